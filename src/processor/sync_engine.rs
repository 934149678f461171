use anyhow::{Result, anyhow};
use tracing::{debug, info};

use crate::models::{ExcludeSet, MatchTable, SourceTable, TargetTable, VALUE_COLUMN};
use crate::processor::field_resolver::{find_match, is_sentinel_zero};

/// Fills target columns from the original flatfile.
pub struct SyncEngine<'a> {
    source: &'a SourceTable,
    match_table: &'a MatchTable,
}

impl<'a> SyncEngine<'a> {
    pub fn new(source: &'a SourceTable, match_table: &'a MatchTable) -> Self {
        SyncEngine {
            source,
            match_table,
        }
    }

    /// Replace every non-excluded column with the value resolved for each
    /// row's SKU. Returns how many columns were rewritten.
    pub fn transfer_from_original(
        &self,
        target: &mut TargetTable,
        exclude: &ExcludeSet,
    ) -> Result<usize> {
        let columns: Vec<(usize, String)> = target
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, column)| !exclude.contains(column))
            .map(|(position, column)| (position, column.clone()))
            .collect();

        for (position, column) in &columns {
            let values = self.resolve_column(target, column);
            target.set_column(*position, values)?;
            strip_zero_values(target, *position);
            debug!("Transferred column '{}'", column);
        }

        info!(
            "Transferred {} columns for {} rows",
            columns.len(),
            target.len()
        );
        Ok(columns.len())
    }

    /// Single-column mode: resolve `field` into the `value` column.
    pub fn transfer_single_column(&self, target: &mut TargetTable, field: &str) -> Result<()> {
        let position = target
            .column_position(VALUE_COLUMN)
            .ok_or_else(|| anyhow!("Single column table has no '{}' column", VALUE_COLUMN))?;

        let values = self.resolve_column(target, field);
        target.set_column(position, values)?;
        strip_zero_values(target, position);

        info!("Resolved column '{}' for {} rows", field, target.len());
        Ok(())
    }

    fn resolve_column(&self, target: &TargetTable, field: &str) -> Vec<String> {
        target
            .skus()
            .map(|sku| find_match(sku, field, self.source, self.match_table))
            .collect()
    }
}

/// Blank out any zero sentinel left in a column.
pub fn strip_zero_values(target: &mut TargetTable, position: usize) -> usize {
    let mut stripped = 0;
    for row in target.rows_mut() {
        if let Some(cell) = row.values.get_mut(position) {
            if is_sentinel_zero(cell) {
                cell.clear();
                stripped += 1;
            }
        }
    }
    stripped
}
