use anyhow::{Result, bail};
use std::collections::{HashMap, HashSet};
use tracing::info;

use crate::models::{MatchTable, Table, TargetTable};

/// Builds the `item_sku` -> `alt_sku` table from an export that names the
/// two columns differently (e.g. `Variation.number` / `Variation.externalId`).
pub struct MatchTableBuilder {
    sku_column: String,
    alt_sku_column: String,
}

impl MatchTableBuilder {
    pub fn new(sku_column: &str, alt_sku_column: &str) -> Self {
        MatchTableBuilder {
            sku_column: sku_column.to_string(),
            alt_sku_column: alt_sku_column.to_string(),
        }
    }

    /// Left join of the target SKUs against the export. Every distinct
    /// target SKU appears once per matching export row, or once with an
    /// empty `alt_sku` when the export does not know it. SKUs are compared
    /// as text.
    pub fn build(&self, target: &TargetTable, export: &Table) -> Result<MatchTable> {
        let (Some(sku_position), Some(alt_position)) = (
            export.column_position(&self.sku_column),
            export.column_position(&self.alt_sku_column),
        ) else {
            bail!(
                "Alternative SKU export lacks the columns '{}' and/or '{}'",
                self.sku_column,
                self.alt_sku_column
            );
        };

        let mut alternatives: HashMap<&str, Vec<&str>> = HashMap::new();
        for row in export.rows() {
            alternatives
                .entry(row[sku_position].as_str())
                .or_default()
                .push(row[alt_position].as_str());
        }

        let mut seen = HashSet::new();
        let mut pairs = Vec::new();
        for sku in target.skus() {
            if !seen.insert(sku) {
                continue;
            }
            match alternatives.get(sku) {
                Some(alts) => {
                    pairs.extend(alts.iter().map(|alt| (sku.to_string(), alt.to_string())));
                }
                None => pairs.push((sku.to_string(), String::new())),
            }
        }

        let table = MatchTable::from_pairs(pairs);
        info!(
            "Built match table with {} entries for {} target SKUs",
            table.len(),
            seen.len()
        );
        Ok(table)
    }

    /// Match table without any alternates, used when the export is not
    /// configured.
    pub fn empty_for(target: &TargetTable) -> MatchTable {
        let mut seen = HashSet::new();
        MatchTable::from_pairs(
            target
                .skus()
                .filter(|sku| seen.insert(*sku))
                .map(|sku| (sku.to_string(), String::new()))
                .collect::<Vec<_>>(),
        )
    }
}
