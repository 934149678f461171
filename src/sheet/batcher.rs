use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::models::{ExcludeSet, TargetTable};
use crate::sheet::client::SheetSink;
use crate::sheet::coordinates::cell_coordinate;

pub const DEFAULT_BATCH_SIZE: usize = 3000;

/// A single cell write, serialized in the shape the Sheets batch update
/// endpoint expects (`{"range": "C4", "values": [["red"]]}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEntry {
    pub range: String,
    pub values: Vec<Vec<String>>,
}

impl UpdateEntry {
    pub fn new(range: String, value: String) -> Self {
        UpdateEntry {
            range,
            values: vec![vec![value]],
        }
    }

    pub fn value(&self) -> &str {
        self.values
            .first()
            .and_then(|row| row.first())
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Outcome of submitting every batch of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteReport {
    pub batches: usize,
    pub failed_batches: usize,
    pub updated_rows: u64,
}

impl WriteReport {
    pub fn is_complete(&self) -> bool {
        self.failed_batches == 0
    }
}

/// Turn a filled target table into cell writes, in row order.
///
/// Rows carrying a `column_index` write their `value` cell only. Other rows
/// write every column that is neither a key nor excluded, addressed by the
/// column's header position and the sheet row `index + 1`.
pub fn build_updates(target: &TargetTable, exclude: &ExcludeSet) -> Result<Vec<UpdateEntry>> {
    let mut updates = Vec::new();
    let value_position = target.column_position(crate::models::VALUE_COLUMN);

    for row in target.rows() {
        let sheet_row = row.index + 1;

        if let (Some(column_index), Some(position)) = (row.column_index, value_position) {
            let range = cell_coordinate(column_index, sheet_row)?;
            updates.push(UpdateEntry::new(range, row.values[position].clone()));
            continue;
        }

        for (position, column) in target.columns().iter().enumerate() {
            if exclude.contains(column) {
                continue;
            }
            let range = cell_coordinate(position, sheet_row)?;
            updates.push(UpdateEntry::new(range, row.values[position].clone()));
        }
    }

    Ok(updates)
}

/// Split `data` into consecutive chunks of at most `size` entries.
pub fn write_chunks<T>(data: &[T], size: usize) -> std::slice::Chunks<'_, T> {
    data.chunks(size.max(1))
}

/// Submit the updates one batch at a time. A batch whose acknowledgment has
/// no updated-row count is logged and counted, the remaining batches are
/// still sent.
pub async fn submit_batches(
    sink: &dyn SheetSink,
    updates: &[UpdateEntry],
    size: usize,
) -> Result<WriteReport> {
    let mut report = WriteReport::default();
    let total = updates.len().div_ceil(size.max(1));

    for (number, batch) in write_chunks(updates, size).enumerate() {
        report.batches += 1;
        info!(
            "Submitting batch {}/{} with {} cells",
            number + 1,
            total,
            batch.len()
        );

        let ack = match sink.batch_update(batch).await {
            Ok(ack) => ack,
            Err(e) => {
                error!("Batch {}/{} could not be sent: {}", number + 1, total, e);
                return Err(e);
            }
        };

        match ack.total_updated_rows {
            Some(rows) => report.updated_rows += rows,
            None => {
                warn!(
                    "Batch {}/{} was not acknowledged with an updated row count",
                    number + 1,
                    total
                );
                report.failed_batches += 1;
            }
        }
    }

    Ok(report)
}
