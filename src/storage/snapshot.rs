use anyhow::{Context, Result};
use chrono::Utc;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::TargetTable;

/// Default location for a snapshot inside the data directory.
pub fn default_snapshot_path(data_dir: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    data_dir.join(format!("transfer_{}.csv", stamp))
}

/// Write the filled target table, including its `index` bookkeeping
/// column, as delimited text.
pub fn write_snapshot(target: &TargetTable, path: &Path, separator: u8) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create snapshot directory: {}", parent.display()))?;
    }

    let mut df = target.to_table().to_dataframe()?;
    let mut file = File::create(path)
        .with_context(|| format!("Failed to create snapshot file: {}", path.display()))?;
    CsvWriter::new(&mut file)
        .with_separator(separator)
        .finish(&mut df)?;

    info!("Saved {} rows to {}", df.height(), path.display());
    Ok(())
}
