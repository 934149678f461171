use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::models::{ExcludeSet, MatchTable, TargetTable, VALUE_COLUMN};
use crate::processor::{MatchTableBuilder, SyncEngine, ValueAdjuster, strip_zero_values};
use crate::sheet::{
    CompletenessFilter, SheetSink, WriteReport, build_range, build_updates, submit_batches,
};
use crate::storage::{FlatfileReader, write_snapshot};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub original: PathBuf,
    pub column: Option<String>,
    pub exclude: ExcludeSet,
    pub save: Option<PathBuf>,
    pub adjust: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub target_rows: usize,
    pub match_entries: usize,
    pub updates: usize,
    pub write: WriteReport,
}

/// One complete transfer: read the sheet, pick the rows to fill, resolve
/// values from the original flatfile and write them back batch by batch.
pub async fn run(
    config: &SyncConfig,
    options: &RunOptions,
    sink: &dyn SheetSink,
) -> Result<RunSummary> {
    let reader = FlatfileReader::new(config.separator(), config.source.header_offset);
    let source = reader.read_source(&options.original)?;

    // The expression is needed before any work is done when --adjust is set.
    let adjuster = if options.adjust {
        let expression = config
            .adjust_expression()
            .context("--adjust needs an [adjust] expression in the configuration")?;
        Some(ValueAdjuster::parse(expression)?)
    } else {
        None
    };

    let range = build_range(
        &config.sheets.start_column,
        config.sheets.max_row,
        Some(config.sheets.end_column.as_str()),
    );
    let grid = sink.batch_get(&range).await?;

    let filter = CompletenessFilter::new(config.layout.clone());
    let mut target = match &options.column {
        Some(column) => filter
            .single_column(&grid, column)?
            .with_context(|| format!("Column '{}' does not exist in the sheet", column))?,
        None => filter.incomplete_rows(&grid)?,
    };

    if target.is_empty() {
        bail!("The sheet has no rows that need values");
    }

    let match_table = load_match_table(config, &reader, &target).await;
    let engine = SyncEngine::new(&source, &match_table);

    match &options.column {
        Some(column) => {
            engine.transfer_single_column(&mut target, column)?;
            if let Some(adjuster) = &adjuster {
                let adjusted = adjuster.adjust_column(&mut target)?;
                if let Some(position) = target.column_position(VALUE_COLUMN) {
                    strip_zero_values(&mut target, position);
                }
                info!("Adjusted {} values", adjusted);
            }
        }
        None => {
            if options.exclude.explicit_len() > 0 {
                info!("Keeping {} excluded columns untouched", options.exclude.explicit_len());
            }
            engine.transfer_from_original(&mut target, &options.exclude)?;
        }
    }

    if let Some(path) = &options.save {
        write_snapshot(&target, path, config.separator())?;
    }

    let updates = build_updates(&target, &options.exclude)?;
    let mut summary = RunSummary {
        target_rows: target.len(),
        match_entries: match_table.len(),
        updates: updates.len(),
        write: WriteReport::default(),
    };

    if options.dry_run {
        info!("Dry run: {} cell updates not submitted", updates.len());
        return Ok(summary);
    }

    summary.write = submit_batches(sink, &updates, config.batch_size()).await?;
    if !summary.write.is_complete() {
        warn!(
            "{} of {} batches were not acknowledged by the sheet",
            summary.write.failed_batches, summary.write.batches
        );
    }

    Ok(summary)
}

/// The match table from the configured export. Missing or broken
/// configuration only disables alternate SKU lookups.
async fn load_match_table(
    config: &SyncConfig,
    reader: &FlatfileReader,
    target: &TargetTable,
) -> MatchTable {
    let settings = match config.match_table_settings() {
        Ok(Some(settings)) => settings,
        Ok(None) => {
            info!("Match table disabled, only direct SKU matches are used");
            return MatchTableBuilder::empty_for(target);
        }
        Err(e) => {
            warn!("Match table not available, only direct SKU matches are used: {}", e);
            return MatchTableBuilder::empty_for(target);
        }
    };

    let builder = MatchTableBuilder::new(&settings.sku_column, &settings.alt_sku_column);
    reader
        .read_export(&settings.export)
        .await
        .and_then(|export| builder.build(target, &export))
        .unwrap_or_else(|e| {
            warn!("Could not build match table, only direct SKU matches are used: {}", e);
            MatchTableBuilder::empty_for(target)
        })
}
