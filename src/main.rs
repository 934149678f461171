use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use transfer_flatfile::cli::Args;
use transfer_flatfile::config::SyncConfig;
use transfer_flatfile::pipeline;
use transfer_flatfile::sheet::GoogleSheetsClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let args = Args::parse();

    let config = SyncConfig::from_file(&args.config)
        .context("Failed to load transfer configuration")?;
    info!(
        "Loaded configuration for sheet {} ({})",
        config.general.sheet_id,
        args.config.display()
    );

    let options = args.run_options(&config)?;
    let sink = GoogleSheetsClient::from_config(&config)
        .context("Failed to initialize the Google Sheets client")?;

    let summary = pipeline::run(&config, &options, &sink).await?;

    info!("=== Transfer Summary ===");
    info!("Rows filled: {}", summary.target_rows);
    info!("Cell updates: {}", summary.updates);
    info!(
        "Batches: {} sent, {} unacknowledged, {} rows updated",
        summary.write.batches, summary.write.failed_batches, summary.write.updated_rows
    );

    if !summary.write.is_complete() {
        warn!("The sheet may be partially updated, check the warnings above");
    }

    Ok(())
}
