use anyhow::{Result, bail};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::SyncConfig;
use crate::models::ExcludeSet;
use crate::pipeline::RunOptions;
use crate::storage::default_snapshot_path;

/// Move values from an original flatfile into the matching rows of a
/// Google sheet that uses a different flatfile format.
#[derive(Debug, Parser)]
#[command(name = "transfer-flatfile", version)]
pub struct Args {
    /// The original flatfile format
    #[arg(short = 'o', long = "original")]
    pub original: PathBuf,

    /// Transfer only this column of the sheet
    #[arg(short = 'c', long = "column")]
    pub column: Option<String>,

    /// Comma separated columns that must not be overwritten
    #[arg(short = 'e', long = "exclude")]
    pub exclude: Option<String>,

    /// Save the filled table locally, optionally to the given path
    #[arg(short = 's', long = "save", num_args = 0..=1)]
    pub save: Option<Option<PathBuf>>,

    /// Apply the configured adjust expression to every value
    #[arg(short = 'a', long = "adjust", requires = "column")]
    pub adjust: bool,

    /// Configuration file
    #[arg(long = "config", default_value = "src/configs/transfer_flatfile.toml")]
    pub config: PathBuf,

    /// Resolve and batch the updates without writing them to the sheet
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

impl Args {
    pub fn run_options(&self, config: &SyncConfig) -> Result<RunOptions> {
        let original = check_path(&self.original)?;

        let exclude = self
            .exclude
            .as_deref()
            .map(ExcludeSet::parse)
            .unwrap_or_default();

        let save = match &self.save {
            None => None,
            Some(Some(path)) => Some(path.clone()),
            Some(None) => Some(default_snapshot_path(&config.data_dir())),
        };

        if self.exclude.is_some() && self.column.is_some() {
            warn!("--exclude has no effect together with --column");
        }

        Ok(RunOptions {
            original,
            column: self.column.clone(),
            exclude,
            save,
            adjust: self.adjust,
            dry_run: self.dry_run,
        })
    }
}

/// Resolve a path from the command line: relative to the working directory
/// first, then as given.
pub fn check_path(path: &Path) -> Result<PathBuf> {
    let full_path = std::env::current_dir()?.join(path);
    if full_path.exists() {
        return Ok(full_path);
    }
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    bail!("Path [{}] not valid", full_path.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(check_path(file.path()).unwrap(), file.path());
        assert!(check_path(Path::new("does/not/exist.csv")).is_err());
    }

    #[test]
    fn test_parse_arguments() {
        let args = Args::try_parse_from([
            "transfer-flatfile",
            "-o",
            "orig.csv",
            "-c",
            "color_name",
            "-a",
            "--save",
        ])
        .unwrap();

        assert_eq!(args.original, PathBuf::from("orig.csv"));
        assert_eq!(args.column.as_deref(), Some("color_name"));
        assert!(args.adjust);
        assert_eq!(args.save, Some(None));
        assert_eq!(args.config, PathBuf::from("src/configs/transfer_flatfile.toml"));
    }

    #[test]
    fn test_adjust_requires_column() {
        let result = Args::try_parse_from(["transfer-flatfile", "-o", "orig.csv", "-a"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_original_is_required() {
        assert!(Args::try_parse_from(["transfer-flatfile", "-c", "color_name"]).is_err());
    }

    #[test]
    fn test_run_options() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let content = "[general]\nsheet_id = \"abc\"\ndata_dir = \"/tmp/t\"\n";
        let config = SyncConfig::from_toml(content).unwrap();
        let args = Args::try_parse_from([
            "transfer-flatfile",
            "-o",
            file.path().to_str().unwrap(),
            "-e",
            "brand_name,item_name",
            "-s",
        ])
        .unwrap();

        let options = args.run_options(&config).unwrap();
        assert!(options.exclude.contains("brand_name"));
        assert!(options.save.unwrap().starts_with("/tmp/t"));
        assert!(!options.adjust);
    }
}
