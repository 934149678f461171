use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::sheet::{DEFAULT_BATCH_SIZE, GridLayout};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub general: GeneralSection,
    #[serde(default)]
    pub sheets: SheetsSection,
    #[serde(default)]
    pub layout: GridLayout,
    #[serde(default)]
    pub source: SourceSection,
    pub match_table: Option<MatchTableSection>,
    pub adjust: Option<AdjustSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSection {
    pub sheet_id: String,
    /// Path or URL of the export holding the alternative SKUs.
    pub sku_export: Option<String>,
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsSection {
    pub base_url: String,
    /// Environment variable that holds the OAuth access token.
    pub token_env: String,
    pub start_column: String,
    pub end_column: String,
    pub max_row: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    pub separator: char,
    pub header_offset: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchTableSection {
    pub sku_column: Option<String>,
    pub alt_sku_column: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustSection {
    pub expression: Option<String>,
}

/// Everything needed to build the match table.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchTableSettings {
    pub export: String,
    pub sku_column: String,
    pub alt_sku_column: String,
}

fn default_enabled() -> bool {
    true
}

impl Default for SheetsSection {
    fn default() -> Self {
        Self {
            base_url: "https://sheets.googleapis.com".to_string(),
            token_env: "GOOGLE_SHEETS_TOKEN".to_string(),
            start_column: "A".to_string(),
            end_column: "FH".to_string(),
            max_row: 2400,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            separator: ';',
            header_offset: 2,
        }
    }
}

impl SyncConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: SyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.sheet_id.is_empty() {
            return Err(anyhow!("general.sheet_id cannot be empty"));
        }

        if !self.source.separator.is_ascii() {
            return Err(anyhow!("source.separator must be a single ASCII character"));
        }

        if self.sheets.start_column.is_empty() {
            return Err(anyhow!("sheets.start_column cannot be empty"));
        }

        Ok(())
    }

    pub fn separator(&self) -> u8 {
        self.source.separator as u8
    }

    pub fn batch_size(&self) -> usize {
        if self.sheets.batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            self.sheets.batch_size
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.general
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn access_token(&self) -> Result<String> {
        env::var(&self.sheets.token_env)
            .with_context(|| format!("Missing environment variable: {}", self.sheets.token_env))
    }

    /// Match table settings, `Ok(None)` when the feature is switched off and
    /// an error naming the missing keys when it is configured incompletely.
    pub fn match_table_settings(&self) -> Result<Option<MatchTableSettings>> {
        let Some(section) = &self.match_table else {
            return Err(anyhow!("Config section [match_table] is missing"));
        };
        if !section.enabled {
            return Ok(None);
        }

        let mut missing = Vec::new();
        if self.general.sku_export.as_deref().unwrap_or("").is_empty() {
            missing.push("general.sku_export");
        }
        if section.sku_column.as_deref().unwrap_or("").is_empty() {
            missing.push("match_table.sku_column");
        }
        if section.alt_sku_column.as_deref().unwrap_or("").is_empty() {
            missing.push("match_table.alt_sku_column");
        }
        if !missing.is_empty() {
            return Err(anyhow!("Missing config keys: {}", missing.join(", ")));
        }

        Ok(Some(MatchTableSettings {
            export: self.general.sku_export.clone().unwrap_or_default(),
            sku_column: section.sku_column.clone().unwrap_or_default(),
            alt_sku_column: section.alt_sku_column.clone().unwrap_or_default(),
        }))
    }

    pub fn adjust_expression(&self) -> Result<&str> {
        self.adjust
            .as_ref()
            .and_then(|section| section.expression.as_deref())
            .filter(|expression| !expression.trim().is_empty())
            .ok_or_else(|| anyhow!("Config key adjust.expression is missing"))
    }
}
