use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use tracing::{info, warn};
use reqwest::{Client, RequestBuilder, Response};

use crate::config::SyncConfig;
use crate::sheet::batcher::UpdateEntry;

/// Acknowledgment of a batch write. A missing row count marks a batch that
/// the sheet did not apply.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WriteAck {
    #[serde(rename = "totalUpdatedRows")]
    pub total_updated_rows: Option<u64>,
}

/// A remote tabular store addressed with A1 coordinates.
#[async_trait]
pub trait SheetSink: Send + Sync {
    /// Raw rows of a rectangular range. Trailing empty cells may be missing.
    async fn batch_get(&self, range: &str) -> Result<Vec<Vec<String>>>;

    async fn batch_update(&self, entries: &[UpdateEntry]) -> Result<WriteAck>;
}

/// Google Sheets v4 values API.
pub struct GoogleSheetsClient {
    client: Client,
    base_url: String,
    sheet_id: String,
    access_token: String,
}

impl GoogleSheetsClient {
    pub fn new(base_url: &str, sheet_id: &str, access_token: String) -> Result<Self> {
        let client = Client::builder().build()?;

        Ok(GoogleSheetsClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            sheet_id: sheet_id.to_string(),
            access_token,
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let token = config.access_token()?;
        Self::new(&config.sheets.base_url, &config.general.sheet_id, token)
    }

    fn values_url(&self, action: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values:{}",
            self.base_url, self.sheet_id, action
        )
    }

    fn cell_text(cell: &Value) -> String {
        match cell {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    fn batch_get_request(&self, range: &str) -> RequestBuilder {
        self.client
            .get(self.values_url("batchGet"))
            .query(&[("ranges", range)])
            .header("Authorization", format!("Bearer {}", self.access_token))
    }

    async fn check_status(response: Response) -> Result<Response> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("HTTP error: {} {}", status, body));
        }
        Ok(response)
    }
}

#[async_trait]
impl SheetSink for GoogleSheetsClient {
    async fn batch_get(&self, range: &str) -> Result<Vec<Vec<String>>> {
        info!("Reading sheet range {}", range);

        let response = self.batch_get_request(range).send().await?;
        let data: Value = Self::check_status(response).await?.json().await?;

        let ranges = data
            .get("valueRanges")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();
        if ranges.is_empty() {
            warn!("No data found in range {}", range);
        }

        let mut rows = Vec::new();
        for value_range in &ranges {
            if let Some(values) = value_range.get("values").and_then(|v| v.as_array()) {
                for row in values {
                    let cells = row
                        .as_array()
                        .map(|cells| cells.iter().map(Self::cell_text).collect())
                        .unwrap_or_default();
                    rows.push(cells);
                }
            }
        }

        Ok(rows)
    }

    async fn batch_update(&self, entries: &[UpdateEntry]) -> Result<WriteAck> {
        let body = json!({
            "valueInputOption": "RAW",
            "data": entries,
        });

        let response = self
            .client
            .post(&self.values_url("batchUpdate"))
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Batch update rejected with {}: {}", status, body);
            return Ok(WriteAck::default());
        }

        Ok(response.json::<WriteAck>().await?)
    }
}

/// Sheet held in memory. Reads return the whole grid regardless of the
/// requested range; writes are recorded per coordinate.
pub struct MemorySheet {
    grid: Vec<Vec<String>>,
    cells: Mutex<HashMap<String, String>>,
    rejected_batches: HashSet<usize>,
    batches_seen: Mutex<usize>,
}

impl MemorySheet {
    pub fn new(grid: Vec<Vec<String>>) -> Self {
        MemorySheet {
            grid,
            cells: Mutex::new(HashMap::new()),
            rejected_batches: HashSet::new(),
            batches_seen: Mutex::new(0),
        }
    }

    /// Answer the given 0-indexed batch without an updated row count.
    pub fn with_rejected_batch(mut self, batch: usize) -> Self {
        self.rejected_batches.insert(batch);
        self
    }

    pub fn cell(&self, coordinate: &str) -> Option<String> {
        self.cells
            .lock()
            .ok()
            .and_then(|cells| cells.get(coordinate).cloned())
    }

    pub fn written_cells(&self) -> HashMap<String, String> {
        self.cells.lock().map(|cells| cells.clone()).unwrap_or_default()
    }

    pub fn batches_seen(&self) -> usize {
        self.batches_seen.lock().map(|seen| *seen).unwrap_or(0)
    }
}

#[async_trait]
impl SheetSink for MemorySheet {
    async fn batch_get(&self, _range: &str) -> Result<Vec<Vec<String>>> {
        Ok(self.grid.clone())
    }

    async fn batch_update(&self, entries: &[UpdateEntry]) -> Result<WriteAck> {
        let batch = {
            let mut seen = self
                .batches_seen
                .lock()
                .map_err(|_| anyhow!("Memory sheet lock poisoned"))?;
            *seen += 1;
            *seen - 1
        };
        if self.rejected_batches.contains(&batch) {
            return Ok(WriteAck::default());
        }

        let mut cells = self
            .cells
            .lock()
            .map_err(|_| anyhow!("Memory sheet lock poisoned"))?;
        let mut rows = BTreeSet::new();
        for entry in entries {
            let row = entry.range.trim_start_matches(|c: char| c.is_ascii_alphabetic());
            rows.insert(row.to_string());
            cells.insert(entry.range.clone(), entry.value().to_string());
        }

        Ok(WriteAck {
            total_updated_rows: Some(rows.len() as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_ack_parsing() {
        let ack: WriteAck = serde_json::from_str(
            r#"{"spreadsheetId": "abc", "totalUpdatedRows": 12, "totalUpdatedCells": 40}"#,
        )
        .unwrap();
        assert_eq!(ack.total_updated_rows, Some(12));

        let ack: WriteAck = serde_json::from_str(r#"{"spreadsheetId": "abc"}"#).unwrap();
        assert_eq!(ack.total_updated_rows, None);
    }

    #[test]
    fn test_cell_text_conversion() {
        assert_eq!(GoogleSheetsClient::cell_text(&json!("0042")), "0042");
        assert_eq!(GoogleSheetsClient::cell_text(&json!(12)), "12");
        assert_eq!(GoogleSheetsClient::cell_text(&Value::Null), "");
    }

    #[test]
    fn test_values_url() {
        let client = GoogleSheetsClient::new(
            "https://sheets.googleapis.com/",
            "sheet-1",
            "token".to_string(),
        )
        .unwrap();
        assert_eq!(
            client.values_url("batchGet"),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-1/values:batchGet"
        );
    }

    #[test]
    fn test_batch_get_range_is_encoded() {
        let client = GoogleSheetsClient::new(
            "https://sheets.googleapis.com",
            "sheet-1",
            "token".to_string(),
        )
        .unwrap();
        let request = client.batch_get_request("'Sheet 1'!A3:FH2400").build().unwrap();

        assert_eq!(request.url().query(), Some("ranges=%27Sheet+1%27%21A3%3AFH2400"));
        assert_eq!(request.url().path(), "/v4/spreadsheets/sheet-1/values:batchGet");
    }

    #[tokio::test]
    async fn test_memory_sheet_records_writes() {
        let sheet = MemorySheet::new(vec![vec!["a".to_string()]]);
        let ack = sheet
            .batch_update(&[
                UpdateEntry::new("C4".to_string(), "red".to_string()),
                UpdateEntry::new("D4".to_string(), "M".to_string()),
            ])
            .await
            .unwrap();

        assert_eq!(ack.total_updated_rows, Some(1));
        assert_eq!(sheet.cell("C4").as_deref(), Some("red"));
        assert_eq!(sheet.batches_seen(), 1);
        assert_eq!(sheet.batch_get("A1:A1").await.unwrap().len(), 1);
    }
}
