use anyhow::{Context, Result, anyhow, bail};
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;
use tracing::{info, warn};
use reqwest::Client;

use crate::models::{SKU_COLUMN, SourceTable, Table};

/// Reads delimited text exports with every column kept as text.
pub struct FlatfileReader {
    separator: u8,
    header_offset: usize,
}

impl FlatfileReader {
    /// `header_offset` is the number of lines to skip when the first line
    /// is not the header (flatfile templates carry metadata rows on top).
    pub fn new(separator: u8, header_offset: usize) -> Self {
        FlatfileReader {
            separator,
            header_offset,
        }
    }

    /// Load the original flatfile. The header is expected on the first line;
    /// if that has no `item_sku` the file is read again from
    /// `header_offset`.
    pub fn read_source(&self, path: &Path) -> Result<SourceTable> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read source flatfile: {}", path.display()))?;

        let table = match self.parse(bytes.clone(), 0) {
            Ok(table) if table.has_column(SKU_COLUMN) => table,
            first_attempt => {
                if let Err(e) = first_attempt {
                    warn!("First line of {} is not a usable header: {}", path.display(), e);
                }
                info!(
                    "No '{}' column in the first line, re-reading {} with header offset {}",
                    SKU_COLUMN,
                    path.display(),
                    self.header_offset
                );
                let table = self.parse(bytes, self.header_offset)?;
                if !table.has_column(SKU_COLUMN) {
                    bail!(
                        "Source flatfile {} has no '{}' column in either accepted header row",
                        path.display(),
                        SKU_COLUMN
                    );
                }
                table
            }
        };

        info!(
            "Loaded source flatfile {} with {} rows and {} columns",
            path.display(),
            table.height(),
            table.columns().len()
        );
        SourceTable::new(table)
    }

    /// Load the alternative SKU export from a local path or an HTTP(S) URL.
    pub async fn read_export(&self, location: &str) -> Result<Table> {
        let bytes = if location.starts_with("http://") || location.starts_with("https://") {
            info!("Downloading alternative SKUs from {}", location);
            fetch_bytes(location).await?
        } else {
            std::fs::read(location)
                .with_context(|| format!("Failed to read alternative SKU export: {}", location))?
        };

        let table = self.parse(bytes, 0)?;
        info!("Loaded alternative SKU export with {} rows", table.height());
        Ok(table)
    }

    /// Parse delimited text, skipping `skip_rows` lines before the header.
    pub fn parse(&self, bytes: Vec<u8>, skip_rows: usize) -> Result<Table> {
        let separator = self.separator;
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_skip_rows(skip_rows)
            .with_infer_schema_length(Some(0))
            .map_parse_options(|parse_options| {
                parse_options
                    .with_separator(separator)
                    .with_truncate_ragged_lines(true)
            })
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()
            .map_err(|e| anyhow!("Failed to parse delimited text: {}", e))?;

        Table::from_dataframe(&df)
    }
}

async fn fetch_bytes(url: &str) -> Result<Vec<u8>> {
    let client = Client::builder().build()?;
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        bail!("HTTP error: {} while downloading {}", response.status(), url);
    }

    Ok(response.bytes().await?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_source_with_header_on_first_line() {
        let file =
            write_temp("item_sku;external_product_id;quantity\n0042;04012345678901;0\n1234x;;5\n");
        let reader = FlatfileReader::new(b';', 2);

        let source = reader.read_source(file.path()).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.lookup("0042", "external_product_id"), Some("04012345678901"));
        assert_eq!(source.lookup("1234x", "external_product_id"), Some(""));
        assert_eq!(source.lookup("1234x", "quantity"), Some("5"));
    }

    #[test]
    fn test_read_source_falls_back_to_header_offset() {
        let file = write_temp(
            "TemplateType=fptcustom;Version=2020.0707\n\
             Product Type;Seller SKU;Colour\n\
             feed_product_type;item_sku;color_name\n\
             shirt;1234x;red\n",
        );
        let reader = FlatfileReader::new(b';', 2);

        let source = reader.read_source(file.path()).unwrap();
        assert_eq!(source.len(), 1);
        assert_eq!(source.lookup("1234x", "color_name"), Some("red"));
    }

    #[test]
    fn test_read_source_without_sku_column() {
        let file = write_temp("a;b\n1;2\n3;4\n5;6\n");
        let reader = FlatfileReader::new(b';', 2);
        assert!(reader.read_source(file.path()).is_err());
    }

    #[tokio::test]
    async fn test_read_export_from_path() {
        let file = write_temp("Variation.number;Variation.externalId\n1234x;2345x\n1243x;\n");
        let reader = FlatfileReader::new(b';', 2);

        let table = reader
            .read_export(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(table.height(), 2);
        assert_eq!(table.cell(1, 1), Some(""));
    }
}
