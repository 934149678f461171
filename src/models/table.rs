use anyhow::{Result, anyhow, bail};
use polars::prelude::*;
use std::collections::{HashMap, HashSet};

pub const SKU_COLUMN: &str = "item_sku";
pub const INDEX_COLUMN: &str = "index";
pub const VALUE_COLUMN: &str = "value";
pub const COLUMN_INDEX_COLUMN: &str = "column_index";

/// Plain text table. Every cell is kept as text so identifiers such as SKUs
/// and EANs never lose leading zeros.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from rows, padding short rows with empty cells and
    /// cutting rows that are wider than the header.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();

        Table { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_position(name).is_some()
    }

    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.columns.len(), String::new());
        self.rows.push(row);
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|values| values.get(column))
            .map(String::as_str)
    }

    /// Convert a polars frame into a text table. Nulls become empty cells.
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let columns: Vec<String> = df
            .get_columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();

        let mut rows = vec![Vec::with_capacity(columns.len()); df.height()];
        for column in df.get_columns() {
            let text = column
                .cast(&DataType::String)
                .map_err(|e| anyhow!("Failed to read column '{}' as text: {}", column.name(), e))?;
            for (row, value) in text.str()?.into_iter().enumerate() {
                rows[row].push(value.unwrap_or_default().to_string());
            }
        }

        Ok(Table { columns, rows })
    }

    /// Convert into a polars frame of string columns, empty cells as nulls.
    /// Repeated or blank header names get a positional suffix, polars
    /// rejects duplicates.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut seen = HashSet::new();
        let mut series_vec = Vec::with_capacity(self.columns.len());

        for (position, name) in self.columns.iter().enumerate() {
            let mut unique = if name.is_empty() {
                format!("column_{}", position)
            } else {
                name.clone()
            };
            if !seen.insert(unique.clone()) {
                unique = format!("{}_{}", unique, position);
                seen.insert(unique.clone());
            }

            let values: Vec<Option<String>> = self
                .rows
                .iter()
                .map(|row| Some(row[position].clone()).filter(|value| !value.is_empty()))
                .collect();
            let series = Series::new(unique.as_str().into(), values);
            series_vec.push(series.into());
        }

        DataFrame::new(series_vec).map_err(|e| anyhow!("Failed to create DataFrame: {}", e))
    }
}

/// The authoritative flatfile. Lookups by SKU return the first row in table
/// order when the file repeats a SKU.
#[derive(Debug, Clone)]
pub struct SourceTable {
    table: Table,
    first_row_by_sku: HashMap<String, usize>,
}

impl SourceTable {
    pub fn new(table: Table) -> Result<Self> {
        let Some(sku_position) = table.column_position(SKU_COLUMN) else {
            bail!("Source table has no '{}' column", SKU_COLUMN);
        };

        let mut first_row_by_sku = HashMap::with_capacity(table.height());
        for (row, values) in table.rows().iter().enumerate() {
            first_row_by_sku
                .entry(values[sku_position].clone())
                .or_insert(row);
        }

        Ok(SourceTable {
            table,
            first_row_by_sku,
        })
    }

    pub fn len(&self) -> usize {
        self.table.height()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.table.has_column(name)
    }

    pub fn contains_sku(&self, sku: &str) -> bool {
        self.first_row_by_sku.contains_key(sku)
    }

    /// Value of `field` in the first row keyed by `sku`.
    pub fn lookup(&self, sku: &str, field: &str) -> Option<&str> {
        let row = *self.first_row_by_sku.get(sku)?;
        let column = self.table.column_position(field)?;
        self.table.cell(row, column)
    }
}

/// One row of the sheet that still needs values.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRow {
    /// Offset of the row in the raw sheet grid (0-indexed).
    pub index: usize,
    /// Sheet column the value belongs to, only set in single-column mode.
    pub column_index: Option<usize>,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetTable {
    columns: Vec<String>,
    sku_position: usize,
    rows: Vec<TargetRow>,
}

impl TargetTable {
    pub fn new(columns: Vec<String>) -> Result<Self> {
        let sku_position = columns
            .iter()
            .position(|column| column == SKU_COLUMN)
            .ok_or_else(|| anyhow!("Target header has no '{}' column", SKU_COLUMN))?;

        Ok(TargetTable {
            columns,
            sku_position,
            rows: Vec::new(),
        })
    }

    pub fn push_row(&mut self, index: usize, column_index: Option<usize>, mut values: Vec<String>) {
        values.resize(self.columns.len(), String::new());
        self.rows.push(TargetRow {
            index,
            column_index,
            values,
        });
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[TargetRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn skus(&self) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().map(|row| row.values[self.sku_position].as_str())
    }

    pub fn column_values(&self, position: usize) -> Vec<&str> {
        self.rows
            .iter()
            .map(|row| row.values[position].as_str())
            .collect()
    }

    /// Replace one column, row by row.
    pub fn set_column(&mut self, position: usize, values: Vec<String>) -> Result<()> {
        if position >= self.columns.len() {
            bail!("Column position {} is outside the target table", position);
        }
        if values.len() != self.rows.len() {
            bail!(
                "Column '{}' got {} values for {} rows",
                self.columns[position],
                values.len(),
                self.rows.len()
            );
        }

        for (row, value) in self.rows.iter_mut().zip(values) {
            row.values[position] = value;
        }
        Ok(())
    }

    pub fn rows_mut(&mut self) -> &mut [TargetRow] {
        &mut self.rows
    }

    /// Flatten into a text table with the bookkeeping columns appended, the
    /// shape used for local snapshots.
    pub fn to_table(&self) -> Table {
        let single_column = self.rows.iter().any(|row| row.column_index.is_some());

        let mut columns = self.columns.clone();
        if single_column {
            columns.push(COLUMN_INDEX_COLUMN.to_string());
        }
        columns.push(INDEX_COLUMN.to_string());

        let mut table = Table::new(columns);
        for row in &self.rows {
            let mut values = row.values.clone();
            if single_column {
                values.push(row.column_index.map(|c| c.to_string()).unwrap_or_default());
            }
            values.push(row.index.to_string());
            table.push_row(values);
        }
        table
    }
}

/// `item_sku` -> `alt_sku` pairs for the SKUs of a target table. An empty
/// `alt_sku` means there is no alternate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchTable {
    entries: Vec<(String, String)>,
    first_entry_by_sku: HashMap<String, usize>,
}

impl MatchTable {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut table = MatchTable::default();
        for (sku, alt_sku) in pairs {
            table
                .first_entry_by_sku
                .entry(sku.clone())
                .or_insert(table.entries.len());
            table.entries.push((sku, alt_sku));
        }
        table
    }

    /// First alternate recorded for `sku`, `None` when the SKU has no entry.
    pub fn lookup(&self, sku: &str) -> Option<&str> {
        self.first_entry_by_sku
            .get(sku)
            .map(|&entry| self.entries[entry].1.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Columns the sync must never overwrite. `item_sku` and `index` are
/// always excluded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExcludeSet {
    columns: HashSet<String>,
}

impl ExcludeSet {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExcludeSet {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a comma separated list such as `"brand_name, item_name"`.
    pub fn parse(list: &str) -> Self {
        Self::new(
            list.split(',')
                .map(str::trim)
                .filter(|column| !column.is_empty()),
        )
    }

    pub fn contains(&self, column: &str) -> bool {
        column == SKU_COLUMN
            || column == INDEX_COLUMN
            || column == COLUMN_INDEX_COLUMN
            || self.columns.contains(column)
    }

    pub fn explicit_len(&self) -> usize {
        self.columns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_source_lookup_uses_first_duplicate() {
        let table = Table::from_rows(
            strings(&["item_sku", "color"]),
            vec![
                strings(&["0042", "red"]),
                strings(&["0042", "blue"]),
                strings(&["42"]),
            ],
        );
        let source = SourceTable::new(table).unwrap();

        assert_eq!(source.lookup("0042", "color"), Some("red"));
        assert_eq!(source.lookup("42", "color"), Some(""));
        assert_eq!(source.lookup("0042", "size"), None);
        assert!(!source.contains_sku("042"));
    }

    #[test]
    fn test_source_requires_sku_column() {
        let table = Table::from_rows(strings(&["sku", "color"]), vec![]);
        assert!(SourceTable::new(table).is_err());
    }

    #[test]
    fn test_exclude_set_implicit_columns() {
        let exclude = ExcludeSet::parse("brand_name, ,item_name");

        assert!(exclude.contains("item_sku"));
        assert!(exclude.contains("index"));
        assert!(exclude.contains("brand_name"));
        assert!(exclude.contains("item_name"));
        assert!(!exclude.contains("color_name"));
        assert_eq!(exclude.explicit_len(), 2);
    }

    #[test]
    fn test_match_table_first_entry_wins() {
        let table = MatchTable::from_pairs(vec![
            ("1234x".to_string(), "2345x".to_string()),
            ("1234x".to_string(), "9999x".to_string()),
            ("1235x".to_string(), String::new()),
        ]);

        assert_eq!(table.lookup("1234x"), Some("2345x"));
        assert_eq!(table.lookup("1235x"), Some(""));
        assert_eq!(table.lookup("1236x"), None);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_dataframe_round_trip_keeps_leading_zeros() {
        let table = Table::from_rows(
            strings(&["item_sku", "external_product_id", "item_sku"]),
            vec![strings(&["001", "04012345678901", "dup"])],
        );

        let df = table.to_dataframe().unwrap();
        assert_eq!(df.width(), 3);

        let back = Table::from_dataframe(&df).unwrap();
        assert_eq!(back.cell(0, 0), Some("001"));
        assert_eq!(back.cell(0, 1), Some("04012345678901"));
        assert_eq!(back.columns()[2], "item_sku_2");
    }

    #[test]
    fn test_target_to_table_appends_bookkeeping_columns() {
        let mut target = TargetTable::new(strings(&["item_sku", "value"])).unwrap();
        target.push_row(7, Some(4), strings(&["1234x", "abc"]));

        let table = target.to_table();
        assert_eq!(
            table.columns(),
            strings(&["item_sku", "value", "column_index", "index"]).as_slice()
        );
        assert_eq!(table.rows()[0], strings(&["1234x", "abc", "4", "7"]));
    }
}
