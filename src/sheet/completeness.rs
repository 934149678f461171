use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{SKU_COLUMN, TargetTable, VALUE_COLUMN};

/// Fixed offsets of the sheet grid: row 0 holds metadata, `header_row` the
/// column names and every following row is data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridLayout {
    pub header_row: usize,
    pub sku_column: usize,
    pub brand_column: usize,
    pub name_column: usize,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            header_row: 2,
            sku_column: 1,
            brand_column: 2,
            name_column: 5,
        }
    }
}

/// Selects the sheet rows that still need values.
pub struct CompletenessFilter {
    layout: GridLayout,
}

impl CompletenessFilter {
    pub fn new(layout: GridLayout) -> Self {
        CompletenessFilter { layout }
    }

    /// All header columns of every row that has a SKU and is missing at
    /// least one of the brand/name markers.
    pub fn incomplete_rows(&self, grid: &[Vec<String>]) -> Result<TargetTable> {
        let header = self.header(grid)?;
        let mut target = TargetTable::new(header.to_vec())?;

        for (index, row) in self.data_rows(grid) {
            if !self.needs_fill(row) {
                continue;
            }
            target.push_row(index, None, fill_up_values(row, header.len()));
        }

        info!(
            "Selected {} incomplete rows out of {} data rows",
            target.len(),
            grid.len().saturating_sub(self.layout.header_row + 1)
        );
        Ok(target)
    }

    /// Narrow variant for a single column: `{item_sku, value}` plus the
    /// column's header position on each row. `None` when the header has no
    /// such column.
    pub fn single_column(&self, grid: &[Vec<String>], column: &str) -> Result<Option<TargetTable>> {
        let header = self.header(grid)?;
        let Some(column_index) = header.iter().position(|name| name == column) else {
            warn!("Column '{}' not found in the sheet header", column);
            return Ok(None);
        };
        debug!("Column '{}' sits at header position {}", column, column_index);

        let mut target = TargetTable::new(vec![SKU_COLUMN.to_string(), VALUE_COLUMN.to_string()])?;
        for (index, row) in self.data_rows(grid) {
            if !self.needs_fill(row) {
                continue;
            }
            let padded = fill_up_values(row, header.len());
            let values = vec![
                padded.get(self.layout.sku_column).cloned().unwrap_or_default(),
                padded[column_index].clone(),
            ];
            target.push_row(index, Some(column_index), values);
        }

        info!(
            "Selected {} rows for single column '{}'",
            target.len(),
            column
        );
        Ok(Some(target))
    }

    fn header<'a>(&self, grid: &'a [Vec<String>]) -> Result<&'a [String]> {
        match grid.get(self.layout.header_row) {
            Some(header) if !header.is_empty() => Ok(header.as_slice()),
            _ => bail!(
                "Sheet data has no header row at offset {}",
                self.layout.header_row
            ),
        }
    }

    fn data_rows<'a>(
        &self,
        grid: &'a [Vec<String>],
    ) -> impl Iterator<Item = (usize, &'a [String])> {
        grid.iter()
            .enumerate()
            .skip(self.layout.header_row + 1)
            .map(|(index, row)| (index, row.as_slice()))
    }

    fn needs_fill(&self, row: &[String]) -> bool {
        let cell = |column: usize| row.get(column).map(String::as_str).unwrap_or("");

        if cell(self.layout.sku_column).is_empty() {
            return false;
        }
        // both markers set means the row was already filled out
        cell(self.layout.brand_column).is_empty() || cell(self.layout.name_column).is_empty()
    }
}

/// Pad a ragged sheet row with empty cells up to `maximum`.
pub fn fill_up_values(row: &[String], maximum: usize) -> Vec<String> {
    let mut values = row.to_vec();
    if values.len() < maximum {
        values.resize(maximum, String::new());
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn sample_grid() -> Vec<Vec<String>> {
        vec![
            row(&["TemplateType=fptcustom"]),
            row(&["Artikel", "SKU", "Marke", "", "", "Name"]),
            row(&[
                "feed_product_type",
                "item_sku",
                "brand_name",
                "color_name",
                "size_name",
                "item_name",
            ]),
            row(&["shirt", "1234x", "", "red"]),
            row(&["shirt", "", "brand"]),
            row(&["shirt", "1235x", "brand", "blue", "M", "Shirt"]),
            row(&["shirt", "1236x", "brand", "", "", ""]),
            row(&[]),
            row(&["shirt", "1237x"]),
        ]
    }

    #[test]
    fn test_incomplete_rows_selection() {
        let filter = CompletenessFilter::new(GridLayout::default());
        let target = filter.incomplete_rows(&sample_grid()).unwrap();

        let skus: Vec<&str> = target.skus().collect();
        assert_eq!(skus, vec!["1234x", "1236x", "1237x"]);

        let indices: Vec<usize> = target.rows().iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![3, 6, 8]);
    }

    #[test]
    fn test_incomplete_rows_are_padded() {
        let filter = CompletenessFilter::new(GridLayout::default());
        let target = filter.incomplete_rows(&sample_grid()).unwrap();

        for target_row in target.rows() {
            assert_eq!(target_row.values.len(), 6);
            assert!(target_row.column_index.is_none());
        }
        assert_eq!(target.rows()[0].values, row(&["shirt", "1234x", "", "red", "", ""]));
    }

    #[test]
    fn test_single_column_variant() {
        let filter = CompletenessFilter::new(GridLayout::default());
        let target = filter
            .single_column(&sample_grid(), "color_name")
            .unwrap()
            .unwrap();

        assert_eq!(target.columns(), row(&["item_sku", "value"]).as_slice());
        assert_eq!(target.len(), 3);
        assert_eq!(target.rows()[0].values, row(&["1234x", "red"]));
        assert_eq!(target.rows()[0].column_index, Some(3));
        assert_eq!(target.rows()[2].values, row(&["1237x", ""]));
    }

    #[test]
    fn test_single_column_missing_header() {
        let filter = CompletenessFilter::new(GridLayout::default());
        let result = filter.single_column(&sample_grid(), "bullet_point1").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_missing_header_row() {
        let filter = CompletenessFilter::new(GridLayout::default());
        let grid = vec![row(&["meta"]), row(&["names"])];
        assert!(filter.incomplete_rows(&grid).is_err());
    }

    #[test]
    fn test_header_without_item_sku() {
        let filter = CompletenessFilter::new(GridLayout::default());
        let grid = vec![row(&["meta"]), row(&[]), row(&["a", "sku", "brand"])];
        assert!(filter.incomplete_rows(&grid).is_err());
    }
}
