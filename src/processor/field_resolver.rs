use regex::Regex;
use std::sync::LazyLock;

use crate::models::{MatchTable, SourceTable};

static ZERO_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*-?0(\.0+)?\s*$").expect("static zero pattern"));

/// "0" (or a decimal zero such as "0.00") means "not set" for every field.
pub fn is_sentinel_zero(value: &str) -> bool {
    ZERO_VALUE.is_match(value)
}

/// Value of `field` for `sku` from the original flatfile.
///
/// The SKU is looked up directly first; only when the flatfile does not
/// contain it is the alternate SKU from the match table tried. Duplicate
/// SKUs resolve to their first row. Missing values and the zero sentinel
/// both come back as an empty string.
pub fn find_match(
    sku: &str,
    field: &str,
    source: &SourceTable,
    match_table: &MatchTable,
) -> String {
    if !source.has_column(field) {
        return String::new();
    }

    let value = if source.contains_sku(sku) {
        source.lookup(sku, field)
    } else {
        match match_table.lookup(sku) {
            None => return String::new(),
            Some(alt_sku) if alt_sku.is_empty() => return String::new(),
            Some(alt_sku) => source.lookup(alt_sku, field),
        }
    };

    match value {
        Some(value) if !value.is_empty() && !is_sentinel_zero(value) => value.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Table;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn sample_original_format() -> SourceTable {
        let table = Table::from_rows(
            strings(&["item_sku", "test", "test2", "test3"]),
            vec![
                strings(&["1234x", "abc", "a", "b"]),
                strings(&["wrong_sku", "abc1", "d", "e"]),
                strings(&["2347x", "abc2", "g", "h"]),
            ],
        );
        SourceTable::new(table).unwrap()
    }

    fn sample_match_table() -> MatchTable {
        MatchTable::from_pairs(vec![
            ("1234x".to_string(), "2345x".to_string()),
            ("1235x".to_string(), "2346x".to_string()),
            ("1236x".to_string(), "2347x".to_string()),
        ])
    }

    #[test]
    fn test_find_match() {
        let source = sample_original_format();
        let table = sample_match_table();

        let expect = vec!["a", "b", "", "", "", "", "g", "h", ""];
        let mut result = Vec::new();
        for sku in ["1234x", "1235x", "1236x"] {
            for header in ["test2", "test3", "test4"] {
                result.push(find_match(sku, header, &source, &table));
            }
        }

        assert_eq!(result, expect);
    }

    #[test]
    fn test_direct_match_wins_over_alternate() {
        let table = Table::from_rows(
            strings(&["item_sku", "color"]),
            vec![strings(&["1234x", "red"]), strings(&["9999x", "blue"])],
        );
        let source = SourceTable::new(table).unwrap();
        let match_table = MatchTable::from_pairs(vec![("1234x".to_string(), "9999x".to_string())]);

        assert_eq!(find_match("1234x", "color", &source, &match_table), "red");
    }

    #[test]
    fn test_unknown_field_is_empty() {
        let source = sample_original_format();
        assert_eq!(find_match("1234x", "item_name", &source, &sample_match_table()), "");
        assert_eq!(find_match("1234x", "item_name", &source, &MatchTable::default()), "");
    }

    #[test]
    fn test_empty_alternate_is_not_looked_up() {
        let table = Table::from_rows(
            strings(&["item_sku", "color"]),
            vec![strings(&["", "ghost"])],
        );
        let source = SourceTable::new(table).unwrap();
        let match_table = MatchTable::from_pairs(vec![("1241x".to_string(), String::new())]);

        assert_eq!(find_match("1241x", "color", &source, &match_table), "");
    }

    #[test]
    fn test_zero_sentinel_suppressed_on_both_paths() {
        let table = Table::from_rows(
            strings(&["item_sku", "quantity", "price"]),
            vec![
                strings(&["1234x", "0", "0.00"]),
                strings(&["2347x", "0", "12.5"]),
            ],
        );
        let source = SourceTable::new(table).unwrap();
        let match_table = MatchTable::from_pairs(vec![("1236x".to_string(), "2347x".to_string())]);

        assert_eq!(find_match("1234x", "quantity", &source, &match_table), "");
        assert_eq!(find_match("1234x", "price", &source, &match_table), "");
        assert_eq!(find_match("1236x", "quantity", &source, &match_table), "");
        assert_eq!(find_match("1236x", "price", &source, &match_table), "12.5");
    }

    #[test]
    fn test_sentinel_zero_detection() {
        assert!(is_sentinel_zero("0"));
        assert!(is_sentinel_zero(" 0 "));
        assert!(is_sentinel_zero("0.0"));
        assert!(is_sentinel_zero("-0"));
        assert!(!is_sentinel_zero("00"));
        assert!(!is_sentinel_zero("0123"));
        assert!(!is_sentinel_zero("10"));
        assert!(!is_sentinel_zero(""));
    }
}
