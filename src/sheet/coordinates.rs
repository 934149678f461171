use anyhow::{Result, bail};
use tracing::warn;

pub const LEN_ALPHABET: usize = 26;

/// Highest column with a label ("ZZ"). Labels are at most two letters long.
pub const MAX_COLUMN: usize = LEN_ALPHABET * LEN_ALPHABET + LEN_ALPHABET - 1;

pub const DEFAULT_RANGE: &str = "A1:E20";

/// Letter label of a 0-indexed column: 0 -> "A", 25 -> "Z", 26 -> "AA".
///
/// Only one- and two-letter labels exist, so anything past column 701
/// ("ZZ") is rejected instead of being silently wrapped.
pub fn encode_column(column: usize) -> Result<String> {
    if column > MAX_COLUMN {
        bail!(
            "Column {} is beyond the last supported column {} (ZZ)",
            column,
            MAX_COLUMN
        );
    }

    if column < LEN_ALPHABET {
        return Ok(letter(column).to_string());
    }

    let quotient = column / LEN_ALPHABET;
    let remainder = column - quotient * LEN_ALPHABET;
    Ok(format!("{}{}", letter(quotient - 1), letter(remainder)))
}

fn letter(offset: usize) -> char {
    (b'A' + offset as u8) as char
}

/// A1 notation for a 0-indexed column and a 1-indexed row.
pub fn cell_coordinate(column: usize, row: usize) -> Result<String> {
    Ok(format!("{}{}", encode_column(column)?, row))
}

/// Rectangular range from row 1 of `start_column` down to `max_row` of
/// `end_column` (or of `start_column` when no end is given).
pub fn build_range(start_column: &str, max_row: usize, end_column: Option<&str>) -> String {
    if max_row == 0 {
        warn!(
            "No amount of rows to read specified, defaulting to range {}. \
             Check max_row in the configuration",
            DEFAULT_RANGE
        );
        return DEFAULT_RANGE.to_string();
    }

    let end_column = end_column.filter(|c| !c.is_empty()).unwrap_or(start_column);
    format!("{}1:{}{}", start_column, end_column, max_row)
}
