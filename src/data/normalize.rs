//! Text-to-number normalization for spreadsheet cells.
//!
//! The published sheet renders balances the way a human typed them
//! (`Rp 1.234.567`, `1.234,56`) or, when a formula breaks, as an error marker.
//! The steps below must run in this exact order.

use crate::domain::Balance;
use crate::error::FetchError;

/// Error markers the spreadsheet may render instead of a value.
pub const ERROR_TOKENS: &[&str] = &[
    "#NAME?", "#REF!", "#VALUE!", "#DIV/0!", "#N/A", "#NUM!", "#NULL!", "#ERROR!",
];

/// Normalize one raw reading into a `Balance`.
pub fn normalize(raw: &str) -> Result<Balance, FetchError> {
    // 1) Trim.
    let text = raw.trim();

    // 2) Spreadsheet error markers.
    let upper = text.to_ascii_uppercase();
    if let Some(token) = ERROR_TOKENS.iter().find(|t| upper.contains(*t)) {
        return Err(FetchError::DataSource((*token).to_string()));
    }

    // 3) Leading currency prefix.
    let text = strip_currency_prefix(text);

    // 4) Thousands separators.
    let text: String = text.chars().filter(|&c| c != '.').collect();

    // 5) First decimal comma.
    let text = text.replacen(',', ".", 1);

    // 6) Anything else that cannot be part of a number.
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    // 7) Nothing left.
    if cleaned.is_empty() {
        return Err(FetchError::EmptyData);
    }

    // 8) Parse; negatives are implausible for a treasury balance.
    let value: f64 = cleaned
        .parse()
        .map_err(|_| FetchError::Parse(raw.trim().to_string()))?;
    Balance::new(value).ok_or_else(|| FetchError::Parse(raw.trim().to_string()))
}

fn strip_currency_prefix(text: &str) -> &str {
    match text.get(..2) {
        Some(prefix) if prefix.eq_ignore_ascii_case("rp") => text[2..].trim_start(),
        _ => text,
    }
}
