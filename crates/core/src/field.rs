//! Numeric values carried as text in client records.

use thiserror::Error;

/// A single derived numeric field could not be parsed.
///
/// This only ever skips the one value it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse {field} from {value:?}")]
pub struct FieldParseError {
    /// Field name as sent by the client.
    pub field: &'static str,
    /// The offending text.
    pub value: String,
}

/// Parses a percentage string such as `"42.5%"` into percent units (`42.5`).
pub fn parse_percent(field: &'static str, text: &str) -> Result<f64, FieldParseError> {
    let trimmed = text.trim();
    parse_decimal(field, trimmed.strip_suffix('%').unwrap_or(trimmed))
        .map_err(|_| FieldParseError {
            field,
            value: text.to_string(),
        })
}

/// Parses decimal text such as `"123456.78"`.
pub fn parse_decimal(field: &'static str, text: &str) -> Result<f64, FieldParseError> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FieldParseError {
            field,
            value: text.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_in_percent_units() {
        assert_eq!(parse_percent("percentdone", "42%"), Ok(42.0));
        assert_eq!(parse_percent("percentdone", "7.25%"), Ok(7.25));
        assert_eq!(parse_percent("percentdone", " 100% "), Ok(100.0));
    }

    #[test]
    fn percent_without_suffix_is_accepted() {
        assert_eq!(parse_percent("percentdone", "0"), Ok(0.0));
    }

    #[test]
    fn malformed_percent_is_a_field_error() {
        let err = parse_percent("percentdone", "N/A").unwrap_err();
        assert_eq!(err.field, "percentdone");
        assert_eq!(err.value, "N/A");
        assert!(parse_percent("percentdone", "").is_err());
        assert!(parse_percent("percentdone", "%").is_err());
    }

    #[test]
    fn decimal_rejects_non_finite() {
        assert_eq!(parse_decimal("ppd", "123456.5"), Ok(123456.5));
        assert!(parse_decimal("ppd", "inf").is_err());
        assert!(parse_decimal("ppd", "NaN").is_err());
        assert!(parse_decimal("ppd", "lots").is_err());
    }
}
