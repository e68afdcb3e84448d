use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

/// A single typed cell. `Missing` is the normalized sentinel for every
/// recognized missing-value token.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Missing,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Text(String),
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Stable textual form used for equality across snapshots and for
    /// distinct counting. `None` is the missing marker, which never collides
    /// with a real value.
    pub fn canonical(&self) -> Option<String> {
        match self {
            Value::Missing => None,
            other => Some(other.as_display()),
        }
    }

    /// Lossless textual form: like [`Value::canonical`] but floats keep their
    /// shortest round-trip digits, so two values share it only when equal.
    pub fn exact(&self) -> Option<String> {
        match self {
            Value::Missing => None,
            Value::Float(f) if *f == 0.0 => Some("0".to_string()),
            Value::Float(f) => Some(f.to_string()),
            other => Some(other.as_display()),
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Missing => String::new(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => format_canonical_number(*f),
            Value::Boolean(b) => b.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            Value::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => write!(f, "{MISSING_LABEL}"),
            other => write!(f, "{}", other.as_display()),
        }
    }
}

/// How a missing value is shown in terminal output and frequency tables.
pub const MISSING_LABEL: &str = "<NA>";

/// Six decimal places with trailing zeros removed, so `1`, `1.0` and
/// `1.000000` all compare equal.
pub fn format_canonical_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{value:.0}");
    }
    let fixed = format!("{value:.6}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Parses numbers written the way spreadsheets export them: currency
/// symbols and thousands separators are ignored and a trailing `%` yields a
/// unit fraction (`12.5%` -> `0.125`).
pub fn parse_numeric(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let (body, percent) = match trimmed.strip_suffix('%') {
        Some(rest) => (rest, true),
        None => (trimmed, false),
    };
    let cleaned = body
        .chars()
        .filter(|c| !matches!(c, '£' | '$' | '€' | ','))
        .collect::<String>();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || !cleaned.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    let parsed = cleaned.parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some(if percent { parsed / 100.0 } else { parsed })
}

/// Outcome of reading a cell as an exact whole number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerText {
    Fits(i64),
    /// A plain digit run too wide for `i64`.
    Overflows,
    NotInteger,
}

/// Reads whole numbers from their digits rather than through `f64`, so wide
/// identifiers keep every digit. Currency symbols and thousands separators
/// are ignored as in [`parse_numeric`]; percentages are never integers.
pub fn parse_integer(value: &str) -> IntegerText {
    let trimmed = value.trim();
    if trimmed.ends_with('%') {
        return IntegerText::NotInteger;
    }
    let cleaned = trimmed
        .chars()
        .filter(|c| !matches!(c, '£' | '$' | '€' | ','))
        .collect::<String>();
    let cleaned = cleaned.trim();
    let digits = cleaned
        .strip_prefix(['-', '+'])
        .unwrap_or(cleaned);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return IntegerText::NotInteger;
    }
    match cleaned.parse::<i64>() {
        Ok(number) => IntegerText::Fits(number),
        Err(_) => IntegerText::Overflows,
    }
}

pub fn parse_boolean(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" => Some(true),
        "false" | "f" | "no" | "n" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_numbers_ignore_representation() {
        assert_eq!(Value::Integer(1).canonical(), Value::Float(1.0).canonical());
        assert_eq!(format_canonical_number(2.500), "2.5");
        assert_eq!(format_canonical_number(-0.0), "0");
        assert_eq!(format_canonical_number(1.0 / 3.0), "0.333333");
    }

    #[test]
    fn exact_form_keeps_small_differences() {
        assert_eq!(Value::Float(0.0000001).canonical(), Value::Float(0.0000002).canonical());
        assert_eq!(Value::Float(0.0000001).exact().as_deref(), Some("0.0000001"));
        assert_ne!(Value::Float(0.0000001).exact(), Value::Float(0.0000002).exact());
        assert_eq!(Value::Float(1.0).exact(), Value::Integer(1).exact());
        assert_eq!(Value::Float(-0.0).exact().as_deref(), Some("0"));
    }

    #[test]
    fn integers_are_read_from_their_digits() {
        assert_eq!(
            parse_integer("12345678901234567"),
            IntegerText::Fits(12_345_678_901_234_567)
        );
        assert_eq!(parse_integer("£1,250"), IntegerText::Fits(1250));
        assert_eq!(parse_integer("-42"), IntegerText::Fits(-42));
        assert_eq!(parse_integer("123456789012345678901234"), IntegerText::Overflows);
        assert_eq!(parse_integer("1.0"), IntegerText::NotInteger);
        assert_eq!(parse_integer("100%"), IntegerText::NotInteger);
        assert_eq!(parse_integer("-"), IntegerText::NotInteger);
    }

    #[test]
    fn missing_has_no_canonical_form() {
        assert_eq!(Value::Missing.canonical(), None);
        assert_eq!(Value::Text(String::new()).canonical(), Some(String::new()));
        assert_eq!(Value::Missing.to_string(), "<NA>");
    }

    #[test]
    fn parse_numeric_handles_currency_and_percentages() {
        assert_eq!(parse_numeric("£1,250"), Some(1250.0));
        assert_eq!(parse_numeric("$ 3.5"), Some(3.5));
        assert_eq!(parse_numeric("12.5%"), Some(0.125));
        assert_eq!(parse_numeric("-7"), Some(-7.0));
        assert_eq!(parse_numeric("NaN"), None);
        assert_eq!(parse_numeric("inf"), None);
        assert_eq!(parse_numeric("$"), None);
        assert_eq!(parse_numeric("abc"), None);
    }

    #[test]
    fn parse_naive_date_supports_multiple_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        assert_eq!(parse_naive_date("2024-05-06"), Some(expected));
        assert_eq!(parse_naive_date("06/05/2024"), Some(expected));
        assert_eq!(parse_naive_date("2024/05/06"), Some(expected));
        assert_eq!(parse_naive_date("yesterday"), None);
    }

    #[test]
    fn parse_naive_datetime_supports_multiple_formats() {
        let expected =
            NaiveDateTime::parse_from_str("2024-05-06 14:30:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(parse_naive_datetime("2024-05-06T14:30:00"), Some(expected));
        assert_eq!(parse_naive_datetime("06/05/2024 14:30:00"), Some(expected));
        assert_eq!(parse_naive_datetime("2024-05-06 14:30"), Some(expected));
    }

    #[test]
    fn parse_boolean_accepts_word_tokens_only() {
        assert_eq!(parse_boolean("Yes"), Some(true));
        assert_eq!(parse_boolean("f"), Some(false));
        assert_eq!(parse_boolean("1"), None);
    }
}
