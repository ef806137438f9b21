use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
];

/// A single cell value as read from a row source
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert a parsed JSON node into a cell value.
    /// Nested arrays and objects are kept as their JSON text.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if n.is_u64() {
                    // above i64::MAX: keep the digits rather than round through f64
                    Value::Text(n.to_string())
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Text(n.to_string())
                }
            }
            serde_json::Value::String(s) => Value::Text(s),
            nested => Value::Text(nested.to_string()),
        }
    }

    /// Short name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
        }
    }

    /// The value as a 64-bit integer, if it is one or is text spelling one
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// The value as a finite float. Integers widen; `inf`/`nan` spellings are rejected.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if f.is_finite() => Some(*f),
            Value::Text(s) => parse_decimal(s.trim()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Some(true),
                "false" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Text(s) => {
                let s = s.trim();
                DATE_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
            }
            _ => None,
        }
    }

    /// The value as a date-time. Dates widen to midnight, RFC 3339 text is normalised to UTC.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            Value::Date(d) => d.and_hms_opt(0, 0, 0),
            Value::Text(s) => {
                let s = s.trim();
                DATETIME_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                    .or_else(|| {
                        DateTime::parse_from_rfc3339(s)
                            .ok()
                            .map(|dt| dt.naive_utc())
                    })
                    .or_else(|| self.as_date().and_then(|d| d.and_hms_opt(0, 0, 0)))
            }
            _ => None,
        }
    }
}

/// Plain decimal or scientific notation only, so `inf`, `NaN` and friends stay text
fn parse_decimal(s: &str) -> Option<f64> {
    if s.is_empty()
        || !s
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        || !s.chars().any(|c| c.is_ascii_digit())
    {
        return None;
    }
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

pub(crate) fn format_date(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub(crate) fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", format_date(d)),
            Value::DateTime(dt) => write!(f, "{}", format_datetime(dt)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_numbers() {
        assert_eq!(Value::from_json(json!(42)), Value::Int(42));
        assert_eq!(Value::from_json(json!(2.5)), Value::Float(2.5));
        assert_eq!(Value::from_json(json!(null)), Value::Null);
        assert_eq!(Value::from_json(json!("x")), Value::Text("x".to_string()));
        assert_eq!(
            Value::from_json(json!(u64::MAX)),
            Value::Text("18446744073709551615".to_string())
        );
    }

    #[test]
    fn test_from_json_nested_becomes_text() {
        let v = Value::from_json(json!({"a": [1, 2]}));
        assert_eq!(v, Value::Text(r#"{"a":[1,2]}"#.to_string()));
    }

    #[test]
    fn test_text_integer_parsing() {
        assert_eq!(Value::from(" 17 ").as_integer(), Some(17));
        assert_eq!(Value::from("-3").as_integer(), Some(-3));
        assert_eq!(Value::from("3.0").as_integer(), None);
        assert_eq!(Value::Float(3.0).as_integer(), None);
    }

    #[test]
    fn test_float_rejects_non_finite_spellings() {
        assert_eq!(Value::from("3.14").as_float(), Some(3.14));
        assert_eq!(Value::from("1e3").as_float(), Some(1000.0));
        assert_eq!(Value::from("inf").as_float(), None);
        assert_eq!(Value::from("NaN").as_float(), None);
        assert_eq!(Value::from("-").as_float(), None);
        assert_eq!(Value::Float(f64::NAN).as_float(), None);
        assert_eq!(Value::Int(2).as_float(), Some(2.0));
    }

    #[test]
    fn test_bool_spellings() {
        assert_eq!(Value::from("TRUE").as_bool(), Some(true));
        assert_eq!(Value::from("no").as_bool(), Some(false));
        assert_eq!(Value::from("1").as_bool(), None);
        assert_eq!(Value::Int(1).as_bool(), None);
    }

    #[test]
    fn test_dates_and_datetimes() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(Value::from("2024-03-09").as_date(), Some(d));
        assert_eq!(Value::from("2024/03/09").as_date(), Some(d));
        assert_eq!(Value::from("2024-03-09 10:00:00").as_date(), None);

        let dt = d.and_hms_opt(10, 30, 0).unwrap();
        assert_eq!(Value::from("2024-03-09 10:30:00").as_datetime(), Some(dt));
        assert_eq!(Value::from("2024-03-09T10:30:00").as_datetime(), Some(dt));
        assert_eq!(Value::from("2024-03-09 10:30").as_datetime(), Some(dt));
        assert_eq!(Value::from("2024-03-09T12:30:00+02:00").as_datetime(), Some(dt));
        assert_eq!(
            Value::from("2024-03-09").as_datetime(),
            d.and_hms_opt(0, 0, 0)
        );
    }

    #[test]
    fn test_display_datetime_keeps_fraction_only_when_present() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let whole = Value::DateTime(d.and_hms_opt(3, 4, 5).unwrap());
        assert_eq!(whole.to_string(), "2024-01-02 03:04:05");
        let frac = Value::DateTime(d.and_hms_micro_opt(3, 4, 5, 250_000).unwrap());
        assert_eq!(frac.to_string(), "2024-01-02 03:04:05.250");
    }
}
