//! Typed cell values.

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

static DURATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$",
    )
    .expect("duration pattern is valid")
});

/// An ISO 8601 duration (`PnYnMnWnDTnHnMnS`).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IsoDuration {
    pub years: u64,
    pub months: u64,
    pub weeks: u64,
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: f64,
}

impl IsoDuration {
    /// Parse an ISO 8601 duration string.
    pub fn parse(text: &str) -> Option<Self> {
        if text == "P" || text.ends_with('T') {
            return None;
        }
        let caps = DURATION_PATTERN.captures(text)?;
        let int = |i: usize| -> Option<u64> {
            caps.get(i).map_or(Some(0), |m| m.as_str().parse().ok())
        };
        Some(Self {
            years: int(1)?,
            months: int(2)?,
            weeks: int(3)?,
            days: int(4)?,
            hours: int(5)?,
            minutes: int(6)?,
            seconds: caps
                .get(7)
                .map_or(Some(0.0), |m| m.as_str().parse().ok())?,
        })
    }

    /// Approximate length in seconds (30-day months, 365-day years).
    pub fn total_seconds(&self) -> f64 {
        let days = self.years as f64 * 365.0
            + self.months as f64 * 30.0
            + self.weeks as f64 * 7.0
            + self.days as f64;
        days * 86_400.0 + self.hours as f64 * 3_600.0 + self.minutes as f64 * 60.0 + self.seconds
    }
}

impl fmt::Display for IsoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut text = String::from("P");
        for (amount, unit) in [
            (self.years, 'Y'),
            (self.months, 'M'),
            (self.weeks, 'W'),
            (self.days, 'D'),
        ] {
            if amount > 0 {
                text.push_str(&format!("{}{}", amount, unit));
            }
        }
        if self.hours > 0 || self.minutes > 0 || self.seconds > 0.0 {
            text.push('T');
            if self.hours > 0 {
                text.push_str(&format!("{}H", self.hours));
            }
            if self.minutes > 0 {
                text.push_str(&format!("{}M", self.minutes));
            }
            if self.seconds > 0.0 {
                text.push_str(&format!("{}S", self.seconds));
            }
        }
        if text == "P" {
            text.push_str("T0S");
        }
        f.write_str(&text)
    }
}

/// A decoded cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Year(i32),
    YearMonth { year: i32, month: u32 },
    Duration(IsoDuration),
    Object(Map<String, JsonValue>),
    Array(Vec<JsonValue>),
    GeoPoint { lon: f64, lat: f64 },
    GeoJson(JsonValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view for integer and number values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Number of items for length constraints.
    pub fn length(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            Value::Object(map) => Some(map.len()),
            _ => None,
        }
    }

    /// Order two values of compatible kinds; `None` when incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Year(a), Value::Year(b)) => Some(a.cmp(b)),
            (
                Value::YearMonth { year: ay, month: am },
                Value::YearMonth { year: by, month: bm },
            ) => Some((ay, am).cmp(&(by, bm))),
            (Value::Duration(a), Value::Duration(b)) => {
                a.total_seconds().partial_cmp(&b.total_seconds())
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    /// Equality that treats integer and number values as one numeric domain.
    pub fn same_as(&self, other: &Value) -> bool {
        self == other || self.compare(other) == Some(Ordering::Equal)
    }

    /// JSON rendering used by keyed row views and inline writing.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Integer(i) => JsonValue::from(*i),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Boolean(b) => JsonValue::Bool(*b),
            Value::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => JsonValue::String(t.format("%H:%M:%S%.f").to_string()),
            Value::DateTime(dt) => {
                JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            Value::Year(y) => JsonValue::from(*y),
            Value::YearMonth { year, month } => {
                JsonValue::String(format!("{:04}-{:02}", year, month))
            }
            Value::Duration(d) => JsonValue::String(d.to_string()),
            Value::Object(map) => JsonValue::Object(map.clone()),
            Value::Array(items) => JsonValue::Array(items.clone()),
            Value::GeoPoint { lon, lat } => serde_json::json!([lon, lat]),
            Value::GeoJson(json) => json.clone(),
        }
    }

    /// Stable text key used for uniqueness tracking.
    pub fn key(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            // Integral numbers share keys with integers while exactly representable.
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 2f64.powi(53) => {
                format!("{}", *n as i64)
            }
            Value::Number(n) => n.to_string(),
            other => other.to_json().to_string(),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::String(s) => f.write_str(s),
            other => match other.to_json() {
                JsonValue::String(s) => f.write_str(&s),
                json => write!(f, "{}", json),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_parse_and_display() {
        let d = IsoDuration::parse("P1Y2M3DT4H5M6S").unwrap();
        assert_eq!(d.years, 1);
        assert_eq!(d.minutes, 5);
        assert_eq!(d.to_string(), "P1Y2M3DT4H5M6S");

        assert_eq!(IsoDuration::parse("PT1.5S").unwrap().seconds, 1.5);
        assert!(IsoDuration::parse("P").is_none());
        assert!(IsoDuration::parse("P1DT").is_none());
        assert!(IsoDuration::parse("1 day").is_none());
    }

    #[test]
    fn test_huge_duration_total_seconds() {
        let huge = IsoDuration::parse("P999999999999999999D").unwrap();
        let day = IsoDuration::parse("P1D").unwrap();
        assert!(huge.total_seconds() > day.total_seconds());
        assert!(huge.total_seconds().is_finite());
    }

    #[test]
    fn test_numeric_comparison_crosses_kinds() {
        assert_eq!(
            Value::Integer(2).compare(&Value::Number(1.5)),
            Some(Ordering::Greater)
        );
        assert!(Value::Integer(1).same_as(&Value::Number(1.0)));
        assert!(Value::String("a".into()).compare(&Value::Integer(1)).is_none());
    }

    #[test]
    fn test_uniqueness_key_normalises_numbers() {
        assert_eq!(Value::Integer(7).key(), Value::Number(7.0).key());
        assert_ne!(Value::Number(1e19).key(), Value::Number(2e19).key());
        assert_ne!(Value::Number(-1e300).key(), Value::Number(-2e300).key());
    }
}
