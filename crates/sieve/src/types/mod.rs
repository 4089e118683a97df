//! Type casting layer: one closed set of cell types.
//!
//! Every type is a stateless rule over a raw cell. Decoding never fails
//! loudly: `None` is the failure sentinel, and the caller decides how to
//! report it. Type options (format, boolean tokens, numeric characters)
//! come from the owning [`Field`].

mod numeric;
mod structured;
mod temporal;
mod value;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::schema::Field;

pub use value::{IsoDuration, Value};

pub(crate) use temporal::is_temporal_format;

/// Type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Date,
    Time,
    DateTime,
    Year,
    YearMonth,
    Duration,
    Object,
    Array,
    GeoPoint,
    GeoJson,
    Any,
}

impl FieldType {
    /// All types, in declaration order.
    pub const ALL: [FieldType; 15] = [
        FieldType::String,
        FieldType::Integer,
        FieldType::Number,
        FieldType::Boolean,
        FieldType::Date,
        FieldType::Time,
        FieldType::DateTime,
        FieldType::Year,
        FieldType::YearMonth,
        FieldType::Duration,
        FieldType::Object,
        FieldType::Array,
        FieldType::GeoPoint,
        FieldType::GeoJson,
        FieldType::Any,
    ];

    /// Candidate precedence used by schema inference, most specific first.
    pub const INFERENCE_ORDER: [FieldType; 14] = [
        FieldType::YearMonth,
        FieldType::GeoPoint,
        FieldType::Duration,
        FieldType::GeoJson,
        FieldType::Object,
        FieldType::Array,
        FieldType::DateTime,
        FieldType::Time,
        FieldType::Date,
        FieldType::Integer,
        FieldType::Number,
        FieldType::Boolean,
        FieldType::Year,
        FieldType::String,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::DateTime => "datetime",
            FieldType::Year => "year",
            FieldType::YearMonth => "yearmonth",
            FieldType::Duration => "duration",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::GeoPoint => "geopoint",
            FieldType::GeoJson => "geojson",
            FieldType::Any => "any",
        }
    }

    /// Returns true if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Number)
    }

    /// Whether `format` is meaningful for this type.
    pub fn supports_format(&self, format: &str) -> bool {
        match self {
            FieldType::String => matches!(format, "default" | "email" | "uri" | "uuid" | "binary"),
            FieldType::Date | FieldType::Time | FieldType::DateTime => is_temporal_format(format),
            FieldType::GeoPoint => matches!(format, "default" | "array" | "object"),
            FieldType::GeoJson => matches!(format, "default" | "topojson"),
            _ => format == "default",
        }
    }

    /// Decode one raw cell; `None` on failure.
    pub fn decode(&self, raw: &str, field: &Field) -> Option<Value> {
        match self {
            FieldType::String => structured::decode_string(raw, field),
            FieldType::Integer => numeric::decode_integer(raw, field),
            FieldType::Number => numeric::decode_number(raw, field),
            FieldType::Boolean => numeric::decode_boolean(raw, field),
            FieldType::Date => temporal::decode_date(raw, field),
            FieldType::Time => temporal::decode_time(raw, field),
            FieldType::DateTime => temporal::decode_datetime(raw, field),
            FieldType::Year => temporal::decode_year(raw, field),
            FieldType::YearMonth => temporal::decode_yearmonth(raw, field),
            FieldType::Duration => temporal::decode_duration(raw, field),
            FieldType::Object => structured::decode_object(raw, field),
            FieldType::Array => structured::decode_array(raw, field),
            FieldType::GeoPoint => structured::decode_geopoint(raw, field),
            FieldType::GeoJson => structured::decode_geojson(raw, field),
            FieldType::Any => structured::decode_any(raw, field),
        }
    }

    /// Encode one value back to its raw form; `None` when the value does
    /// not belong to this type.
    pub fn encode(&self, value: &Value, field: &Field) -> Option<String> {
        match self {
            FieldType::String => structured::encode_string(value, field),
            FieldType::Integer => numeric::encode_integer(value, field),
            FieldType::Number => numeric::encode_number(value, field),
            FieldType::Boolean => numeric::encode_boolean(value, field),
            FieldType::Date => temporal::encode_date(value, field),
            FieldType::Time => temporal::encode_time(value, field),
            FieldType::DateTime => temporal::encode_datetime(value, field),
            FieldType::Year => temporal::encode_year(value, field),
            FieldType::YearMonth => temporal::encode_yearmonth(value, field),
            FieldType::Duration => temporal::encode_duration(value, field),
            FieldType::Object => structured::encode_object(value, field),
            FieldType::Array => structured::encode_array(value, field),
            FieldType::GeoPoint => structured::encode_geopoint(value, field),
            FieldType::GeoJson => structured::encode_geojson(value, field),
            FieldType::Any => structured::encode_any(value, field),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        FieldType::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown field type \"{}\"", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_canonical_cells() {
        let cases = [
            (FieldType::String, "hello"),
            (FieldType::Integer, "-42"),
            (FieldType::Number, "3.5"),
            (FieldType::Boolean, "true"),
            (FieldType::Date, "2024-01-15"),
            (FieldType::Time, "10:30:00"),
            (FieldType::DateTime, "2024-01-15T10:30:00"),
            (FieldType::Year, "1999"),
            (FieldType::YearMonth, "2020-07"),
            (FieldType::Duration, "P1DT2H"),
            (FieldType::Object, r#"{"a":1}"#),
            (FieldType::Array, "[1,2]"),
            (FieldType::GeoPoint, "90, 45"),
        ];
        for (field_type, raw) in cases {
            let field = Field::new("f", field_type);
            let value = field_type.decode(raw, &field).unwrap();
            assert_eq!(field_type.encode(&value, &field).as_deref(), Some(raw), "{}", field_type);
        }
    }

    #[test]
    fn test_encode_rejects_foreign_values() {
        let field = Field::new("f", FieldType::Integer);
        assert!(FieldType::Integer.encode(&Value::String("1".into()), &field).is_none());
    }

    #[test]
    fn test_parse_type_names() {
        assert_eq!("yearmonth".parse::<FieldType>().unwrap(), FieldType::YearMonth);
        assert!("decimal".parse::<FieldType>().is_err());
        assert!(FieldType::Date.supports_format("%d/%m/%Y"));
        assert!(!FieldType::Integer.supports_format("currency"));
    }
}
