//! Date, time, datetime, year, yearmonth and duration casting.
//!
//! Formats follow the field's `format`: `default` is ISO 8601, `any` tries a
//! list of common layouts, and anything else is a strftime pattern.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::schema::Field;

use super::value::IsoDuration;
use super::Value;

const ANY_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

const ANY_TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M:%S%.f", "%H:%M", "%I:%M %p", "%I:%M:%S %p"];

const ANY_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// Whether a temporal format string is acceptable.
pub(crate) fn is_temporal_format(format: &str) -> bool {
    format == "default" || format == "any" || format.contains('%')
}

pub(super) fn decode_date(raw: &str, field: &Field) -> Option<Value> {
    let raw = raw.trim();
    let date = match field.format.as_str() {
        "default" => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok(),
        "any" => ANY_DATE_FORMATS
            .iter()
            .find_map(|f| NaiveDate::parse_from_str(raw, f).ok()),
        pattern => NaiveDate::parse_from_str(raw, pattern).ok(),
    }?;
    Some(Value::Date(date))
}

pub(super) fn encode_date(value: &Value, field: &Field) -> Option<String> {
    let Value::Date(date) = value else {
        return None;
    };
    Some(date.format(custom_pattern(field).unwrap_or("%Y-%m-%d")).to_string())
}

pub(super) fn decode_time(raw: &str, field: &Field) -> Option<Value> {
    let raw = raw.trim();
    let time = match field.format.as_str() {
        "default" => NaiveTime::parse_from_str(raw, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S%.f"))
            .ok(),
        "any" => ANY_TIME_FORMATS
            .iter()
            .find_map(|f| NaiveTime::parse_from_str(raw, f).ok()),
        pattern => NaiveTime::parse_from_str(raw, pattern).ok(),
    }?;
    Some(Value::Time(time))
}

pub(super) fn encode_time(value: &Value, field: &Field) -> Option<String> {
    let Value::Time(time) = value else {
        return None;
    };
    let pattern = match custom_pattern(field) {
        Some(pattern) => pattern,
        None if time.nanosecond() > 0 => "%H:%M:%S%.f",
        None => "%H:%M:%S",
    };
    Some(time.format(pattern).to_string())
}

pub(super) fn decode_datetime(raw: &str, field: &Field) -> Option<Value> {
    let raw = raw.trim();
    let datetime = match field.format.as_str() {
        "default" => parse_iso_datetime(raw),
        "any" => parse_iso_datetime(raw).or_else(|| {
            ANY_DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        }),
        pattern if pattern.contains("%z") || pattern.contains("%:z") => {
            DateTime::parse_from_str(raw, pattern)
                .ok()
                .map(|dt| dt.naive_utc())
        }
        pattern => NaiveDateTime::parse_from_str(raw, pattern).ok(),
    }?;
    Some(Value::DateTime(datetime))
}

/// ISO 8601 with optional fraction; offsets (including `Z`) are normalised to UTC.
fn parse_iso_datetime(raw: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

pub(super) fn encode_datetime(value: &Value, field: &Field) -> Option<String> {
    let Value::DateTime(datetime) = value else {
        return None;
    };
    let pattern = match custom_pattern(field) {
        Some(pattern) => pattern,
        None if datetime.nanosecond() > 0 => "%Y-%m-%dT%H:%M:%S%.f",
        None => "%Y-%m-%dT%H:%M:%S",
    };
    Some(datetime.format(pattern).to_string())
}

pub(super) fn decode_year(raw: &str, _field: &Field) -> Option<Value> {
    let raw = raw.trim();
    if raw.len() != 4 || !raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok().map(Value::Year)
}

pub(super) fn encode_year(value: &Value, _field: &Field) -> Option<String> {
    match value {
        Value::Year(year) => Some(format!("{:04}", year)),
        _ => None,
    }
}

pub(super) fn decode_yearmonth(raw: &str, _field: &Field) -> Option<Value> {
    let (year, month) = raw.trim().split_once('-')?;
    if year.len() != 4 || month.is_empty() || month.len() > 2 {
        return None;
    }
    if !year.chars().chain(month.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    (1..=12)
        .contains(&month)
        .then_some(Value::YearMonth { year, month })
}

pub(super) fn encode_yearmonth(value: &Value, _field: &Field) -> Option<String> {
    match value {
        Value::YearMonth { year, month } => Some(format!("{:04}-{:02}", year, month)),
        _ => None,
    }
}

pub(super) fn decode_duration(raw: &str, _field: &Field) -> Option<Value> {
    IsoDuration::parse(raw.trim()).map(Value::Duration)
}

pub(super) fn encode_duration(value: &Value, _field: &Field) -> Option<String> {
    match value {
        Value::Duration(duration) => Some(duration.to_string()),
        _ => None,
    }
}

fn custom_pattern(field: &Field) -> Option<&str> {
    match field.format.as_str() {
        "default" | "any" => None,
        pattern => Some(pattern),
    }
}
