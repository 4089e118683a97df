//! Value-level checks over one field or every cell.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::input::Resource;
use crate::report::{ErrorCode, ReportError, TaskStats};
use crate::schema::Schema;
use crate::table::Row;
use crate::types::{FieldType, Value};

use super::{Check, resolve_field};

// =============================================================================
// DEVIATED VALUE
// =============================================================================

/// Centre of the accepted interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Average {
    #[default]
    Mean,
    Median,
    Mode,
}

fn default_interval() -> f64 {
    3.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviatedValueOptions {
    pub field_name: String,
    #[serde(default = "default_interval")]
    pub interval: f64,
    #[serde(default)]
    pub average: Average,
}

/// Single-pass mean and variance (Welford).
#[derive(Debug, Clone, Default)]
struct RunningStats {
    count: usize,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn add(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Sample standard deviation.
    fn stdev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }
}

/// Flags numeric values further than `interval` standard deviations from the average.
#[derive(Debug)]
pub struct DeviatedValue {
    options: DeviatedValueOptions,
    schema: Option<Schema>,
    index: Option<usize>,
    stats: RunningStats,
    cells: Vec<(f64, usize)>,
}

impl DeviatedValue {
    pub fn new(options: DeviatedValueOptions) -> Self {
        Self {
            options,
            schema: None,
            index: None,
            stats: RunningStats::default(),
            cells: Vec::new(),
        }
    }

    fn average(&self) -> f64 {
        let mut values: Vec<f64> = self.cells.iter().map(|(v, _)| *v).collect();
        match self.options.average {
            Average::Mean => self.stats.mean,
            Average::Median => {
                values.sort_by(|a, b| a.total_cmp(b));
                let middle = values.len() / 2;
                if values.len() % 2 == 0 {
                    (values[middle - 1] + values[middle]) / 2.0
                } else {
                    values[middle]
                }
            }
            Average::Mode => {
                let mut counts: HashMap<u64, usize> = HashMap::new();
                for value in &values {
                    *counts.entry(value.to_bits()).or_insert(0) += 1;
                }
                let top = counts.values().copied().max().unwrap_or(0);
                values
                    .iter()
                    .copied()
                    .find(|v| counts.get(&v.to_bits()) == Some(&top))
                    .unwrap_or(self.stats.mean)
            }
        }
    }
}

impl Check for DeviatedValue {
    fn code(&self) -> &'static str {
        "deviated-value"
    }

    fn scope(&self) -> Vec<ErrorCode> {
        vec![ErrorCode::DeviatedValue]
    }

    fn connect(&mut self, resource: &Resource) {
        self.schema = resource.schema.clone();
    }

    fn validate_check(&mut self) -> Vec<ReportError> {
        let numeric = [FieldType::Integer, FieldType::Number];
        match resolve_field(self.code(), self.schema.as_ref(), &self.options.field_name, &numeric) {
            Ok((index, _)) => {
                self.index = Some(index);
                Vec::new()
            }
            Err(error) => vec![error],
        }
    }

    fn validate_row(&mut self, row: &Row) -> Vec<ReportError> {
        let value = self.index.and_then(|i| row.values().get(i)).and_then(Value::as_f64);
        if let Some(value) = value.filter(|v| v.is_finite()) {
            self.stats.add(value);
            self.cells.push((value, row.row_position()));
        }
        Vec::new()
    }

    fn validate_table(&mut self, _stats: &TaskStats) -> Vec<ReportError> {
        if self.cells.len() < 2 {
            return Vec::new();
        }
        let average = self.average();
        let spread = self.stats.stdev() * self.options.interval;
        let (minimum, maximum) = (average - spread, average + spread);
        self.cells
            .iter()
            .filter(|(value, _)| *value < minimum || *value > maximum)
            .map(|(value, position)| {
                ReportError::table(
                    ErrorCode::DeviatedValue,
                    format!(
                        "value \"{}\" in row at position \"{}\" and field \"{}\" is deviated \"[{:.2}, {:.2}]\"",
                        value, position, self.options.field_name, minimum, maximum
                    ),
                )
            })
            .collect()
    }

    fn memory_usage(&self) -> usize {
        self.cells.len() * std::mem::size_of::<(f64, usize)>()
    }
}

// =============================================================================
// FORBIDDEN VALUE
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForbiddenValueOptions {
    pub field_name: String,
    pub values: Vec<JsonValue>,
}

/// Rejects listed values in one field.
#[derive(Debug)]
pub struct ForbiddenValue {
    options: ForbiddenValueOptions,
    schema: Option<Schema>,
    index: Option<usize>,
}

impl ForbiddenValue {
    pub fn new(options: ForbiddenValueOptions) -> Self {
        Self {
            options,
            schema: None,
            index: None,
        }
    }

    fn is_forbidden(&self, raw: &str, value: &Value) -> bool {
        let json = value.to_json();
        self.options
            .values
            .iter()
            .any(|forbidden| *forbidden == json || forbidden.as_str() == Some(raw))
    }
}

impl Check for ForbiddenValue {
    fn code(&self) -> &'static str {
        "forbidden-value"
    }

    fn scope(&self) -> Vec<ErrorCode> {
        vec![ErrorCode::ForbiddenValue]
    }

    fn connect(&mut self, resource: &Resource) {
        self.schema = resource.schema.clone();
    }

    fn validate_check(&mut self) -> Vec<ReportError> {
        match resolve_field(self.code(), self.schema.as_ref(), &self.options.field_name, &[]) {
            Ok((index, _)) => {
                self.index = Some(index);
                Vec::new()
            }
            Err(error) => vec![error],
        }
    }

    fn validate_row(&mut self, row: &Row) -> Vec<ReportError> {
        let Some(index) = self.index else {
            return Vec::new();
        };
        let (Some(raw), Some(value)) = (row.cells().get(index), row.values().get(index)) else {
            return Vec::new();
        };
        if !self.is_forbidden(raw, value) {
            return Vec::new();
        }
        let listed: Vec<String> = self.options.values.iter().map(|v| match v {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        }).collect();
        vec![ReportError::cell(
            ErrorCode::ForbiddenValue,
            format!("forbidden values are \"{}\"", listed.join(", ")),
            row.location(),
            raw.clone(),
            row.field_location(index),
        )]
    }
}

// =============================================================================
// SEQUENTIAL VALUE
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequentialValueOptions {
    pub field_name: String,
}

/// Requires an integer field to increase by one per row; reports the first break only.
#[derive(Debug)]
pub struct SequentialValue {
    options: SequentialValueOptions,
    schema: Option<Schema>,
    index: Option<usize>,
    cursor: Option<i64>,
    exhausted: bool,
}

impl SequentialValue {
    pub fn new(options: SequentialValueOptions) -> Self {
        Self {
            options,
            schema: None,
            index: None,
            cursor: None,
            exhausted: false,
        }
    }
}

impl Check for SequentialValue {
    fn code(&self) -> &'static str {
        "sequential-value"
    }

    fn scope(&self) -> Vec<ErrorCode> {
        vec![ErrorCode::SequentialValue]
    }

    fn connect(&mut self, resource: &Resource) {
        self.schema = resource.schema.clone();
    }

    fn validate_check(&mut self) -> Vec<ReportError> {
        let types = [FieldType::Integer];
        match resolve_field(self.code(), self.schema.as_ref(), &self.options.field_name, &types) {
            Ok((index, _)) => {
                self.index = Some(index);
                Vec::new()
            }
            Err(error) => vec![error],
        }
    }

    fn validate_row(&mut self, row: &Row) -> Vec<ReportError> {
        let Some(index) = self.index.filter(|_| !self.exhausted) else {
            return Vec::new();
        };
        let note = match row.values().get(index) {
            Some(Value::Integer(value)) => match self.cursor {
                Some(previous) if previous.checked_add(1) != Some(*value) => "the value is not sequential",
                _ => {
                    self.cursor = Some(*value);
                    return Vec::new();
                }
            },
            _ => "the value is missing or not an integer",
        };
        self.exhausted = true;
        let raw = row.cells().get(index).cloned().unwrap_or_default();
        vec![ReportError::cell(
            ErrorCode::SequentialValue,
            note,
            row.location(),
            raw,
            row.field_location(index),
        )]
    }
}

// =============================================================================
// TRUNCATED VALUE
// =============================================================================

/// String lengths at which database columns commonly cut text.
const TRUNCATED_STRING_LENGTHS: [usize; 3] = [255, 8000, 65535];

/// Integer limits of common database column types.
const TRUNCATED_INTEGERS: [i64; 5] = [32767, 2147483647, 65535, 4294967295, 9223372036854775807];

/// Flags values that sit exactly on a common storage limit.
#[derive(Debug, Default)]
pub struct TruncatedValue;

impl Check for TruncatedValue {
    fn code(&self) -> &'static str {
        "truncated-value"
    }

    fn scope(&self) -> Vec<ErrorCode> {
        vec![ErrorCode::TruncatedValue]
    }

    fn validate_row(&mut self, row: &Row) -> Vec<ReportError> {
        row.values()
            .iter()
            .enumerate()
            .filter(|(_, value)| match value {
                Value::String(s) => TRUNCATED_STRING_LENGTHS.contains(&s.chars().count()),
                Value::Integer(i) => TRUNCATED_INTEGERS.contains(i),
                _ => false,
            })
            .map(|(index, _)| {
                ReportError::cell(
                    ErrorCode::TruncatedValue,
                    "value is probably truncated",
                    row.location(),
                    row.cells().get(index).cloned().unwrap_or_default(),
                    row.field_location(index),
                )
            })
            .collect()
    }
}
