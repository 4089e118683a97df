//! Row: one data record cast through the schema.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};

use crate::report::{ErrorCode, FieldLocation, ReportError, RowLocation};
use crate::schema::Schema;
use crate::types::Value;

/// A cast data row with its errors.
#[derive(Debug, Clone)]
pub struct Row {
    cells: Vec<String>,
    values: Vec<Value>,
    field_names: Arc<[String]>,
    field_positions: Arc<[usize]>,
    blank_cells: IndexMap<String, String>,
    error_cells: IndexMap<String, String>,
    row_position: usize,
    row_number: usize,
    errors: Vec<ReportError>,
}

impl Row {
    /// Cast `cells` through `schema`.
    ///
    /// A row whose every cell is a missing value carries a single
    /// `blank-row` error and nothing else.
    pub fn new(
        schema: &Schema,
        field_names: Arc<[String]>,
        field_positions: Arc<[usize]>,
        cells: Vec<String>,
        row_position: usize,
        row_number: usize,
    ) -> Self {
        let mut row = Self {
            values: Vec::with_capacity(schema.fields.len()),
            cells,
            field_names,
            field_positions,
            blank_cells: IndexMap::new(),
            error_cells: IndexMap::new(),
            row_position,
            row_number,
            errors: Vec::new(),
        };
        row.cast(schema);
        row
    }

    fn cast(&mut self, schema: &Schema) {
        let results = schema.read_cells(&self.cells);
        let mut errors = Vec::new();

        for (index, field) in schema.fields.iter().enumerate() {
            let Some(raw) = self.cells.get(index) else {
                self.values.push(Value::Null);
                errors.push(ReportError::cell(
                    ErrorCode::MissingCell,
                    "",
                    self.location(),
                    "",
                    self.field_location(index),
                ));
                continue;
            };
            let Some((value, notes)) = results.get(index) else {
                continue;
            };
            if field.is_missing(raw, &schema.missing_values) {
                self.blank_cells.insert(field.name.clone(), raw.clone());
            }
            if !notes.is_empty() {
                self.error_cells.insert(field.name.clone(), raw.clone());
            }
            for (name, note) in notes {
                let code = if name == "type" {
                    ErrorCode::TypeError
                } else {
                    ErrorCode::ConstraintError
                };
                errors.push(ReportError::cell(
                    code,
                    note.clone(),
                    self.location(),
                    raw.clone(),
                    self.field_location(index),
                ));
            }
            self.values.push(value.clone());
        }

        for (index, raw) in self.cells.iter().enumerate().skip(schema.fields.len()) {
            errors.push(ReportError::cell(
                ErrorCode::ExtraCell,
                "",
                self.location(),
                raw.clone(),
                self.field_location(index),
            ));
        }

        let blank = self.cells.iter().enumerate().all(|(index, raw)| match schema.fields.get(index) {
            Some(field) => field.is_missing(raw, &schema.missing_values),
            None => schema.missing_values.iter().any(|m| m == raw),
        });
        self.errors = if blank {
            vec![ReportError::row(ErrorCode::BlankRow, "", self.location())]
        } else {
            errors
        };
    }

    /// Coordinates used by errors about this row.
    pub fn location(&self) -> RowLocation {
        RowLocation {
            cells: self.cells.clone(),
            row_number: self.row_number,
            row_position: self.row_position,
        }
    }

    /// Coordinates of the field at `index` (0-based).
    pub fn field_location(&self, index: usize) -> FieldLocation {
        FieldLocation {
            field_name: self.field_names.get(index).cloned().unwrap_or_default(),
            field_number: index + 1,
            field_position: self.field_positions.get(index).copied().unwrap_or(index + 1),
        }
    }

    pub(crate) fn push_error(&mut self, error: ReportError) {
        self.errors.push(error);
    }

    pub(crate) fn mark_error_cell(&mut self, name: &str, raw: &str) {
        self.error_cells.insert(name.to_string(), raw.to_string());
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    /// Cast values, one per schema field.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    /// The value of the named field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let index = self.field_names.iter().position(|n| n == name)?;
        self.values.get(index)
    }

    /// The raw cell of the named field.
    pub fn cell(&self, name: &str) -> Option<&str> {
        let index = self.field_names.iter().position(|n| n == name)?;
        self.cells.get(index).map(String::as_str)
    }

    /// Missing-value cells keyed by field name.
    pub fn blank_cells(&self) -> &IndexMap<String, String> {
        &self.blank_cells
    }

    /// Cells that failed casting or constraints, keyed by field name.
    pub fn error_cells(&self) -> &IndexMap<String, String> {
        &self.error_cells
    }

    /// Physical 1-based position in the source.
    pub fn row_position(&self) -> usize {
        self.row_position
    }

    /// 1-based ordinal among emitted rows.
    pub fn row_number(&self) -> usize {
        self.row_number
    }

    pub fn errors(&self) -> &[ReportError] {
        &self.errors
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Values keyed by field name.
    pub fn to_map(&self) -> IndexMap<String, Value> {
        self.field_names
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }

    /// A JSON object keyed by field name, or an array in field order.
    pub fn to_json(&self, keyed: bool) -> JsonValue {
        if keyed {
            let map: Map<String, JsonValue> = self
                .field_names
                .iter()
                .cloned()
                .zip(self.values.iter().map(Value::to_json))
                .collect();
            JsonValue::Object(map)
        } else {
            JsonValue::Array(self.values.iter().map(Value::to_json).collect())
        }
    }
}
