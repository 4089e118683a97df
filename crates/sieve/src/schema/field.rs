//! Field definition: one typed column of a schema.

use indexmap::IndexMap;
use once_cell::sync::{Lazy, OnceCell};
use serde::{Deserialize, Serialize};

use crate::types::{FieldType, Value};

use super::constraints::{CompiledConstraints, Constraints};

/// Named notes collected while reading or writing one cell
/// (`type`, `required`, `minimum`, ...).
pub type Notes = IndexMap<String, String>;

static DEFAULT_TRUE_VALUES: Lazy<Vec<String>> =
    Lazy::new(|| ["true", "True", "TRUE", "1"].map(String::from).to_vec());
static DEFAULT_FALSE_VALUES: Lazy<Vec<String>> =
    Lazy::new(|| ["false", "False", "FALSE", "0"].map(String::from).to_vec());
static DEFAULT_MISSING_VALUES: Lazy<Vec<String>> = Lazy::new(|| vec![String::new()]);

fn default_format() -> String {
    "default".to_string()
}

fn is_default_format(format: &String) -> bool {
    format == "default"
}

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

/// Schema for a single column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// Field name; non-empty and unique within its schema.
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default = "default_format", skip_serializing_if = "is_default_format")]
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared constraints. Replace them with [`Field::with_constraints`]
    /// once the field has read a cell.
    #[serde(default, skip_serializing_if = "Constraints::is_empty")]
    pub constraints: Constraints,
    /// Overrides the schema's missing values when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub true_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub false_values: Option<Vec<String>>,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub bare_number: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_char: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimal_char: Option<String>,
    #[serde(skip)]
    compiled: OnceCell<std::result::Result<CompiledConstraints, String>>,
}

impl Field {
    /// Create a field of the given type with default options.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            format: default_format(),
            title: None,
            description: None,
            constraints: Constraints::default(),
            missing_values: None,
            true_values: None,
            false_values: None,
            bare_number: true,
            group_char: None,
            decimal_char: None,
            compiled: OnceCell::new(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self.compiled = OnceCell::new();
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self.compiled = OnceCell::new();
        self
    }

    pub fn with_missing_values(mut self, values: Vec<String>) -> Self {
        self.missing_values = Some(values);
        self
    }

    pub fn with_true_values(mut self, values: Vec<String>) -> Self {
        self.true_values = Some(values);
        self.compiled = OnceCell::new();
        self
    }

    pub fn with_false_values(mut self, values: Vec<String>) -> Self {
        self.false_values = Some(values);
        self.compiled = OnceCell::new();
        self
    }

    pub fn with_bare_number(mut self, bare_number: bool) -> Self {
        self.bare_number = bare_number;
        self.compiled = OnceCell::new();
        self
    }

    pub fn with_group_char(mut self, group_char: &str) -> Self {
        self.group_char = Some(group_char.to_string());
        self.compiled = OnceCell::new();
        self
    }

    pub fn with_decimal_char(mut self, decimal_char: &str) -> Self {
        self.decimal_char = Some(decimal_char.to_string());
        self.compiled = OnceCell::new();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn decimal_char(&self) -> &str {
        self.decimal_char.as_deref().unwrap_or(".")
    }

    pub fn true_values(&self) -> &[String] {
        self.true_values.as_deref().unwrap_or(DEFAULT_TRUE_VALUES.as_slice())
    }

    pub fn false_values(&self) -> &[String] {
        self.false_values.as_deref().unwrap_or(DEFAULT_FALSE_VALUES.as_slice())
    }

    /// Whether the field declares `unique`.
    pub fn is_unique(&self) -> bool {
        self.constraints.unique
    }

    /// Read one raw cell using the default missing values.
    pub fn read_cell(&self, raw: &str) -> (Value, Notes) {
        self.read_cell_in(raw, DEFAULT_MISSING_VALUES.as_slice())
    }

    /// Read one raw cell; `schema_missing` applies unless the field overrides it.
    ///
    /// The value is `Null` for a missing-value token or a failed decode.
    /// Constraints are evaluated independently, one note per violation.
    pub fn read_cell_in(&self, raw: &str, schema_missing: &[String]) -> (Value, Notes) {
        let mut notes = Notes::new();
        let missing = self.is_missing(raw, schema_missing);
        let value = if missing {
            Value::Null
        } else {
            match self.field_type.decode(raw, self) {
                Some(value) => value,
                None => {
                    notes.insert("type".to_string(), self.type_note());
                    Value::Null
                }
            }
        };
        if let Ok(compiled) = self.compiled() {
            compiled.evaluate(&self.constraints, !missing, raw, &value, &mut notes);
        }
        (value, notes)
    }

    /// Encode one value using the default missing values.
    pub fn write_cell(&self, value: &Value) -> (String, Notes) {
        self.write_cell_in(value, DEFAULT_MISSING_VALUES.as_slice())
    }

    /// Encode one value; `Null` becomes the first missing-value token.
    pub fn write_cell_in(&self, value: &Value, schema_missing: &[String]) -> (String, Notes) {
        let mut notes = Notes::new();
        if value.is_null() {
            let missing = self.missing_values.as_deref().unwrap_or(schema_missing);
            return (missing.first().cloned().unwrap_or_default(), notes);
        }
        match self.field_type.encode(value, self) {
            Some(raw) => (raw, notes),
            None => {
                notes.insert("type".to_string(), self.type_note());
                (String::new(), notes)
            }
        }
    }

    /// Whether `raw` is one of the effective missing-value tokens.
    pub fn is_missing(&self, raw: &str, schema_missing: &[String]) -> bool {
        self.missing_values
            .as_deref()
            .unwrap_or(schema_missing)
            .iter()
            .any(|m| m == raw)
    }

    /// Problems with this field's own descriptor.
    pub fn metadata_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("field name is empty".to_string());
        }
        if !self.field_type.supports_format(&self.format) {
            errors.push(format!(
                "format \"{}\" is not supported by type \"{}\"",
                self.format, self.field_type
            ));
        }
        if let Err(note) = self.compiled() {
            errors.push(note.clone());
        }
        errors
    }

    fn type_note(&self) -> String {
        format!("type is \"{}/{}\"", self.field_type, self.format)
    }

    fn compiled(&self) -> &std::result::Result<CompiledConstraints, String> {
        self.compiled.get_or_init(|| CompiledConstraints::compile(self))
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.field_type == other.field_type
            && self.format == other.format
            && self.title == other.title
            && self.description == other.description
            && self.constraints == other.constraints
            && self.missing_values == other.missing_values
            && self.true_values == other.true_values
            && self.false_values == other.false_values
            && self.bare_number == other.bare_number
            && self.group_char == other.group_char
            && self.decimal_char == other.decimal_char
    }
}
