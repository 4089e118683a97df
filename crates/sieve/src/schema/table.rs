//! Table-level schema definition.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Result, SieveError};
use crate::report::{ErrorCode, ReportError};
use crate::types::Value;

use super::field::{Field, Notes};

fn default_missing_values() -> Vec<String> {
    vec![String::new()]
}

/// Accepts either a single name or a list of names.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(name) => vec![name],
        OneOrMany::Many(names) => names,
    })
}

/// Target of a foreign key. An empty `resource` refers to the same table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyReference {
    #[serde(default)]
    pub resource: String,
    #[serde(deserialize_with = "one_or_many")]
    pub fields: Vec<String>,
}

/// A foreign key declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    #[serde(deserialize_with = "one_or_many")]
    pub fields: Vec<String>,
    pub reference: ForeignKeyReference,
}

impl ForeignKey {
    pub fn new(fields: Vec<String>, resource: impl Into<String>, reference: Vec<String>) -> Self {
        Self {
            fields,
            reference: ForeignKeyReference {
                resource: resource.into(),
                fields: reference,
            },
        }
    }
}

/// Schema for an entire table: ordered fields plus key declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Fields in column order.
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default = "default_missing_values")]
    pub missing_values: Vec<String>,
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub primary_key: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
}

impl Schema {
    /// Create a new empty schema.
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            missing_values: default_missing_values(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Create a schema with the given fields.
    pub fn with_fields(fields: Vec<Field>) -> Self {
        Self {
            fields,
            ..Self::new()
        }
    }

    pub fn with_missing_values(mut self, values: Vec<String>) -> Self {
        self.missing_values = values;
        self
    }

    /// Load a descriptor from JSON text, rejecting invalid metadata.
    pub fn from_json(text: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Load a descriptor from a JSON value, rejecting invalid metadata.
    pub fn from_value(value: JsonValue) -> Result<Self> {
        let schema: Schema = serde_json::from_value(value)
            .map_err(|e| SieveError::new(ErrorCode::SchemaError, e.to_string()))?;
        schema.validate()?;
        Ok(schema)
    }

    /// The descriptor as JSON.
    pub fn to_value(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }

    /// Get all field names.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Get a field by name.
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.get_field(name).is_some()
    }

    /// Zero-based index of a field.
    pub fn field_position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Append a field; rolled back if the descriptor becomes invalid.
    pub fn add_field(&mut self, field: Field) -> Result<()> {
        self.fields.push(field);
        self.validate().inspect_err(|_| {
            self.fields.pop();
        })
    }

    /// Remove a field by name; rolled back if a key still references it.
    pub fn remove_field(&mut self, name: &str) -> Result<Field> {
        let position = self.field_position(name).ok_or_else(|| {
            SieveError::new(ErrorCode::SchemaError, format!("field \"{}\" does not exist", name))
        })?;
        let field = self.fields.remove(position);
        if let Err(err) = self.validate() {
            self.fields.insert(position, field);
            return Err(err);
        }
        Ok(field)
    }

    /// Replace the primary key; rolled back on dangling names.
    pub fn set_primary_key(&mut self, names: Vec<String>) -> Result<()> {
        let previous = std::mem::replace(&mut self.primary_key, names);
        self.validate().inspect_err(|_| {
            self.primary_key = previous;
        })
    }

    /// Append a foreign key; rolled back on dangling names.
    pub fn add_foreign_key(&mut self, key: ForeignKey) -> Result<()> {
        self.foreign_keys.push(key);
        self.validate().inspect_err(|_| {
            self.foreign_keys.pop();
        })
    }

    /// Fail with the first descriptor problem, if any.
    pub fn validate(&self) -> Result<()> {
        match self.metadata_errors().into_iter().next() {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    /// Every descriptor problem, in field order then key order.
    pub fn metadata_errors(&self) -> Vec<ReportError> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        for field in &self.fields {
            for note in field.metadata_errors() {
                errors.push(ReportError::general(
                    ErrorCode::FieldError,
                    format!("field \"{}\": {}", field.name, note),
                ));
            }
            if !field.name.is_empty() && !seen.insert(field.name.as_str()) {
                errors.push(ReportError::general(
                    ErrorCode::SchemaError,
                    format!("duplicate field name \"{}\"", field.name),
                ));
            }
        }

        for name in &self.primary_key {
            if !seen.contains(name.as_str()) {
                errors.push(ReportError::general(
                    ErrorCode::SchemaError,
                    format!("primary key \"{}\" does not match a field", name),
                ));
            }
        }

        for key in &self.foreign_keys {
            for name in &key.fields {
                if !seen.contains(name.as_str()) {
                    errors.push(ReportError::general(
                        ErrorCode::SchemaError,
                        format!("foreign key \"{}\" does not match a field", name),
                    ));
                }
            }
            if key.fields.len() != key.reference.fields.len() {
                errors.push(ReportError::general(
                    ErrorCode::SchemaError,
                    "foreign key fields and reference fields differ in length",
                ));
            }
            if key.reference.resource.is_empty() {
                for name in &key.reference.fields {
                    if !seen.contains(name.as_str()) {
                        errors.push(ReportError::general(
                            ErrorCode::SchemaError,
                            format!("foreign key reference \"{}\" does not match a field", name),
                        ));
                    }
                }
            }
        }
        errors
    }

    /// Cast raw cells positionally. Extra or missing cells are left to the row.
    pub fn read_cells(&self, cells: &[String]) -> Vec<(Value, Notes)> {
        self.fields
            .iter()
            .zip(cells)
            .map(|(field, raw)| field.read_cell_in(raw, &self.missing_values))
            .collect()
    }

    /// Encode values positionally.
    pub fn write_cells(&self, values: &[Value]) -> Vec<(String, Notes)> {
        self.fields
            .iter()
            .zip(values)
            .map(|(field, value)| field.write_cell_in(value, &self.missing_values))
            .collect()
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}
