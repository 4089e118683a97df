//! Field constraints and their compiled form.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::types::Value;

use super::field::Field;

/// Declared constraints of a field.
///
/// Bounds and enum members are kept as JSON so they can be written back
/// unchanged; they are decoded through the field's type on first use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_maximum: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<JsonValue>>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        *self == Constraints::default()
    }

    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    pub fn with_minimum(mut self, minimum: impl Into<JsonValue>) -> Self {
        self.minimum = Some(minimum.into());
        self
    }

    pub fn with_maximum(mut self, maximum: impl Into<JsonValue>) -> Self {
        self.maximum = Some(maximum.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_enum(mut self, values: Vec<JsonValue>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn with_unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Constraints resolved against a field's type.
#[derive(Debug, Clone, Default)]
pub(crate) struct CompiledConstraints {
    pattern: Option<Regex>,
    minimum: Option<Value>,
    maximum: Option<Value>,
    exclusive_minimum: Option<Value>,
    exclusive_maximum: Option<Value>,
    enum_values: Option<Vec<Value>>,
}

impl CompiledConstraints {
    /// Resolve `field.constraints`; the error is a descriptor note.
    pub(crate) fn compile(field: &Field) -> std::result::Result<Self, String> {
        let c = &field.constraints;
        let pattern = match &c.pattern {
            Some(pattern) => Some(
                Regex::new(&format!("^(?:{})$", pattern))
                    .map_err(|e| format!("constraint \"pattern\" is invalid: {}", e))?,
            ),
            None => None,
        };
        let bound = |name: &str, json: &Option<JsonValue>| -> std::result::Result<Option<Value>, String> {
            json.as_ref().map(|j| decode_bound(name, j, field)).transpose()
        };
        let enum_values = match &c.enum_values {
            Some(items) => Some(
                items
                    .iter()
                    .map(|j| decode_bound("enum", j, field))
                    .collect::<std::result::Result<Vec<_>, _>>()?,
            ),
            None => None,
        };
        Ok(Self {
            pattern,
            minimum: bound("minimum", &c.minimum)?,
            maximum: bound("maximum", &c.maximum)?,
            exclusive_minimum: bound("exclusiveMinimum", &c.exclusive_minimum)?,
            exclusive_maximum: bound("exclusiveMaximum", &c.exclusive_maximum)?,
            enum_values,
        })
    }

    /// Evaluate every declared constraint, appending one note per violation.
    pub(crate) fn evaluate(
        &self,
        declared: &Constraints,
        present: bool,
        raw: &str,
        value: &Value,
        notes: &mut IndexMap<String, String>,
    ) {
        let mut violate = |name: &str, expected: String| {
            notes.insert(name.to_string(), format!("constraint \"{}\" is \"{}\"", name, expected));
        };

        if declared.required && !present {
            violate("required", "true".to_string());
        }
        if value.is_null() {
            return;
        }

        if let Value::String(_) = value {
            if let Some(pattern) = &self.pattern {
                if !pattern.is_match(raw) {
                    violate("pattern", declared.pattern.clone().unwrap_or_default());
                }
            }
        }
        if let Some(length) = value.length() {
            if let Some(min) = declared.min_length.filter(|min| length < *min) {
                violate("minLength", min.to_string());
            }
            if let Some(max) = declared.max_length.filter(|max| length > *max) {
                violate("maxLength", max.to_string());
            }
        }

        use std::cmp::Ordering::{Greater, Less};
        let outside = |bound: &Option<Value>, rejected: &[std::cmp::Ordering]| {
            bound
                .as_ref()
                .and_then(|b| value.compare(b))
                .is_some_and(|ord| rejected.contains(&ord))
        };
        if outside(&self.minimum, &[Less]) {
            violate("minimum", render(&declared.minimum));
        }
        if outside(&self.maximum, &[Greater]) {
            violate("maximum", render(&declared.maximum));
        }
        if outside(&self.exclusive_minimum, &[Less, std::cmp::Ordering::Equal]) {
            violate("exclusiveMinimum", render(&declared.exclusive_minimum));
        }
        if outside(&self.exclusive_maximum, &[Greater, std::cmp::Ordering::Equal]) {
            violate("exclusiveMaximum", render(&declared.exclusive_maximum));
        }
        if let Some(members) = &self.enum_values {
            if !members.iter().any(|m| value.same_as(m)) {
                let listed: Vec<String> = members.iter().map(Value::to_string).collect();
                violate("enum", format!("[{}]", listed.join(", ")));
            }
        }
    }
}

fn decode_bound(name: &str, json: &JsonValue, field: &Field) -> std::result::Result<Value, String> {
    let decoded = match json {
        JsonValue::Bool(b) if field.field_type == crate::types::FieldType::Boolean => {
            Some(Value::Boolean(*b))
        }
        JsonValue::String(text) => field.field_type.decode(text, field),
        other => field.field_type.decode(&other.to_string(), field),
    };
    decoded.ok_or_else(|| {
        format!(
            "constraint \"{}\" value \"{}\" is not a valid {}",
            name,
            render_json(json),
            field.field_type
        )
    })
}

fn render(json: &Option<JsonValue>) -> String {
    json.as_ref().map(render_json).unwrap_or_default()
}

fn render_json(json: &JsonValue) -> String {
    match json {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
