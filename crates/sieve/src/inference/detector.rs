//! Sample-based inference of encoding, layout, and schema.

use std::collections::HashMap;

use encoding_rs::{DecoderResult, Encoding, UTF_8, WINDOWS_1252};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{Result, SieveError};
use crate::input::Layout;
use crate::report::ErrorCode;
use crate::schema::{Field, Schema};
use crate::types::FieldType;

/// Inference settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Detector {
    /// Bytes buffered for encoding detection and delimiter sniffing.
    pub buffer_size: usize,
    /// Raw rows read for layout and schema inference.
    pub sample_size: usize,
    /// Encoding assumed for an empty sample.
    pub encoding_default: String,
    /// Forces every inferred field to this type.
    pub field_type: Option<FieldType>,
    /// Overrides labels as field names.
    pub field_names: Option<Vec<String>>,
    /// Fraction of sampled values a type must decode to be chosen.
    pub field_confidence: f64,
    /// Candidate types, most specific first.
    pub field_candidates: Vec<FieldType>,
    pub field_missing_values: Vec<String>,
    pub field_true_values: Option<Vec<String>>,
    pub field_false_values: Option<Vec<String>>,
    /// Bind a supplied schema to labels by name instead of position.
    pub schema_sync: bool,
    /// `{"fields": {name: partial}, ...}` overlaid after inference.
    pub schema_patch: Option<JsonValue>,
}

impl Default for Detector {
    fn default() -> Self {
        Self {
            buffer_size: 10_000,
            sample_size: 100,
            encoding_default: "utf-8".to_string(),
            field_type: None,
            field_names: None,
            field_confidence: 0.9,
            field_candidates: FieldType::INFERENCE_ORDER.to_vec(),
            field_missing_values: vec![String::new()],
            field_true_values: None,
            field_false_values: None,
            schema_sync: false,
            schema_patch: None,
        }
    }
}

impl Detector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_field_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    pub fn with_field_names(mut self, names: Vec<String>) -> Self {
        self.field_names = Some(names);
        self
    }

    pub fn with_field_confidence(mut self, confidence: f64) -> Self {
        self.field_confidence = confidence;
        self
    }

    pub fn with_field_candidates(mut self, candidates: Vec<FieldType>) -> Self {
        self.field_candidates = candidates;
        self
    }

    pub fn with_field_missing_values(mut self, values: Vec<String>) -> Self {
        self.field_missing_values = values;
        self
    }

    pub fn with_schema_sync(mut self, sync: bool) -> Self {
        self.schema_sync = sync;
        self
    }

    pub fn with_schema_patch(mut self, patch: JsonValue) -> Self {
        self.schema_patch = Some(patch);
        self
    }

    // =========================================================================
    // ENCODING
    // =========================================================================

    /// Guess the encoding of a byte sample.
    ///
    /// Byte order marks win; otherwise UTF-8 when the sample is valid UTF-8
    /// (a sequence cut by the sample boundary is tolerated), else
    /// windows-1252.
    pub fn detect_encoding(&self, sample: &[u8]) -> String {
        if sample.is_empty() {
            return self.encoding_default.clone();
        }
        if let Some((encoding, _)) = Encoding::for_bom(sample) {
            if encoding == UTF_8 {
                return "utf-8-sig".to_string();
            }
            return encoding.name().to_ascii_lowercase();
        }
        let mut decoder = UTF_8.new_decoder_without_bom_handling();
        let capacity = decoder
            .max_utf8_buffer_length_without_replacement(sample.len())
            .unwrap_or(sample.len() + 16);
        let mut out = vec![0u8; capacity];
        let (result, _, _) = decoder.decode_to_utf8_without_replacement(sample, &mut out, false);
        match result {
            DecoderResult::Malformed(..) => WINDOWS_1252.name().to_ascii_lowercase(),
            _ => UTF_8.name().to_ascii_lowercase(),
        }
    }

    // =========================================================================
    // LAYOUT
    // =========================================================================

    /// Infer comment skipping and the header row from raw sample rows.
    ///
    /// An explicit layout is returned unchanged.
    pub fn detect_layout(&self, sample: &[Vec<String>], layout: Option<&Layout>) -> Layout {
        if let Some(layout) = layout {
            return layout.clone();
        }
        let mut layout = Layout::default();

        let non_blank: Vec<&Vec<String>> = sample
            .iter()
            .filter(|row| row.iter().any(|c| !c.is_empty()))
            .collect();
        let comments = non_blank
            .iter()
            .filter(|row| row.first().is_some_and(|c| c.starts_with('#')))
            .count();
        if !non_blank.is_empty() && comments * 2 >= non_blank.len() {
            layout.skip_rows.push("#".into());
        }

        let kept: Vec<&Vec<String>> = sample
            .iter()
            .enumerate()
            .filter(|(index, row)| layout.keeps_row(index + 1, row))
            .map(|(_, row)| row)
            .collect();
        let Some(modal) = modal_width(&kept) else {
            return layout;
        };
        let tolerance = ((modal as f64 * 0.1).round() as usize).max(1);

        let header = kept.iter().position(|row| {
            row.len().abs_diff(modal) <= tolerance && row.iter().all(|c| !c.trim().is_empty())
        });
        if let Some(index) = header {
            layout.header_rows = vec![index + 1];
            let numeric = Field::new("label", FieldType::Number);
            let all_numeric = kept[index]
                .iter()
                .filter(|c| !c.is_empty())
                .all(|c| FieldType::Number.decode(c, &numeric).is_some());
            if all_numeric {
                layout.header = false;
                layout.header_rows = vec![1];
            }
        } else {
            layout.header = false;
        }
        debug!(header = layout.header, header_rows = ?layout.header_rows, "detected layout");
        layout
    }

    // =========================================================================
    // SCHEMA
    // =========================================================================

    /// Infer a schema from data rows (`fragment`) and their labels.
    ///
    /// With a supplied schema and no `schema_sync`, the schema is used as
    /// given; `schema_patch` applies in every case.
    pub fn detect_schema(
        &self,
        fragment: &[Vec<String>],
        labels: &[String],
        schema: Option<&Schema>,
    ) -> Result<Schema> {
        let detected = match schema {
            Some(supplied) if !self.schema_sync => supplied.clone(),
            _ => {
                let inferred = self.infer_schema(fragment, labels);
                match schema {
                    Some(supplied) => sync_schema(supplied, inferred, labels),
                    None => inferred,
                }
            }
        };
        match &self.schema_patch {
            Some(patch) => patch_schema(&detected, patch),
            None => Ok(detected),
        }
    }

    fn infer_schema(&self, fragment: &[Vec<String>], labels: &[String]) -> Schema {
        let width = if labels.is_empty() {
            fragment.iter().map(Vec::len).max().unwrap_or(0)
        } else {
            labels.len()
        };
        let names = self.field_names(labels, width);

        let fields = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| {
                let mut field = Field::new(name, FieldType::String);
                if let Some(values) = &self.field_true_values {
                    field = field.with_true_values(values.clone());
                }
                if let Some(values) = &self.field_false_values {
                    field = field.with_false_values(values.clone());
                }
                let field_type = match self.field_type {
                    Some(forced) => forced,
                    None => self.infer_type(&field, fragment, index),
                };
                field.field_type = field_type;
                field
            })
            .collect();
        let schema =
            Schema::with_fields(fields).with_missing_values(self.field_missing_values.clone());
        debug!(fields = schema.field_count(), rows = fragment.len(), "inferred schema");
        schema
    }

    /// Names from `field_names`, labels, or `fieldN`; blanks and duplicates fixed up.
    fn field_names(&self, labels: &[String], width: usize) -> Vec<String> {
        let source = self.field_names.as_deref().unwrap_or(labels);
        let mut seen: HashMap<String, usize> = HashMap::new();
        (0..width)
            .map(|index| {
                let name = match source.get(index).map(|n| n.trim()) {
                    Some(name) if !name.is_empty() => name.to_string(),
                    _ => format!("field{}", index + 1),
                };
                let count = seen.entry(name.clone()).or_insert(0);
                *count += 1;
                if *count > 1 {
                    format!("{}{}", name, count)
                } else {
                    name
                }
            })
            .collect()
    }

    /// The first candidate whose decode rate reaches the confidence threshold.
    fn infer_type(&self, field: &Field, fragment: &[Vec<String>], index: usize) -> FieldType {
        let values: Vec<&str> = fragment
            .iter()
            .filter_map(|row| row.get(index))
            .map(String::as_str)
            .filter(|cell| !self.field_missing_values.iter().any(|m| m == cell))
            .collect();
        if values.is_empty() {
            return FieldType::String;
        }
        let total = values.len() as f64;
        self.field_candidates
            .iter()
            .copied()
            .find(|candidate| {
                let mut trial = field.clone();
                trial.field_type = *candidate;
                let decoded = values
                    .iter()
                    .filter(|raw| candidate.decode(raw, &trial).is_some())
                    .count();
                decoded as f64 / total + f64::EPSILON >= self.field_confidence
            })
            .unwrap_or(FieldType::String)
    }
}

/// The most common non-zero row width; ties go to the wider row.
fn modal_width(rows: &[&Vec<String>]) -> Option<usize> {
    let mut counts: HashMap<usize, usize> = HashMap::new();
    for row in rows.iter().filter(|r| !r.is_empty()) {
        *counts.entry(row.len()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by_key(|&(width, count)| (count, width))
        .map(|(width, _)| width)
}

/// Follow label order, preferring the supplied field of the same name.
fn sync_schema(supplied: &Schema, inferred: Schema, labels: &[String]) -> Schema {
    let fields = inferred
        .fields
        .into_iter()
        .enumerate()
        .map(|(index, field)| {
            let label = labels.get(index).map(String::as_str).unwrap_or(&field.name);
            supplied.get_field(label).cloned().unwrap_or(field)
        })
        .collect::<Vec<_>>();
    let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    let primary_key = supplied
        .primary_key
        .iter()
        .filter(|n| names.contains(&n.as_str()))
        .cloned()
        .collect();
    let foreign_keys = supplied
        .foreign_keys
        .iter()
        .filter(|key| key.fields.iter().all(|n| names.contains(&n.as_str())))
        .cloned()
        .collect();
    Schema {
        fields,
        missing_values: supplied.missing_values.clone(),
        primary_key,
        foreign_keys,
    }
}

/// Overlay `{"fields": {name: partial}, ...}` onto a schema descriptor.
fn patch_schema(schema: &Schema, patch: &JsonValue) -> Result<Schema> {
    let JsonValue::Object(patch) = patch else {
        return Err(SieveError::new(
            ErrorCode::SchemaError,
            "schema patch must be an object",
        ));
    };
    let mut descriptor = schema.to_value();
    let Some(target) = descriptor.as_object_mut() else {
        return Err(SieveError::new(ErrorCode::SchemaError, "schema is not an object"));
    };
    for (key, value) in patch {
        if key != "fields" {
            target.insert(key.clone(), value.clone());
        }
    }
    if let (Some(JsonValue::Object(partials)), Some(JsonValue::Array(fields))) =
        (patch.get("fields"), target.get_mut("fields"))
    {
        for field in fields.iter_mut() {
            let name = field.get("name").and_then(JsonValue::as_str).map(str::to_string);
            let partial = name.and_then(|n| partials.get(&n));
            if let (Some(JsonValue::Object(partial)), Some(field)) = (partial, field.as_object_mut()) {
                for (key, value) in partial {
                    field.insert(key.clone(), value.clone());
                }
            }
        }
    }
    Schema::from_value(descriptor)
}
