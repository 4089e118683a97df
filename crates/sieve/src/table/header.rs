//! Header: labels bound to schema fields.

use std::collections::HashSet;

use crate::report::{ErrorCode, FieldLocation, ReportError};
use crate::schema::{Field, Schema};

/// The header of an opened table.
#[derive(Debug, Clone)]
pub struct Header {
    labels: Vec<String>,
    fields: Vec<Field>,
    field_positions: Vec<usize>,
    row_positions: Vec<usize>,
    errors: Vec<ReportError>,
}

impl Header {
    /// Bind `labels` to the schema's fields.
    ///
    /// `row_positions` are the physical rows the labels came from; an empty
    /// list means the table has no header and no label errors are raised.
    /// With `by_name` the schema was synced to the labels, so labels are not
    /// compared to field names.
    pub fn new(
        labels: Vec<String>,
        schema: &Schema,
        field_positions: Vec<usize>,
        row_positions: Vec<usize>,
        ignore_case: bool,
        by_name: bool,
    ) -> Self {
        let mut header = Self {
            labels,
            fields: schema.fields.clone(),
            field_positions,
            row_positions,
            errors: Vec::new(),
        };
        if !header.row_positions.is_empty() {
            header.errors = header.collect_errors(ignore_case, by_name);
        }
        header
    }

    fn location(&self, index: usize, name: &str) -> FieldLocation {
        FieldLocation {
            field_name: name.to_string(),
            field_number: index + 1,
            field_position: self.field_positions.get(index).copied().unwrap_or(index + 1),
        }
    }

    fn collect_errors(&self, ignore_case: bool, by_name: bool) -> Vec<ReportError> {
        let labels = &self.labels;
        let rows = &self.row_positions;
        if !labels.is_empty() && labels.iter().all(|l| l.trim().is_empty()) {
            return vec![ReportError::header(
                ErrorCode::BlankHeader,
                "all labels are blank",
                labels,
                rows,
            )];
        }

        let mut errors = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let width = labels.len().max(self.fields.len());
        for index in 0..width {
            let label = labels.get(index);
            let field = self.fields.get(index);
            match (label, field) {
                (Some(label), None) => errors.push(ReportError::label(
                    ErrorCode::ExtraLabel,
                    "",
                    labels,
                    rows,
                    label.clone(),
                    self.location(index, label),
                )),
                (None, Some(field)) => errors.push(ReportError::label(
                    ErrorCode::MissingLabel,
                    "",
                    labels,
                    rows,
                    "",
                    self.location(index, &field.name),
                )),
                (Some(label), Some(field)) => {
                    let location = || self.location(index, &field.name);
                    let key = if ignore_case { label.to_lowercase() } else { label.clone() };
                    if label.trim().is_empty() {
                        errors.push(ReportError::label(
                            ErrorCode::BlankLabel,
                            "",
                            labels,
                            rows,
                            label.clone(),
                            location(),
                        ));
                    } else if !seen.insert(key) {
                        let first = labels
                            .iter()
                            .position(|l| same_label(l, label, ignore_case))
                            .map(|i| i + 1)
                            .unwrap_or(index + 1);
                        errors.push(ReportError::label(
                            ErrorCode::DuplicateLabel,
                            format!("at position \"{}\"", first),
                            labels,
                            rows,
                            label.clone(),
                            location(),
                        ));
                    } else if !by_name && !same_label(label, &field.name, ignore_case) {
                        errors.push(ReportError::label(
                            ErrorCode::IncorrectLabel,
                            format!("expected \"{}\"", field.name),
                            labels,
                            rows,
                            label.clone(),
                            location(),
                        ));
                    }
                }
                (None, None) => {}
            }
        }
        errors
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// 1-based raw positions of the bound fields.
    pub fn field_positions(&self) -> &[usize] {
        &self.field_positions
    }

    /// Physical rows the labels were read from.
    pub fn row_positions(&self) -> &[usize] {
        &self.row_positions
    }

    pub fn errors(&self) -> &[ReportError] {
        &self.errors
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether the table had no header row.
    pub fn missing(&self) -> bool {
        self.row_positions.is_empty()
    }
}

fn same_label(a: &str, b: &str, ignore_case: bool) -> bool {
    if ignore_case {
        a.to_lowercase() == b.to_lowercase()
    } else {
        a == b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;

    fn schema(names: &[&str]) -> Schema {
        Schema::with_fields(names.iter().map(|n| Field::new(*n, FieldType::String)).collect())
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn header(labels_: &[&str], names: &[&str], ignore_case: bool) -> Header {
        let width = labels_.len().max(names.len());
        Header::new(
            labels(labels_),
            &schema(names),
            (1..=width).collect(),
            vec![1],
            ignore_case,
            false,
        )
    }

    fn codes(header: &Header) -> Vec<ErrorCode> {
        header.errors().iter().map(|e| e.code).collect()
    }

    #[test]
    fn test_matching_header_is_valid() {
        let header = header(&["id", "name"], &["id", "name"], false);
        assert!(header.valid());
        assert_eq!(header.field_names(), vec!["id", "name"]);
    }

    #[test]
    fn test_label_errors() {
        assert_eq!(codes(&header(&["id", "name", "x"], &["id", "name"], false)), vec![ErrorCode::ExtraLabel]);
        assert_eq!(codes(&header(&["id"], &["id", "name"], false)), vec![ErrorCode::MissingLabel]);
        assert_eq!(codes(&header(&["id", ""], &["id", "name"], false)), vec![ErrorCode::BlankLabel]);
        assert_eq!(codes(&header(&["id", "id"], &["id", "name"], false)), vec![ErrorCode::DuplicateLabel]);
        assert_eq!(codes(&header(&["id", "nam"], &["id", "name"], false)), vec![ErrorCode::IncorrectLabel]);
        assert_eq!(codes(&header(&["", ""], &["id", "name"], false)), vec![ErrorCode::BlankHeader]);
    }

    #[test]
    fn test_case_insensitive_labels() {
        assert_eq!(codes(&header(&["ID"], &["id"], false)), vec![ErrorCode::IncorrectLabel]);
        assert!(header(&["ID"], &["id"], true).valid());
    }

    #[test]
    fn test_label_error_location() {
        let header = header(&["id", "nam"], &["id", "name"], false);
        let error = &header.errors()[0];
        assert_eq!(error.field_name(), Some("name"));
        assert_eq!(error.field_number(), Some(2));
        assert_eq!(error.note, "expected \"name\"");
    }

    #[test]
    fn test_headless_table_has_no_label_errors() {
        let header = Header::new(Vec::new(), &schema(&["field1"]), vec![1], Vec::new(), false, false);
        assert!(header.valid());
        assert!(header.missing());
    }
}
