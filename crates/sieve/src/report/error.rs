//! Structured errors recorded in validation reports.

use serde::Serialize;

/// Broad category of an error, deciding which positional context it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed descriptor, unreachable source, bad configuration.
    General,
    /// Whole-table findings (checksums, statistics, blank tables).
    Table,
    /// Problems with the header as a whole.
    Header,
    /// Problems with one header label.
    Label,
    /// Row-level findings.
    Row,
    /// Cell-level findings; always carry row and field positions.
    Cell,
}

/// Every error code the engine can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    Error,
    ResourceError,
    SourceError,
    SchemeError,
    FormatError,
    EncodingError,
    CompressionError,
    DialectError,
    LayoutError,
    SchemaError,
    FieldError,
    CheckError,
    TaskError,
    BlankTable,
    ChecksumError,
    DeviatedValue,
    BlankHeader,
    ExtraLabel,
    MissingLabel,
    BlankLabel,
    DuplicateLabel,
    IncorrectLabel,
    BlankRow,
    PrimaryKeyError,
    DuplicateRow,
    RowConstraint,
    ExtraCell,
    MissingCell,
    TypeError,
    ConstraintError,
    UniqueError,
    TruncatedValue,
    ForbiddenValue,
    SequentialValue,
}

impl ErrorCode {
    /// The wire name of the code, e.g. `type-error`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Error => "error",
            ErrorCode::ResourceError => "resource-error",
            ErrorCode::SourceError => "source-error",
            ErrorCode::SchemeError => "scheme-error",
            ErrorCode::FormatError => "format-error",
            ErrorCode::EncodingError => "encoding-error",
            ErrorCode::CompressionError => "compression-error",
            ErrorCode::DialectError => "dialect-error",
            ErrorCode::LayoutError => "layout-error",
            ErrorCode::SchemaError => "schema-error",
            ErrorCode::FieldError => "field-error",
            ErrorCode::CheckError => "check-error",
            ErrorCode::TaskError => "task-error",
            ErrorCode::BlankTable => "blank-table",
            ErrorCode::ChecksumError => "checksum-error",
            ErrorCode::DeviatedValue => "deviated-value",
            ErrorCode::BlankHeader => "blank-header",
            ErrorCode::ExtraLabel => "extra-label",
            ErrorCode::MissingLabel => "missing-label",
            ErrorCode::BlankLabel => "blank-label",
            ErrorCode::DuplicateLabel => "duplicate-label",
            ErrorCode::IncorrectLabel => "incorrect-label",
            ErrorCode::BlankRow => "blank-row",
            ErrorCode::PrimaryKeyError => "primary-key-error",
            ErrorCode::DuplicateRow => "duplicate-row",
            ErrorCode::RowConstraint => "row-constraint",
            ErrorCode::ExtraCell => "extra-cell",
            ErrorCode::MissingCell => "missing-cell",
            ErrorCode::TypeError => "type-error",
            ErrorCode::ConstraintError => "constraint-error",
            ErrorCode::UniqueError => "unique-error",
            ErrorCode::TruncatedValue => "truncated-value",
            ErrorCode::ForbiddenValue => "forbidden-value",
            ErrorCode::SequentialValue => "sequential-value",
        }
    }

    /// Human-readable title.
    pub fn title(&self) -> &'static str {
        match self {
            ErrorCode::Error => "Error",
            ErrorCode::ResourceError => "Resource Error",
            ErrorCode::SourceError => "Source Error",
            ErrorCode::SchemeError => "Scheme Error",
            ErrorCode::FormatError => "Format Error",
            ErrorCode::EncodingError => "Encoding Error",
            ErrorCode::CompressionError => "Compression Error",
            ErrorCode::DialectError => "Dialect Error",
            ErrorCode::LayoutError => "Layout Error",
            ErrorCode::SchemaError => "Schema Error",
            ErrorCode::FieldError => "Field Error",
            ErrorCode::CheckError => "Check Error",
            ErrorCode::TaskError => "Task Error",
            ErrorCode::BlankTable => "Blank Table",
            ErrorCode::ChecksumError => "Checksum Error",
            ErrorCode::DeviatedValue => "Deviated Value",
            ErrorCode::BlankHeader => "Blank Header",
            ErrorCode::ExtraLabel => "Extra Label",
            ErrorCode::MissingLabel => "Missing Label",
            ErrorCode::BlankLabel => "Blank Label",
            ErrorCode::DuplicateLabel => "Duplicate Label",
            ErrorCode::IncorrectLabel => "Incorrect Label",
            ErrorCode::BlankRow => "Blank Row",
            ErrorCode::PrimaryKeyError => "Primary Key Error",
            ErrorCode::DuplicateRow => "Duplicate Row",
            ErrorCode::RowConstraint => "Row Constraint",
            ErrorCode::ExtraCell => "Extra Cell",
            ErrorCode::MissingCell => "Missing Cell",
            ErrorCode::TypeError => "Type Error",
            ErrorCode::ConstraintError => "Constraint Error",
            ErrorCode::UniqueError => "Unique Error",
            ErrorCode::TruncatedValue => "Truncated Value",
            ErrorCode::ForbiddenValue => "Forbidden Value",
            ErrorCode::SequentialValue => "Sequential Value",
        }
    }

    /// The kind decides which context an error of this code carries.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorCode::BlankTable | ErrorCode::ChecksumError | ErrorCode::DeviatedValue => {
                ErrorKind::Table
            }
            ErrorCode::BlankHeader => ErrorKind::Header,
            ErrorCode::ExtraLabel
            | ErrorCode::MissingLabel
            | ErrorCode::BlankLabel
            | ErrorCode::DuplicateLabel
            | ErrorCode::IncorrectLabel => ErrorKind::Label,
            ErrorCode::BlankRow
            | ErrorCode::PrimaryKeyError
            | ErrorCode::DuplicateRow
            | ErrorCode::RowConstraint => ErrorKind::Row,
            ErrorCode::ExtraCell
            | ErrorCode::MissingCell
            | ErrorCode::TypeError
            | ErrorCode::ConstraintError
            | ErrorCode::UniqueError
            | ErrorCode::TruncatedValue
            | ErrorCode::ForbiddenValue
            | ErrorCode::SequentialValue => ErrorKind::Cell,
            _ => ErrorKind::General,
        }
    }

    /// Tags used by pick/skip filtering (`#table`, `#row`, ...).
    pub fn tags(&self) -> &'static [&'static str] {
        match self.kind() {
            ErrorKind::General => &["#general"],
            ErrorKind::Table => &["#table"],
            ErrorKind::Header => &["#table", "#header"],
            ErrorKind::Label => &["#table", "#header", "#label"],
            ErrorKind::Row => &["#table", "#row"],
            ErrorKind::Cell => &["#table", "#row", "#cell"],
        }
    }

    /// Whether a pick/skip selector (a code or a `#tag`) names this code.
    pub fn matches(&self, selector: &str) -> bool {
        selector == self.as_str() || self.tags().contains(&selector)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row coordinates shared by row and cell errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowLocation {
    pub cells: Vec<String>,
    pub row_number: usize,
    pub row_position: usize,
}

/// Field coordinates shared by label and cell errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldLocation {
    pub field_name: String,
    /// 1-based position among schema fields.
    pub field_number: usize,
    /// 1-based position among the source's raw cells.
    pub field_position: usize,
}

/// Positional context, one shape per [`ErrorKind`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum ErrorContext {
    General {},
    Table {},
    Header {
        labels: Vec<String>,
        row_positions: Vec<usize>,
    },
    Label {
        labels: Vec<String>,
        row_positions: Vec<usize>,
        label: String,
        field_name: String,
        field_number: usize,
        field_position: usize,
    },
    Row {
        cells: Vec<String>,
        row_number: usize,
        row_position: usize,
    },
    Cell {
        cells: Vec<String>,
        row_number: usize,
        row_position: usize,
        cell: String,
        field_name: String,
        field_number: usize,
        field_position: usize,
    },
}

/// An immutable error record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportError {
    pub code: ErrorCode,
    pub name: &'static str,
    pub tags: &'static [&'static str],
    pub note: String,
    pub message: String,
    #[serde(flatten)]
    pub context: ErrorContext,
}

impl ReportError {
    fn build(code: ErrorCode, note: String, message: String, context: ErrorContext) -> Self {
        Self {
            code,
            name: code.title(),
            tags: code.tags(),
            note,
            message,
            context,
        }
    }

    /// Error without positional context.
    pub fn general(code: ErrorCode, note: impl Into<String>) -> Self {
        let note = note.into();
        let message = format!("{}: {}", code.title(), note);
        let context = if code.kind() == ErrorKind::Table {
            ErrorContext::Table {}
        } else {
            ErrorContext::General {}
        };
        Self::build(code, note, message, context)
    }

    /// Whole-table error.
    pub fn table(code: ErrorCode, note: impl Into<String>) -> Self {
        let note = note.into();
        let message = format!("The data source has a table-level error \"{}\": {}", code.as_str(), note);
        Self::build(code, note, message, ErrorContext::Table {})
    }

    /// Error about the header as a whole.
    pub fn header(
        code: ErrorCode,
        note: impl Into<String>,
        labels: &[String],
        row_positions: &[usize],
    ) -> Self {
        let note = note.into();
        let message = format!("{} in the header: {}", code.title(), note);
        let context = ErrorContext::Header {
            labels: labels.to_vec(),
            row_positions: row_positions.to_vec(),
        };
        Self::build(code, note, message, context)
    }

    /// Error about one header label.
    pub fn label(
        code: ErrorCode,
        note: impl Into<String>,
        labels: &[String],
        row_positions: &[usize],
        label: impl Into<String>,
        field: FieldLocation,
    ) -> Self {
        let note = note.into();
        let message = format!(
            "{} in label at position \"{}\": {}",
            code.title(),
            field.field_number,
            note
        );
        let context = ErrorContext::Label {
            labels: labels.to_vec(),
            row_positions: row_positions.to_vec(),
            label: label.into(),
            field_name: field.field_name,
            field_number: field.field_number,
            field_position: field.field_position,
        };
        Self::build(code, note, message, context)
    }

    /// Row-level error.
    pub fn row(code: ErrorCode, note: impl Into<String>, row: RowLocation) -> Self {
        let note = note.into();
        let message = format!(
            "{} in row \"{}\" at position \"{}\": {}",
            code.title(),
            row.row_number,
            row.row_position,
            note
        );
        let context = ErrorContext::Row {
            cells: row.cells,
            row_number: row.row_number,
            row_position: row.row_position,
        };
        Self::build(code, note, message, context)
    }

    /// Cell-level error.
    pub fn cell(
        code: ErrorCode,
        note: impl Into<String>,
        row: RowLocation,
        cell: impl Into<String>,
        field: FieldLocation,
    ) -> Self {
        let note = note.into();
        let cell = cell.into();
        let message = format!(
            "{} in the cell \"{}\" in row \"{}\" and field \"{}\" at position \"{}\": {}",
            code.title(),
            cell,
            row.row_number,
            field.field_name,
            field.field_number,
            note
        );
        let context = ErrorContext::Cell {
            cells: row.cells,
            row_number: row.row_number,
            row_position: row.row_position,
            cell,
            field_name: field.field_name,
            field_number: field.field_number,
            field_position: field.field_position,
        };
        Self::build(code, note, message, context)
    }

    /// The error's kind.
    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// Row number, when the error is row- or cell-scoped.
    pub fn row_number(&self) -> Option<usize> {
        match &self.context {
            ErrorContext::Row { row_number, .. } | ErrorContext::Cell { row_number, .. } => {
                Some(*row_number)
            }
            _ => None,
        }
    }

    /// Row position, when the error is row- or cell-scoped.
    pub fn row_position(&self) -> Option<usize> {
        match &self.context {
            ErrorContext::Row { row_position, .. } | ErrorContext::Cell { row_position, .. } => {
                Some(*row_position)
            }
            _ => None,
        }
    }

    /// Field name, when the error is label- or cell-scoped.
    pub fn field_name(&self) -> Option<&str> {
        match &self.context {
            ErrorContext::Label { field_name, .. } | ErrorContext::Cell { field_name, .. } => {
                Some(field_name.as_str())
            }
            _ => None,
        }
    }

    /// Field number, when the error is label- or cell-scoped.
    pub fn field_number(&self) -> Option<usize> {
        match &self.context {
            ErrorContext::Label { field_number, .. } | ErrorContext::Cell { field_number, .. } => {
                Some(*field_number)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> RowLocation {
        RowLocation {
            cells: vec!["x".to_string(), "b".to_string()],
            row_number: 2,
            row_position: 3,
        }
    }

    #[test]
    fn test_cell_error_carries_positions() {
        let err = ReportError::cell(
            ErrorCode::TypeError,
            "type is \"integer/default\"",
            location(),
            "x",
            FieldLocation {
                field_name: "id".to_string(),
                field_number: 1,
                field_position: 1,
            },
        );

        assert_eq!(err.kind(), ErrorKind::Cell);
        assert_eq!(err.row_number(), Some(2));
        assert_eq!(err.row_position(), Some(3));
        assert_eq!(err.field_name(), Some("id"));
        assert!(err.message.contains("row \"2\""));
    }

    #[test]
    fn test_serialized_shape_is_flat() {
        let err = ReportError::row(ErrorCode::BlankRow, "row is completely blank", location());
        let json = serde_json::to_value(&err).unwrap();

        assert_eq!(json["code"], "blank-row");
        assert_eq!(json["rowNumber"], 2);
        assert_eq!(json["rowPosition"], 3);
        assert_eq!(json["tags"][1], "#row");
    }

    #[test]
    fn test_selector_matching() {
        assert!(ErrorCode::TypeError.matches("type-error"));
        assert!(ErrorCode::TypeError.matches("#cell"));
        assert!(!ErrorCode::BlankHeader.matches("#row"));
        assert_eq!(ErrorCode::ChecksumError.kind(), ErrorKind::Table);
    }
}
