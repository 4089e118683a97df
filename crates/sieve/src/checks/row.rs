//! Row-level checks.

use std::collections::HashMap;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::input::Resource;
use crate::report::{ErrorCode, ReportError};
use crate::schema::Schema;
use crate::table::Row;

use super::Check;
use super::formula::Formula;

/// Reports rows whose cells repeat an earlier row.
#[derive(Debug, Default)]
pub struct DuplicateRow {
    seen: HashMap<[u8; 32], usize>,
}

impl Check for DuplicateRow {
    fn code(&self) -> &'static str {
        "duplicate-row"
    }

    fn scope(&self) -> Vec<ErrorCode> {
        vec![ErrorCode::DuplicateRow]
    }

    fn validate_row(&mut self, row: &Row) -> Vec<ReportError> {
        let mut hasher = Sha256::new();
        for cell in row.cells() {
            hasher.update(cell.len().to_le_bytes());
            hasher.update(cell.as_bytes());
        }
        let digest: [u8; 32] = hasher.finalize().into();
        match self.seen.get(&digest) {
            Some(first) => vec![ReportError::row(
                ErrorCode::DuplicateRow,
                format!("the same as row at position \"{}\"", first),
                row.location(),
            )],
            None => {
                self.seen.insert(digest, row.row_position());
                Vec::new()
            }
        }
    }

    fn memory_usage(&self) -> usize {
        self.seen.len() * (32 + 2 * std::mem::size_of::<usize>())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RowConstraintOptions {
    pub formula: String,
}

/// Requires each row to satisfy a boolean formula over its fields.
#[derive(Debug)]
pub struct RowConstraint {
    options: RowConstraintOptions,
    schema: Option<Schema>,
    formula: Option<Formula>,
}

impl RowConstraint {
    pub fn new(options: RowConstraintOptions) -> Self {
        Self {
            options,
            schema: None,
            formula: None,
        }
    }

    fn check_error(&self, reason: String) -> ReportError {
        ReportError::general(
            ErrorCode::CheckError,
            format!("row constraint \"{}\" is invalid: {}", self.options.formula, reason),
        )
    }
}

impl Check for RowConstraint {
    fn code(&self) -> &'static str {
        "row-constraint"
    }

    fn scope(&self) -> Vec<ErrorCode> {
        vec![ErrorCode::RowConstraint]
    }

    fn connect(&mut self, resource: &Resource) {
        self.schema = resource.schema.clone();
    }

    fn validate_check(&mut self) -> Vec<ReportError> {
        let formula = match Formula::parse(&self.options.formula) {
            Ok(formula) => formula,
            Err(reason) => return vec![self.check_error(reason)],
        };
        let unknown: Vec<String> = formula
            .fields()
            .into_iter()
            .filter(|name| !self.schema.as_ref().is_some_and(|s| s.has_field(name)))
            .collect();
        if !unknown.is_empty() {
            return vec![self.check_error(format!("unknown fields \"{}\"", unknown.join(", ")))];
        }
        self.formula = Some(formula);
        Vec::new()
    }

    fn validate_row(&mut self, row: &Row) -> Vec<ReportError> {
        let Some(formula) = &self.formula else {
            return Vec::new();
        };
        if formula.evaluate(row) == Ok(true) {
            return Vec::new();
        }
        vec![ReportError::row(
            ErrorCode::RowConstraint,
            format!("the row constraint to conform is \"{}\"", formula),
            row.location(),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;
    use crate::types::FieldType;
    use std::sync::Arc;

    fn schema() -> Schema {
        Schema::with_fields(vec![
            Field::new("low", FieldType::Integer),
            Field::new("high", FieldType::Integer),
        ])
    }

    fn row(position: usize, cells: &[&str]) -> Row {
        let schema = schema();
        let names: Arc<[String]> = schema.field_names().iter().map(|n| n.to_string()).collect();
        Row::new(
            &schema,
            names,
            Arc::from(vec![1, 2]),
            cells.iter().map(|c| c.to_string()).collect(),
            position,
            position - 1,
        )
    }

    fn constraint(formula: &str) -> RowConstraint {
        let mut check = RowConstraint::new(RowConstraintOptions { formula: formula.into() });
        check.connect(&Resource::from_inline(Vec::new()).with_schema(schema()));
        check
    }

    #[test]
    fn test_duplicate_row_references_first_occurrence() {
        let mut check = DuplicateRow::default();
        assert!(check.validate_row(&row(2, &["1", "2"])).is_empty());
        assert!(check.validate_row(&row(3, &["1", "3"])).is_empty());
        let errors = check.validate_row(&row(4, &["1", "2"]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].note, "the same as row at position \"2\"");
        assert!(check.memory_usage() > 0);
    }

    #[test]
    fn test_row_constraint() {
        let mut check = constraint("low <= high");
        assert!(check.validate_check().is_empty());
        assert!(check.validate_row(&row(2, &["1", "2"])).is_empty());
        let errors = check.validate_row(&row(3, &["3", "2"]));
        assert_eq!(errors[0].code, ErrorCode::RowConstraint);
        // A failing evaluation counts as a violation.
        assert_eq!(check.validate_row(&row(4, &["", "2"])).len(), 1);
    }

    #[test]
    fn test_row_constraint_check_errors() {
        assert_eq!(constraint("low <=").validate_check()[0].code, ErrorCode::CheckError);
        let mut unknown = constraint("middle > 1");
        assert_eq!(unknown.validate_check()[0].code, ErrorCode::CheckError);
        assert!(unknown.validate_row(&row(2, &["1", "2"])).is_empty());
    }
}
