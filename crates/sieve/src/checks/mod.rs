//! Checks: pluggable validation steps run over an open table.
//!
//! A check is connected to exactly one resource and may accumulate state
//! across rows. The orchestrator calls the hooks in lifecycle order:
//! `connect`, `prepare`, `validate_check`, `validate_source`,
//! `validate_schema`, `validate_header`, `validate_row` for each row, and
//! finally `validate_table`. Every hook defaults to doing nothing.

mod baseline;
mod cell;
mod formula;
mod row;

pub use baseline::{Baseline, Checksum};
pub use cell::{Average, DeviatedValue, DeviatedValueOptions, ForbiddenValue, ForbiddenValueOptions, SequentialValue, SequentialValueOptions, TruncatedValue};
pub use formula::Formula;
pub use row::{DuplicateRow, RowConstraint, RowConstraintOptions};

use crate::input::Resource;
use crate::report::{ErrorCode, ReportError, TaskStats};
use crate::schema::{Field, Schema};
use crate::table::{Header, Row};
use crate::types::FieldType;

/// A validation step with per-resource lifecycle hooks.
pub trait Check: Send {
    /// Registry code, e.g. `"duplicate-row"`.
    fn code(&self) -> &'static str;

    /// Error codes this check can report.
    fn scope(&self) -> Vec<ErrorCode>;

    /// Bind to the opened resource; its schema and layout are resolved.
    fn connect(&mut self, _resource: &Resource) {}

    fn prepare(&mut self) {}

    /// Problems with the check's own configuration. Any error disables the check.
    fn validate_check(&mut self) -> Vec<ReportError> {
        Vec::new()
    }

    fn validate_source(&mut self) -> Vec<ReportError> {
        Vec::new()
    }

    fn validate_schema(&mut self, _schema: &Schema) -> Vec<ReportError> {
        Vec::new()
    }

    fn validate_header(&mut self, _header: &Header) -> Vec<ReportError> {
        Vec::new()
    }

    fn validate_row(&mut self, _row: &Row) -> Vec<ReportError> {
        Vec::new()
    }

    fn validate_table(&mut self, _stats: &TaskStats) -> Vec<ReportError> {
        Vec::new()
    }

    /// Approximate bytes held in accumulated state.
    fn memory_usage(&self) -> usize {
        0
    }
}

/// Resolve a configured field, or explain why the check cannot run.
pub(crate) fn resolve_field<'a>(
    code: &str,
    schema: Option<&'a Schema>,
    name: &str,
    types: &[FieldType],
) -> Result<(usize, &'a Field), ReportError> {
    let found = schema.and_then(|s| s.field_position(name).map(|i| (i, &s.fields[i])));
    match found {
        None => Err(ReportError::general(
            ErrorCode::CheckError,
            format!("check \"{}\" requires field \"{}\" to exist", code, name),
        )),
        Some((_, field)) if !types.is_empty() && !types.contains(&field.field_type) => {
            let expected: Vec<&str> = types.iter().map(FieldType::as_str).collect();
            Err(ReportError::general(
                ErrorCode::CheckError,
                format!(
                    "check \"{}\" requires field \"{}\" to be of type {}",
                    code,
                    name,
                    expected.join(" or ")
                ),
            ))
        }
        Some(found) => Ok(found),
    }
}
