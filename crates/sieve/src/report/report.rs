//! Validation reports: one task per validated resource.

use serde::Serialize;
use serde_json::Value as JsonValue;

use super::error::{ErrorCode, ReportError};

/// Identifies the resource a task validated.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub scheme: String,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// Counters recorded for a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskStats {
    pub errors: usize,
    /// Rows produced by the row stream.
    pub rows: usize,
    /// Fields in the resolved schema.
    pub fields: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Outcome of validating one resource.
#[derive(Debug, Clone, Serialize)]
pub struct ReportTask {
    pub resource: ResourceSummary,
    /// Elapsed seconds.
    pub time: f64,
    pub valid: bool,
    /// Error codes the active checks could report.
    pub scope: Vec<ErrorCode>,
    /// True when the task stopped early on a limit.
    pub partial: bool,
    pub stats: TaskStats,
    pub errors: Vec<ReportError>,
}

impl ReportTask {
    /// Assemble a task; validity and the error count derive from `errors`.
    pub fn new(
        resource: ResourceSummary,
        time: f64,
        scope: Vec<ErrorCode>,
        partial: bool,
        mut stats: TaskStats,
        errors: Vec<ReportError>,
    ) -> Self {
        stats.errors = errors.len();
        Self {
            resource,
            time,
            valid: errors.is_empty(),
            scope,
            partial,
            stats,
            errors,
        }
    }

    /// A task that failed before any row was read.
    pub fn from_error(resource: ResourceSummary, time: f64, error: ReportError) -> Self {
        let scope = vec![error.code];
        Self::new(resource, time, scope, false, TaskStats::default(), vec![error])
    }

    /// Codes of the collected errors, in report order.
    pub fn error_codes(&self) -> Vec<ErrorCode> {
        self.errors.iter().map(|e| e.code).collect()
    }

    /// Project errors to tuples of the named properties.
    pub fn flatten(&self, spec: &[&str]) -> Vec<Vec<JsonValue>> {
        flatten_errors(&self.errors, None, spec)
    }
}

/// Counters recorded for a whole report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportStats {
    pub errors: usize,
    pub tasks: usize,
}

/// Immutable outcome of a validation run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Elapsed seconds.
    pub time: f64,
    /// True when no task and no report-level error exists.
    pub valid: bool,
    pub stats: ReportStats,
    /// Errors not tied to a single task.
    pub errors: Vec<ReportError>,
    pub tasks: Vec<ReportTask>,
}

impl Report {
    /// Assemble a report from finished tasks.
    pub fn from_tasks(time: f64, errors: Vec<ReportError>, tasks: Vec<ReportTask>) -> Self {
        let task_errors: usize = tasks.iter().map(|t| t.stats.errors).sum();
        let valid = errors.is_empty() && tasks.iter().all(|t| t.valid);
        Self {
            time,
            valid,
            stats: ReportStats {
                errors: errors.len() + task_errors,
                tasks: tasks.len(),
            },
            errors,
            tasks,
        }
    }

    /// The task of a single-resource report.
    pub fn task(&self) -> Option<&ReportTask> {
        match self.tasks.as_slice() {
            [task] => Some(task),
            _ => None,
        }
    }

    /// Project all errors to tuples of the named properties.
    ///
    /// Besides any serialized error property (`code`, `rowNumber`,
    /// `fieldName`, ...), `taskNumber`/`taskPosition` name the 1-based task.
    pub fn flatten(&self, spec: &[&str]) -> Vec<Vec<JsonValue>> {
        let mut result = flatten_errors(&self.errors, None, spec);
        for (index, task) in self.tasks.iter().enumerate() {
            result.extend(flatten_errors(&task.errors, Some(index + 1), spec));
        }
        result
    }

    /// Pretty JSON rendering.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn flatten_errors(
    errors: &[ReportError],
    task_number: Option<usize>,
    spec: &[&str],
) -> Vec<Vec<JsonValue>> {
    errors
        .iter()
        .map(|error| {
            let json = serde_json::to_value(error).unwrap_or(JsonValue::Null);
            spec.iter()
                .map(|key| match *key {
                    "taskNumber" | "taskPosition" => {
                        task_number.map(JsonValue::from).unwrap_or(JsonValue::Null)
                    }
                    other => json.get(other).cloned().unwrap_or(JsonValue::Null),
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{FieldLocation, RowLocation};
    use serde_json::json;

    fn type_error(row_number: usize) -> ReportError {
        ReportError::cell(
            ErrorCode::TypeError,
            "type is \"integer/default\"",
            RowLocation {
                cells: vec!["x".into()],
                row_number,
                row_position: row_number + 1,
            },
            "x",
            FieldLocation {
                field_name: "id".into(),
                field_number: 1,
                field_position: 1,
            },
        )
    }

    #[test]
    fn test_task_validity_follows_errors() {
        let task = ReportTask::new(
            ResourceSummary::default(),
            0.0,
            vec![ErrorCode::TypeError],
            false,
            TaskStats::default(),
            vec![type_error(2)],
        );
        assert!(!task.valid);
        assert_eq!(task.stats.errors, 1);

        let report = Report::from_tasks(0.0, Vec::new(), vec![task]);
        assert!(!report.valid);
        assert_eq!(report.stats.errors, 1);
        assert_eq!(report.stats.tasks, 1);
    }

    #[test]
    fn test_flatten_projects_fields() {
        let task = ReportTask::new(
            ResourceSummary::default(),
            0.0,
            Vec::new(),
            false,
            TaskStats::default(),
            vec![type_error(2)],
        );
        let report = Report::from_tasks(0.0, Vec::new(), vec![task]);

        let rows = report.flatten(&["taskNumber", "rowNumber", "fieldNumber", "code"]);
        assert_eq!(rows, vec![vec![json!(1), json!(2), json!(1), json!("type-error")]]);
    }

    #[test]
    fn test_empty_report_is_valid() {
        let report = Report::from_tasks(0.0, Vec::new(), Vec::new());
        assert!(report.valid);
        assert!(report.task().is_none());
    }
}
