//! Report model: structured errors and validation outcomes.

mod error;
#[allow(clippy::module_inception)]
mod report;

pub use error::{ErrorCode, ErrorContext, ErrorKind, FieldLocation, ReportError, RowLocation};
pub use report::{Report, ReportStats, ReportTask, ResourceSummary, TaskStats};
