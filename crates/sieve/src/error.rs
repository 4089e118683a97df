//! Error types for the Sieve library.
//!
//! Per-row and per-cell problems never travel through this type: they are
//! data, recorded on [`crate::table::Row`] and in the [`crate::report::Report`].
//! `SieveError` is reserved for failures that stop a resource from being
//! opened or read at all.

use std::path::PathBuf;
use thiserror::Error;

use crate::report::{ErrorCode, ReportError};

/// Main error type for Sieve operations.
#[derive(Debug, Error)]
pub enum SieveError {
    /// Error reading or accessing a file.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error from the CSV library.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Regex compilation error.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A failure described by exactly one structured report error.
    #[error("{}", .0.message)]
    Report(Box<ReportError>),
}

impl SieveError {
    /// Create a failure from an error code and a note.
    pub fn new(code: ErrorCode, note: impl Into<String>) -> Self {
        SieveError::Report(Box::new(ReportError::general(code, note)))
    }

    /// The error code this failure maps to in a report.
    pub fn code(&self) -> ErrorCode {
        match self {
            SieveError::Io { .. } => ErrorCode::SchemeError,
            SieveError::Csv(_) => ErrorCode::FormatError,
            SieveError::Json(_) => ErrorCode::FormatError,
            SieveError::Regex(_) => ErrorCode::SchemaError,
            SieveError::Report(error) => error.code,
        }
    }

    /// Convert into the single report error this failure wraps.
    pub fn into_report_error(self) -> ReportError {
        match self {
            SieveError::Report(error) => *error,
            other => ReportError::general(other.code(), other.to_string()),
        }
    }
}

impl From<ReportError> for SieveError {
    fn from(error: ReportError) -> Self {
        SieveError::Report(Box::new(error))
    }
}

/// Result type alias for Sieve operations.
pub type Result<T> = std::result::Result<T, SieveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_variant_keeps_code() {
        let err = SieveError::new(ErrorCode::SchemaError, "duplicate field name \"id\"");
        assert_eq!(err.code(), ErrorCode::SchemaError);
        let report_error = err.into_report_error();
        assert_eq!(report_error.note, "duplicate field name \"id\"");
    }

    #[test]
    fn test_io_folds_into_scheme_error() {
        let err = SieveError::Io {
            path: PathBuf::from("missing.csv"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        let report_error = err.into_report_error();
        assert_eq!(report_error.code, ErrorCode::SchemeError);
        assert!(report_error.note.contains("missing.csv"));
    }
}
