//! Baseline and checksum checks.

use crate::input::{ExpectedStats, Resource};
use crate::report::{ErrorCode, ReportError, TaskStats};
use crate::table::{Header, Row};

use super::Check;

/// Reports the header and row errors found while reading, plus `blank-table`.
#[derive(Debug, Default)]
pub struct Baseline {
    labels: usize,
}

impl Check for Baseline {
    fn code(&self) -> &'static str {
        "baseline"
    }

    fn scope(&self) -> Vec<ErrorCode> {
        vec![
            ErrorCode::SourceError,
            ErrorCode::FormatError,
            ErrorCode::EncodingError,
            ErrorCode::BlankTable,
            ErrorCode::BlankHeader,
            ErrorCode::ExtraLabel,
            ErrorCode::MissingLabel,
            ErrorCode::BlankLabel,
            ErrorCode::DuplicateLabel,
            ErrorCode::IncorrectLabel,
            ErrorCode::BlankRow,
            ErrorCode::PrimaryKeyError,
            ErrorCode::ExtraCell,
            ErrorCode::MissingCell,
            ErrorCode::TypeError,
            ErrorCode::ConstraintError,
            ErrorCode::UniqueError,
        ]
    }

    fn validate_header(&mut self, header: &Header) -> Vec<ReportError> {
        self.labels = header.labels().len();
        header.errors().to_vec()
    }

    fn validate_row(&mut self, row: &Row) -> Vec<ReportError> {
        row.errors().to_vec()
    }

    fn validate_table(&mut self, stats: &TaskStats) -> Vec<ReportError> {
        if self.labels == 0 && stats.rows == 0 {
            return vec![ReportError::table(
                ErrorCode::BlankTable,
                "the table has no labels and no rows",
            )];
        }
        Vec::new()
    }
}

/// Compares the declared `stats` of a resource with what was read.
#[derive(Debug, Default)]
pub struct Checksum {
    expected: ExpectedStats,
}

impl Checksum {
    fn mismatch(stat: &str, expected: &str, actual: Option<String>) -> ReportError {
        let actual = actual.unwrap_or_else(|| "unknown".to_string());
        ReportError::table(
            ErrorCode::ChecksumError,
            format!("expected {} is \"{}\" and actual is \"{}\"", stat, expected, actual),
        )
    }
}

impl Check for Checksum {
    fn code(&self) -> &'static str {
        "checksum"
    }

    fn scope(&self) -> Vec<ErrorCode> {
        vec![ErrorCode::ChecksumError]
    }

    fn connect(&mut self, resource: &Resource) {
        self.expected = resource.stats.clone();
    }

    fn validate_table(&mut self, stats: &TaskStats) -> Vec<ReportError> {
        let mut errors = Vec::new();
        if let Some(hash) = &self.expected.hash {
            let expected = hash.strip_prefix("sha256:").unwrap_or(hash);
            let matches = stats
                .hash
                .as_deref()
                .is_some_and(|actual| actual.eq_ignore_ascii_case(expected));
            if !matches {
                errors.push(Self::mismatch("hash", expected, stats.hash.clone()));
            }
        }
        if let Some(bytes) = self.expected.bytes {
            if stats.bytes != Some(bytes) {
                let actual = stats.bytes.map(|b| b.to_string());
                errors.push(Self::mismatch("bytes", &bytes.to_string(), actual));
            }
        }
        if let Some(fields) = self.expected.fields {
            if stats.fields != fields {
                errors.push(Self::mismatch("fields", &fields.to_string(), Some(stats.fields.to_string())));
            }
        }
        if let Some(rows) = self.expected.rows {
            if stats.rows != rows {
                errors.push(Self::mismatch("rows", &rows.to_string(), Some(stats.rows.to_string())));
            }
        }
        errors
    }
}
