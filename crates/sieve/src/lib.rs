//! Sieve: describe, infer and validate tabular data.
//!
//! A [`Resource`] names a source of rows (a file, a byte buffer, inline JSON)
//! together with optional dialect, layout and schema. Opening it yields a
//! [`Table`]: the header is detected from a sample, a [`Schema`] is inferred
//! unless one is supplied, and rows are streamed and cast lazily.
//! [`ValidationEngine`] runs a set of [`Check`]s over the table and gathers
//! every problem into a [`Report`].
//!
//! # Core Principles
//!
//! - **Streaming**: rows are pulled one at a time; only a bounded sample is buffered
//! - **Data, not panics**: per-row and per-cell problems are report entries
//! - **Pluggable**: loaders, parsers and checks come from an explicit [`Registry`]
//!
//! # Example
//!
//! ```no_run
//! use sieve::{Resource, ValidateOptions, ValidationEngine};
//!
//! let resource = Resource::from_path("table.csv");
//! let report = ValidationEngine::new()
//!     .validate(&resource, &ValidateOptions::default())
//!     .unwrap();
//!
//! println!("valid: {}", report.valid);
//! for error in &report.tasks[0].errors {
//!     println!("{}: {}", error.code.as_str(), error.note);
//! }
//! ```

pub mod checks;
pub mod error;
pub mod inference;
pub mod input;
pub mod registry;
pub mod report;
pub mod schema;
pub mod table;
pub mod types;

mod validator;

pub use checks::Check;
pub use error::{Result, SieveError};
pub use inference::Detector;
pub use input::{Dialect, ExpectedStats, Layout, Resource, Source};
pub use registry::Registry;
pub use report::{ErrorCode, Report, ReportError, ReportTask};
pub use schema::{Constraints, Field, Schema};
pub use table::{Header, Row, Table};
pub use types::{FieldType, Value};
pub use validator::{OnError, ValidateOptions, ValidationEngine};

/// Validate one resource with the built-in registry.
pub fn validate(resource: &Resource, options: &ValidateOptions) -> Result<Report> {
    ValidationEngine::new().validate(resource, options)
}

/// Infer encoding, dialect, layout and schema for a resource.
pub fn describe(resource: &Resource) -> Result<Resource> {
    resource.describe(&Registry::default())
}
