//! Factories for loaders, parsers and checks.
//!
//! A registry is built by the caller and passed down explicitly; there is
//! no process-wide registration. Factories are `Send + Sync` so one registry
//! can serve parallel validation workers.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::checks::{
    Baseline, Check, Checksum, DeviatedValue, DuplicateRow, ForbiddenValue, RowConstraint,
    SequentialValue, TruncatedValue,
};
use crate::error::{Result, SieveError};
use crate::input::{BufferLoader, CsvParser, FileLoader, InlineParser, Loader, Parser};
use crate::report::ErrorCode;

pub type LoaderFactory = Arc<dyn Fn() -> Box<dyn Loader> + Send + Sync>;
pub type ParserFactory = Arc<dyn Fn() -> Box<dyn Parser> + Send + Sync>;
/// Builds a check from its descriptor (`{"code": ..., options...}`).
pub type CheckFactory = Arc<dyn Fn(&JsonValue) -> Result<Box<dyn Check>> + Send + Sync>;

/// Loader factories by scheme, parser factories by format, check factories by code.
#[derive(Clone)]
pub struct Registry {
    loaders: IndexMap<String, LoaderFactory>,
    parsers: IndexMap<String, ParserFactory>,
    checks: IndexMap<String, CheckFactory>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("loaders", &self.loaders.keys().collect::<Vec<_>>())
            .field("parsers", &self.parsers.keys().collect::<Vec<_>>())
            .field("checks", &self.checks.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Deserialize a check's options from its descriptor.
fn options<T: serde::de::DeserializeOwned>(code: &str, descriptor: &JsonValue) -> Result<T> {
    serde_json::from_value(descriptor.clone()).map_err(|e| {
        SieveError::new(
            ErrorCode::CheckError,
            format!("check \"{}\" has invalid options: {}", code, e),
        )
    })
}

impl Registry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            loaders: IndexMap::new(),
            parsers: IndexMap::new(),
            checks: IndexMap::new(),
        }
    }

    pub fn register_loader(
        &mut self,
        scheme: impl Into<String>,
        factory: impl Fn() -> Box<dyn Loader> + Send + Sync + 'static,
    ) -> &mut Self {
        self.loaders.insert(scheme.into(), Arc::new(factory));
        self
    }

    pub fn register_parser(
        &mut self,
        format: impl Into<String>,
        factory: impl Fn() -> Box<dyn Parser> + Send + Sync + 'static,
    ) -> &mut Self {
        self.parsers.insert(format.into(), Arc::new(factory));
        self
    }

    pub fn register_check(
        &mut self,
        code: impl Into<String>,
        factory: impl Fn(&JsonValue) -> Result<Box<dyn Check>> + Send + Sync + 'static,
    ) -> &mut Self {
        self.checks.insert(code.into(), Arc::new(factory));
        self
    }

    pub fn create_loader(&self, scheme: &str) -> Result<Box<dyn Loader>> {
        let factory = self.loaders.get(scheme).ok_or_else(|| {
            SieveError::new(
                ErrorCode::SchemeError,
                format!("scheme \"{}\" is not supported", scheme),
            )
        })?;
        Ok(factory())
    }

    pub fn create_parser(&self, format: &str) -> Result<Box<dyn Parser>> {
        let factory = self.parsers.get(format).ok_or_else(|| {
            SieveError::new(
                ErrorCode::FormatError,
                format!("format \"{}\" is not supported", format),
            )
        })?;
        Ok(factory())
    }

    /// Build a check from a descriptor such as `{"code": "duplicate-row"}`.
    pub fn create_check(&self, descriptor: &JsonValue) -> Result<Box<dyn Check>> {
        let code = descriptor
            .get("code")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| SieveError::new(ErrorCode::CheckError, "check descriptor has no \"code\""))?;
        let factory = self.checks.get(code).ok_or_else(|| {
            SieveError::new(
                ErrorCode::CheckError,
                format!("check \"{}\" is not supported", code),
            )
        })?;
        factory(descriptor)
    }

    pub fn schemes(&self) -> Vec<&str> {
        self.loaders.keys().map(String::as_str).collect()
    }

    pub fn formats(&self) -> Vec<&str> {
        self.parsers.keys().map(String::as_str).collect()
    }

    pub fn check_codes(&self) -> Vec<&str> {
        self.checks.keys().map(String::as_str).collect()
    }
}

impl Default for Registry {
    /// The built-in loaders, parsers and checks.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register_loader("file", || Box::new(FileLoader::default()))
            .register_loader("buffer", || Box::new(BufferLoader::default()));
        registry
            .register_parser("csv", || Box::new(CsvParser::new()))
            .register_parser("tsv", || Box::new(CsvParser::new()))
            .register_parser("inline", || Box::new(InlineParser::new()));
        registry
            .register_check("baseline", |_| Ok(Box::new(Baseline::default())))
            .register_check("checksum", |_| Ok(Box::new(Checksum::default())))
            .register_check("deviated-value", |d| {
                Ok(Box::new(DeviatedValue::new(options("deviated-value", d)?)))
            })
            .register_check("duplicate-row", |_| Ok(Box::new(DuplicateRow::default())))
            .register_check("forbidden-value", |d| {
                Ok(Box::new(ForbiddenValue::new(options("forbidden-value", d)?)))
            })
            .register_check("row-constraint", |d| {
                Ok(Box::new(RowConstraint::new(options("row-constraint", d)?)))
            })
            .register_check("sequential-value", |d| {
                Ok(Box::new(SequentialValue::new(options("sequential-value", d)?)))
            })
            .register_check("truncated-value", |_| Ok(Box::new(TruncatedValue::default())));
        registry
    }
}
