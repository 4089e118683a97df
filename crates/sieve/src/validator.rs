//! Validation orchestration: open, check, and report.

use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};

use crate::checks::{Baseline, Check, Checksum};
use crate::error::{Result, SieveError};
use crate::input::Resource;
use crate::registry::Registry;
use crate::report::{ErrorCode, Report, ReportError, ReportTask, TaskStats};
use crate::table::Table;

/// Rows between two memory checks.
const MEMORY_CHECK_INTERVAL: usize = 100;

/// What to do when the source fails mid-stream or cannot be opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Record the failure as a task error.
    #[default]
    Ignore,
    /// Record it and log a warning.
    Warn,
    /// Return it as `Err`.
    Raise,
}

fn default_limit_memory() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

/// Validation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateOptions {
    /// Check descriptors, e.g. `{"code": "duplicate-row"}`.
    #[serde(default)]
    pub checks: Vec<JsonValue>,
    /// Keep only errors matching one of these codes or `#tags`.
    #[serde(default)]
    pub pick_errors: Vec<String>,
    /// Drop errors matching one of these codes or `#tags`.
    #[serde(default)]
    pub skip_errors: Vec<String>,
    #[serde(default)]
    pub limit_errors: Option<usize>,
    /// Megabytes of row-stream memos and check state allowed per task.
    #[serde(default = "default_limit_memory")]
    pub limit_memory: usize,
    #[serde(default)]
    pub onerror: OnError,
    /// Validate several resources on the rayon pool.
    #[serde(default)]
    pub parallel: bool,
    /// Infer layout and schema; otherwise explicit settings are used as-is.
    #[serde(default = "default_true")]
    pub detect: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            checks: Vec::new(),
            pick_errors: Vec::new(),
            skip_errors: Vec::new(),
            limit_errors: None,
            limit_memory: default_limit_memory(),
            onerror: OnError::default(),
            parallel: false,
            detect: true,
        }
    }
}

impl ValidateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_check(mut self, descriptor: JsonValue) -> Self {
        self.checks.push(descriptor);
        self
    }

    pub fn with_pick_errors(mut self, selectors: Vec<String>) -> Self {
        self.pick_errors = selectors;
        self
    }

    pub fn with_skip_errors(mut self, selectors: Vec<String>) -> Self {
        self.skip_errors = selectors;
        self
    }

    pub fn with_limit_errors(mut self, limit: usize) -> Self {
        self.limit_errors = Some(limit);
        self
    }

    pub fn with_limit_memory(mut self, megabytes: usize) -> Self {
        self.limit_memory = megabytes;
        self
    }

    pub fn with_onerror(mut self, onerror: OnError) -> Self {
        self.onerror = onerror;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_detect(mut self, detect: bool) -> Self {
        self.detect = detect;
        self
    }

    /// Whether pick/skip filtering keeps this error.
    fn keeps(&self, error: &ReportError) -> bool {
        let picked = self.pick_errors.is_empty()
            || self.pick_errors.iter().any(|s| error.code.matches(s));
        picked && !self.skip_errors.iter().any(|s| error.code.matches(s))
    }
}

/// Collects filtered errors up to `limit_errors`; a limit of 0 collects all.
struct Collector<'a> {
    options: &'a ValidateOptions,
    limit: Option<usize>,
    errors: Vec<ReportError>,
    full: bool,
}

impl<'a> Collector<'a> {
    fn new(options: &'a ValidateOptions) -> Self {
        Self {
            options,
            limit: options.limit_errors.filter(|&limit| limit > 0),
            errors: Vec::new(),
            full: false,
        }
    }

    fn extend(&mut self, errors: impl IntoIterator<Item = ReportError>) {
        for error in errors {
            if self.full {
                return;
            }
            if self.options.keeps(&error) {
                self.errors.push(error);
                self.full = self.limit.is_some_and(|limit| self.errors.len() >= limit);
            }
        }
    }
}

/// Descriptor problems that prevent reading a resource.
fn metadata_errors(resource: &Resource) -> Vec<ReportError> {
    let mut errors: Vec<ReportError> = resource
        .dialect
        .metadata_errors()
        .into_iter()
        .map(|note| ReportError::general(ErrorCode::DialectError, note))
        .collect();
    if let Some(layout) = &resource.layout {
        errors.extend(layout.metadata_errors());
    }
    if let Some(schema) = &resource.schema {
        errors.extend(schema.metadata_errors());
    }
    errors
}

fn codes_of(errors: &[ReportError]) -> Vec<ErrorCode> {
    let mut codes = Vec::new();
    for error in errors {
        if !codes.contains(&error.code) {
            codes.push(error.code);
        }
    }
    codes
}

/// Drives detection, reading and checks, and assembles reports.
#[derive(Debug, Clone, Default)]
pub struct ValidationEngine {
    registry: Registry,
}

impl ValidationEngine {
    /// An engine over the built-in registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Validate one resource.
    pub fn validate(&self, resource: &Resource, options: &ValidateOptions) -> Result<Report> {
        self.validate_with_checks(resource, options, Vec::new())
    }

    /// Validate one resource, running `checks` after the configured ones.
    pub fn validate_with_checks(
        &self,
        resource: &Resource,
        options: &ValidateOptions,
        checks: Vec<Box<dyn Check>>,
    ) -> Result<Report> {
        let started = Instant::now();
        let task = self.validate_resource(resource, options, checks)?;
        Ok(Report::from_tasks(started.elapsed().as_secs_f64(), Vec::new(), vec![task]))
    }

    /// Validate several resources; tasks keep the order of `resources`.
    pub fn validate_many(&self, resources: &[Resource], options: &ValidateOptions) -> Result<Report> {
        let started = Instant::now();
        let tasks: Vec<Result<ReportTask>> = if options.parallel {
            resources
                .par_iter()
                .map(|resource| self.validate_resource(resource, options, Vec::new()))
                .collect()
        } else {
            resources
                .iter()
                .map(|resource| self.validate_resource(resource, options, Vec::new()))
                .collect()
        };
        let tasks = tasks.into_iter().collect::<Result<Vec<_>>>()?;
        Ok(Report::from_tasks(started.elapsed().as_secs_f64(), Vec::new(), tasks))
    }

    /// Apply the `onerror` policy to a failure that ends the task's reading.
    fn fold(&self, options: &ValidateOptions, resource: &Resource, error: SieveError) -> Result<ReportError> {
        match options.onerror {
            OnError::Raise => Err(error),
            OnError::Warn => {
                warn!(resource = %resource.name, error = %error, "validation failure");
                Ok(error.into_report_error())
            }
            OnError::Ignore => Ok(error.into_report_error()),
        }
    }

    /// Validate one resource into a task.
    #[instrument(skip_all, fields(resource = %resource.name))]
    pub fn validate_resource(
        &self,
        resource: &Resource,
        options: &ValidateOptions,
        extra: Vec<Box<dyn Check>>,
    ) -> Result<ReportTask> {
        let started = Instant::now();
        let elapsed = || started.elapsed().as_secs_f64();

        let mut collector = Collector::new(options);
        let metadata = metadata_errors(resource);
        if let Some(first) = metadata.first() {
            if options.onerror == OnError::Raise {
                return Err(SieveError::from(first.clone()));
            }
            let scope = codes_of(&metadata);
            collector.extend(metadata);
            let partial = collector.full;
            return Ok(ReportTask::new(
                resource.summary(),
                elapsed(),
                scope,
                partial,
                TaskStats::default(),
                collector.errors,
            ));
        }

        let mut checks: Vec<Box<dyn Check>> = vec![Box::new(Baseline::default())];
        if !resource.stats.is_empty() {
            checks.push(Box::new(Checksum::default()));
        }
        for descriptor in &options.checks {
            match self.registry.create_check(descriptor) {
                Ok(check) => checks.push(check),
                Err(error) => {
                    let error = self.fold(options, resource, error)?;
                    collector.extend([error]);
                }
            }
        }
        checks.extend(extra);

        let mut table = match Table::open(resource.clone(), &self.registry, options.detect) {
            Ok(table) => table,
            Err(error) => {
                let error = self.fold(options, resource, error)?;
                let scope = vec![error.code];
                collector.extend([error]);
                let partial = collector.full;
                return Ok(ReportTask::new(
                    resource.summary(),
                    elapsed(),
                    scope,
                    partial,
                    TaskStats::default(),
                    collector.errors,
                ));
            }
        };
        let described = table.resource().clone();
        let summary = described.summary();

        let mut active: Vec<Box<dyn Check>> = Vec::with_capacity(checks.len());
        for mut check in checks {
            check.connect(&described);
            check.prepare();
            let problems = check.validate_check();
            if problems.is_empty() {
                active.push(check);
            } else {
                debug!(check = check.code(), "check disabled");
                collector.extend(problems);
            }
        }
        let mut scope: Vec<ErrorCode> = Vec::new();
        for code in active.iter().flat_map(|c| c.scope()) {
            if !scope.contains(&code) {
                scope.push(code);
            }
        }

        for check in &mut active {
            collector.extend(check.validate_source());
            collector.extend(check.validate_schema(table.schema()));
        }
        let header = table.header().clone();
        for check in &mut active {
            collector.extend(check.validate_header(&header));
        }

        let memory_limit = options.limit_memory.saturating_mul(1024 * 1024);
        let mut partial = collector.full;
        if !partial {
            let mut rows = table.rows();
            let mut count = 0;
            while let Some(result) = rows.next() {
                let row = match result {
                    Ok(row) => row,
                    Err(error) => {
                        let error = self.fold(options, resource, error)?;
                        collector.extend([error]);
                        break;
                    }
                };
                for check in &mut active {
                    collector.extend(check.validate_row(&row));
                }
                if collector.full {
                    warn!(limit = ?options.limit_errors, "error limit reached");
                    partial = true;
                    break;
                }
                count += 1;
                if count % MEMORY_CHECK_INTERVAL == 0 {
                    let used = rows.memory_usage() + active.iter().map(|c| c.memory_usage()).sum::<usize>();
                    if used > memory_limit {
                        warn!(used, limit = memory_limit, "memory limit reached");
                        collector.errors.push(ReportError::general(
                            ErrorCode::TaskError,
                            format!("exceeded memory limit \"{}MB\"", options.limit_memory),
                        ));
                        partial = true;
                        break;
                    }
                }
            }
        }

        let stats = table.stats();
        table.close();
        if !partial {
            for check in &mut active {
                collector.extend(check.validate_table(&stats));
            }
            partial = collector.full;
        }

        let time = elapsed();
        info!(
            rows = stats.rows,
            errors = collector.errors.len(),
            partial,
            time,
            "validated resource"
        );
        Ok(ReportTask::new(summary, time, scope, partial, stats, collector.errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Layout;
    use crate::schema::{Field, Schema};
    use crate::types::FieldType;
    use serde_json::json;

    fn engine() -> ValidationEngine {
        ValidationEngine::new()
    }

    #[test]
    fn test_options_from_json() {
        let options: ValidateOptions = serde_json::from_value(json!({
            "checks": [{"code": "duplicate-row"}],
            "skipErrors": ["#header"],
            "limitErrors": 5,
            "onerror": "warn"
        }))
        .unwrap();
        assert_eq!(options.limit_errors, Some(5));
        assert_eq!(options.limit_memory, 1000);
        assert_eq!(options.onerror, OnError::Warn);
        assert!(options.detect);
    }

    #[test]
    fn test_pick_and_skip_by_tag() {
        let resource = Resource::from_bytes(b"id,id\n1,x\n".to_vec()).with_schema(Schema::with_fields(vec![
            Field::new("id", FieldType::Integer),
            Field::new("id2", FieldType::Integer),
        ]));
        let all = engine().validate(&resource, &ValidateOptions::default()).unwrap();
        let codes = all.task().unwrap().error_codes();
        assert!(codes.contains(&ErrorCode::DuplicateLabel));
        assert!(codes.contains(&ErrorCode::TypeError));

        let skipped = ValidateOptions::default().with_skip_errors(vec!["#header".into()]);
        let report = engine().validate(&resource, &skipped).unwrap();
        assert_eq!(report.task().unwrap().error_codes(), vec![ErrorCode::TypeError]);

        let picked = ValidateOptions::default().with_pick_errors(vec!["duplicate-label".into()]);
        let report = engine().validate(&resource, &picked).unwrap();
        assert_eq!(report.task().unwrap().error_codes(), vec![ErrorCode::DuplicateLabel]);
    }

    #[test]
    fn test_open_failure_becomes_single_error_task() {
        let resource = Resource::from_path("does/not/exist.csv");
        let report = engine().validate(&resource, &ValidateOptions::default()).unwrap();
        let task = report.task().unwrap();
        assert!(!report.valid);
        assert_eq!(task.error_codes(), vec![ErrorCode::SchemeError]);

        let raise = ValidateOptions::default().with_onerror(OnError::Raise);
        assert!(engine().validate(&resource, &raise).is_err());
    }

    #[test]
    fn test_invalid_check_is_reported_and_disabled() {
        let resource = Resource::from_bytes(b"id\n1\n2\n".to_vec());
        let options = ValidateOptions::default()
            .with_check(json!({"code": "sequential-value", "fieldName": "missing"}))
            .with_check(json!({"code": "no-such-check"}));
        let report = engine().validate(&resource, &options).unwrap();
        assert_eq!(
            report.task().unwrap().error_codes(),
            vec![ErrorCode::CheckError, ErrorCode::CheckError]
        );
    }

    #[test]
    fn test_zero_limit_errors_keeps_every_error() {
        let resource = Resource::from_bytes(b"n\nx\ny\nz\n".to_vec())
            .with_schema(Schema::with_fields(vec![Field::new("n", FieldType::Integer)]));
        let options = ValidateOptions::default().with_limit_errors(0);
        let report = engine().validate(&resource, &options).unwrap();
        let task = report.task().unwrap();
        assert_eq!(task.errors.len(), 3);
        assert!(!task.partial);
        assert!(!report.valid);
    }

    #[test]
    fn test_metadata_errors_respect_limit_and_filters() {
        let schema = Schema::with_fields(vec![
            Field::new("a", FieldType::String),
            Field::new("a", FieldType::String),
            Field::new("a", FieldType::String),
        ]);
        let resource = Resource::from_bytes(b"a,a,a\n1,2,3\n".to_vec()).with_schema(schema);

        let all = engine().validate(&resource, &ValidateOptions::default()).unwrap();
        assert_eq!(all.task().unwrap().errors.len(), 2);

        let limited = ValidateOptions::default().with_limit_errors(1);
        let report = engine().validate(&resource, &limited).unwrap();
        let task = report.task().unwrap();
        assert_eq!(task.error_codes(), vec![ErrorCode::SchemaError]);
        assert!(task.partial);

        let skipped = ValidateOptions::default().with_skip_errors(vec!["schema-error".into()]);
        let report = engine().validate(&resource, &skipped).unwrap();
        assert!(report.task().unwrap().errors.is_empty());
    }

    #[test]
    fn test_memory_limit_marks_task_partial() {
        let mut data = String::from("id\n");
        for i in 0..250 {
            data.push_str(&format!("{}\n", i));
        }
        let schema = Schema::with_fields(vec![Field::new("id", FieldType::Integer)
            .with_constraints(crate::schema::Constraints::default().with_unique())]);
        let resource = Resource::from_bytes(data.into_bytes()).with_schema(schema);
        let options = ValidateOptions::default().with_limit_memory(0);
        let report = engine().validate(&resource, &options).unwrap();
        let task = report.task().unwrap();
        assert!(task.partial);
        assert_eq!(task.error_codes(), vec![ErrorCode::TaskError]);
        assert_eq!(task.stats.rows, 100);
    }

    #[test]
    fn test_detect_false_uses_explicit_layout() {
        let resource = Resource::from_bytes(b"1,2\n3,4\n".to_vec())
            .with_layout(Layout::new().with_header(false));
        let options = ValidateOptions::default().with_detect(false);
        let report = engine().validate(&resource, &options).unwrap();
        assert!(report.valid);
        assert_eq!(report.task().unwrap().stats.rows, 2);
    }

    #[test]
    fn test_validate_many_keeps_order() {
        let resources = vec![
            Resource::from_bytes(b"a\n1\n".to_vec()).with_name("first"),
            Resource::from_path("missing.csv").with_name("second"),
            Resource::from_bytes(b"b\nx\n".to_vec()).with_name("third"),
        ];
        let options = ValidateOptions::default().with_parallel(true);
        let report = engine().validate_many(&resources, &options).unwrap();
        let names: Vec<&str> = report.tasks.iter().map(|t| t.resource.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert!(!report.valid);
        assert_eq!(report.stats.tasks, 3);
    }
}
