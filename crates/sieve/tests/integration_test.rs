//! Integration tests for sieve.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;
use tempfile::NamedTempFile;

use sieve::input::{MemoryStorage, Storage};
use sieve::{
    Constraints, Detector, ErrorCode, ExpectedStats, Field, FieldType, Layout, OnError, Registry, Resource,
    Schema, ValidateOptions, ValidationEngine, Value,
};

/// Helper to create a temporary csv file with given content.
fn create_test_file(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".csv")
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write to temp file");
    file
}

/// Route `tracing` output through the test harness.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Gzip `content` in memory.
fn gzip(content: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content).expect("Failed to compress");
    encoder.finish().expect("Failed to finish gzip stream")
}

fn id_name_schema() -> Schema {
    Schema::with_fields(vec![
        Field::new("id", FieldType::Integer),
        Field::new("name", FieldType::String),
    ])
}

fn validate(resource: &Resource, options: &ValidateOptions) -> sieve::Report {
    ValidationEngine::new()
        .validate(resource, options)
        .expect("Validation failed")
}

// =============================================================================
// Validation Scenarios
// =============================================================================

#[test]
fn test_type_error_is_located() {
    let resource = Resource::from_inline(vec![
        json!(["id", "name"]),
        json!(["1", "a"]),
        json!(["x", "b"]),
    ])
    .with_schema(id_name_schema());

    let report = validate(&resource, &ValidateOptions::default());
    assert!(!report.valid);

    let task = report.task().unwrap();
    assert_eq!(task.errors.len(), 1);
    let error = &task.errors[0];
    assert_eq!(error.code, ErrorCode::TypeError);
    assert_eq!(error.row_number(), Some(2));
    assert_eq!(error.field_name(), Some("id"));
    assert_eq!(task.stats.rows, 2);
}

#[test]
fn test_checksum_mismatch_on_bytes_only() {
    // 8 header bytes plus two rows of 46 bytes.
    let name = "a".repeat(43);
    let data = format!("id,name\n1,{}\n2,{}\n", name, name);
    assert_eq!(data.len(), 100);

    let resource = Resource::from_bytes(data.into_bytes())
        .with_schema(id_name_schema())
        .with_stats(ExpectedStats::default().with_bytes(120).with_rows(2));
    let report = validate(&resource, &ValidateOptions::default());

    let task = report.task().unwrap();
    assert_eq!(task.error_codes(), vec![ErrorCode::ChecksumError]);
    assert!(task.errors[0].note.contains("bytes"));
    assert!(task.errors.iter().all(|e| e.row_number().is_none()));
    assert_eq!(task.stats.bytes, Some(100));
    assert!(task.scope.contains(&ErrorCode::ChecksumError));
}

#[test]
fn test_duplicate_row_over_keyed_inline_rows() {
    let resource = Resource::from_inline(vec![json!({"a": 1}), json!({"a": 1})]);
    let options = ValidateOptions::default().with_check(json!({"code": "duplicate-row"}));
    let report = validate(&resource, &options);

    let task = report.task().unwrap();
    assert_eq!(task.error_codes(), vec![ErrorCode::DuplicateRow]);
    assert_eq!(task.errors[0].row_number(), Some(2));
}

#[test]
fn test_limit_rows_reads_one_row() {
    let resource = Resource::from_bytes(b"n\n1\n2\n3\n4\n5\n".to_vec())
        .with_layout(Layout::new().with_limit_rows(1));

    let rows = resource.read_rows(&Registry::default()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("n"), Some(&Value::Integer(1)));

    let report = validate(&resource, &ValidateOptions::default());
    assert!(report.valid);
    assert_eq!(report.task().unwrap().stats.rows, 1);
}

#[test]
fn test_limit_errors_marks_partial() {
    let mut data = String::from("n\n");
    for _ in 0..10 {
        data.push_str("x\n");
    }
    let resource = Resource::from_bytes(data.into_bytes())
        .with_schema(Schema::with_fields(vec![Field::new("n", FieldType::Integer)]));
    let options = ValidateOptions::default().with_limit_errors(3);
    let report = validate(&resource, &options);

    let task = report.task().unwrap();
    assert!(task.partial);
    assert_eq!(task.errors.len(), 3);
    assert_eq!(task.stats.errors, 3);
}

#[test]
fn test_zero_limit_errors_collects_everything() {
    let mut data = String::from("n\n");
    for _ in 0..10 {
        data.push_str("x\n");
    }
    let resource = Resource::from_bytes(data.into_bytes())
        .with_schema(Schema::with_fields(vec![Field::new("n", FieldType::Integer)]));
    let options = ValidateOptions::default().with_limit_errors(0);
    let report = validate(&resource, &options);

    let task = report.task().unwrap();
    assert!(!task.partial);
    assert_eq!(task.errors.len(), 10);
    assert!(!report.valid);
}

#[test]
fn test_schema_errors_are_limited() {
    let schema = Schema::with_fields(vec![
        Field::new("a", FieldType::String),
        Field::new("a", FieldType::String),
        Field::new("a", FieldType::String),
    ]);
    let resource = Resource::from_bytes(b"a,a,a\n1,2,3\n".to_vec()).with_schema(schema);
    let options = ValidateOptions::default().with_limit_errors(1);
    let report = validate(&resource, &options);

    let task = report.task().unwrap();
    assert_eq!(task.error_codes(), vec![ErrorCode::SchemaError]);
    assert!(task.partial);
    assert!(!report.valid);
}

#[test]
fn test_unique_numbers_beyond_integer_precision() {
    let schema = Schema::with_fields(vec![Field::new("n", FieldType::Number)
        .with_constraints(Constraints::default().with_unique())]);
    let resource = Resource::from_bytes(b"n\n1e19\n2e19\n1e19\n".to_vec()).with_schema(schema);
    let report = validate(&resource, &ValidateOptions::default());

    let task = report.task().unwrap();
    assert_eq!(task.error_codes(), vec![ErrorCode::UniqueError]);
    assert_eq!(task.errors[0].row_number(), Some(4));
}

#[test]
fn test_huge_duration_against_maximum() {
    let schema = Schema::with_fields(vec![Field::new("span", FieldType::Duration)
        .with_constraints(Constraints::default().with_maximum("P1D"))]);
    let resource = Resource::from_bytes(b"span\nPT5H\nP999999999999999999D\n".to_vec()).with_schema(schema);
    let report = validate(&resource, &ValidateOptions::default());

    let task = report.task().unwrap();
    assert_eq!(task.error_codes(), vec![ErrorCode::ConstraintError]);
    assert_eq!(task.errors[0].row_number(), Some(3));
}

#[test]
fn test_sequential_value_past_integer_maximum() {
    let resource = Resource::from_bytes(b"id\n9223372036854775806\n9223372036854775807\n1\n".to_vec())
        .with_schema(Schema::with_fields(vec![Field::new("id", FieldType::Integer)]));
    let options = ValidateOptions::default()
        .with_check(json!({"code": "sequential-value", "fieldName": "id"}));
    let report = validate(&resource, &options);

    let task = report.task().unwrap();
    assert_eq!(task.error_codes(), vec![ErrorCode::SequentialValue]);
    assert_eq!(task.errors[0].row_number(), Some(4));
}

#[test]
fn test_unique_and_primary_key() {
    let mut schema = Schema::with_fields(vec![
        Field::new("id", FieldType::Integer),
        Field::new("email", FieldType::String)
            .with_constraints(Constraints::default().with_unique()),
    ]);
    schema.set_primary_key(vec!["id".to_string()]).unwrap();
    let resource = Resource::from_bytes(b"id,email\n1,a@x\n2,b@x\n1,a@x\n".to_vec())
        .with_schema(schema);

    let report = validate(&resource, &ValidateOptions::default());
    let codes = report.task().unwrap().error_codes();
    assert!(codes.contains(&ErrorCode::UniqueError));
    assert!(codes.contains(&ErrorCode::PrimaryKeyError));
}

#[test]
fn test_row_constraint_and_forbidden_value() {
    let resource = Resource::from_bytes(b"low,high,tag\n1,2,ok\n5,3,ok\n1,9,bad\n".to_vec());
    let options = ValidateOptions::default()
        .with_check(json!({"code": "row-constraint", "formula": "low < high"}))
        .with_check(json!({"code": "forbidden-value", "fieldName": "tag", "values": ["bad"]}));
    let report = validate(&resource, &options);

    let task = report.task().unwrap();
    assert_eq!(
        task.error_codes(),
        vec![ErrorCode::RowConstraint, ErrorCode::ForbiddenValue]
    );
    assert_eq!(task.errors[0].row_number(), Some(2));
    assert_eq!(task.errors[1].row_number(), Some(3));
}

#[test]
fn test_onerror_raise_returns_error() {
    let resource = Resource::from_path("no/such/file.csv");
    let options = ValidateOptions::default().with_onerror(OnError::Raise);
    let error = ValidationEngine::new().validate(&resource, &options).unwrap_err();
    assert_eq!(error.code(), ErrorCode::SchemeError);
}

#[test]
fn test_onerror_warn_folds_stream_failure() {
    init_tracing();
    let resource = Resource::from_inline(vec![
        json!({"id": 1}),
        json!({"id": 2}),
        json!(["not", "keyed"]),
    ])
    .with_detector(Detector::default().with_sample_size(3));
    let options = ValidateOptions::default().with_onerror(OnError::Warn);
    let report = validate(&resource, &options);

    let task = report.task().unwrap();
    assert_eq!(task.error_codes(), vec![ErrorCode::FormatError]);
    assert_eq!(task.stats.rows, 2);
}

// =============================================================================
// Sources
// =============================================================================

#[test]
fn test_validate_file_resource() {
    let file = create_test_file("id;name\n1;ann\n2;bob\n");
    let resource = Resource::from_path(file.path());
    let report = validate(&resource, &ValidateOptions::default());

    assert!(report.valid);
    let task = report.task().unwrap();
    assert_eq!(task.resource.format, "csv");
    assert_eq!(task.resource.encoding.as_deref(), Some("utf-8"));
    assert_eq!(task.stats.rows, 2);
    assert_eq!(task.stats.fields, 2);
    assert_eq!(task.stats.bytes, Some(20));
}

#[test]
fn test_validate_gzipped_csv() {
    let data = b"id,name\n1,ann\nx,bob\n";
    let compressed = gzip(data);
    let stored = compressed.len() as u64;

    let resource = Resource::from_bytes(compressed)
        .with_compression("gz")
        .with_schema(id_name_schema());
    let report = validate(&resource, &ValidateOptions::default());
    let task = report.task().unwrap();
    assert_eq!(task.error_codes(), vec![ErrorCode::TypeError]);
    assert_eq!(task.errors[0].row_number(), Some(3));
    assert_eq!(task.stats.rows, 2);
    assert_eq!(task.stats.bytes, Some(stored));

    let mut file = tempfile::Builder::new()
        .suffix(".csv.gz")
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(&gzip(b"id,name\n1,ann\n2,bob\n"))
        .expect("Failed to write to temp file");
    let report = validate(&Resource::from_path(file.path()), &ValidateOptions::default());
    assert!(report.valid);
    assert_eq!(report.task().unwrap().resource.format, "csv");
    assert_eq!(report.task().unwrap().stats.rows, 2);
}

#[test]
fn test_unsupported_compression_is_reported() {
    let resource = Resource::from_bytes(b"id\n1\n".to_vec()).with_compression("zip");
    let report = validate(&resource, &ValidateOptions::default());
    assert_eq!(report.task().unwrap().error_codes(), vec![ErrorCode::CompressionError]);
}

#[test]
fn test_single_byte_encodings() {
    let declared = Resource::from_bytes(b"name\ncaf\xe9\n".to_vec()).with_encoding("windows-1252");
    let rows = declared.read_rows(&Registry::default()).unwrap();
    assert_eq!(rows[0].get("name"), Some(&Value::String("caf\u{e9}".into())));

    let detected = Resource::from_bytes(b"name\nna\xefve\n".to_vec());
    let report = validate(&detected, &ValidateOptions::default());
    assert!(report.valid);
    assert_eq!(report.task().unwrap().resource.encoding.as_deref(), Some("windows-1252"));
}

#[test]
fn test_describe_infers_dialect_and_schema() {
    let file = create_test_file("id;amount;when\n1;2.5;2024-01-15\n2;3.0;2024-02-01\n");
    let described = sieve::describe(&Resource::from_path(file.path())).unwrap();

    assert_eq!(described.dialect.delimiter.as_deref(), Some(";"));
    assert_eq!(described.encoding.as_deref(), Some("utf-8"));
    let schema = described.schema.expect("schema is inferred");
    let types: Vec<FieldType> = schema.fields.iter().map(|f| f.field_type).collect();
    assert_eq!(types, vec![FieldType::Integer, FieldType::Number, FieldType::Date]);
}

#[test]
fn test_memory_storage_round_trip() {
    let registry = Registry::default();
    let mut storage = MemoryStorage::new();
    let mut table = Resource::from_bytes(b"id,name\n1,ann\n2,bob\n".to_vec())
        .open(&registry)
        .unwrap();
    storage.write("people", &mut table).unwrap();
    assert_eq!(storage.names(), vec!["people".to_string()]);

    let resource = storage.read("people").unwrap();
    let rows = resource.read_rows(&registry).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get("name"), Some(&Value::String("bob".into())));
    assert!(storage.read("missing").is_err());
}

#[test]
fn test_validate_many_reports_each_resource() {
    let resources = vec![
        Resource::from_bytes(b"a\n1\n".to_vec()).with_name("good"),
        Resource::from_inline(vec![json!(["a", "b"]), json!(["1"])]).with_name("short"),
    ];
    for parallel in [false, true] {
        let options = ValidateOptions::default().with_parallel(parallel);
        let report = ValidationEngine::new()
            .validate_many(&resources, &options)
            .unwrap();
        assert_eq!(report.tasks.len(), 2);
        assert!(report.tasks[0].valid);
        assert_eq!(report.tasks[1].error_codes(), vec![ErrorCode::MissingCell]);
        assert!(!report.valid);
    }
}

#[test]
fn test_report_serializes_and_flattens() {
    let resource = Resource::from_inline(vec![
        json!(["id", "name"]),
        json!(["1", "a"]),
        json!(["x", "b"]),
    ])
    .with_schema(id_name_schema());
    let report = validate(&resource, &ValidateOptions::default());

    let text = report.to_json().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["valid"], json!(false));
    assert_eq!(parsed["tasks"][0]["errors"][0]["code"], json!("type-error"));

    let flat = report.flatten(&["rowNumber", "fieldName", "code"]);
    assert_eq!(flat, vec![vec![json!(2), json!("id"), json!("type-error")]]);
}
