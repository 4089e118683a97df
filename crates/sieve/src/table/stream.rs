//! Opened tables and their row streams.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, SieveError};
use crate::input::{ByteSource, ByteStats, Layout, Parser, Resource};
use crate::registry::Registry;
use crate::report::{ErrorCode, ReportError, TaskStats};
use crate::schema::Schema;

use super::header::Header;
use super::row::Row;

type Records = Box<dyn Iterator<Item = Result<(usize, Vec<String>)>> + Send>;

/// Approximate bookkeeping cost of one memoised key, beyond its text.
const MEMO_ENTRY_OVERHEAD: usize = 48;

/// Separates the parts of a composite primary key.
const KEY_SEPARATOR: char = '\u{1f}';

#[derive(Default)]
struct StreamState {
    emitted: usize,
    skipped: usize,
    failed: bool,
    unique: Vec<(usize, HashMap<String, usize>)>,
    primary_key: Option<(Vec<usize>, HashMap<String, usize>)>,
    memo_bytes: usize,
}

impl StreamState {
    fn new(schema: &Schema) -> Self {
        let unique = schema
            .fields
            .iter()
            .enumerate()
            .filter(|(_, field)| field.is_unique())
            .map(|(index, _)| (index, HashMap::new()))
            .collect();
        let primary_key = if schema.primary_key.is_empty() {
            None
        } else {
            let indexes = schema
                .primary_key
                .iter()
                .filter_map(|name| schema.field_position(name))
                .collect();
            Some((indexes, HashMap::new()))
        };
        Self {
            unique,
            primary_key,
            ..Self::default()
        }
    }

    /// Add unique-error and primary-key-error by remembering earlier rows.
    fn track(&mut self, row: &mut Row) {
        if row.errors().iter().any(|e| e.code == ErrorCode::BlankRow) {
            return;
        }
        let position = row.row_position();

        for (index, seen) in &mut self.unique {
            let Some(value) = row.values().get(*index).filter(|v| !v.is_null()) else {
                continue;
            };
            match seen.entry(value.key()) {
                Entry::Occupied(first) => {
                    let raw = row.cells().get(*index).cloned().unwrap_or_default();
                    let note = format!("the same as in the row at position \"{}\"", first.get());
                    let field = row.field_location(*index);
                    row.mark_error_cell(&field.field_name, &raw);
                    row.push_error(ReportError::cell(
                        ErrorCode::UniqueError,
                        note,
                        row.location(),
                        raw,
                        field,
                    ));
                }
                Entry::Vacant(slot) => {
                    self.memo_bytes += slot.key().len() + MEMO_ENTRY_OVERHEAD;
                    slot.insert(position);
                }
            }
        }

        if let Some((indexes, seen)) = &mut self.primary_key {
            let values: Vec<_> = indexes.iter().filter_map(|i| row.values().get(*i)).collect();
            if values.iter().all(|v| v.is_null()) {
                row.push_error(ReportError::row(
                    ErrorCode::PrimaryKeyError,
                    "cells composing the primary keys are all missing",
                    row.location(),
                ));
                return;
            }
            let key = values
                .iter()
                .map(|v| v.key())
                .collect::<Vec<_>>()
                .join(&KEY_SEPARATOR.to_string());
            match seen.entry(key) {
                Entry::Occupied(first) => {
                    let note = format!("the same as in the row at position \"{}\"", first.get());
                    row.push_error(ReportError::row(ErrorCode::PrimaryKeyError, note, row.location()));
                }
                Entry::Vacant(slot) => {
                    self.memo_bytes += slot.key().len() + MEMO_ENTRY_OVERHEAD;
                    slot.insert(position);
                }
            }
        }
    }
}

/// An opened resource: detected layout, schema and header, plus a row stream.
///
/// The table owns its parser, which owns the byte source and loader.
/// Closing or dropping the table releases all of them.
pub struct Table {
    resource: Resource,
    parser: Box<dyn Parser>,
    byte_stats: Option<ByteStats>,
    layout: Layout,
    schema: Schema,
    header: Header,
    field_names: Arc<[String]>,
    field_positions: Arc<[usize]>,
    records: Option<Records>,
    state: StreamState,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("resource", &self.resource.name)
            .field("layout", &self.layout)
            .field("schema", &self.schema)
            .field("rows", &self.state.emitted)
            .finish()
    }
}

impl Table {
    /// Open `resource`, read the sample, and resolve layout, schema and header.
    ///
    /// With `detect` unset, an explicit layout and schema are used as given
    /// (the default layout when none is declared; a schema is still inferred
    /// when none is declared).
    pub fn open(resource: Resource, registry: &Registry, detect: bool) -> Result<Self> {
        let mut resource = resource;
        if let Some(note) = resource.dialect.metadata_errors().into_iter().next() {
            return Err(SieveError::new(ErrorCode::DialectError, note));
        }
        if let Some(layout) = &resource.layout {
            layout.validate()?;
        }
        if let Some(schema) = &resource.schema {
            schema.validate()?;
        }
        let detector = resource.detector.clone();

        let mut parser = registry.create_parser(&resource.format())?;
        let mut byte_stats = None;
        let source = if parser.requires_loader() {
            let loader = registry.create_loader(&resource.scheme())?;
            let source = ByteSource::open(loader, &resource, &detector)?;
            byte_stats = Some(source.stats());
            resource.encoding = Some(source.encoding().to_string());
            Some(source)
        } else {
            None
        };
        parser.open(&resource, source)?;
        if let Some(dialect) = parser.dialect() {
            resource.dialect = dialect;
        }
        let mut stream = parser.data_stream()?;

        let mut sample = Vec::new();
        while sample.len() < detector.sample_size {
            match stream.next() {
                Some(record) => sample.push(record?),
                None => break,
            }
        }
        let sampled = sample.len();
        debug!(resource = %resource.name, rows = sampled, "read sample");

        let layout = if detect {
            detector.detect_layout(&sample, resource.layout.as_ref())
        } else {
            resource.layout.clone().unwrap_or_default()
        };

        let mut head: Vec<(usize, Vec<String>)> = sample
            .into_iter()
            .enumerate()
            .map(|(index, cells)| (index + 1, cells))
            .filter(|(position, cells)| layout.keeps_row(*position, cells))
            .collect();
        let span = layout.header_span().min(head.len());
        let data = head.split_off(span);

        let (labels, row_positions) = if layout.header && !head.is_empty() {
            let rows: Vec<Vec<String>> = head.iter().map(|(_, cells)| cells.clone()).collect();
            let positions = layout
                .header_rows
                .iter()
                .filter_map(|n| n.checked_sub(1).and_then(|i| head.get(i)))
                .map(|(position, _)| *position)
                .collect();
            (layout.join_header(&rows), positions)
        } else {
            (Vec::new(), Vec::new())
        };

        let width = data
            .iter()
            .map(|(_, cells)| cells.len())
            .chain(std::iter::once(labels.len()))
            .max()
            .unwrap_or(0);
        let positions = layout.field_positions(&labels, width);
        let labels = layout.project(labels, &positions);
        let fragment: Vec<Vec<String>> = data
            .iter()
            .map(|(_, cells)| layout.project(cells.clone(), &positions))
            .collect();

        let schema = match (&resource.schema, detect) {
            (Some(schema), false) => schema.clone(),
            _ => detector.detect_schema(&fragment, &labels, resource.schema.as_ref())?,
        };
        let by_name = detect && detector.schema_sync;
        let header = Header::new(
            labels,
            &schema,
            positions.clone(),
            row_positions,
            !layout.header_case,
            by_name,
        );
        debug!(
            fields = schema.field_count(),
            header = ?header.labels(),
            "resolved schema and header"
        );

        let rest_layout = layout.clone();
        let rest = stream
            .enumerate()
            .map(move |(index, record)| record.map(|cells| (sampled + index + 1, cells)))
            .filter(move |record| match record {
                Ok((position, cells)) => rest_layout.keeps_row(*position, cells),
                Err(_) => true,
            });
        let records: Records = Box::new(data.into_iter().map(Ok).chain(rest));

        let field_names: Arc<[String]> = schema.field_names().iter().map(|n| n.to_string()).collect();
        let state = StreamState::new(&schema);
        resource.layout = Some(layout.clone());
        resource.schema = Some(schema.clone());

        Ok(Self {
            resource,
            parser,
            byte_stats,
            layout,
            schema,
            header,
            field_names,
            field_positions: Arc::from(positions),
            records: Some(records),
            state,
        })
    }

    /// The resource with encoding, dialect, layout and schema resolved.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Stream the data rows. Rows are produced once; later calls yield nothing.
    pub fn rows(&mut self) -> RowStream<'_> {
        RowStream { table: self }
    }

    /// Counters for the rows and bytes read so far.
    pub fn stats(&self) -> TaskStats {
        TaskStats {
            errors: 0,
            rows: self.state.emitted,
            fields: self.schema.field_count(),
            bytes: self.byte_stats.as_ref().map(ByteStats::bytes),
            hash: self.byte_stats.as_ref().map(ByteStats::hash),
        }
    }

    /// Approximate bytes held by the uniqueness and primary-key memos.
    pub fn memory_usage(&self) -> usize {
        self.state.memo_bytes
    }

    /// Release the parser, byte source and loader.
    pub fn close(&mut self) {
        self.records = None;
        self.parser.close();
    }

    fn next_row(&mut self) -> Option<Result<Row>> {
        loop {
            if self.state.failed {
                return None;
            }
            if self.layout.limit_rows.is_some_and(|limit| self.state.emitted >= limit) {
                return None;
            }
            let record = self.records.as_mut()?.next()?;
            let (position, cells) = match record {
                Ok(record) => record,
                Err(error) => {
                    self.state.failed = true;
                    return Some(Err(error));
                }
            };
            if self.state.skipped < self.layout.offset_rows.unwrap_or(0) {
                self.state.skipped += 1;
                continue;
            }
            let cells = self.layout.project(cells, &self.field_positions);
            self.state.emitted += 1;
            let mut row = Row::new(
                &self.schema,
                Arc::clone(&self.field_names),
                Arc::clone(&self.field_positions),
                cells,
                position,
                self.state.emitted,
            );
            self.state.track(&mut row);
            return Some(Ok(row));
        }
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        self.close();
    }
}

/// Iterator over the rows of an open [`Table`].
///
/// The first stream failure is yielded as an error and ends the stream.
pub struct RowStream<'a> {
    table: &'a mut Table,
}

impl RowStream<'_> {
    /// Memo bytes held by the underlying table.
    pub fn memory_usage(&self) -> usize {
        self.table.memory_usage()
    }
}

impl Iterator for RowStream<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.table.next_row()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Selector, Source};
    use crate::schema::{Constraints, Field};
    use crate::types::{FieldType, Value};
    use serde_json::json;

    fn open(resource: Resource) -> Table {
        Table::open(resource, &Registry::default(), true).unwrap()
    }

    fn codes(row: &Row) -> Vec<ErrorCode> {
        row.errors().iter().map(|e| e.code).collect()
    }

    #[test]
    fn test_csv_rows_are_cast() {
        let mut table = open(Resource::from_bytes(b"id,name\n1,ann\n2,bob\n".to_vec()));
        assert_eq!(table.header().labels(), &["id", "name"]);
        assert_eq!(table.schema().fields[0].field_type, FieldType::Integer);
        let rows: Vec<Row> = table.rows().collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("id"), Some(&Value::Integer(2)));
        assert_eq!(rows[1].row_position(), 3);
        assert_eq!(rows[1].row_number(), 2);

        let stats = table.stats();
        assert_eq!(stats.rows, 2);
        assert_eq!(stats.fields, 2);
        assert_eq!(stats.bytes, Some(20));
        assert_eq!(table.resource().encoding.as_deref(), Some("utf-8"));
    }

    #[test]
    fn test_offset_and_limit_rows() {
        let data = b"n\n1\n2\n3\n4\n5\n".to_vec();
        let layout = Layout::new().with_offset_rows(1).with_limit_rows(2);
        let mut table = open(Resource::from_bytes(data).with_layout(layout));
        let rows: Vec<Row> = table.rows().collect::<Result<_>>().unwrap();
        let values: Vec<&Value> = rows.iter().map(|r| &r.values()[0]).collect();
        assert_eq!(values, vec![&Value::Integer(2), &Value::Integer(3)]);
        assert_eq!(rows[0].row_number(), 1);
        assert_eq!(rows[0].row_position(), 3);
        assert_eq!(table.stats().rows, 2);
    }

    #[test]
    fn test_comment_rows_are_skipped_past_the_sample() {
        let detector = crate::inference::Detector::default().with_sample_size(2);
        let layout = Layout::new().with_skip_rows(vec![Selector::from("#")]);
        let resource = Resource::from_bytes(b"id\n1\n# note\n2\n".to_vec())
            .with_layout(layout)
            .with_detector(detector);
        let mut table = open(resource);
        let positions: Vec<usize> = table.rows().map(|r| r.unwrap().row_position()).collect();
        assert_eq!(positions, vec![2, 4]);
    }

    #[test]
    fn test_unique_and_primary_key_errors() {
        let schema = Schema::with_fields(vec![
            Field::new("id", FieldType::Integer),
            Field::new("code", FieldType::String)
                .with_constraints(Constraints::default().with_unique()),
        ]);
        let mut schema = schema;
        schema.set_primary_key(vec!["id".to_string()]).unwrap();
        let resource = Resource::from_inline(vec![
            json!(["id", "code"]),
            json!([1, "a"]),
            json!([2, "a"]),
            json!([1, "b"]),
        ])
        .with_schema(schema);
        let mut table = open(resource);
        let rows: Vec<Row> = table.rows().collect::<Result<_>>().unwrap();
        assert!(rows[0].valid());
        assert_eq!(codes(&rows[1]), vec![ErrorCode::UniqueError]);
        assert_eq!(codes(&rows[2]), vec![ErrorCode::PrimaryKeyError]);
        assert!(rows[1].errors()[0].note.contains("position \"2\""));
        assert!(table.memory_usage() > 0);
    }

    #[test]
    fn test_field_selection_projects_cells() {
        let layout = Layout::new().with_pick_fields(vec![Selector::from("name")]);
        let resource = Resource::from_bytes(b"id,name\n1,ann\n".to_vec()).with_layout(layout);
        let mut table = open(resource);
        assert_eq!(table.schema().field_names(), vec!["name"]);
        let row = table.rows().next().unwrap().unwrap();
        assert_eq!(row.cells(), &["ann"]);
        assert_eq!(row.field_location(0).field_position, 2);
    }

    #[test]
    fn test_stream_failure_is_terminal() {
        let resource = Resource::from_bytes(b"id\n1\n\xFF\n2\n".to_vec())
            .with_encoding("utf-8")
            .with_detector(crate::inference::Detector::default().with_sample_size(1));
        let mut table = open(resource);
        let results: Vec<Result<Row>> = table.rows().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        let error = results.into_iter().nth(1).unwrap().unwrap_err();
        assert_eq!(error.code(), ErrorCode::EncodingError);
    }

    #[test]
    fn test_unknown_format_fails_to_open() {
        let resource = Resource::new(Source::Bytes(b"x".to_vec())).with_format("xlsx");
        let error = Table::open(resource, &Registry::default(), true).unwrap_err();
        assert_eq!(error.code(), ErrorCode::FormatError);
    }
}
