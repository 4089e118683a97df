//! Record decoding: parsers turn bytes or in-memory rows into raw cells.

use std::io;

use serde_json::{Map, Value as JsonValue};

use crate::error::{Result, SieveError};
use crate::report::ErrorCode;
use crate::table::Row;

use super::loader::ByteSource;
use super::source::{Dialect, Resource, Source};

/// A lazy sequence of raw cell records. The first error ends the stream.
pub type DataStream = Box<dyn Iterator<Item = Result<Vec<String>>> + Send>;

/// Decodes records from a resource.
pub trait Parser: Send {
    /// Whether `open` needs a byte source from a loader.
    fn requires_loader(&self) -> bool;

    fn open(&mut self, resource: &Resource, source: Option<ByteSource>) -> Result<()>;

    /// The record stream. Can be taken once per open.
    fn data_stream(&mut self) -> Result<DataStream>;

    /// The dialect as resolved on open (sniffed delimiter, keyed mode).
    fn dialect(&self) -> Option<Dialect> {
        None
    }

    /// Release the byte source and its loader.
    fn close(&mut self) {}
}

/// Stop after the first error so later records are never misread.
fn terminal<I>(records: I) -> DataStream
where
    I: Iterator<Item = Result<Vec<String>>> + Send + 'static,
{
    Box::new(records.scan(false, |failed, record| {
        if *failed {
            return None;
        }
        *failed = record.is_err();
        Some(record)
    }))
}

// =============================================================================
// DELIMITED TEXT
// =============================================================================

/// Delimiters to try when auto-detecting.
const DELIMITERS: &[u8] = &[b',', b'\t', b';', b'|'];

/// Parses delimited text with the csv crate.
#[derive(Default)]
pub struct CsvParser {
    source: Option<ByteSource>,
    dialect: Dialect,
}

impl CsvParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn delimiter(&self) -> u8 {
        single_byte(&self.dialect.delimiter).unwrap_or(b',')
    }
}

fn single_byte(value: &Option<String>) -> Option<u8> {
    value.as_ref().and_then(|v| v.bytes().next())
}

impl Parser for CsvParser {
    fn requires_loader(&self) -> bool {
        true
    }

    fn open(&mut self, resource: &Resource, source: Option<ByteSource>) -> Result<()> {
        let source = source.ok_or_else(|| {
            SieveError::new(ErrorCode::FormatError, "the csv parser requires a byte source")
        })?;
        if let Some(note) = resource.dialect.metadata_errors().into_iter().next() {
            return Err(SieveError::new(ErrorCode::DialectError, note));
        }
        let mut dialect = resource.dialect.clone();
        if dialect.delimiter.is_none() {
            let delimiter = if resource.format() == "tsv" {
                b'\t'
            } else {
                detect_delimiter(&source.sample_text())
            };
            dialect.delimiter = Some((delimiter as char).to_string());
        }
        self.dialect = dialect;
        self.source = Some(source);
        Ok(())
    }

    fn data_stream(&mut self) -> Result<DataStream> {
        let delimiter = self.delimiter();
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| SieveError::new(ErrorCode::FormatError, "csv parser is not open"))?;
        let text = source.text_stream()?;

        let mut builder = csv::ReaderBuilder::new();
        builder
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .quote(single_byte(&self.dialect.quote_char).unwrap_or(b'"'))
            .double_quote(self.dialect.double_quote.unwrap_or(true))
            .escape(single_byte(&self.dialect.escape_char))
            .comment(single_byte(&self.dialect.comment_char));
        let reader = builder.from_reader(text);

        let skip_initial_space = self.dialect.skip_initial_space;
        let records = reader.into_records().map(move |record| -> Result<Vec<String>> {
            let record = record.map_err(csv_error)?;
            Ok(record
                .iter()
                .map(|cell| {
                    if skip_initial_space {
                        cell.trim_start_matches(' ').to_string()
                    } else {
                        cell.to_string()
                    }
                })
                .collect())
        });
        Ok(terminal(records))
    }

    fn dialect(&self) -> Option<Dialect> {
        Some(self.dialect.clone())
    }

    fn close(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
        }
    }
}

impl Drop for CsvParser {
    fn drop(&mut self) {
        self.close();
    }
}

fn csv_error(error: csv::Error) -> SieveError {
    let code = match error.kind() {
        csv::ErrorKind::Io(e) if e.kind() == io::ErrorKind::InvalidData => ErrorCode::EncodingError,
        csv::ErrorKind::Utf8 { .. } => ErrorCode::EncodingError,
        _ => ErrorCode::FormatError,
    };
    SieveError::new(code, error.to_string())
}

/// Detect the delimiter from the first lines of a sample.
///
/// A delimiter seen the same number of times on every line wins over one
/// that is merely frequent.
pub fn detect_delimiter(sample: &str) -> u8 {
    let lines: Vec<&str> = sample
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(10)
        .collect();
    if lines.is_empty() {
        return b',';
    }

    let mut best_delimiter = b',';
    let mut best_score = 0;
    for &delimiter in DELIMITERS {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| count_delimiter_in_line(line, delimiter))
            .collect();
        let first = counts[0];
        if first == 0 {
            continue;
        }

        let mean = counts.iter().sum::<usize>() as f64 / counts.len() as f64;
        let variance = counts.iter().map(|&c| (c as f64 - mean).powi(2)).sum::<f64>()
            / counts.len() as f64;
        let score = if counts.iter().all(|&c| c == first) {
            first * 1000
        } else if variance < 1.0 {
            first * 100
        } else {
            first
        };
        if score > best_score {
            best_score = score;
            best_delimiter = delimiter;
        }
    }
    best_delimiter
}

/// Count delimiter occurrences in a line, respecting quotes.
fn count_delimiter_in_line(line: &str, delimiter: u8) -> usize {
    let delimiter = delimiter as char;
    let mut count = 0;
    let mut in_quotes = false;
    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => count += 1,
            _ => {}
        }
    }
    count
}

// =============================================================================
// INLINE ROWS
// =============================================================================

/// Reads in-memory rows: arrays of cells, or keyed objects.
///
/// Keyed rows yield a label record first, in `keys` order or the first
/// row's key order.
#[derive(Debug, Default)]
pub struct InlineParser {
    rows: Option<Vec<JsonValue>>,
    keys: Option<Vec<String>>,
    dialect: Dialect,
}

impl InlineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render rows as inline data: a label row plus arrays, or keyed objects.
    pub fn write_rows(labels: &[String], rows: &[Row], keyed: bool) -> Vec<JsonValue> {
        let mut data = Vec::with_capacity(rows.len() + 1);
        if !keyed {
            data.push(JsonValue::Array(
                labels.iter().cloned().map(JsonValue::String).collect(),
            ));
        }
        data.extend(rows.iter().map(|row| row.to_json(keyed)));
        data
    }
}

impl Parser for InlineParser {
    fn requires_loader(&self) -> bool {
        false
    }

    fn open(&mut self, resource: &Resource, _source: Option<ByteSource>) -> Result<()> {
        let Source::Inline(rows) = &resource.source else {
            return Err(SieveError::new(
                ErrorCode::FormatError,
                "the inline parser requires in-memory rows",
            ));
        };
        let mut dialect = resource.dialect.clone();
        let keyed = matches!(rows.first(), Some(JsonValue::Object(_)));
        dialect.keyed = Some(keyed);
        self.keys = match (&dialect.keys, rows.first()) {
            (Some(keys), _) if keyed => Some(keys.clone()),
            (None, Some(JsonValue::Object(first))) => Some(first.keys().cloned().collect()),
            _ => None,
        };
        self.dialect = dialect;
        self.rows = Some(rows.clone());
        Ok(())
    }

    fn data_stream(&mut self) -> Result<DataStream> {
        let rows = self
            .rows
            .take()
            .ok_or_else(|| SieveError::new(ErrorCode::FormatError, "inline parser is not open"))?;
        let records: DataStream = match self.keys.clone() {
            Some(keys) => {
                let labels = std::iter::once(Ok(keys.clone()));
                let cells = rows.into_iter().map(move |row| match row {
                    JsonValue::Object(map) => Ok(keyed_cells(&map, &keys)),
                    _ => Err(SieveError::new(
                        ErrorCode::FormatError,
                        "all inline rows must be keyed objects",
                    )),
                });
                Box::new(labels.chain(cells))
            }
            None => Box::new(rows.into_iter().map(|row| match row {
                JsonValue::Array(items) => Ok(items.iter().map(cell_text).collect()),
                _ => Err(SieveError::new(
                    ErrorCode::FormatError,
                    "all inline rows must be arrays",
                )),
            })),
        };
        Ok(terminal(records))
    }

    fn dialect(&self) -> Option<Dialect> {
        Some(self.dialect.clone())
    }

    fn close(&mut self) {
        self.rows = None;
    }
}

fn keyed_cells(map: &Map<String, JsonValue>, keys: &[String]) -> Vec<String> {
    keys.iter()
        .map(|key| map.get(key).map(cell_text).unwrap_or_default())
        .collect()
}

fn cell_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::inference::Detector;
    use crate::input::BufferLoader;

    fn records(parser: &mut dyn Parser) -> Vec<Vec<String>> {
        parser.data_stream().unwrap().map(|r| r.unwrap()).collect()
    }

    fn open_csv(bytes: &[u8], resource: Resource) -> CsvParser {
        let resource = Resource { source: Source::Bytes(bytes.to_vec()), ..resource };
        let source = ByteSource::open(Box::new(BufferLoader::default()), &resource, &Detector::default())
            .unwrap();
        let mut parser = CsvParser::new();
        parser.open(&resource, Some(source)).unwrap();
        parser
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a,b,c\n1,2,3\n4,5,6"), b',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), b'\t');
        assert_eq!(detect_delimiter("a;b\n\"x;y\";2"), b';');
        assert_eq!(detect_delimiter(""), b',');
    }

    #[test]
    fn test_csv_records_and_sniffed_dialect() {
        let mut parser = open_csv(b"id;name\n1;\"a;b\"\n", Resource::from_bytes(Vec::new()));
        assert_eq!(parser.dialect().unwrap().delimiter.as_deref(), Some(";"));
        assert_eq!(
            records(&mut parser),
            vec![vec!["id", "name"], vec!["1", "a;b"]]
        );
    }

    #[test]
    fn test_csv_encoding_error_is_terminal() {
        let resource = Resource::from_bytes(Vec::new()).with_encoding("utf-8");
        let mut bytes = b"id\n1\n".to_vec();
        bytes.extend_from_slice(&[0xFF, 0xFE, b'\n', b'2', b'\n']);
        let mut parser = open_csv(&bytes, resource);
        let results: Vec<_> = parser.data_stream().unwrap().collect();
        let last = results.last().unwrap().as_ref().unwrap_err();
        assert_eq!(last.code(), ErrorCode::EncodingError);
        assert!(results.len() <= 3);
    }

    #[test]
    fn test_inline_arrays() {
        let resource = Resource::from_inline(vec![json!(["id", "name"]), json!([1, null]), json!([2.5, true])]);
        let mut parser = InlineParser::new();
        parser.open(&resource, None).unwrap();
        assert_eq!(parser.dialect().unwrap().keyed, Some(false));
        assert_eq!(
            records(&mut parser),
            vec![vec!["id", "name"], vec!["1", ""], vec!["2.5", "true"]]
        );
    }

    #[test]
    fn test_inline_keyed_order_is_preserved() {
        let resource = Resource::from_inline(vec![
            json!({"name": "english", "id": "1"}),
            json!({"name": "中国人", "id": "2"}),
        ]);
        let mut parser = InlineParser::new();
        parser.open(&resource, None).unwrap();
        assert_eq!(parser.dialect().unwrap().keyed, Some(true));
        assert_eq!(
            records(&mut parser),
            vec![vec!["name", "id"], vec!["english", "1"], vec!["中国人", "2"]]
        );
    }

    #[test]
    fn test_inline_keys_option() {
        let resource = Resource::from_inline(vec![json!({"id": "1", "name": "english"})])
            .with_dialect(Dialect::default().with_keys(vec!["name".into(), "id".into()]));
        let mut parser = InlineParser::new();
        parser.open(&resource, None).unwrap();
        assert_eq!(records(&mut parser), vec![vec!["name", "id"], vec!["english", "1"]]);
    }
}
