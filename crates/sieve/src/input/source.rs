//! Resource description: where data comes from and how to read it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Result, SieveError};
use crate::inference::Detector;
use crate::registry::Registry;
use crate::report::{ErrorCode, ResourceSummary};
use crate::schema::Schema;
use crate::table::{Header, Row, Table};

use super::layout::Layout;

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

/// Where the bytes or rows of a resource live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// A local file.
    Path(PathBuf),
    /// In-memory bytes, serialized as base64.
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
    /// In-memory rows: arrays of cells, or keyed objects.
    #[serde(rename = "data")]
    Inline(Vec<JsonValue>),
}

impl Source {
    /// Scheme of the loader able to read this source.
    pub fn default_scheme(&self) -> &'static str {
        match self {
            Source::Path(_) => "file",
            Source::Bytes(_) => "buffer",
            Source::Inline(_) => "",
        }
    }

    /// Format implied by the source. A `.gz` suffix is looked through.
    pub fn default_format(&self) -> String {
        match self {
            Source::Path(path) => match inner_path(path).extension().and_then(|e| e.to_str()) {
                Some(ext) if ext.eq_ignore_ascii_case("tsv") || ext.eq_ignore_ascii_case("tab") => {
                    "tsv".to_string()
                }
                Some(ext) if ext.eq_ignore_ascii_case("txt") => "csv".to_string(),
                Some(ext) => ext.to_ascii_lowercase(),
                None => "csv".to_string(),
            },
            Source::Bytes(_) => "csv".to_string(),
            Source::Inline(_) => "inline".to_string(),
        }
    }

    /// Compression implied by the source: `gz` for `.gz` paths.
    pub fn default_compression(&self) -> Option<String> {
        match self {
            Source::Path(path) if is_gzip_path(path) => Some("gz".to_string()),
            _ => None,
        }
    }
}

fn is_gzip_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// `data.csv.gz` reads as `data.csv`.
fn inner_path(path: &Path) -> &Path {
    match path.file_stem() {
        Some(stem) if is_gzip_path(path) => Path::new(stem),
        _ => path,
    }
}

/// Format-specific structural parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dialect {
    /// Single-character delimiter; sniffed from the sample when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_char: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub double_quote: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escape_char: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_char: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip_initial_space: bool,
    /// Key order for keyed inline rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
    /// Whether inline rows are keyed objects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyed: Option<bool>,
}

impl Dialect {
    pub fn is_default(&self) -> bool {
        *self == Dialect::default()
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    pub fn with_keys(mut self, keys: Vec<String>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_keyed(mut self, keyed: bool) -> Self {
        self.keyed = Some(keyed);
        self
    }

    /// Problems with the dialect descriptor.
    pub fn metadata_errors(&self) -> Vec<String> {
        let single = [
            ("delimiter", &self.delimiter),
            ("quoteChar", &self.quote_char),
            ("escapeChar", &self.escape_char),
            ("commentChar", &self.comment_char),
        ];
        single
            .iter()
            .filter_map(|(name, value)| {
                value
                    .as_ref()
                    .filter(|v| v.len() != 1)
                    .map(|v| format!("\"{}\" must be a single ASCII character, got \"{}\"", name, v))
            })
            .collect()
    }
}

/// Statistics a resource is expected to match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpectedStats {
    /// SHA-256 hex digest, optionally prefixed with `sha256:`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
}

impl ExpectedStats {
    pub fn is_empty(&self) -> bool {
        *self == ExpectedStats::default()
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = Some(bytes);
        self
    }

    pub fn with_fields(mut self, fields: usize) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = Some(rows);
        self
    }
}

/// One described, streamable data source plus its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub source: Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
    #[serde(default, skip_serializing_if = "Dialect::is_default")]
    pub dialect: Dialect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    #[serde(default, skip_serializing_if = "ExpectedStats::is_empty")]
    pub stats: ExpectedStats,
    /// Inference settings used when the resource is opened.
    #[serde(skip)]
    pub detector: Detector,
}

impl Resource {
    /// Create a resource over any source.
    pub fn new(source: Source) -> Self {
        let name = match &source {
            Source::Path(path) => inner_path(path)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".to_string()),
            Source::Bytes(_) => "memory".to_string(),
            Source::Inline(_) => "inline".to_string(),
        };
        Self {
            name,
            source,
            scheme: None,
            format: None,
            encoding: None,
            compression: None,
            dialect: Dialect::default(),
            layout: None,
            schema: None,
            stats: ExpectedStats::default(),
            detector: Detector::default(),
        }
    }

    /// A resource reading a local file.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self::new(Source::Path(path.as_ref().to_path_buf()))
    }

    /// A resource reading in-memory bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(Source::Bytes(bytes.into()))
    }

    /// A resource over in-memory rows.
    pub fn from_inline(rows: Vec<JsonValue>) -> Self {
        Self::new(Source::Inline(rows))
    }

    /// Load a resource descriptor from JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| SieveError::new(ErrorCode::ResourceError, e.to_string()))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn with_compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_stats(mut self, stats: ExpectedStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_detector(mut self, detector: Detector) -> Self {
        self.detector = detector;
        self
    }

    /// Resolved scheme: explicit, or implied by the source.
    pub fn scheme(&self) -> String {
        self.scheme
            .clone()
            .unwrap_or_else(|| self.source.default_scheme().to_string())
    }

    /// Resolved format: explicit, or implied by the source.
    pub fn format(&self) -> String {
        self.format
            .clone()
            .unwrap_or_else(|| self.source.default_format())
    }

    /// Resolved compression: explicit, or implied by the source.
    pub fn compression(&self) -> Option<String> {
        self.compression
            .clone()
            .or_else(|| self.source.default_compression())
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            Source::Path(path) => Some(path),
            _ => None,
        }
    }

    /// Identification used in report tasks.
    pub fn summary(&self) -> ResourceSummary {
        ResourceSummary {
            name: self.name.clone(),
            path: self.path().map(|p| p.display().to_string()),
            scheme: self.scheme(),
            format: self.format(),
            encoding: self.encoding.clone(),
        }
    }

    /// Open the resource for row streaming.
    pub fn open(&self, registry: &Registry) -> Result<Table> {
        Table::open(self.clone(), registry, true)
    }

    /// Infer encoding, dialect, layout and schema without reading past the sample.
    pub fn describe(&self, registry: &Registry) -> Result<Resource> {
        let mut table = self.open(registry)?;
        let described = table.resource().clone();
        table.close();
        Ok(described)
    }

    /// Read the header only.
    pub fn read_header(&self, registry: &Registry) -> Result<Header> {
        let mut table = self.open(registry)?;
        let header = table.header().clone();
        table.close();
        Ok(header)
    }

    /// Read every row into memory.
    pub fn read_rows(&self, registry: &Registry) -> Result<Vec<Row>> {
        let mut table = self.open(registry)?;
        let rows = table.rows().collect::<Result<Vec<_>>>();
        table.close();
        rows
    }
}
