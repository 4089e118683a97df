//! Byte acquisition: loaders, the counted byte stream, and text decoding.

use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use encoding_rs::{DecoderResult, Encoding, UTF_8};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Result, SieveError};
use crate::inference::Detector;
use crate::report::ErrorCode;

use super::source::{Resource, Source};

/// Acquires the raw bytes of a resource.
pub trait Loader: Send {
    /// Bind to a resource; fails when the source is unreachable.
    fn open(&mut self, resource: &Resource) -> Result<()>;

    /// A fresh reader over the raw bytes.
    fn read_byte_stream(&mut self) -> Result<Box<dyn Read + Send>>;

    /// Release any held handle.
    fn close(&mut self) {}
}

// =============================================================================
// REFERENCE LOADERS
// =============================================================================

/// Reads a local file.
#[derive(Debug, Default)]
pub struct FileLoader {
    path: Option<PathBuf>,
}

impl Loader for FileLoader {
    fn open(&mut self, resource: &Resource) -> Result<()> {
        let Source::Path(path) = &resource.source else {
            return Err(SieveError::new(
                ErrorCode::SchemeError,
                "the file loader requires a path source",
            ));
        };
        if !path.is_file() {
            return Err(SieveError::new(
                ErrorCode::SchemeError,
                format!("file \"{}\" does not exist", path.display()),
            ));
        }
        self.path = Some(path.clone());
        Ok(())
    }

    fn read_byte_stream(&mut self) -> Result<Box<dyn Read + Send>> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| SieveError::new(ErrorCode::SchemeError, "file loader is not open"))?;
        let file = File::open(&path).map_err(|e| SieveError::Io { path, source: e })?;
        Ok(Box::new(file))
    }

    fn close(&mut self) {
        self.path = None;
    }
}

/// Reads in-memory bytes.
#[derive(Debug, Default)]
pub struct BufferLoader {
    bytes: Option<Arc<[u8]>>,
}

impl Loader for BufferLoader {
    fn open(&mut self, resource: &Resource) -> Result<()> {
        let Source::Bytes(bytes) = &resource.source else {
            return Err(SieveError::new(
                ErrorCode::SchemeError,
                "the buffer loader requires a bytes source",
            ));
        };
        self.bytes = Some(Arc::from(bytes.as_slice()));
        Ok(())
    }

    fn read_byte_stream(&mut self) -> Result<Box<dyn Read + Send>> {
        let bytes = self
            .bytes
            .clone()
            .ok_or_else(|| SieveError::new(ErrorCode::SchemeError, "buffer loader is not open"))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn close(&mut self) {
        self.bytes = None;
    }
}

// =============================================================================
// BYTE STATISTICS
// =============================================================================

#[derive(Debug, Clone, Default)]
struct ByteCounter {
    bytes: u64,
    hasher: Sha256,
}

/// Shared view of how many bytes have been read so far and their digest.
#[derive(Debug, Clone, Default)]
pub struct ByteStats {
    inner: Arc<Mutex<ByteCounter>>,
}

impl ByteStats {
    fn update(&self, chunk: &[u8]) {
        if let Ok(mut counter) = self.inner.lock() {
            counter.bytes += chunk.len() as u64;
            counter.hasher.update(chunk);
        }
    }

    /// Bytes read so far.
    pub fn bytes(&self) -> u64 {
        self.inner.lock().map(|c| c.bytes).unwrap_or(0)
    }

    /// SHA-256 hex digest of the bytes read so far.
    pub fn hash(&self) -> String {
        self.inner
            .lock()
            .map(|c| format!("{:x}", c.hasher.clone().finalize()))
            .unwrap_or_default()
    }
}

struct CountingReader {
    inner: Box<dyn Read + Send>,
    stats: ByteStats,
}

impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.stats.update(&buf[..n]);
        Ok(n)
    }
}

// =============================================================================
// BYTE SOURCE
// =============================================================================

/// Wrap the raw stream in the decoder for a declared compression.
fn decompress(raw: Box<dyn Read + Send>, compression: Option<&str>) -> Result<Box<dyn Read + Send>> {
    let Some(compression) = compression.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(raw);
    };
    match compression.to_ascii_lowercase().as_str() {
        "no" | "none" => Ok(raw),
        "gz" | "gzip" => Ok(Box::new(GzDecoder::new(raw))),
        other => Err(SieveError::new(
            ErrorCode::CompressionError,
            format!("compression \"{}\" is not supported", other),
        )),
    }
}

/// An opened loader: counted, hashed, decompressed, sampled and
/// encoding-resolved.
///
/// Byte counts and the hash cover the bytes as stored, before
/// decompression. Dropping the source closes its loader.
pub struct ByteSource {
    loader: Box<dyn Loader>,
    sample: Vec<u8>,
    encoding: String,
    stats: ByteStats,
    stream: Option<Box<dyn Read + Send>>,
}

impl ByteSource {
    /// Open `loader` over `resource`, buffering the first `buffer_size`
    /// decompressed bytes.
    pub fn open(
        mut loader: Box<dyn Loader>,
        resource: &Resource,
        detector: &Detector,
    ) -> Result<Self> {
        let encoding = match resource.encoding.as_deref() {
            Some(declared) => Some(normalize_encoding(declared).ok_or_else(|| {
                SieveError::new(
                    ErrorCode::EncodingError,
                    format!("encoding \"{}\" is not supported", declared),
                )
            })?),
            None => None,
        };
        loader.open(resource)?;

        let stats = ByteStats::default();
        let counted: Box<dyn Read + Send> = Box::new(CountingReader {
            inner: loader.read_byte_stream()?,
            stats: stats.clone(),
        });
        let compression = resource.compression();
        let mut raw = decompress(counted, compression.as_deref())?;

        let mut sample = Vec::with_capacity(detector.buffer_size);
        (&mut raw)
            .take(detector.buffer_size as u64)
            .read_to_end(&mut sample)
            .map_err(|e| {
                let code = match compression {
                    Some(_) => ErrorCode::CompressionError,
                    None => ErrorCode::SourceError,
                };
                SieveError::new(code, e.to_string())
            })?;

        let encoding = encoding.unwrap_or_else(|| detector.detect_encoding(&sample));
        debug!(bytes = sample.len(), encoding = %encoding, "sampled byte stream");

        let stream: Box<dyn Read + Send> = Box::new(Cursor::new(sample.clone()).chain(raw));
        Ok(Self {
            loader,
            sample,
            encoding,
            stats,
            stream: Some(stream),
        })
    }

    /// Resolved encoding name.
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// The buffered prefix of the decompressed bytes.
    pub fn sample(&self) -> &[u8] {
        &self.sample
    }

    /// The sample decoded as far as it is valid.
    pub fn sample_text(&self) -> String {
        let mut text = TextStream::new(Box::new(Cursor::new(self.sample.clone())), &self.encoding);
        let mut decoded = Vec::new();
        // A cut trailing sequence is expected in a sample.
        let _ = text.read_to_end(&mut decoded);
        String::from_utf8_lossy(&decoded).into_owned()
    }

    /// Handle to the live byte counters.
    pub fn stats(&self) -> ByteStats {
        self.stats.clone()
    }

    /// The decompressed byte stream. Can be taken once.
    pub fn byte_stream(&mut self) -> Result<Box<dyn Read + Send>> {
        self.stream
            .take()
            .ok_or_else(|| SieveError::new(ErrorCode::SourceError, "byte stream already consumed"))
    }

    /// The byte stream decoded to UTF-8. Can be taken once.
    pub fn text_stream(&mut self) -> Result<TextStream> {
        let bytes = self.byte_stream()?;
        Ok(TextStream::new(bytes, &self.encoding))
    }

    pub fn close(&mut self) {
        self.stream = None;
        self.loader.close();
    }
}

impl Drop for ByteSource {
    fn drop(&mut self) {
        self.close();
    }
}

// =============================================================================
// TEXT DECODING
// =============================================================================

/// Look up an encoding by label; `utf-8-sig` and `latin-1` are accepted
/// alongside the WHATWG labels.
fn resolve_encoding(name: &str) -> Option<&'static Encoding> {
    let label = name.trim().to_ascii_lowercase();
    let dashed = label.replace('_', "-");
    match dashed.as_str() {
        "utf-8-sig" | "utf8-sig" => Some(UTF_8),
        "latin-1" => Encoding::for_label(b"latin1"),
        _ => Encoding::for_label(label.as_bytes()).or_else(|| Encoding::for_label(dashed.as_bytes())),
    }
}

/// Canonical lowercase name of a supported encoding.
pub fn normalize_encoding(name: &str) -> Option<String> {
    let encoding = resolve_encoding(name)?;
    if encoding == UTF_8 && name.trim().to_ascii_lowercase().replace('_', "-").ends_with("-sig") {
        return Some("utf-8-sig".to_string());
    }
    Some(encoding.name().to_ascii_lowercase())
}

const CHUNK: usize = 8192;

/// A reader producing UTF-8 from bytes in another encoding.
///
/// A leading byte order mark is honored and removed. An invalid byte
/// sequence surfaces as an `InvalidData` I/O error after the valid prefix.
pub struct TextStream {
    inner: Box<dyn Read + Send>,
    encoding: &'static Encoding,
    decoder: encoding_rs::Decoder,
    out: String,
    pos: usize,
    offset: u64,
    eof: bool,
    failed: Option<String>,
}

impl TextStream {
    /// Unknown labels decode as UTF-8.
    pub fn new(inner: Box<dyn Read + Send>, encoding: &str) -> Self {
        let encoding = resolve_encoding(encoding).unwrap_or(UTF_8);
        Self {
            inner,
            encoding,
            decoder: encoding.new_decoder(),
            out: String::new(),
            pos: 0,
            offset: 0,
            eof: false,
            failed: None,
        }
    }

    /// Decode `input` into `out`, stopping at the first malformed sequence.
    fn decode(&mut self, mut input: &[u8], last: bool) {
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length_without_replacement(input.len())
                .unwrap_or(input.len().saturating_mul(3) + 16);
            self.out.reserve(needed);
            let (result, read) = self
                .decoder
                .decode_to_string_without_replacement(input, &mut self.out, last);
            self.offset += read as u64;
            input = &input[read..];
            match result {
                DecoderResult::InputEmpty => return,
                DecoderResult::OutputFull => continue,
                DecoderResult::Malformed(..) => {
                    self.failed = Some(format!(
                        "invalid {} byte sequence before byte {}",
                        self.encoding.name(),
                        self.offset
                    ));
                    return;
                }
            }
        }
    }
}

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

impl Read for TextStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.out.len() {
            if let Some(message) = self.failed.take() {
                self.eof = true;
                return Err(invalid(message));
            }
            if self.eof {
                return Ok(0);
            }
            self.out.clear();
            self.pos = 0;
            let mut chunk = [0u8; CHUNK];
            let n = self.inner.read(&mut chunk)?;
            if n == 0 {
                self.eof = true;
                self.decode(&[], true);
            } else {
                self.decode(&chunk[..n], false);
            }
        }
        let n = buf.len().min(self.out.len() - self.pos);
        buf[..n].copy_from_slice(&self.out.as_bytes()[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8], encoding: &str) -> io::Result<String> {
        let mut stream = TextStream::new(Box::new(Cursor::new(bytes.to_vec())), encoding);
        let mut text = String::new();
        stream.read_to_string(&mut text)?;
        Ok(text)
    }

    #[test]
    fn test_decodes_supported_encodings() {
        assert_eq!(decode("a,ü\n".as_bytes(), "utf-8").unwrap(), "a,ü\n");
        assert_eq!(decode(b"\xEF\xBB\xBFid", "utf-8-sig").unwrap(), "id");
        assert_eq!(decode(b"caf\xE9", "latin-1").unwrap(), "café");
        assert_eq!(decode(b"\xFF\xFEi\x00d\x00", "utf-16").unwrap(), "id");
        assert_eq!(decode(b"\x00i\x00d", "utf-16be").unwrap(), "id");
        assert_eq!(decode(b"\x80 5", "windows-1252").unwrap(), "\u{20ac} 5");
        assert_eq!(decode(b"\x82\xa0", "shift_jis").unwrap(), "\u{3042}");
    }

    #[test]
    fn test_normalize_encoding_labels() {
        assert_eq!(normalize_encoding("UTF8").as_deref(), Some("utf-8"));
        assert_eq!(normalize_encoding("utf_8_sig").as_deref(), Some("utf-8-sig"));
        assert_eq!(normalize_encoding("latin-1").as_deref(), Some("windows-1252"));
        assert_eq!(normalize_encoding("Shift_JIS").as_deref(), Some("shift_jis"));
        assert!(normalize_encoding("klingon").is_none());
    }

    #[test]
    fn test_invalid_sequence_is_an_error() {
        let err = decode(b"ok\xFF\xFEbad", "utf-8").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(decode(b"cut\xC3", "utf-8").is_err());
    }

    #[test]
    fn test_byte_source_counts_and_hashes() {
        let resource = Resource::from_bytes(b"id\n1\n".to_vec());
        let mut source =
            ByteSource::open(Box::new(BufferLoader::default()), &resource, &Detector::default())
                .unwrap();
        assert_eq!(source.encoding(), "utf-8");
        assert_eq!(source.sample_text(), "id\n1\n");

        let stats = source.stats();
        let mut text = String::new();
        source.text_stream().unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "id\n1\n");
        assert_eq!(stats.bytes(), 5);
        assert_eq!(stats.hash().len(), 64);
        assert!(source.byte_stream().is_err());
    }

    #[test]
    fn test_gzip_is_decompressed_and_counted_as_stored() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"id\n1\n2\n").unwrap();
        let compressed = encoder.finish().unwrap();
        let stored = compressed.len() as u64;

        let resource = Resource::from_bytes(compressed).with_compression("gz");
        let mut source =
            ByteSource::open(Box::new(BufferLoader::default()), &resource, &Detector::default())
                .unwrap();
        assert_eq!(source.sample(), b"id\n1\n2\n");
        let stats = source.stats();
        let mut text = String::new();
        source.text_stream().unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "id\n1\n2\n");
        assert_eq!(stats.bytes(), stored);
    }

    #[test]
    fn test_unsupported_compression_is_rejected() {
        let resource = Resource::from_bytes(b"id\n".to_vec()).with_compression("lzma");
        let err = ByteSource::open(Box::new(BufferLoader::default()), &resource, &Detector::default())
            .err()
            .unwrap();
        assert_eq!(err.code(), ErrorCode::CompressionError);

        let corrupt = Resource::from_bytes(b"not gzip".to_vec()).with_compression("gzip");
        let err = ByteSource::open(Box::new(BufferLoader::default()), &corrupt, &Detector::default())
            .err()
            .unwrap();
        assert_eq!(err.code(), ErrorCode::CompressionError);
    }

    #[test]
    fn test_missing_file_is_a_scheme_error() {
        let resource = Resource::from_path("/definitely/not/here.csv");
        let err = FileLoader::default().open(&resource).unwrap_err();
        assert_eq!(err.code(), ErrorCode::SchemeError);
    }
}
