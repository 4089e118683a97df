//! Input pipeline: resources, loaders, parsers, layouts and storage.

mod layout;
mod loader;
mod parser;
mod source;
mod storage;

pub use layout::{BLANK, Layout, Selector};
pub use loader::{BufferLoader, ByteSource, ByteStats, FileLoader, Loader, TextStream, normalize_encoding};
pub use parser::{CsvParser, DataStream, InlineParser, Parser, detect_delimiter};
pub use source::{Dialect, ExpectedStats, Resource, Source};
pub use storage::{MemoryStorage, Storage};
