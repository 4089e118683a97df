//! Opened tables: header binding, row casting and row streaming.

mod header;
mod row;
mod stream;

pub use header::Header;
pub use row::Row;
pub use stream::{RowStream, Table};
