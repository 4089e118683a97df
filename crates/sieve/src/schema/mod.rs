//! Schema types: typed fields, constraints, and table-level keys.

mod constraints;
mod field;
mod table;

pub use constraints::Constraints;
pub use field::{Field, Notes};
pub use table::{ForeignKey, ForeignKeyReference, Schema};
