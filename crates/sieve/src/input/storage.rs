//! Bulk import and export between named datasets and resources.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{Result, SieveError};
use crate::report::ErrorCode;
use crate::schema::Schema;
use crate::table::Table;

use super::source::Resource;

/// Maps named external datasets to resources.
pub trait Storage {
    /// Dataset names, in insertion order.
    fn names(&self) -> Vec<String>;

    /// Describe a stored dataset as a resource.
    fn read(&self, name: &str) -> Result<Resource>;

    /// Drain an open table into a named dataset, replacing any previous one.
    fn write(&mut self, name: &str, table: &mut Table) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredTable {
    schema: Schema,
    data: Vec<JsonValue>,
}

/// Keeps datasets in memory as encoded inline rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    tables: IndexMap<String, StoredTable>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.tables.shift_remove(name).is_some()
    }
}

impl Storage for MemoryStorage {
    fn names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    fn read(&self, name: &str) -> Result<Resource> {
        let stored = self.tables.get(name).ok_or_else(|| {
            SieveError::new(
                ErrorCode::ResourceError,
                format!("dataset \"{}\" does not exist", name),
            )
        })?;
        Ok(Resource::from_inline(stored.data.clone())
            .with_name(name)
            .with_schema(stored.schema.clone()))
    }

    fn write(&mut self, name: &str, table: &mut Table) -> Result<()> {
        let schema = table.schema().clone();
        let mut data = vec![JsonValue::Array(
            schema
                .field_names()
                .into_iter()
                .map(|n| JsonValue::String(n.to_string()))
                .collect(),
        )];
        for row in table.rows() {
            let row = row?;
            let cells = schema
                .write_cells(row.values())
                .into_iter()
                .map(|(raw, _)| JsonValue::String(raw))
                .collect();
            data.push(JsonValue::Array(cells));
        }
        debug!(dataset = name, rows = data.len() - 1, "stored table");
        self.tables.insert(name.to_string(), StoredTable { schema, data });
        Ok(())
    }
}
