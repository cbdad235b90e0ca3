//! Row source abstraction and an in-process implementation

use crate::error::{Result, StatediffError};
use crate::value::Row;
use indexmap::IndexMap;
use std::sync::RwLock;

/// Access to the tables of a data source.
///
/// Every call may fail with a connectivity or query error; callers treat any
/// failure as fatal to the operation in progress.
pub trait RowSource: Send + Sync {
    /// Table names in the source's enumeration order
    fn list_tables(&self) -> Result<Vec<String>>;

    /// Column names of a table, in order
    fn get_columns(&self, table: &str) -> Result<Vec<String>>;

    fn count_rows(&self, table: &str) -> Result<u64>;

    /// One page of rows, in a stable order across calls
    fn fetch_rows(&self, table: &str, offset: u64, limit: usize) -> Result<Vec<Row>>;

    fn fetch_all_rows(&self, table: &str) -> Result<Vec<Row>>;
}

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<String>,
    rows: Vec<Row>,
}

/// Row source backed by tables held in memory.
///
/// Tables can be replaced between fetches, which makes it convenient for
/// embedding and for exercising the comparison pipeline without a database.
#[derive(Debug, Default)]
pub struct MemorySource {
    tables: RwLock<IndexMap<String, MemoryTable>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`MemorySource::put_table`]
    pub fn with_table(self, name: &str, columns: &[&str], rows: Vec<Row>) -> Self {
        self.put_table(name, columns, rows);
        self
    }

    /// Create or replace a table
    pub fn put_table(&self, name: &str, columns: &[&str], rows: Vec<Row>) {
        let table = MemoryTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        };
        self.write().insert(name.to_string(), table);
    }

    /// Replace the rows of an existing table, keeping its columns
    pub fn set_rows(&self, name: &str, rows: Vec<Row>) -> Result<()> {
        let mut tables = self.write();
        let table = tables
            .get_mut(name)
            .ok_or_else(|| StatediffError::query(name, "table does not exist"))?;
        table.rows = rows;
        Ok(())
    }

    pub fn drop_table(&self, name: &str) -> bool {
        self.write().shift_remove(name).is_some()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<String, MemoryTable>> {
        self.tables.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IndexMap<String, MemoryTable>> {
        self.tables.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_table_ref<T>(&self, name: &str, f: impl FnOnce(&MemoryTable) -> T) -> Result<T> {
        let tables = self.read();
        tables
            .get(name)
            .map(f)
            .ok_or_else(|| StatediffError::query(name, "table does not exist"))
    }
}

impl RowSource for MemorySource {
    fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.read().keys().cloned().collect())
    }

    fn get_columns(&self, table: &str) -> Result<Vec<String>> {
        self.with_table_ref(table, |t| t.columns.clone())
    }

    fn count_rows(&self, table: &str) -> Result<u64> {
        self.with_table_ref(table, |t| t.rows.len() as u64)
    }

    fn fetch_rows(&self, table: &str, offset: u64, limit: usize) -> Result<Vec<Row>> {
        self.with_table_ref(table, |t| {
            t.rows
                .iter()
                .skip(offset as usize)
                .take(limit)
                .cloned()
                .collect()
        })
    }

    fn fetch_all_rows(&self, table: &str) -> Result<Vec<Row>> {
        self.with_table_ref(table, |t| t.rows.clone())
    }
}
