//! Point-in-time keyed table captures

use crate::config::FetchMode;
use crate::value::{row_key, Row};
use blake3::Hasher;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use uuid::Uuid;

/// Rows of one table keyed by the canonical value of their first column
pub type RowState = IndexMap<String, Row>;

/// Columns and rows of a single table within a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableSnapshot {
    pub columns: Vec<String>,
    pub rows: RowState,
}

impl TableSnapshot {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: RowState::new(),
        }
    }

    /// Store a row under its key, returning the row it replaced
    pub fn insert_row(&mut self, row: Row) -> Option<Row> {
        self.rows.insert(row_key(&row), row)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Order-independent digest of the table's canonical content.
    ///
    /// Equal for any two captures holding the same columns and the same
    /// keyed rows, regardless of the order rows arrived in.
    pub fn fingerprint(&self) -> String {
        let mut row_digests: Vec<[u8; 32]> = self
            .rows
            .iter()
            .map(|(key, row)| {
                let mut hasher = Hasher::new();
                hash_field(&mut hasher, key.as_bytes());
                hasher.update(&(row.len() as u64).to_le_bytes());
                for value in row {
                    hash_field(&mut hasher, value.canonical().as_bytes());
                }
                *hasher.finalize().as_bytes()
            })
            .collect();
        row_digests.sort_unstable();

        let mut hasher = Hasher::new();
        hasher.update(&(self.columns.len() as u64).to_le_bytes());
        for column in &self.columns {
            hash_field(&mut hasher, column.as_bytes());
        }
        for digest in &row_digests {
            hasher.update(digest);
        }
        hasher.finalize().to_hex().to_string()
    }
}

// Length-prefixed so field boundaries cannot shift between captures
fn hash_field(hasher: &mut Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Keyed capture of one or more tables at a moment in time
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub mode: FetchMode,
    tables: IndexMap<String, TableSnapshot>,
}

impl Snapshot {
    pub fn new(mode: FetchMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            captured_at: Utc::now(),
            mode,
            tables: IndexMap::new(),
        }
    }

    /// Add a table built from `rows`, later rows replacing earlier ones on key collision
    pub fn with_table(mut self, name: &str, columns: &[&str], rows: Vec<Row>) -> Self {
        let mut table = TableSnapshot::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            table.insert_row(row);
        }
        self.insert_table(name, table);
        self
    }

    pub fn insert_table(&mut self, name: &str, table: TableSnapshot) {
        self.tables.insert(name.to_string(), table);
    }

    pub fn table(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.get(name)
    }

    /// Columns recorded for `name`, if the table was captured
    pub fn columns(&self, name: &str) -> Option<&[String]> {
        self.tables.get(name).map(|t| t.columns.as_slice())
    }

    pub fn tables(&self) -> impl Iterator<Item = (&String, &TableSnapshot)> {
        self.tables.iter()
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn row_count(&self) -> usize {
        self.tables.values().map(TableSnapshot::row_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// True when both snapshots hold the same tables with the same content,
    /// ignoring capture metadata
    pub fn same_content(&self, other: &Snapshot) -> bool {
        self.tables.len() == other.tables.len()
            && self.tables.iter().all(|(name, table)| {
                other
                    .tables
                    .get(name)
                    .map(|t| t.fingerprint() == table.fingerprint())
                    .unwrap_or(false)
            })
    }
}
