//! Per-session column metadata cache

use crate::error::Result;
use crate::source::RowSource;
use std::collections::HashMap;
use std::sync::Mutex;

/// Column names per table, resolved once and reused until invalidated.
///
/// Owned by a comparison session; dropped or invalidated together with the
/// source it was filled from.
#[derive(Debug, Default)]
pub struct ColumnCache {
    entries: Mutex<HashMap<String, Vec<String>>>,
}

impl ColumnCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached columns for `table`, querying the source on a miss
    pub fn columns(&self, source: &dyn RowSource, table: &str) -> Result<Vec<String>> {
        if let Some(columns) = self.get(table) {
            return Ok(columns);
        }

        let columns = source.get_columns(table)?;
        log::debug!("Cached {} columns for table '{}'", columns.len(), table);
        self.lock().insert(table.to_string(), columns.clone());
        Ok(columns)
    }

    pub fn get(&self, table: &str) -> Option<Vec<String>> {
        self.lock().get(table).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget everything; the next lookup goes back to the source
    pub fn invalidate(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<String>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
