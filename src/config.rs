//! Comparison and source configuration

use crate::error::{Result, StatediffError};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// How rows are pulled from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Paged retrieval bounded by the batch size
    #[default]
    Batched,
    /// One query per table, whole table held in memory
    Full,
}

impl FetchMode {
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s.to_lowercase().as_str() {
            "batched" => Ok(Self::Batched),
            "full" | "fast" => Ok(Self::Full),
            _ => Err(format!("Invalid fetch mode: {}. Use 'batched' or 'full'", s)),
        }
    }
}

/// Which tables a fetch covers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<Vec<String>>", into = "Option<Vec<String>>")]
pub enum TableSelection {
    /// Everything the source enumerates, in its order
    #[default]
    All,
    /// Exactly these tables, in this order
    Only(Vec<String>),
}

impl From<Option<Vec<String>>> for TableSelection {
    fn from(tables: Option<Vec<String>>) -> Self {
        match tables {
            Some(tables) if !tables.is_empty() => Self::Only(tables),
            _ => Self::All,
        }
    }
}

impl From<TableSelection> for Option<Vec<String>> {
    fn from(selection: TableSelection) -> Self {
        match selection {
            TableSelection::All => None,
            TableSelection::Only(tables) => Some(tables),
        }
    }
}

/// What to do when two rows of one fetch share a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateKeyPolicy {
    /// Later row replaces the earlier one
    #[default]
    Overwrite,
    /// Abort the fetch with a duplicate key error
    Reject,
}

impl DuplicateKeyPolicy {
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s.to_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("Invalid duplicate key policy: {}. Use 'overwrite' or 'reject'", s)),
        }
    }
}

/// What to do when a row has a different number of columns in the two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaDriftPolicy {
    /// Compare up to the shorter row and ignore the trailing cells
    #[default]
    Truncate,
    /// Abort the comparison with a schema drift error
    Reject,
}

impl SchemaDriftPolicy {
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s.to_lowercase().as_str() {
            "truncate" => Ok(Self::Truncate),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("Invalid schema drift policy: {}. Use 'truncate' or 'reject'", s)),
        }
    }
}

/// Settings for a comparison session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    pub batch_size: usize,
    pub mode: FetchMode,
    pub tables: TableSelection,
    pub duplicate_keys: DuplicateKeyPolicy,
    pub schema_drift: SchemaDriftPolicy,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::DEFAULT_BATCH_SIZE,
            mode: FetchMode::default(),
            tables: TableSelection::default(),
            duplicate_keys: DuplicateKeyPolicy::default(),
            schema_drift: SchemaDriftPolicy::default(),
        }
    }
}

impl CompareConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(StatediffError::config("Batch size must be greater than 0"));
        }
        if let TableSelection::Only(tables) = &self.tables {
            if tables.iter().any(|t| t.trim().is_empty()) {
                return Err(StatediffError::config("Table selection contains an empty name"));
            }
        }
        Ok(())
    }
}

/// Where a DuckDB-backed source reads from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// DuckDB database file; in-memory when absent
    pub database: Option<PathBuf>,
    /// `ATTACH '...' AS name (TYPE ...)` statement for an external database
    pub attach: Option<String>,
}

impl SourceConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            database: Some(path.into()),
            attach: None,
        }
    }

    /// The attach statement with environment placeholders resolved
    pub fn resolved_attach(&self) -> Result<Option<String>> {
        self.attach.as_deref().map(substitute_env_vars).transpose()
    }
}

/// Substitute `{VAR_NAME}` placeholders with environment variable values
pub fn substitute_env_vars(connection_string: &str) -> Result<String> {
    let mut result = connection_string.to_string();

    let mut start = 0;
    while let Some(open_pos) = result[start..].find('{') {
        let open_pos = start + open_pos;
        if let Some(close_pos) = result[open_pos..].find('}') {
            let close_pos = open_pos + close_pos;
            let var_name = &result[open_pos + 1..close_pos];

            let var_value = env::var(var_name).map_err(|_| {
                StatediffError::config(format!(
                    "Environment variable '{}' not found. Make sure it's set in your .env file or environment.",
                    var_name
                ))
            })?;

            result.replace_range(open_pos..=close_pos, &var_value);
            start = open_pos + var_value.len();
        } else {
            start = open_pos + 1;
        }
    }

    Ok(result)
}

/// Load environment variables from a .env file in the current directory, if any
pub fn load_env_file() -> Result<()> {
    if Path::new(".env").exists() {
        dotenvy::dotenv()
            .map_err(|e| StatediffError::config(format!("Failed to load .env file: {}", e)))?;
    }

    Ok(())
}
