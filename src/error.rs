//! Error types for statediff operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StatediffError>;

#[derive(Error, Debug)]
pub enum StatediffError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("Cannot reach data source: {message}")]
    Connectivity { message: String },

    #[error("Query failed for table '{table}': {message}")]
    Query { table: String, message: String },

    #[error("No baseline snapshot: fetch the initial state first")]
    NoBaseline,

    #[error("Another fetch or comparison is already running")]
    Busy,

    #[error("Operation cancelled by user")]
    Cancelled,

    #[error("Duplicate row key '{key}' in table '{table}'")]
    DuplicateKey { table: String, key: String },

    #[error("Row '{key}' in table '{table}' has {initial_len} columns initially but {current_len} now")]
    SchemaDrift {
        table: String,
        key: String,
        initial_len: usize,
        current_len: usize,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl StatediffError {
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity {
            message: msg.into(),
        }
    }

    pub fn query(table: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Query {
            table: table.into(),
            message: msg.into(),
        }
    }

    pub fn duplicate_key(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::DuplicateKey {
            table: table.into(),
            key: key.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Table named by the error, when the failure is tied to one
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Query { table, .. }
            | Self::DuplicateKey { table, .. }
            | Self::SchemaDrift { table, .. } => Some(table),
            _ => None,
        }
    }
}

/// Terminal result of a long-running operation that did not fail.
///
/// Cancellation is kept apart from both success and failure so that an
/// aborted run can never be mistaken for "nothing changed".
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Completed(T),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Cancelled => None,
        }
    }

    /// Collapse into a plain result, turning cancellation into [`StatediffError::Cancelled`]
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Cancelled => Err(StatediffError::Cancelled),
        }
    }
}
