//! # statediff
//!
//! Capture a point-in-time snapshot of database tables, let something change
//! the data, capture again and report every changed cell.
//!
//! The [`ComparisonSession`] drives the fetch-fetch-compare cycle on a
//! background worker; [`SnapshotFetcher`] and [`DiffEngine`] can also be used
//! directly against any [`RowSource`].

pub mod cache;
pub mod cancel;
pub mod cli;
pub mod commands;
pub mod config;
pub mod diff;
pub mod duckdb_source;
pub mod error;
pub mod fetcher;
pub mod output;
pub mod progress;
pub mod session;
pub mod snapshot;
pub mod source;
pub mod value;

pub use cache::ColumnCache;
pub use cancel::CancelToken;
pub use config::{CompareConfig, DuplicateKeyPolicy, FetchMode, SchemaDriftPolicy, SourceConfig, TableSelection};
pub use diff::{ChangeKind, DiffEngine, DiffSummary, Difference, Traversal};
pub use duckdb_source::DuckDbSource;
pub use error::{Outcome, Result, StatediffError};
pub use fetcher::{FetchContext, SnapshotFetcher};
pub use progress::{ProgressCallback, ProgressUpdate};
pub use session::{CompletionCallback, ComparisonSession, IdleState, RunCompletion, RunHandle, RunKind, SessionState};
pub use snapshot::{Snapshot, TableSnapshot};
pub use source::{MemorySource, RowSource};
pub use value::{Row, Value};

/// Default number of rows per page in batched mode
pub const DEFAULT_BATCH_SIZE: usize = 1000;
