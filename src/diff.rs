//! Cell-level comparison of two snapshots
//!
//! A single comparison core walks the keys of each table and emits one
//! [`Difference`] per changed cell. The [`Traversal`] only decides the order
//! keys are visited in, how often progress is reported and how often the
//! cancellation token is polled; classification and emission are shared, so
//! both traversals always produce the same set of differences.

use crate::cancel::CancelToken;
use crate::config::{CompareConfig, FetchMode, SchemaDriftPolicy};
use crate::error::{Outcome, Result, StatediffError};
use crate::progress::{report, ProgressCallback, ProgressUpdate};
use crate::snapshot::{RowState, Snapshot};
use crate::value::Row;
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Kind of change a cell went through between the two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
        }
    }
}

/// A single changed cell
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Difference {
    pub table: String,
    pub row_key: String,
    /// 1-based position of the column
    pub column_index: usize,
    pub column_name: String,
    /// Canonical value before, empty for added cells
    pub old_value: String,
    /// Canonical value after, empty for deleted cells
    pub new_value: String,
    pub change_kind: ChangeKind,
}

/// Order in which keys of a table are visited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Traversal {
    /// Deleted keys, then added keys, then common keys; paired with full fetches
    Grouped,
    /// One pass over the union of keys; paired with batched fetches
    #[default]
    Interleaved,
}

impl Traversal {
    pub fn for_mode(mode: FetchMode) -> Self {
        match mode {
            FetchMode::Full => Traversal::Grouped,
            FetchMode::Batched => Traversal::Interleaved,
        }
    }

    /// Keys processed between two cancellation polls
    pub fn poll_interval(self) -> usize {
        match self {
            Traversal::Grouped => 1000,
            Traversal::Interleaved => 100,
        }
    }

    fn parallel(self) -> bool {
        matches!(self, Traversal::Grouped)
    }

    fn phases<'a>(self, table: &str, initial: &'a RowState, current: &'a RowState) -> Vec<Phase<'a>> {
        match self {
            Traversal::Grouped => {
                let deleted = initial
                    .keys()
                    .filter(|k| !current.contains_key(*k))
                    .map(String::as_str)
                    .collect();
                let added = current
                    .keys()
                    .filter(|k| !initial.contains_key(*k))
                    .map(String::as_str)
                    .collect();
                let common = initial
                    .keys()
                    .filter(|k| current.contains_key(*k))
                    .map(String::as_str)
                    .collect();
                vec![
                    Phase {
                        message: format!("Processing deleted rows in {}...", table),
                        keys: deleted,
                        start: 0.25,
                        span: 0.0,
                    },
                    Phase {
                        message: format!("Processing added rows in {}...", table),
                        keys: added,
                        start: 0.5,
                        span: 0.0,
                    },
                    Phase {
                        message: format!("Processing modified rows in {}...", table),
                        keys: common,
                        start: 0.75,
                        span: 0.25,
                    },
                ]
            }
            Traversal::Interleaved => {
                let keys = initial
                    .keys()
                    .chain(current.keys().filter(|k| !initial.contains_key(*k)))
                    .map(String::as_str)
                    .collect();
                vec![Phase {
                    message: format!("Comparing {}...", table),
                    keys,
                    start: 0.0,
                    span: 1.0,
                }]
            }
        }
    }
}

/// A run of keys reported under one progress message
struct Phase<'a> {
    message: String,
    keys: Vec<&'a str>,
    start: f64,
    span: f64,
}

/// Column lookup used when neither snapshot recorded a table's columns
pub type ColumnFallback<'a> = &'a dyn Fn(&str) -> Result<Vec<String>>;

/// Compares two snapshots cell by cell
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    traversal: Traversal,
    schema_drift: SchemaDriftPolicy,
}

impl DiffEngine {
    pub fn new(traversal: Traversal) -> Self {
        Self {
            traversal,
            schema_drift: SchemaDriftPolicy::default(),
        }
    }

    pub fn from_config(config: &CompareConfig) -> Self {
        Self::new(Traversal::for_mode(config.mode)).with_schema_drift(config.schema_drift)
    }

    pub fn with_schema_drift(mut self, policy: SchemaDriftPolicy) -> Self {
        self.schema_drift = policy;
        self
    }

    pub fn traversal(&self) -> Traversal {
        self.traversal
    }

    /// Compare `initial` against `current`.
    ///
    /// Tables are visited in the initial snapshot's order followed by tables
    /// only present in the current one.
    pub fn compare(
        &self,
        initial: &Snapshot,
        current: &Snapshot,
        fallback: Option<ColumnFallback<'_>>,
        progress: Option<&ProgressCallback>,
        cancel: &CancelToken,
    ) -> Result<Outcome<Vec<Difference>>> {
        let mut tables: Vec<&str> = initial.table_names();
        tables.extend(
            current
                .table_names()
                .into_iter()
                .filter(|t| initial.table(t).is_none()),
        );
        let total_tables = tables.len();
        let empty = RowState::new();

        let mut differences = Vec::new();
        for (table_index, table) in tables.iter().copied().enumerate() {
            if cancel.is_cancelled() {
                log::info!("Comparison cancelled before table '{}'", table);
                return Ok(Outcome::Cancelled);
            }
            report(progress, || {
                ProgressUpdate::new(format!("Comparing {}...", table), table_index, total_tables)
            });

            let columns = resolve_columns(table, initial, current, fallback)?;
            let ctx = TableContext {
                table,
                columns: &columns,
                initial: initial.table(table).map(|t| &t.rows).unwrap_or(&empty),
                current: current.table(table).map(|t| &t.rows).unwrap_or(&empty),
                schema_drift: self.schema_drift,
                drifted: AtomicUsize::new(0),
            };

            let before = differences.len();
            if self
                .diff_table(&ctx, table_index, total_tables, progress, cancel, &mut differences)?
                .is_cancelled()
            {
                log::info!("Comparison cancelled in table '{}'", table);
                return Ok(Outcome::Cancelled);
            }

            let drifted = ctx.drifted.load(Ordering::Relaxed);
            if drifted > 0 {
                log::warn!(
                    "Table '{}': {} rows changed length between snapshots; compared up to the shorter row",
                    table,
                    drifted
                );
            }
            log::debug!("Table '{}': {} differences", table, differences.len() - before);
        }

        log::info!("Comparison found {} differences across {} tables", differences.len(), total_tables);
        Ok(Outcome::Completed(differences))
    }

    fn diff_table(
        &self,
        ctx: &TableContext<'_>,
        table_index: usize,
        total_tables: usize,
        progress: Option<&ProgressCallback>,
        cancel: &CancelToken,
        out: &mut Vec<Difference>,
    ) -> Result<Outcome<()>> {
        let interval = self.traversal.poll_interval();

        for phase in self.traversal.phases(ctx.table, ctx.initial, ctx.current) {
            if cancel.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }
            // a phase starting at zero is already announced by the table-level report
            if phase.start > 0.0 {
                report(progress, || {
                    ProgressUpdate::new(phase.message.clone(), table_index, total_tables).with_fraction(phase.start)
                });
            }

            let total_keys = phase.keys.len();
            for (chunk_index, chunk) in phase.keys.chunks(interval).enumerate() {
                if chunk_index > 0 {
                    if cancel.is_cancelled() {
                        return Ok(Outcome::Cancelled);
                    }
                    if phase.span > 0.0 {
                        let done = (chunk_index * interval) as f64 / total_keys as f64;
                        report(progress, || {
                            ProgressUpdate::new(phase.message.clone(), table_index, total_tables)
                                .with_fraction(phase.start + phase.span * done)
                        });
                    }
                }

                if self.traversal.parallel() {
                    let chunk_diffs: Vec<Vec<Difference>> =
                        chunk.par_iter().map(|key| ctx.diff_key(key)).collect::<Result<_>>()?;
                    out.extend(chunk_diffs.into_iter().flatten());
                } else {
                    for key in chunk {
                        out.extend(ctx.diff_key(key)?);
                    }
                }
            }
        }

        if self.traversal == Traversal::Grouped {
            report(progress, || {
                ProgressUpdate::new(format!("Compared {}", ctx.table), table_index, total_tables).with_fraction(1.0)
            });
        }
        Ok(Outcome::Completed(()))
    }
}

/// Columns of `table`: initial snapshot first, then current, then the fallback lookup
fn resolve_columns(
    table: &str,
    initial: &Snapshot,
    current: &Snapshot,
    fallback: Option<ColumnFallback<'_>>,
) -> Result<Vec<String>> {
    if let Some(columns) = initial.columns(table).filter(|c| !c.is_empty()) {
        return Ok(columns.to_vec());
    }
    if let Some(columns) = current.columns(table).filter(|c| !c.is_empty()) {
        return Ok(columns.to_vec());
    }
    match fallback {
        Some(lookup) => lookup(table),
        None => Ok(Vec::new()),
    }
}

/// Per-table inputs shared by every key comparison
struct TableContext<'a> {
    table: &'a str,
    columns: &'a [String],
    initial: &'a RowState,
    current: &'a RowState,
    schema_drift: SchemaDriftPolicy,
    drifted: AtomicUsize,
}

impl TableContext<'_> {
    /// Classify one key and emit its cell differences
    fn diff_key(&self, key: &str) -> Result<Vec<Difference>> {
        match (self.initial.get(key), self.current.get(key)) {
            (Some(row), None) => Ok(self.whole_row(key, row, ChangeKind::Deleted)),
            (None, Some(row)) => Ok(self.whole_row(key, row, ChangeKind::Added)),
            (Some(before), Some(after)) => self.changed_cells(key, before, after),
            (None, None) => Ok(Vec::new()),
        }
    }

    fn whole_row(&self, key: &str, row: &Row, kind: ChangeKind) -> Vec<Difference> {
        row.iter()
            .enumerate()
            .map(|(idx, value)| {
                let value = value.canonical();
                let (old_value, new_value) = match kind {
                    ChangeKind::Deleted => (value, String::new()),
                    _ => (String::new(), value),
                };
                self.difference(key, idx, old_value, new_value, kind)
            })
            .collect()
    }

    fn changed_cells(&self, key: &str, before: &Row, after: &Row) -> Result<Vec<Difference>> {
        if before.len() != after.len() {
            match self.schema_drift {
                SchemaDriftPolicy::Reject => {
                    return Err(StatediffError::SchemaDrift {
                        table: self.table.to_string(),
                        key: key.to_string(),
                        initial_len: before.len(),
                        current_len: after.len(),
                    });
                }
                SchemaDriftPolicy::Truncate => {
                    self.drifted.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        Ok(before
            .iter()
            .zip(after.iter())
            .enumerate()
            .filter_map(|(idx, (old, new))| {
                let old_value = old.canonical();
                let new_value = new.canonical();
                (old_value != new_value)
                    .then(|| self.difference(key, idx, old_value, new_value, ChangeKind::Modified))
            })
            .collect())
    }

    fn difference(&self, key: &str, idx: usize, old_value: String, new_value: String, kind: ChangeKind) -> Difference {
        Difference {
            table: self.table.to_string(),
            row_key: key.to_string(),
            column_index: idx + 1,
            column_name: self
                .columns
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("Column {}", idx + 1)),
            old_value,
            new_value,
            change_kind: kind,
        }
    }
}

/// Change counts for one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub added_cells: usize,
    pub modified_cells: usize,
    pub deleted_cells: usize,
    pub rows_changed: usize,
}

/// Change counts across a difference list, per table in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub tables: IndexMap<String, TableSummary>,
}

impl DiffSummary {
    pub fn from_differences(differences: &[Difference]) -> Self {
        let mut tables: IndexMap<String, TableSummary> = IndexMap::new();
        let mut rows_seen: HashSet<(&str, &str)> = HashSet::new();

        for diff in differences {
            let summary = tables.entry(diff.table.clone()).or_default();
            match diff.change_kind {
                ChangeKind::Added => summary.added_cells += 1,
                ChangeKind::Modified => summary.modified_cells += 1,
                ChangeKind::Deleted => summary.deleted_cells += 1,
            }
            if rows_seen.insert((diff.table.as_str(), diff.row_key.as_str())) {
                summary.rows_changed += 1;
            }
        }

        Self { tables }
    }

    pub fn total_cells(&self) -> usize {
        self.tables
            .values()
            .map(|t| t.added_cells + t.modified_cells + t.deleted_cells)
            .sum()
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(|t| t.rows_changed).sum()
    }

    pub fn has_changes(&self) -> bool {
        !self.tables.is_empty()
    }
}
