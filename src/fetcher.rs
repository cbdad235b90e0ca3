//! Snapshot acquisition from a row source

use crate::cache::ColumnCache;
use crate::cancel::CancelToken;
use crate::config::{CompareConfig, DuplicateKeyPolicy, FetchMode, TableSelection};
use crate::error::{Outcome, Result, StatediffError};
use crate::progress::{report, ProgressCallback, ProgressUpdate};
use crate::snapshot::{Snapshot, TableSnapshot};
use crate::source::RowSource;
use crate::value::Row;

/// Builds snapshots in batched or full mode.
///
/// Both modes produce identical table content for the same data; they only
/// trade memory against the number of round trips.
#[derive(Debug, Clone)]
pub struct SnapshotFetcher {
    batch_size: usize,
    mode: FetchMode,
    duplicate_keys: DuplicateKeyPolicy,
}

/// Everything a single fetch needs besides its own settings
pub struct FetchContext<'a> {
    pub source: &'a dyn RowSource,
    pub cache: &'a ColumnCache,
    pub progress: Option<&'a ProgressCallback>,
    pub cancel: &'a CancelToken,
}

impl SnapshotFetcher {
    pub fn new(batch_size: usize, mode: FetchMode) -> Self {
        Self {
            batch_size: batch_size.max(1),
            mode,
            duplicate_keys: DuplicateKeyPolicy::default(),
        }
    }

    pub fn from_config(config: &CompareConfig) -> Self {
        Self::new(config.batch_size, config.mode).with_duplicate_keys(config.duplicate_keys)
    }

    pub fn with_duplicate_keys(mut self, policy: DuplicateKeyPolicy) -> Self {
        self.duplicate_keys = policy;
        self
    }

    pub fn mode(&self) -> FetchMode {
        self.mode
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Capture the selected tables.
    ///
    /// Any source error aborts the whole fetch; no partial snapshot is
    /// returned. Cancellation yields [`Outcome::Cancelled`].
    pub fn fetch(&self, ctx: &FetchContext<'_>, selection: &TableSelection) -> Result<Outcome<Snapshot>> {
        let tables = match selection {
            TableSelection::All => ctx.source.list_tables()?,
            TableSelection::Only(tables) => tables.clone(),
        };
        let total_tables = tables.len();
        log::info!(
            "Fetching {} tables in {:?} mode (batch size {})",
            total_tables,
            self.mode,
            self.batch_size
        );

        let mut snapshot = Snapshot::new(self.mode);
        for (table_index, table) in tables.iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                log::info!("Fetch cancelled before table '{}'", table);
                return Ok(Outcome::Cancelled);
            }
            report(ctx.progress, || {
                ProgressUpdate::new(format!("Fetching {}...", table), table_index, total_tables)
            });

            let fetched = match self.mode {
                FetchMode::Batched => self.fetch_table_batched(ctx, table, table_index, total_tables)?,
                FetchMode::Full => self.fetch_table_full(ctx, table, table_index, total_tables)?,
            };
            match fetched {
                Outcome::Completed(table_snapshot) => {
                    log::debug!("Fetched {} rows from '{}'", table_snapshot.row_count(), table);
                    snapshot.insert_table(table, table_snapshot);
                }
                Outcome::Cancelled => {
                    log::info!("Fetch cancelled while reading table '{}'", table);
                    return Ok(Outcome::Cancelled);
                }
            }
        }

        log::info!(
            "Snapshot {} captured: {} tables, {} rows",
            snapshot.id,
            snapshot.table_count(),
            snapshot.row_count()
        );
        Ok(Outcome::Completed(snapshot))
    }

    fn fetch_table_batched(
        &self,
        ctx: &FetchContext<'_>,
        table: &str,
        table_index: usize,
        total_tables: usize,
    ) -> Result<Outcome<TableSnapshot>> {
        let total_rows = ctx.source.count_rows(table)?;
        let columns = ctx.cache.columns(ctx.source, table)?;
        let mut state = KeyedRows::new(table, columns, self.duplicate_keys);

        let mut offset = 0u64;
        loop {
            if ctx.cancel.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }

            let page = ctx.source.fetch_rows(table, offset, self.batch_size)?;
            let page_len = page.len();
            state.extend(page)?;
            offset += page_len as u64;

            report(ctx.progress, || {
                ProgressUpdate::new(format!("Fetching {}...", table), table_index, total_tables)
                    .with_fraction(offset as f64 / total_rows.max(1) as f64)
            });

            if page_len < self.batch_size {
                break;
            }
        }

        Ok(Outcome::Completed(state.finish()))
    }

    fn fetch_table_full(
        &self,
        ctx: &FetchContext<'_>,
        table: &str,
        table_index: usize,
        total_tables: usize,
    ) -> Result<Outcome<TableSnapshot>> {
        let columns = ctx.cache.columns(ctx.source, table)?;
        let rows = ctx.source.fetch_all_rows(table)?;

        // the single fetch cannot be interrupted, so the result is discarded instead
        if ctx.cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        let mut state = KeyedRows::new(table, columns, self.duplicate_keys);
        state.extend(rows)?;

        report(ctx.progress, || {
            ProgressUpdate::new(format!("Fetching {}...", table), table_index, total_tables).with_fraction(1.0)
        });

        Ok(Outcome::Completed(state.finish()))
    }
}

/// Accumulates rows into a table snapshot under a duplicate-key policy
struct KeyedRows<'a> {
    table: &'a str,
    snapshot: TableSnapshot,
    policy: DuplicateKeyPolicy,
    overwritten: usize,
}

impl<'a> KeyedRows<'a> {
    fn new(table: &'a str, columns: Vec<String>, policy: DuplicateKeyPolicy) -> Self {
        Self {
            table,
            snapshot: TableSnapshot::new(columns),
            policy,
            overwritten: 0,
        }
    }

    fn extend(&mut self, rows: Vec<Row>) -> Result<()> {
        for row in rows {
            if let Some(previous) = self.snapshot.insert_row(row) {
                match self.policy {
                    DuplicateKeyPolicy::Overwrite => self.overwritten += 1,
                    DuplicateKeyPolicy::Reject => {
                        return Err(StatediffError::duplicate_key(
                            self.table,
                            crate::value::row_key(&previous),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> TableSnapshot {
        if self.overwritten > 0 {
            log::warn!(
                "Table '{}': {} rows shared a key with an earlier row and replaced it",
                self.table,
                self.overwritten
            );
        }
        self.snapshot
    }
}
