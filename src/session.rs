//! Fetch-fetch-compare orchestration
//!
//! A [`ComparisonSession`] owns the baseline and current snapshots, the last
//! difference list and the column cache. All I/O and diff work runs on a
//! single background worker per session; the caller only issues commands,
//! receives progress through its callback and collects the result through a
//! [`RunHandle`]. A [`CompletionCallback`] registered on the session fires on
//! the worker thread as each run settles, so callers need not block on
//! [`RunHandle::wait`].

use crate::cache::ColumnCache;
use crate::cancel::CancelToken;
use crate::config::{CompareConfig, FetchMode, TableSelection};
use crate::diff::{DiffEngine, Difference};
use crate::error::{Outcome, Result, StatediffError};
use crate::fetcher::{FetchContext, SnapshotFetcher};
use crate::progress::ProgressCallback;
use crate::snapshot::Snapshot;
use crate::source::RowSource;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::JoinHandle;
use uuid::Uuid;

/// Why a session is idle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    /// Nothing fetched yet, or cleared
    Empty,
    HasInitial,
    HasResult,
    Cancelled,
    Failed,
}

/// Where a session is in its fetch-fetch-compare cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle(IdleState),
    FetchingInitial,
    FetchingCurrent,
    Comparing,
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        !matches!(self, SessionState::Idle(_))
    }
}

#[derive(Debug)]
struct Shared {
    state: SessionState,
    initial: Option<Arc<Snapshot>>,
    current: Option<Arc<Snapshot>>,
    differences: Option<Arc<Vec<Difference>>>,
    active: Option<CancelToken>,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            state: SessionState::Idle(IdleState::Empty),
            initial: None,
            current: None,
            differences: None,
            active: None,
        }
    }
}

/// Which session operation a run performed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    FetchInitial,
    FetchCurrentAndCompare,
}

/// Delivered once per run after the session has returned to idle
#[derive(Debug, Clone)]
pub struct RunCompletion {
    pub run_id: Uuid,
    pub kind: RunKind,
    pub state: IdleState,
    pub error: Option<String>,
}

/// Invoked on the worker thread when a run settles
pub type CompletionCallback = Arc<dyn Fn(&RunCompletion) + Send + Sync>;

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases the single-flight slot when a worker ends, even by panicking,
/// then notifies the completion listener
struct RunGuard {
    shared: Arc<Mutex<Shared>>,
    id: Uuid,
    kind: RunKind,
    listener: Option<CompletionCallback>,
    settled: Option<IdleState>,
    error: Option<String>,
}

impl RunGuard {
    fn set_state(&self, state: SessionState) {
        lock(&self.shared).state = state;
    }

    fn finish(mut self, idle: IdleState, update: impl FnOnce(&mut Shared)) {
        let mut shared = lock(&self.shared);
        update(&mut shared);
        shared.state = SessionState::Idle(idle);
        shared.active = None;
        drop(shared);
        self.settled = Some(idle);
    }

    fn fail(mut self, error: &StatediffError) {
        self.error = Some(error.to_string());
        self.finish(IdleState::Failed, |_| {});
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let state = match self.settled {
            Some(state) => state,
            None => {
                let mut shared = lock(&self.shared);
                shared.state = SessionState::Idle(IdleState::Failed);
                shared.active = None;
                drop(shared);
                log::error!("Run {}: worker stopped before settling", self.id);
                self.error = Some("worker stopped before settling".to_string());
                IdleState::Failed
            }
        };

        if let Some(listener) = self.listener.take() {
            listener(&RunCompletion {
                run_id: self.id,
                kind: self.kind,
                state,
                error: self.error.take(),
            });
        }
    }
}

/// Handle on a background fetch or comparison
#[derive(Debug)]
pub struct RunHandle<T> {
    id: Uuid,
    cancel: CancelToken,
    join: JoinHandle<Result<Outcome<T>>>,
}

impl<T> RunHandle<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Token observed by this run's worker
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once the worker has produced its result; never blocks
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Block until the worker finishes and return its result
    pub fn wait(self) -> Result<Outcome<T>> {
        self.join
            .join()
            .map_err(|_| StatediffError::Generic(anyhow::anyhow!("worker thread for run {} panicked", self.id)))?
    }
}

/// Single-flight state machine around two snapshots and their differences
pub struct ComparisonSession {
    source: RwLock<Arc<dyn RowSource>>,
    config: Mutex<CompareConfig>,
    cache: Arc<ColumnCache>,
    shared: Arc<Mutex<Shared>>,
    on_complete: Mutex<Option<CompletionCallback>>,
}

impl ComparisonSession {
    pub fn new(source: Arc<dyn RowSource>) -> Self {
        Self::with_config(source, CompareConfig::default())
    }

    pub fn with_config(source: Arc<dyn RowSource>, config: CompareConfig) -> Self {
        Self {
            source: RwLock::new(source),
            config: Mutex::new(config),
            cache: Arc::new(ColumnCache::new()),
            shared: Arc::new(Mutex::new(Shared::default())),
            on_complete: Mutex::new(None),
        }
    }

    pub fn config(&self) -> CompareConfig {
        self.config_lock().clone()
    }

    /// Replace the whole configuration; applies from the next run
    pub fn set_config(&self, config: CompareConfig) -> Result<()> {
        config.validate()?;
        *self.config_lock() = config;
        Ok(())
    }

    pub fn set_table_selection(&self, selection: TableSelection) {
        self.config_lock().tables = selection;
    }

    pub fn set_mode(&self, mode: FetchMode) {
        self.config_lock().mode = mode;
    }

    /// Register the listener told about every run that settles; applies from the next run
    pub fn set_completion_callback(&self, callback: Option<CompletionCallback>) {
        *self.on_complete.lock().unwrap_or_else(|p| p.into_inner()) = callback;
    }

    /// Swap the row source and drop every cached column list
    pub fn reload_source(&self, source: Arc<dyn RowSource>) -> Result<()> {
        let shared = lock(&self.shared);
        if shared.state.is_running() {
            return Err(StatediffError::Busy);
        }
        *self.source.write().unwrap_or_else(|p| p.into_inner()) = source;
        self.cache.invalidate();
        log::info!("Row source reloaded; column cache invalidated");
        Ok(())
    }

    pub fn column_cache(&self) -> &ColumnCache {
        &self.cache
    }

    pub fn state(&self) -> SessionState {
        lock(&self.shared).state
    }

    pub fn is_busy(&self) -> bool {
        self.state().is_running()
    }

    pub fn initial_snapshot(&self) -> Option<Arc<Snapshot>> {
        lock(&self.shared).initial.clone()
    }

    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        lock(&self.shared).current.clone()
    }

    /// Differences of the last completed comparison
    pub fn get_current_differences(&self) -> Option<Arc<Vec<Difference>>> {
        lock(&self.shared).differences.clone()
    }

    /// Signal the running operation, if any, to stop at its next poll point
    pub fn request_cancel(&self) -> bool {
        match &lock(&self.shared).active {
            Some(token) => {
                token.cancel();
                log::info!("Cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Drop all snapshots and results
    pub fn clear(&self) -> Result<()> {
        let mut shared = lock(&self.shared);
        if shared.state.is_running() {
            return Err(StatediffError::Busy);
        }
        *shared = Shared::default();
        Ok(())
    }

    /// Capture the baseline snapshot in the background.
    ///
    /// On success the new baseline replaces the previous one and any current
    /// snapshot or differences derived from it are dropped. A cancelled or
    /// failed fetch leaves the previous baseline in place.
    pub fn fetch_initial(&self, progress: Option<ProgressCallback>) -> Result<RunHandle<Arc<Snapshot>>> {
        let config = self.run_config()?;
        let source = self.current_source();
        let cache = self.cache.clone();

        let id = Uuid::new_v4();
        let (cancel, guard, _) = self.begin(id, RunKind::FetchInitial, SessionState::FetchingInitial)?;
        let token = cancel.clone();
        log::info!("Run {}: fetching initial state", id);

        self.spawn(id, cancel, guard, move |guard| {
            let fetcher = SnapshotFetcher::from_config(&config);
            let ctx = FetchContext {
                source: source.as_ref(),
                cache: &cache,
                progress: progress.as_ref(),
                cancel: &token,
            };

            match fetcher.fetch(&ctx, &config.tables) {
                Ok(Outcome::Completed(snapshot)) => {
                    let snapshot = Arc::new(snapshot);
                    let stored = snapshot.clone();
                    guard.finish(IdleState::HasInitial, |shared| {
                        shared.initial = Some(stored);
                        shared.current = None;
                        shared.differences = None;
                    });
                    log::info!("Run {}: initial state fetched", id);
                    Ok(Outcome::Completed(snapshot))
                }
                Ok(Outcome::Cancelled) => {
                    guard.finish(IdleState::Cancelled, |_| {});
                    log::info!("Run {}: initial fetch cancelled", id);
                    Ok(Outcome::Cancelled)
                }
                Err(e) => {
                    guard.fail(&e);
                    log::error!("Run {}: initial fetch failed: {}", id, e);
                    Err(e)
                }
            }
        })
    }

    /// Capture the current snapshot and compare it against the baseline.
    ///
    /// Fails immediately with [`StatediffError::NoBaseline`] when no initial
    /// fetch has completed, and with [`StatediffError::Busy`] while another
    /// run is in flight.
    pub fn fetch_current_and_compare(
        &self,
        progress: Option<ProgressCallback>,
    ) -> Result<RunHandle<Arc<Vec<Difference>>>> {
        let config = self.run_config()?;
        let source = self.current_source();
        let cache = self.cache.clone();

        let id = Uuid::new_v4();
        let (cancel, guard, baseline) =
            self.begin(id, RunKind::FetchCurrentAndCompare, SessionState::FetchingCurrent)?;
        let initial = baseline.ok_or(StatediffError::NoBaseline)?;
        let token = cancel.clone();
        log::info!("Run {}: fetching current state", id);

        self.spawn(id, cancel, guard, move |guard| {
            let fetcher = SnapshotFetcher::from_config(&config);
            let ctx = FetchContext {
                source: source.as_ref(),
                cache: &cache,
                progress: progress.as_ref(),
                cancel: &token,
            };

            let current = match fetcher.fetch(&ctx, &config.tables) {
                Ok(Outcome::Completed(snapshot)) => Arc::new(snapshot),
                Ok(Outcome::Cancelled) => {
                    guard.finish(IdleState::Cancelled, |_| {});
                    log::info!("Run {}: current fetch cancelled", id);
                    return Ok(Outcome::Cancelled);
                }
                Err(e) => {
                    guard.fail(&e);
                    log::error!("Run {}: current fetch failed: {}", id, e);
                    return Err(e);
                }
            };
            {
                let mut shared = lock(&guard.shared);
                shared.current = Some(current.clone());
                shared.differences = None;
            }
            guard.set_state(SessionState::Comparing);

            let engine = DiffEngine::from_config(&config);
            let lookup = |table: &str| cache.columns(source.as_ref(), table);
            match engine.compare(&initial, &current, Some(&lookup), progress.as_ref(), &token) {
                Ok(Outcome::Completed(differences)) => {
                    let differences = Arc::new(differences);
                    let stored = differences.clone();
                    guard.finish(IdleState::HasResult, |shared| shared.differences = Some(stored));
                    log::info!("Run {}: comparison complete, {} differences", id, differences.len());
                    Ok(Outcome::Completed(differences))
                }
                Ok(Outcome::Cancelled) => {
                    guard.finish(IdleState::Cancelled, |_| {});
                    log::info!("Run {}: comparison cancelled", id);
                    Ok(Outcome::Cancelled)
                }
                Err(e) => {
                    guard.fail(&e);
                    log::error!("Run {}: comparison failed: {}", id, e);
                    Err(e)
                }
            }
        })
    }

    fn config_lock(&self) -> MutexGuard<'_, CompareConfig> {
        self.config.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run_config(&self) -> Result<CompareConfig> {
        let config = self.config();
        config.validate()?;
        Ok(config)
    }

    fn current_source(&self) -> Arc<dyn RowSource> {
        self.source.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Claim the single-flight slot, returning the baseline held at that moment
    fn begin(
        &self,
        id: Uuid,
        kind: RunKind,
        state: SessionState,
    ) -> Result<(CancelToken, RunGuard, Option<Arc<Snapshot>>)> {
        let listener = self.on_complete.lock().unwrap_or_else(|p| p.into_inner()).clone();
        let mut shared = lock(&self.shared);
        if shared.state.is_running() {
            return Err(StatediffError::Busy);
        }
        if kind == RunKind::FetchCurrentAndCompare && shared.initial.is_none() {
            return Err(StatediffError::NoBaseline);
        }

        let cancel = CancelToken::new();
        shared.state = state;
        shared.active = Some(cancel.clone());
        let baseline = shared.initial.clone();
        Ok((
            cancel,
            RunGuard {
                shared: self.shared.clone(),
                id,
                kind,
                listener,
                settled: None,
                error: None,
            },
            baseline,
        ))
    }

    fn spawn<T, F>(&self, id: Uuid, cancel: CancelToken, guard: RunGuard, work: F) -> Result<RunHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(RunGuard) -> Result<Outcome<T>> + Send + 'static,
    {
        // a failed spawn drops the guard inside the closure, freeing the slot
        let join = std::thread::Builder::new()
            .name("statediff-worker".to_string())
            .spawn(move || work(guard))?;
        Ok(RunHandle { id, cancel, join })
    }
}
