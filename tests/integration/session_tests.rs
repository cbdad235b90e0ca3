//! Integration tests for the comparison session lifecycle

use crate::common::sample_data::{current_users, initial_users, users_source};
use crate::common::{BlockingSource, CountingSource, FailingSource};
use statediff::{
    ChangeKind, CompareConfig, ComparisonSession, FetchMode, IdleState, MemorySource, Outcome, ProgressUpdate,
    RunCompletion, RunKind, SessionState, StatediffError, TableSelection, Value,
};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One row per page, so a cancel raised during the first page is seen before the second
fn single_row_pages() -> CompareConfig {
    CompareConfig {
        batch_size: 1,
        ..CompareConfig::default()
    }
}

/// Route every completion notice from `session` into a channel
fn completions(session: &ComparisonSession) -> Receiver<RunCompletion> {
    let (tx, rx) = channel();
    let tx = Mutex::new(tx);
    session.set_completion_callback(Some(Arc::new(move |done: &RunCompletion| {
        let _ = tx.lock().unwrap().send(done.clone());
    })));
    rx
}

fn next(rx: &Receiver<RunCompletion>) -> RunCompletion {
    rx.recv_timeout(Duration::from_secs(5)).expect("run never settled")
}

#[test]
fn test_fetch_then_compare_worked_example() {
    let source = users_source(initial_users());
    let session = ComparisonSession::new(source.clone());

    let initial = session.fetch_initial(None).unwrap().wait().unwrap().completed().unwrap();
    assert_eq!(initial.row_count(), 1);

    source.set_rows("users", current_users()).unwrap();
    let diffs = session
        .fetch_current_and_compare(None)
        .unwrap()
        .wait()
        .unwrap()
        .completed()
        .unwrap();

    let rendered: Vec<(String, usize, &str, &str, &str, ChangeKind)> = diffs
        .iter()
        .map(|d| {
            (
                d.row_key.clone(),
                d.column_index,
                d.column_name.as_str(),
                d.old_value.as_str(),
                d.new_value.as_str(),
                d.change_kind,
            )
        })
        .collect();
    assert_eq!(
        rendered,
        vec![
            ("1".to_string(), 3, "email", "a@x.com", "b@x.com", ChangeKind::Modified),
            ("2".to_string(), 1, "id", "", "2", ChangeKind::Added),
            ("2".to_string(), 2, "name", "", "bob", ChangeKind::Added),
            ("2".to_string(), 3, "email", "", "c@x.com", ChangeKind::Added),
        ]
    );
    assert_eq!(session.current_snapshot().unwrap().row_count(), 2);
}

#[test]
fn test_no_baseline_fails_fast() {
    let session = ComparisonSession::new(users_source(initial_users()));
    assert!(matches!(
        session.fetch_current_and_compare(None),
        Err(StatediffError::NoBaseline)
    ));
    assert!(!session.is_busy());
}

#[test]
fn test_second_run_rejected_while_busy() {
    let blocking = Arc::new(BlockingSource::new(users_source(initial_users())));
    let session = ComparisonSession::new(blocking.clone());

    let handle = session.fetch_initial(None).unwrap();
    blocking.wait_until_blocked();
    assert_eq!(session.state(), SessionState::FetchingInitial);

    assert!(matches!(session.fetch_initial(None), Err(StatediffError::Busy)));
    assert!(matches!(session.clear(), Err(StatediffError::Busy)));
    assert!(matches!(
        session.reload_source(Arc::new(MemorySource::new())),
        Err(StatediffError::Busy)
    ));

    blocking.release();
    assert!(matches!(handle.wait().unwrap(), Outcome::Completed(_)));
    assert_eq!(session.state(), SessionState::Idle(IdleState::HasInitial));
}

#[test]
fn test_cancelled_current_fetch_keeps_baseline() {
    let memory = users_source(initial_users());
    let session = ComparisonSession::with_config(memory.clone(), single_row_pages());
    let baseline = session.fetch_initial(None).unwrap().wait().unwrap().completed().unwrap();

    memory.set_rows("users", current_users()).unwrap();
    let blocking = Arc::new(BlockingSource::new(memory));
    session.reload_source(blocking.clone()).unwrap();

    let handle = session.fetch_current_and_compare(None).unwrap();
    blocking.wait_until_blocked();
    assert!(session.request_cancel());
    blocking.release();

    assert!(handle.wait().unwrap().is_cancelled());
    assert_eq!(session.state(), SessionState::Idle(IdleState::Cancelled));
    assert_eq!(session.initial_snapshot().unwrap().id, baseline.id);
    assert!(session.current_snapshot().is_none());
    assert!(session.get_current_differences().is_none());
}

#[test]
fn test_cancel_through_handle() {
    let blocking = Arc::new(BlockingSource::new(users_source(current_users())));
    let session = ComparisonSession::with_config(blocking.clone(), single_row_pages());

    let handle = session.fetch_initial(None).unwrap();
    blocking.wait_until_blocked();
    handle.cancel();
    assert!(handle.cancel_token().is_cancelled());
    blocking.release();

    assert!(handle.wait().unwrap().is_cancelled());
    assert!(session.initial_snapshot().is_none());
}

#[test]
fn test_failed_fetch_keeps_previous_state() {
    let memory = Arc::new(
        MemorySource::new()
            .with_table("users", &["id"], vec![vec![Value::from(1)]])
            .with_table("orders", &["id"], vec![vec![Value::from(10)]]),
    );
    let session = ComparisonSession::new(memory.clone());
    let baseline = session.fetch_initial(None).unwrap().wait().unwrap().completed().unwrap();

    session.reload_source(Arc::new(FailingSource::new(memory, "orders"))).unwrap();
    let err = session.fetch_initial(None).unwrap().wait().unwrap_err();
    assert_eq!(err.table(), Some("orders"));
    assert_eq!(session.state(), SessionState::Idle(IdleState::Failed));
    assert_eq!(session.initial_snapshot().unwrap().id, baseline.id);

    // the failed comparison reports no partial result either
    let err = session.fetch_current_and_compare(None).unwrap().wait().unwrap_err();
    assert!(matches!(err, StatediffError::Query { .. }));
    assert!(session.get_current_differences().is_none());
}

#[test]
fn test_new_baseline_drops_previous_result() {
    let source = users_source(initial_users());
    let session = ComparisonSession::new(source.clone());
    session.fetch_initial(None).unwrap().wait().unwrap();
    source.set_rows("users", current_users()).unwrap();
    session.fetch_current_and_compare(None).unwrap().wait().unwrap();
    assert!(session.get_current_differences().is_some());

    session.fetch_initial(None).unwrap().wait().unwrap();
    assert!(session.get_current_differences().is_none());
    assert!(session.current_snapshot().is_none());
    assert_eq!(session.initial_snapshot().unwrap().row_count(), 2);
}

#[test]
fn test_reload_source_invalidates_column_cache() {
    let counting = Arc::new(CountingSource::new(users_source(initial_users())));
    let session = ComparisonSession::new(counting.clone());

    session.fetch_initial(None).unwrap().wait().unwrap();
    session.fetch_initial(None).unwrap().wait().unwrap();
    assert_eq!(counting.column_lookups(), 1);
    assert_eq!(session.column_cache().len(), 1);

    session.reload_source(counting.clone()).unwrap();
    assert!(session.column_cache().is_empty());
    session.fetch_initial(None).unwrap().wait().unwrap();
    assert_eq!(counting.column_lookups(), 2);
}

#[test]
fn test_table_selection_and_mode_apply_to_next_run() {
    let memory = Arc::new(
        MemorySource::new()
            .with_table("a", &["id"], vec![vec![Value::from(1)]])
            .with_table("b", &["id"], vec![vec![Value::from(2)]]),
    );
    let session = ComparisonSession::new(memory);
    session.set_table_selection(TableSelection::Only(vec!["b".to_string()]));
    session.set_mode(FetchMode::Full);

    let snapshot = session.fetch_initial(None).unwrap().wait().unwrap().completed().unwrap();
    assert_eq!(snapshot.table_names(), vec!["b"]);
    assert_eq!(snapshot.mode, FetchMode::Full);
    assert_eq!(session.config().mode, FetchMode::Full);
}

#[test]
fn test_progress_reaches_callback() {
    let updates: Arc<Mutex<Vec<ProgressUpdate>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = updates.clone();
    let session = ComparisonSession::with_config(
        users_source(initial_users()),
        single_row_pages(),
    );

    session
        .fetch_initial(Some(Arc::new(move |u: &ProgressUpdate| sink.lock().unwrap().push(u.clone()))))
        .unwrap()
        .wait()
        .unwrap();

    let updates = updates.lock().unwrap();
    assert!(!updates.is_empty());
    assert_eq!(updates[0].message, "Fetching users...");
    assert!(updates.iter().all(|u| u.total_tables == 1));
    assert_eq!(updates.last().unwrap().fraction, Some(1.0));
}

#[test]
fn test_completion_notices_without_waiting() {
    let source = users_source(initial_users());
    let session = ComparisonSession::new(source.clone());
    let rx = completions(&session);

    let first = session.fetch_initial(None).unwrap().id();
    let done = next(&rx);
    assert_eq!((done.run_id, done.kind, done.state), (first, RunKind::FetchInitial, IdleState::HasInitial));

    source.set_rows("users", current_users()).unwrap();
    let second = session.fetch_current_and_compare(None).unwrap().id();
    let done = next(&rx);
    assert_eq!(done.run_id, second);
    assert_eq!(done.kind, RunKind::FetchCurrentAndCompare);
    assert_eq!(done.state, IdleState::HasResult);
    assert_eq!(session.get_current_differences().unwrap().len(), 4);
}

#[test]
fn test_completion_notice_carries_failure() {
    let memory = Arc::new(MemorySource::new().with_table("orders", &["id"], vec![vec![Value::from(10)]]));
    let session = ComparisonSession::new(Arc::new(FailingSource::new(memory, "orders")));
    let rx = completions(&session);

    drop(session.fetch_initial(None).unwrap());
    let done = next(&rx);
    assert_eq!(done.state, IdleState::Failed);
    assert!(done.error.unwrap().contains("simulated failure"));
    assert!(!session.is_busy());
}

#[test]
fn test_completion_notice_after_cancel() {
    let blocking = Arc::new(BlockingSource::new(users_source(current_users())));
    let session = ComparisonSession::with_config(blocking.clone(), single_row_pages());
    let rx = completions(&session);

    let handle = session.fetch_initial(None).unwrap();
    blocking.wait_until_blocked();
    session.request_cancel();
    blocking.release();

    let done = next(&rx);
    assert_eq!(done.run_id, handle.id());
    assert_eq!(done.state, IdleState::Cancelled);
    assert!(done.error.is_none());
    assert!(handle.wait().unwrap().is_cancelled());
}
