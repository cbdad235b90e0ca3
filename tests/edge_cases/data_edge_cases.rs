//! Edge case tests for unusual data shapes

use statediff::{
    CancelToken, ChangeKind, ColumnCache, ComparisonSession, DiffEngine, Difference, DuplicateKeyPolicy, FetchContext,
    FetchMode, MemorySource, Row, SchemaDriftPolicy, Snapshot, SnapshotFetcher, StatediffError, TableSelection,
    TableSnapshot, Traversal, Value,
};
use std::sync::Arc;

fn compare(initial: &Snapshot, current: &Snapshot) -> Vec<Difference> {
    DiffEngine::new(Traversal::Interleaved)
        .compare(initial, current, None, None, &CancelToken::new())
        .unwrap()
        .completed()
        .unwrap()
}

fn single(columns: &[&str], rows: Vec<Row>) -> Snapshot {
    Snapshot::new(FetchMode::Batched).with_table("t", columns, rows)
}

#[test]
fn test_empty_tables_on_both_sides() {
    let empty = single(&["id"], vec![]);
    assert!(compare(&empty, &empty).is_empty());
}

#[test]
fn test_null_and_empty_string_are_equal() {
    let initial = single(&["id", "note"], vec![vec![Value::from(1), Value::Null]]);
    let current = single(&["id", "note"], vec![vec![Value::from(1), Value::from("")]]);
    assert!(compare(&initial, &current).is_empty());
}

#[test]
fn test_type_change_with_same_text_is_not_a_change() {
    let initial = single(&["id", "qty"], vec![vec![Value::from(1), Value::from(5)]]);
    let current = single(&["id", "qty"], vec![vec![Value::from("1"), Value::from(5.0)]]);
    assert!(compare(&initial, &current).is_empty());
}

#[test]
fn test_null_first_column_is_empty_key() {
    let initial = single(&["id", "v"], vec![vec![Value::Null, Value::from("a")]]);
    let current = single(&["id", "v"], vec![vec![Value::from(""), Value::from("b")]]);
    let diffs = compare(&initial, &current);
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].row_key, "");
    assert_eq!(diffs[0].change_kind, ChangeKind::Modified);
}

#[test]
fn test_unicode_values() {
    let initial = single(&["id", "name"], vec![vec![Value::from("ключ"), Value::from("café")]]);
    let current = single(&["id", "name"], vec![vec![Value::from("ключ"), Value::from("cafe\u{301}")]]);
    let diffs = compare(&initial, &current);
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].row_key, "ключ");
}

#[test]
fn test_rows_longer_than_column_list_use_positional_names() {
    let initial = single(&["id"], vec![vec![Value::from(1), Value::from("x"), Value::from("y")]]);
    let current = Snapshot::new(FetchMode::Batched);
    let diffs = compare(&initial, &current);
    let names: Vec<&str> = diffs.iter().map(|d| d.column_name.as_str()).collect();
    assert_eq!(names, vec!["id", "Column 2", "Column 3"]);
    assert_eq!(diffs[2].column_index, 3);
}

#[test]
fn test_column_fallback_used_when_snapshots_have_none() {
    let mut initial = Snapshot::new(FetchMode::Batched);
    let mut table = TableSnapshot::new(Vec::new());
    table.insert_row(vec![Value::from(1), Value::from("x")]);
    initial.insert_table("t", table);

    let lookup = |_: &str| -> statediff::Result<Vec<String>> { Ok(vec!["id".to_string(), "label".to_string()]) };
    let diffs = DiffEngine::new(Traversal::Grouped)
        .compare(&initial, &Snapshot::new(FetchMode::Full), Some(&lookup), None, &CancelToken::new())
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(diffs[1].column_name, "label");
}

#[test]
fn test_schema_drift_policies() {
    let initial = single(&["id", "a", "b"], vec![vec![Value::from(1), Value::from("x"), Value::from("y")]]);
    let current = single(&["id", "a"], vec![vec![Value::from(1), Value::from("z")]]);

    let diffs = compare(&initial, &current);
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].column_name, "a");

    let err = DiffEngine::new(Traversal::Grouped)
        .with_schema_drift(SchemaDriftPolicy::Reject)
        .compare(&initial, &current, None, None, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(
        err,
        StatediffError::SchemaDrift {
            initial_len: 3,
            current_len: 2,
            ..
        }
    ));
}

#[test]
fn test_duplicate_keys_in_session() {
    let source = Arc::new(MemorySource::new().with_table(
        "t",
        &["id", "v"],
        vec![
            vec![Value::from(7), Value::from("first")],
            vec![Value::from("7"), Value::from("second")],
        ],
    ));
    let session = ComparisonSession::new(source.clone());
    let snapshot = session.fetch_initial(None).unwrap().wait().unwrap().completed().unwrap();
    let rows = &snapshot.table("t").unwrap().rows;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows["7"][1], Value::from("second"));

    let mut config = session.config();
    config.duplicate_keys = DuplicateKeyPolicy::Reject;
    session.set_config(config).unwrap();
    let err = session.fetch_initial(None).unwrap().wait().unwrap_err();
    assert!(matches!(err, StatediffError::DuplicateKey { ref key, .. } if key == "7"));
}

#[test]
fn test_table_dropped_between_fetches() {
    let source = Arc::new(
        MemorySource::new()
            .with_table("keep", &["id"], vec![vec![Value::from(1)]])
            .with_table("drop", &["id", "v"], vec![vec![Value::from(1), Value::from("x")]]),
    );
    let session = ComparisonSession::new(source.clone());
    session.fetch_initial(None).unwrap().wait().unwrap();

    assert!(source.drop_table("drop"));
    let diffs = session
        .fetch_current_and_compare(None)
        .unwrap()
        .wait()
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(diffs.len(), 2);
    assert!(diffs.iter().all(|d| d.table == "drop" && d.change_kind == ChangeKind::Deleted));
}

#[test]
fn test_empty_table_fetches_in_both_modes() {
    let source = MemorySource::new().with_table("t", &["id"], vec![]);
    let cache = ColumnCache::new();
    let cancel = CancelToken::new();
    for mode in [FetchMode::Batched, FetchMode::Full] {
        let ctx = FetchContext {
            source: &source,
            cache: &cache,
            progress: None,
            cancel: &cancel,
        };
        let snapshot = SnapshotFetcher::new(3, mode)
            .fetch(&ctx, &TableSelection::All)
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(snapshot.table("t").unwrap().row_count(), 0);
        assert_eq!(snapshot.columns("t").unwrap(), ["id".to_string()]);
    }
}

#[test]
fn test_pipe_characters_do_not_merge_cells() {
    let initial = single(&["id", "a", "b"], vec![vec![Value::from(1), Value::from("x|"), Value::from("y")]]);
    let current = single(&["id", "a", "b"], vec![vec![Value::from(1), Value::from("x"), Value::from("|y")]]);
    assert!(!initial.same_content(&current));
    assert_eq!(compare(&initial, &current).len(), 2);
}
