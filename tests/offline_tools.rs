use snapdb::offline;
use snapdb::{DataType, DbConfig, Field, Registry, SnapErrorCode, Value};
use std::fs::OpenOptions;
use std::io::Write;
use tempfile::tempdir;

fn build(registry: &Registry) {
    registry.open("inv").expect("open");
    let mut tx = registry.begin("inv", false).expect("begin");
    let t = tx.create_table("items").expect("table");
    let sku = tx.add_column(t, "sku", DataType::String).expect("sku");
    let qty = tx.add_column(t, "qty", DataType::Integer).expect("qty");
    tx.create_index(t, true, vec![sku], None).expect("pk");
    for (s, q) in [("a-1", 3), ("b-2", 0), ("c-3", 12)] {
        tx.insert(
            t,
            vec![
                Field::new(sku, Value::text(s)),
                Field::new(qty, Value::Integer(q)),
            ],
        )
        .expect("insert");
    }
    registry.commit(tx).expect("commit");
}

#[test]
fn inspect_lists_every_record_in_order() {
    let dir = tempdir().expect("tempdir");
    let registry = Registry::new(dir.path(), DbConfig::default()).expect("registry");
    build(&registry);
    registry.close("inv").expect("close");

    let report = offline::inspect_log(&registry.path_for("inv"), &DbConfig::default())
        .expect("inspect");
    assert_eq!(report.records, 7);
    assert_eq!(report.commits, 1);
    assert_eq!(report.kinds.get("table"), Some(&1));
    assert_eq!(report.kinds.get("column"), Some(&2));
    assert_eq!(report.kinds.get("index"), Some(&1));
    assert_eq!(report.kinds.get("record"), Some(&3));
    assert!(report.entries.windows(2).all(|w| w[0].offset < w[1].offset));
    assert_eq!(report.torn_at, None);

    let json = serde_json::to_value(&report).expect("json");
    assert_eq!(json["records"], 7);
    assert_eq!(json["entries"][0]["kind"], "table");
}

#[test]
fn inspect_reports_a_torn_tail_without_failing() {
    let dir = tempdir().expect("tempdir");
    let registry = Registry::new(dir.path(), DbConfig::default()).expect("registry");
    build(&registry);
    registry.close("inv").expect("close");
    let path = registry.path_for("inv");
    let length = std::fs::metadata(&path).expect("meta").len();
    let mut file = OpenOptions::new().append(true).open(&path).expect("open");
    file.write_all(&[9, 0, 0, 0, 40]).expect("write");
    drop(file);

    let report = offline::inspect_log(&path, &DbConfig::default()).expect("inspect");
    assert_eq!(report.records, 7);
    assert_eq!(report.torn_at, Some(length));
    assert!(report.error.is_some());
}

#[test]
fn check_invariants_passes_on_a_healthy_database() {
    let dir = tempdir().expect("tempdir");
    let registry = Registry::new(dir.path(), DbConfig::default()).expect("registry");
    build(&registry);

    let report =
        offline::check_invariants(dir.path(), "inv", &DbConfig::default()).expect("check");
    assert!(report.ok, "{:?}", report.violations);
    assert_eq!(report.tables, 1);
    assert_eq!(report.indexes, 1);
    assert_eq!(report.rows, 3);
    assert_eq!(report.records, 7);
    assert_eq!(report.commits, 1);
}

#[test]
fn check_invariants_never_writes() {
    let dir = tempdir().expect("tempdir");
    let registry = Registry::new(dir.path(), DbConfig::default()).expect("registry");
    build(&registry);
    registry.close("inv").expect("close");
    let path = registry.path_for("inv");
    let mut file = OpenOptions::new().append(true).open(&path).expect("open");
    file.write_all(&[4]).expect("write");
    drop(file);
    let length = std::fs::metadata(&path).expect("meta").len();

    let err = offline::check_invariants(dir.path(), "inv", &DbConfig::production())
        .expect_err("strict");
    assert_eq!(err.code(), SnapErrorCode::LogCorruption);

    let report = offline::check_invariants(dir.path(), "inv", &DbConfig::development())
        .expect("permissive");
    assert_eq!(report.torn_at, Some(length - 1));
    assert!(report.ok);
    assert_eq!(std::fs::metadata(&path).expect("meta").len(), length);
}

#[test]
fn check_invariants_of_a_missing_database() {
    let dir = tempdir().expect("tempdir");
    let err = offline::check_invariants(dir.path(), "ghost", &DbConfig::default())
        .expect_err("missing");
    assert_eq!(err.code(), SnapErrorCode::DatabaseNotFound);
}
