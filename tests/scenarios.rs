use snapdb::catalog::types::IndexKey;
use snapdb::{
    DataType, DbConfig, DbObject, Field, Registry, SnapErrorCode, Transaction, Uid, Value,
};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

struct People {
    t: Uid,
    id: Uid,
    name: Uid,
    pk: Uid,
    r: Uid,
    r_ref: Uid,
    fk: Uid,
}

fn registry() -> (TempDir, Registry) {
    let dir = tempdir().expect("tempdir");
    let registry = Registry::new(dir.path(), DbConfig::default()).expect("registry");
    registry.open("shop").expect("open");
    (dir, registry)
}

/// `T(id, name)` keyed on `id`, and `R(t)` whose `t` references `T.id`.
fn schema(registry: &Registry) -> People {
    let mut tx = registry.begin("shop", false).expect("begin");
    let t = tx.create_table("T").expect("T");
    let id = tx.add_column(t, "id", DataType::Integer).expect("id");
    let name = tx.add_column(t, "name", DataType::String).expect("name");
    let pk = tx.create_index(t, true, vec![id], None).expect("pk");
    let r = tx.create_table("R").expect("R");
    let r_ref = tx.add_column(r, "t", DataType::Integer).expect("t");
    let fk = tx.create_index(r, false, vec![r_ref], Some(t)).expect("fk");
    let res = registry.commit(tx).expect("schema");
    let p = |u| res.permanent(u).expect("fixup");
    People {
        t: p(t),
        id: p(id),
        name: p(name),
        pk: p(pk),
        r: p(r),
        r_ref: p(r_ref),
        fk: p(fk),
    }
}

fn insert_person(registry: &Registry, s: &People, id: i64, name: &str) -> Uid {
    let mut tx = registry.begin("shop", false).expect("begin");
    let row = tx
        .insert(
            s.t,
            vec![
                Field::new(s.id, Value::Integer(id)),
                Field::new(s.name, Value::text(name)),
            ],
        )
        .expect("insert");
    registry
        .commit(tx)
        .expect("commit")
        .permanent(row)
        .expect("row")
}

fn insert_reference(tx: &mut Transaction, s: &People, id: i64) -> Uid {
    tx.insert(s.r, vec![Field::new(s.r_ref, Value::Integer(id))])
        .expect("insert")
}

#[test]
fn primary_index_points_at_the_inserted_row() {
    let (_dir, registry) = registry();
    let s = schema(&registry);
    let defpos = insert_person(&registry, &s, 1, "a");

    let snapshot = registry.snapshot("shop").expect("snapshot");
    let table = snapshot.table(s.t).expect("T");
    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.current_version(defpos), Some(defpos));
    let pk = snapshot.index(s.pk).expect("pk");
    assert_eq!(
        pk.lookup(&IndexKey::from_single(Value::Integer(1))),
        Some(defpos)
    );
}

#[test]
fn dangling_foreign_key_aborts_the_commit() {
    let (_dir, registry) = registry();
    let s = schema(&registry);
    insert_person(&registry, &s, 1, "a");
    let before = registry.snapshot("shop").expect("before");
    let length = std::fs::metadata(registry.path_for("shop"))
        .expect("meta")
        .len();

    let mut tx = registry.begin("shop", false).expect("begin");
    insert_reference(&mut tx, &s, 2);
    let err = registry.commit(tx).expect_err("no T row with id 2");
    assert_eq!(err.code(), SnapErrorCode::ReferentialConstraint);

    let after = registry.snapshot("shop").expect("after");
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.table(s.r).expect("R").rows.len(), 0);
    assert_eq!(
        std::fs::metadata(registry.path_for("shop"))
            .expect("meta")
            .len(),
        length
    );
}

#[test]
fn referenced_row_cannot_be_deleted() {
    let (_dir, registry) = registry();
    let s = schema(&registry);
    let defpos = insert_person(&registry, &s, 1, "a");
    let mut tx = registry.begin("shop", false).expect("begin");
    insert_reference(&mut tx, &s, 1);
    registry.commit(tx).expect("reference");

    let mut tx = registry.begin("shop", false).expect("begin");
    tx.delete(s.t, defpos).expect("delete");
    let err = registry.commit(tx).expect_err("still referenced");
    assert_eq!(err.code(), SnapErrorCode::ReferentialConstraint);
    assert!(registry.row("shop", defpos).is_ok());

    let mut tx = registry.begin("shop", false).expect("begin");
    let prior = registry.row("shop", defpos).expect("row");
    tx.update(&prior, vec![Field::new(s.id, Value::Integer(9))])
        .expect("update");
    let err = registry.commit(tx).expect_err("key change");
    assert_eq!(err.code(), SnapErrorCode::ReferentialConstraint);
}

#[test]
fn deleting_the_referencing_row_first_releases_the_key() {
    let (_dir, registry) = registry();
    let s = schema(&registry);
    let person = insert_person(&registry, &s, 1, "a");
    let mut tx = registry.begin("shop", false).expect("begin");
    let reference = insert_reference(&mut tx, &s, 1);
    let reference = registry
        .commit(tx)
        .expect("reference")
        .permanent(reference)
        .expect("fixup");

    let mut tx = registry.begin("shop", false).expect("begin");
    tx.delete(s.r, reference).expect("delete reference");
    tx.delete(s.t, person).expect("delete person");
    let res = registry.commit(tx).expect("both deletes");
    assert_eq!(res.snapshot.row_count(), 0);
    assert!(res.snapshot.index(s.fk).expect("fk").entries.is_empty());
    assert_eq!(
        registry.row("shop", person).expect_err("gone").code(),
        SnapErrorCode::RowNotFound
    );
}

#[test]
fn updates_supersede_but_keep_history() {
    let (_dir, registry) = registry();
    let s = schema(&registry);
    let defpos = insert_person(&registry, &s, 1, "a");

    let mut tx = registry.begin("shop", false).expect("begin");
    let prior = registry.row("shop", defpos).expect("row");
    let update = tx
        .update(&prior, vec![Field::new(s.name, Value::text("b"))])
        .expect("update");
    let res = registry.commit(tx).expect("commit");
    let version = res.permanent(update).expect("fixup");

    let table = res.snapshot.table(s.t).expect("T");
    assert_eq!(table.current_version(defpos), Some(version));
    let current = registry.row("shop", defpos).expect("current");
    assert_eq!(current.get(s.name), Some(&Value::text("b")));
    assert_eq!(current.get(s.id), Some(&Value::Integer(1)));

    let old = registry.resolve("shop", defpos).expect("history");
    let old = old.row_image().expect("row");
    assert_eq!(old.get(s.name), Some(&Value::text("a")));
}

#[test]
fn committed_snapshot_holds_no_transient_uids() {
    let (_dir, registry) = registry();
    let s = schema(&registry);
    let snapshot = registry.snapshot("shop").expect("snapshot");
    for object in snapshot.objects.values() {
        assert!(snapshot_uid_is_permanent(object.uid()));
        for r in object.references() {
            assert!(snapshot_uid_is_permanent(r), "{object} refers to {r}");
        }
    }
    let t = snapshot.table(s.t).expect("T");
    assert!(t.columns.keys().all(|c| snapshot_uid_is_permanent(*c)));
    assert!(matches!(snapshot.by_name("R"), Some(DbObject::Table(_))));
}

fn snapshot_uid_is_permanent(uid: Uid) -> bool {
    snapdb::catalog::uid::is_permanent(uid)
}

#[test]
fn schema_changes_go_through_the_log() {
    let (_dir, registry) = registry();
    let s = schema(&registry);
    insert_person(&registry, &s, 1, "a");

    let mut tx = registry.begin("shop", false).expect("begin");
    tx.rename_table(s.t, "People").expect("rename");
    tx.alter_column(s.t, s.name, "full_name", None)
        .expect("alter");
    tx.create_view("everyone", "select * from People")
        .expect("view");
    let res = registry.commit(tx).expect("commit");
    assert!(res.snapshot.table_by_name("T").is_none());
    let people = res.snapshot.table_by_name("People").expect("renamed");
    assert!(people.column_by_name("full_name").is_some());
    assert!(res.snapshot.view_by_name("everyone").is_some());

    let mut tx = registry.begin("shop", false).expect("begin");
    tx.drop_table(s.t).expect("drop");
    let err = registry.commit(tx).expect_err("R references T");
    assert_eq!(err.code(), SnapErrorCode::ReferentialConstraint);

    let mut tx = registry.begin("shop", false).expect("begin");
    tx.drop_table(s.r).expect("drop R");
    tx.drop_table(s.t).expect("drop T");
    let res = registry.commit(tx).expect("drop both");
    assert_eq!(res.snapshot.tables().count(), 0);
    assert_eq!(res.snapshot.indexes().count(), 0);
}

#[test]
fn foreign_key_of_the_wrong_shape_is_refused_at_creation() {
    let (_dir, registry) = registry();
    let s = schema(&registry);
    insert_person(&registry, &s, 1, "a");
    let length = std::fs::metadata(registry.path_for("shop"))
        .expect("meta")
        .len();

    let mut tx = registry.begin("shop", false).expect("begin");
    let o = tx.create_table("O").expect("O");
    let code = tx.add_column(o, "code", DataType::String).expect("code");
    tx.create_index(o, false, vec![code], Some(s.t)).expect("fk");
    let err = registry.commit(tx).expect_err("string key against integer key");
    assert_eq!(err.code(), SnapErrorCode::SchemaViolation);
    assert!(registry.snapshot("shop").expect("snap").table_by_name("O").is_none());
    assert_eq!(
        std::fs::metadata(registry.path_for("shop"))
            .expect("meta")
            .len(),
        length
    );

    let mut tx = registry.begin("shop", false).expect("begin");
    let o = tx.create_table("O").expect("O");
    let person = tx.add_column(o, "person", DataType::Integer).expect("person");
    tx.create_index(o, false, vec![person], Some(s.t)).expect("fk");
    tx.insert(o, vec![Field::new(person, Value::Integer(1))])
        .expect("insert");
    let res = registry.commit(tx).expect("matching key");
    assert_eq!(res.snapshot.referencing(s.t).len(), 2);
}
