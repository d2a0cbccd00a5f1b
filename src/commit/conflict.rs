use crate::catalog::DbObject;
use crate::catalog::uid::{DisplayUid, Uid};
use crate::error::SnapError;
use crate::wal::record::{LogEntry, Origin, decode_entry};
use crate::wal::{LogFile, codec::ByteSource};

/// Objects appended to `log` in `[from, to)`, with their log uids.
pub fn read_committed(log: &LogFile, from: u64, to: u64) -> Result<Vec<DbObject>, SnapError> {
    let mut cursor = log.cursor(from);
    let mut out = Vec::new();
    while cursor.position() < to {
        let pos = cursor.position();
        let entry = decode_entry(&mut cursor, Origin::Log, log.max_record_bytes()).map_err(
            |e| SnapError::LogCorruption {
                offset: pos,
                message: e.to_string(),
            },
        )?;
        if let LogEntry::Object(object) = entry {
            out.push(object);
        }
    }
    Ok(out)
}

/// Fails with `Conflict` if any pending object clashes with an object that
/// another transaction committed after this one's base snapshot.
pub fn check<'a>(
    committed: &[DbObject],
    pending: impl IntoIterator<Item = &'a DbObject>,
) -> Result<(), SnapError> {
    for mine in pending {
        for theirs in committed {
            if let Some(reason) = clash(mine, theirs).or_else(|| clash(theirs, mine)) {
                return Err(SnapError::Conflict(reason));
            }
        }
    }
    Ok(())
}

fn top_level_name(object: &DbObject) -> Option<&str> {
    match object {
        DbObject::Table(t) => Some(t.name.as_str()),
        DbObject::View(v) => Some(v.name.as_str()),
        DbObject::Alter(a) if a.parent.is_none() => Some(a.name.as_str()),
        _ => None,
    }
}

fn column_name(object: &DbObject) -> Option<(Uid, &str)> {
    match object {
        DbObject::Column(c) => Some((c.table, c.name.as_str())),
        DbObject::Alter(a) => a.parent.map(|p| (p, a.name.as_str())),
        _ => None,
    }
}

/// Row a change is about, for updates and deletes.
fn touched_row(object: &DbObject) -> Option<Uid> {
    match object {
        DbObject::Update(u) => Some(u.defpos),
        DbObject::Delete(d) => Some(d.delpos),
        _ => None,
    }
}

/// Reason `a` and `b` cannot both commit, checked from `a`'s side.
fn clash(a: &DbObject, b: &DbObject) -> Option<String> {
    if let (Some(x), Some(y)) = (top_level_name(a), top_level_name(b))
        && x == y
    {
        return Some(format!("name '{x}' was claimed concurrently"));
    }
    if let (Some((ta, x)), Some((tb, y))) = (column_name(a), column_name(b))
        && ta == tb
        && x == y
    {
        return Some(format!(
            "column '{x}' of {} was claimed concurrently",
            DisplayUid(ta)
        ));
    }
    match (a, b) {
        (DbObject::Drop(d), _) if b.references().contains(&d.target) => {
            return Some(format!(
                "{} was dropped concurrently with {}",
                DisplayUid(d.target),
                b.kind()
            ));
        }
        (DbObject::Alter(x), DbObject::Alter(y)) if x.target == y.target => {
            return Some(format!(
                "{} was altered concurrently",
                DisplayUid(x.target)
            ));
        }
        _ => {}
    }
    match (touched_row(a), touched_row(b)) {
        (Some(x), Some(y)) if x == y => Some(format!(
            "row {} was changed concurrently",
            DisplayUid(x)
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::check;
    use crate::catalog::schema::{Column, Table};
    use crate::catalog::types::{DataType, Value};
    use crate::catalog::uid::TXN_BASE;
    use crate::catalog::{Alter, DbObject, Delete, DropObject, Field, Record, Update};
    use crate::error::SnapErrorCode;

    fn table(id: i64, name: &str) -> DbObject {
        DbObject::Table(Table::new(id, name))
    }

    fn update(id: i64, defpos: i64) -> DbObject {
        DbObject::Update(Update {
            id,
            table: 4,
            defpos,
            fields: vec![Field::new(20, Value::Integer(1))],
        })
    }

    fn conflicts(committed: &[DbObject], pending: &[DbObject]) -> bool {
        match check(committed, pending) {
            Ok(()) => false,
            Err(e) => {
                assert_eq!(e.code(), SnapErrorCode::Conflict);
                true
            }
        }
    }

    #[test]
    fn same_name_tables_conflict() {
        assert!(conflicts(&[table(100, "T")], &[table(TXN_BASE + 1, "T")]));
        assert!(!conflicts(&[table(100, "T")], &[table(TXN_BASE + 1, "U")]));
        let rename = DbObject::Alter(Alter {
            id: TXN_BASE + 1,
            target: 4,
            parent: None,
            name: "T".into(),
            data_type: None,
        });
        assert!(conflicts(&[table(100, "T")], &[rename]));
    }

    #[test]
    fn same_name_columns_conflict_only_on_one_table() {
        let col = |id, table| {
            DbObject::Column(Column {
                id,
                name: "c".into(),
                table,
                data_type: DataType::Integer,
            })
        };
        assert!(conflicts(&[col(100, 4)], &[col(TXN_BASE + 1, 4)]));
        assert!(!conflicts(&[col(100, 4)], &[col(TXN_BASE + 1, 8)]));
    }

    #[test]
    fn changes_to_dropped_objects_conflict() {
        let drop = DbObject::Drop(DropObject {
            id: 100,
            target: 4,
            parent: None,
        });
        let insert = DbObject::Record(Record {
            id: TXN_BASE + 1,
            table: 4,
            fields: vec![],
        });
        assert!(conflicts(&[drop.clone()], &[insert.clone()]));
        // Either side may be the one that dropped.
        assert!(conflicts(&[insert], &[drop]));
    }

    #[test]
    fn row_changes_conflict_on_the_same_defpos() {
        assert!(conflicts(&[update(100, 50)], &[update(TXN_BASE + 1, 50)]));
        assert!(!conflicts(&[update(100, 50)], &[update(TXN_BASE + 1, 60)]));
        let delete = DbObject::Delete(Delete {
            id: TXN_BASE + 1,
            table: 4,
            delpos: 50,
        });
        assert!(conflicts(&[update(100, 50)], &[delete]));
    }

    #[test]
    fn alters_of_one_target_conflict() {
        let alter = |id, name: &str| {
            DbObject::Alter(Alter {
                id,
                target: 20,
                parent: Some(4),
                name: name.into(),
                data_type: None,
            })
        };
        assert!(conflicts(&[alter(100, "a")], &[alter(TXN_BASE + 1, "b")]));
    }
}
