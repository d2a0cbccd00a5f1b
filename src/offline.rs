use crate::catalog::{DbObject, ObjectKind};
use crate::catalog::uid::DisplayUid;
use crate::config::DbConfig;
use crate::error::{FormatError, ResourceType, SnapError};
use crate::recovery::replay;
use crate::snapshot::{Resolver, RowSource, Snapshot};
use crate::wal::codec::ByteSource;
use crate::wal::record::{LogEntry, Origin, decode_entry};
use crate::wal::{LOG_EXTENSION, LOG_HEADER_LEN, LogFile};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RecordEntry {
    pub offset: u64,
    pub kind: ObjectKind,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LogInspectReport {
    pub path: String,
    pub bytes: u64,
    pub records: usize,
    pub commits: usize,
    pub kinds: BTreeMap<&'static str, usize>,
    pub entries: Vec<RecordEntry>,
    /// End of the last complete commit when the bytes after it do not form
    /// one; recovery would cut the log here.
    pub torn_at: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InvariantReport {
    pub ok: bool,
    pub database: String,
    pub records: usize,
    pub commits: usize,
    pub curpos: u64,
    pub tables: usize,
    pub indexes: usize,
    pub views: usize,
    pub rows: usize,
    pub torn_at: Option<u64>,
    pub violations: Vec<String>,
}

/// Decodes every record of the log at `path` without building a snapshot.
/// Stops at the first record that does not decode and reports where the
/// last complete commit ends.
pub fn inspect_log(path: &Path, config: &DbConfig) -> Result<LogInspectReport, SnapError> {
    let log = LogFile::open_read_only(path, config)?;
    let mut cursor = log.cursor(LOG_HEADER_LEN);
    let mut kinds = BTreeMap::new();
    let mut entries = Vec::new();
    let mut commits = 0usize;
    let mut last_commit_end = LOG_HEADER_LEN;
    let mut in_flight = 0usize;
    let mut error = None;
    while !cursor.at_end() {
        let offset = cursor.position();
        match decode_entry(&mut cursor, Origin::Log, log.max_record_bytes()) {
            Ok(LogEntry::Object(object)) => {
                let kind = object.kind();
                *kinds.entry(kind.as_str()).or_insert(0) += 1;
                entries.push(RecordEntry {
                    offset,
                    kind,
                    detail: object.to_string(),
                });
                in_flight += 1;
            }
            Ok(LogEntry::CommitEnd { records }) if records == in_flight => {
                commits += 1;
                last_commit_end = cursor.position();
                in_flight = 0;
            }
            Ok(LogEntry::CommitEnd { records }) => {
                error = Some(format!(
                    "commit marker at offset {offset} counts {records} records, found {in_flight}"
                ));
                break;
            }
            Err(FormatError::Io(message)) => return Err(SnapError::Io(io::Error::other(message))),
            Err(err) => {
                error = Some(err.to_string());
                break;
            }
        }
    }
    if error.is_none() && in_flight > 0 {
        error = Some(format!("{in_flight} records after the last commit marker"));
    }
    Ok(LogInspectReport {
        path: path.display().to_string(),
        bytes: log.len(),
        records: entries.len(),
        commits,
        kinds,
        entries,
        torn_at: error.is_some().then_some(last_commit_end),
        error,
    })
}

/// Replays database `name` under `dir` read-only and checks the resulting
/// snapshot. Nothing is written, even when a permissive replay finds a torn
/// tail.
pub fn check_invariants(
    dir: &Path,
    name: &str,
    config: &DbConfig,
) -> Result<InvariantReport, SnapError> {
    let path = dir.join(format!("{name}.{LOG_EXTENSION}"));
    if !path.exists() {
        return Err(SnapError::not_found(ResourceType::Database, name));
    }
    let log = LogFile::open_read_only(&path, config)?;
    let outcome = replay(name, &log, config.recovery_mode)?;
    let snapshot = &outcome.snapshot;
    let violations = verify_snapshot(snapshot, &Resolver::new(&log));
    Ok(InvariantReport {
        ok: violations.is_empty(),
        database: name.to_string(),
        records: outcome.records,
        commits: outcome.commits,
        curpos: snapshot.curpos,
        tables: snapshot.tables().count(),
        indexes: snapshot.indexes().count(),
        views: snapshot.views().count(),
        rows: snapshot.row_count(),
        torn_at: outcome.torn_at,
        violations,
    })
}

/// Structural checks over one snapshot; returns one message per violation.
pub fn verify_snapshot(snapshot: &Snapshot, rows: &dyn RowSource) -> Vec<String> {
    let mut violations = Vec::new();

    for (name, object) in snapshot.names.iter() {
        match snapshot.object(object.uid()) {
            Some(stored) if stored.name() == Some(name.as_str()) => {}
            Some(stored) => violations.push(format!(
                "name '{name}' maps to {} whose name is {:?}",
                DisplayUid(object.uid()),
                stored.name()
            )),
            None => violations.push(format!(
                "name '{name}' maps to {} which is not in objects",
                DisplayUid(object.uid())
            )),
        }
    }
    for object in snapshot.objects.values() {
        if let Some(name) = object.name()
            && snapshot.by_name(name).map(DbObject::uid) != Some(object.uid())
        {
            violations.push(format!(
                "{} {} is not reachable by its name '{name}'",
                object.kind(),
                DisplayUid(object.uid())
            ));
        }
    }

    for table in snapshot.tables() {
        for column in table.columns.values() {
            if column.table != table.id {
                violations.push(format!(
                    "column {} of table '{}' names owner {}",
                    DisplayUid(column.id),
                    table.name,
                    DisplayUid(column.table)
                ));
            }
        }
        for (defpos, version) in table.rows.iter() {
            match rows.load_row(*version) {
                Ok(row) if row.defpos == *defpos && row.table == table.id => {}
                Ok(row) => violations.push(format!(
                    "row {} of table '{}' resolves to row {} of {}",
                    DisplayUid(*defpos),
                    table.name,
                    DisplayUid(row.defpos),
                    DisplayUid(row.table)
                )),
                Err(err) => violations.push(format!(
                    "row {} of table '{}' does not load: {err}",
                    DisplayUid(*defpos),
                    table.name
                )),
            }
        }
    }

    for index in snapshot.indexes() {
        let label = DisplayUid(index.id);
        let Ok(table) = snapshot.table(index.table) else {
            violations.push(format!(
                "index {label} is on missing table {}",
                DisplayUid(index.table)
            ));
            continue;
        };
        let referenced = match index.references {
            Some(target) => match snapshot.primary_index(target) {
                Some(primary) => Some(primary),
                None => {
                    violations.push(format!(
                        "index {label} references {} which has no primary index",
                        DisplayUid(target)
                    ));
                    None
                }
            },
            None => None,
        };
        let mut indexed = 0usize;
        for (key, defposes) in index.entries.iter() {
            if index.primary && defposes.len() > 1 {
                violations.push(format!("primary index {label} holds key {key} more than once"));
            }
            if let Some(primary) = referenced
                && !key.has_null()
                && !primary.contains_key(key)
            {
                violations.push(format!(
                    "index {label} holds key {key} missing from the referenced table"
                ));
            }
            for defpos in defposes.keys() {
                indexed += 1;
                let Some(version) = table.current_version(*defpos) else {
                    violations.push(format!(
                        "index {label} points at removed row {}",
                        DisplayUid(*defpos)
                    ));
                    continue;
                };
                if let Ok(row) = rows.load_row(version)
                    && index.key_for(&row.fields) != *key
                {
                    violations.push(format!(
                        "index {label} files row {} under stale key {key}",
                        DisplayUid(*defpos)
                    ));
                }
            }
        }
        if indexed != table.rows.len() {
            violations.push(format!(
                "index {label} covers {indexed} rows, table '{}' has {}",
                table.name,
                table.rows.len()
            ));
        }
    }

    if snapshot.curpos < LOG_HEADER_LEN {
        violations.push(format!("curpos {} is inside the log header", snapshot.curpos));
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::verify_snapshot;
    use crate::catalog::DbObject;
    use crate::catalog::schema::{Index, Table};
    use crate::catalog::types::IndexKey;
    use crate::catalog::types::Value;
    use crate::error::{ResourceType, SnapError};
    use crate::snapshot::{RowSource, Snapshot};

    struct NoRows;

    impl RowSource for NoRows {
        fn load(&self, pos: i64) -> Result<DbObject, SnapError> {
            Err(SnapError::not_found(ResourceType::Object, pos))
        }
    }

    #[test]
    fn empty_snapshot_is_consistent() {
        assert!(verify_snapshot(&Snapshot::empty("db"), &NoRows).is_empty());
    }

    #[test]
    fn dangling_index_entries_are_reported() {
        let snapshot = Snapshot::empty("db").put_table(Table::new(4, "T"));
        let index = Index::new(10, 4, true, vec![], None)
            .with_entry(IndexKey::from_single(Value::Integer(1)), 50);
        let snapshot = snapshot.put_index(index);
        let violations = verify_snapshot(&snapshot, &NoRows);
        assert!(violations.iter().any(|v| v.contains("removed row 50")));
        assert!(violations.iter().any(|v| v.contains("covers 1 rows")));
    }

    #[test]
    fn names_out_of_step_with_objects_are_reported() {
        let mut snapshot = Snapshot::empty("db").put_table(Table::new(4, "T"));
        snapshot.names = snapshot.names.remove("T");
        let violations = verify_snapshot(&snapshot, &NoRows);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("not reachable"));
    }
}
