use crate::config::RecoveryMode;
use crate::error::{FormatError, SnapError};
use crate::snapshot::{Resolver, Snapshot};
use crate::wal::codec::ByteSource;
use crate::wal::record::{LogEntry, Origin, decode_entry};
use crate::wal::{LOG_HEADER_LEN, LogFile};
use std::io;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub snapshot: Snapshot,
    /// Object records folded into `snapshot`.
    pub records: usize,
    /// Commits folded into `snapshot`.
    pub commits: usize,
    /// End of the last complete commit, when a permissive replay found bytes
    /// after it that do not form a complete commit. The caller decides
    /// whether to cut the file there.
    pub torn_at: Option<u64>,
}

/// Folds every commit of `log` into a snapshot for database `name`.
///
/// Each record's offset is its uid, so nothing needs remapping. Objects are
/// installed as they are read, but the snapshot only moves forward at a
/// commit marker whose count matches the objects before it. A tail that does
/// not end in such a marker (an undecodable record, a miscounted marker, or
/// objects with no marker at all) fails a strict replay with
/// `LogCorruption`; a permissive replay drops it and reports where the last
/// complete commit ends. A record that decodes but does not install is
/// corruption in either mode.
pub fn replay(name: &str, log: &LogFile, mode: RecoveryMode) -> Result<ReplayOutcome, SnapError> {
    info!(database = name, bytes = log.len(), ?mode, "recovery: replay log");
    let rows = Resolver::new(log);
    let max = log.max_record_bytes();
    let mut committed = Snapshot::empty(name);
    let mut records = 0usize;
    let mut commits = 0usize;
    let mut working = committed.clone();
    let mut in_flight = 0usize;
    let mut cursor = log.cursor(LOG_HEADER_LEN);
    let mut torn = None;

    while !cursor.at_end() {
        let pos = cursor.position();
        match decode_entry(&mut cursor, Origin::Log, max) {
            Ok(LogEntry::Object(object)) => {
                let uid = object.uid();
                working = working
                    .install(&object, uid, &rows)
                    .map_err(|err| SnapError::LogCorruption {
                        offset: pos,
                        message: format!("{} does not install: {err}", object.kind()),
                    })?
                    .advance(cursor.position());
                in_flight += 1;
            }
            Ok(LogEntry::CommitEnd { records: expected }) if expected == in_flight => {
                committed = working.advance(cursor.position());
                working = committed.clone();
                records += in_flight;
                commits += 1;
                in_flight = 0;
            }
            Ok(LogEntry::CommitEnd { records: expected }) => {
                torn = Some((
                    pos,
                    format!("commit marker counts {expected} records, found {in_flight}"),
                ));
                break;
            }
            Err(FormatError::Io(message)) => return Err(SnapError::Io(io::Error::other(message))),
            Err(err) => {
                torn = Some((pos, err.to_string()));
                break;
            }
        }
    }
    if torn.is_none() && in_flight > 0 {
        torn = Some((
            log.len(),
            format!("{in_flight} records after the last commit marker"),
        ));
    }

    let torn_at = match torn {
        None => None,
        Some((offset, message)) if matches!(mode, RecoveryMode::Strict) => {
            return Err(SnapError::LogCorruption { offset, message });
        }
        Some((offset, message)) => {
            warn!(
                database = name,
                offset,
                kept = committed.curpos,
                length = log.len(),
                error = %message,
                "recovery: incomplete commit at the end of the log, dropping it"
            );
            Some(committed.curpos)
        }
    };

    info!(
        database = name,
        records,
        commits,
        tables = committed.tables().count(),
        rows = committed.row_count(),
        curpos = committed.curpos,
        "recovery: replay complete"
    );
    Ok(ReplayOutcome {
        snapshot: committed,
        records,
        commits,
        torn_at,
    })
}

#[cfg(test)]
mod tests {
    use super::replay;
    use crate::catalog::DbObject;
    use crate::catalog::schema::{Column, Table};
    use crate::catalog::types::DataType;
    use crate::catalog::uid::DETACHED_UID;
    use crate::config::{DbConfig, RecoveryMode};
    use crate::error::SnapErrorCode;
    use crate::wal::LOG_HEADER_LEN;
    use crate::wal::LogFile;
    use crate::wal::record::{COMMIT_END_LEN, encode_commit_end, encoded};
    use tempfile::tempdir;

    fn table(name: &str) -> DbObject {
        DbObject::Table(Table::new(DETACHED_UID, name))
    }

    /// Encodes `objects` as one commit, marker included.
    fn commit_bytes(objects: &[DbObject]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for object in objects {
            bytes.extend(encoded(object));
        }
        encode_commit_end(&mut bytes, objects.len());
        bytes
    }

    #[test]
    fn empty_log_replays_to_the_empty_snapshot() {
        let dir = tempdir().expect("tempdir");
        let log = LogFile::open(&dir.path().join("e.sdblog"), &DbConfig::default()).expect("open");
        let out = replay("e", &log, RecoveryMode::Strict).expect("replay");
        assert_eq!(out.records, 0);
        assert_eq!(out.commits, 0);
        assert_eq!(out.snapshot.curpos, LOG_HEADER_LEN);
        assert_eq!(out.torn_at, None);
    }

    #[test]
    fn records_install_at_their_offsets() {
        let dir = tempdir().expect("tempdir");
        let log = LogFile::open(&dir.path().join("r.sdblog"), &DbConfig::default()).expect("open");
        let a = encoded(&table("A"));
        log.lock_writer()
            .append(&commit_bytes(&[table("A"), table("B")]))
            .expect("append");

        let out = replay("r", &log, RecoveryMode::Strict).expect("replay");
        assert_eq!(out.records, 2);
        assert_eq!(out.commits, 1);
        assert_eq!(out.snapshot.curpos, log.len());
        let b = out.snapshot.table_by_name("B").expect("B");
        assert_eq!(b.id, (LOG_HEADER_LEN + a.len() as u64) as i64);
    }

    #[test]
    fn torn_tail_depends_on_the_mode() {
        let dir = tempdir().expect("tempdir");
        let log = LogFile::open(&dir.path().join("t.sdblog"), &DbConfig::default()).expect("open");
        let writer = log.lock_writer();
        let good = writer.append(&commit_bytes(&[table("A")])).expect("append");
        let partial = commit_bytes(&[table("B")]);
        writer.append(&partial[..partial.len() - 2]).expect("append");
        drop(writer);

        let err = replay("t", &log, RecoveryMode::Strict).expect_err("strict");
        assert_eq!(err.code(), SnapErrorCode::LogCorruption);

        let out = replay("t", &log, RecoveryMode::Permissive).expect("permissive");
        assert_eq!(out.records, 1);
        assert_eq!(out.torn_at, Some(good));
        assert_eq!(out.snapshot.curpos, good);
    }

    #[test]
    fn a_commit_missing_its_marker_is_dropped_whole() {
        let dir = tempdir().expect("tempdir");
        let log = LogFile::open(&dir.path().join("m.sdblog"), &DbConfig::default()).expect("open");
        let writer = log.lock_writer();
        let good = writer.append(&commit_bytes(&[table("A")])).expect("append");
        // B lands where the first commit ends.
        let b = good as i64;
        let second = commit_bytes(&[
            table("B"),
            DbObject::Column(Column {
                id: DETACHED_UID,
                name: "c".into(),
                table: b,
                data_type: DataType::Integer,
            }),
        ]);
        // Every object of the second commit is on disk, its marker is not.
        writer
            .append(&second[..second.len() - COMMIT_END_LEN])
            .expect("append");
        drop(writer);

        let err = replay("m", &log, RecoveryMode::Strict).expect_err("strict");
        assert_eq!(err.code(), SnapErrorCode::LogCorruption);

        let out = replay("m", &log, RecoveryMode::Permissive).expect("permissive");
        assert_eq!(out.commits, 1);
        assert_eq!(out.torn_at, Some(good));
        assert!(out.snapshot.table_by_name("B").is_none());
        assert!(out.snapshot.table(b).is_err());
        assert_eq!(
            out.snapshot.table_by_name("A").map(|a| a.id),
            Some(LOG_HEADER_LEN as i64)
        );
    }

    #[test]
    fn a_miscounted_marker_ends_the_good_prefix() {
        let dir = tempdir().expect("tempdir");
        let log = LogFile::open(&dir.path().join("n.sdblog"), &DbConfig::default()).expect("open");
        let writer = log.lock_writer();
        let good = writer.append(&commit_bytes(&[table("A")])).expect("append");
        let mut bytes = encoded(&table("B"));
        encode_commit_end(&mut bytes, 3);
        writer.append(&bytes).expect("append");
        drop(writer);

        let out = replay("n", &log, RecoveryMode::Permissive).expect("permissive");
        assert_eq!(out.torn_at, Some(good));
        assert!(out.snapshot.table_by_name("B").is_none());
    }

    #[test]
    fn records_that_do_not_install_are_corruption() {
        let dir = tempdir().expect("tempdir");
        let log = LogFile::open(&dir.path().join("d.sdblog"), &DbConfig::default()).expect("open");
        log.lock_writer()
            .append(&commit_bytes(&[table("A"), table("A")]))
            .expect("append");
        for mode in [RecoveryMode::Strict, RecoveryMode::Permissive] {
            let err = replay("d", &log, mode).expect_err("duplicate name");
            assert_eq!(err.code(), SnapErrorCode::LogCorruption);
        }
    }
}
