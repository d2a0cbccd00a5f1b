use crate::catalog::uid::{DisplayUid, Uid};
use crate::catalog::{DbObject, RowImage};
use crate::error::{ResourceType, SnapError};
use crate::snapshot::Snapshot;
use crate::wal::{CommitBuffer, LOG_HEADER_LEN, LogFile};

/// Loads objects that live only in the log, such as row versions.
pub trait RowSource {
    fn load(&self, pos: Uid) -> Result<DbObject, SnapError>;

    /// The row version recorded at `pos`.
    fn load_row(&self, pos: Uid) -> Result<RowImage, SnapError> {
        self.load(pos)?
            .row_image()
            .ok_or_else(|| SnapError::not_found(ResourceType::Row, DisplayUid(pos)))
    }
}

/// Finds objects by uid in a snapshot, in the bytes of a commit that is
/// being built, or in the durable log.
pub struct Resolver<'a> {
    log: &'a LogFile,
    in_flight: Option<&'a CommitBuffer>,
}

impl<'a> Resolver<'a> {
    pub fn new(log: &'a LogFile) -> Self {
        Self {
            log,
            in_flight: None,
        }
    }

    pub fn with_buffer(log: &'a LogFile, buffer: &'a CommitBuffer) -> Self {
        Self {
            log,
            in_flight: Some(buffer),
        }
    }

    pub fn resolve(&self, snapshot: &Snapshot, pos: Uid) -> Result<DbObject, SnapError> {
        match snapshot.object(pos) {
            Some(object) => Ok(object.clone()),
            None => self.load(pos),
        }
    }
}

impl RowSource for Resolver<'_> {
    fn load(&self, pos: Uid) -> Result<DbObject, SnapError> {
        let max = self.log.max_record_bytes();
        if let Some(decoded) = self.in_flight.and_then(|b| b.read_object(pos, max)) {
            return decoded.map_err(|e| SnapError::LogCorruption {
                offset: pos as u64,
                message: e.to_string(),
            });
        }
        if pos < LOG_HEADER_LEN as Uid || (pos as u64) >= self.log.len() {
            return Err(SnapError::not_found(ResourceType::Object, DisplayUid(pos)));
        }
        self.log
            .read_object(pos as u64)
            .map_err(|e| SnapError::LogCorruption {
                offset: pos as u64,
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{Resolver, RowSource};
    use crate::catalog::schema::Table;
    use crate::catalog::uid::{DETACHED_UID, TXN_BASE};
    use crate::catalog::{DbObject, Field, Record};
    use crate::catalog::types::Value;
    use crate::config::DbConfig;
    use crate::error::SnapErrorCode;
    use crate::snapshot::Snapshot;
    use crate::wal::record::encoded;
    use crate::wal::{CommitBuffer, LOG_HEADER_LEN, LogFile};
    use tempfile::tempdir;

    #[test]
    fn resolves_from_snapshot_buffer_and_log() {
        let dir = tempdir().expect("tempdir");
        let log = LogFile::open(&dir.path().join("r.sdblog"), &DbConfig::default()).expect("open");
        let table = DbObject::Table(Table::new(DETACHED_UID, "T"));
        let end = log.lock_writer().append(&encoded(&table)).expect("append");

        let mut buffer = CommitBuffer::new(end);
        let (row_pos, _) = buffer.push(&DbObject::Record(Record {
            id: DETACHED_UID,
            table: LOG_HEADER_LEN as i64,
            fields: vec![Field::new(9, Value::Integer(1))],
        }));

        let snapshot = Snapshot::empty("r").put_table(Table::new(77, "cached"));
        let resolver = Resolver::with_buffer(&log, &buffer);
        assert_eq!(
            resolver.resolve(&snapshot, 77).expect("snapshot").name(),
            Some("cached")
        );
        assert_eq!(
            resolver.resolve(&snapshot, LOG_HEADER_LEN as i64).expect("log").name(),
            Some("T")
        );
        let row = resolver.load_row(row_pos).expect("buffer");
        assert_eq!((row.uid, row.defpos), (row_pos, row_pos));

        let cold = Resolver::new(&log);
        assert_eq!(
            cold.load(row_pos).err().map(|e| e.code()),
            Some(SnapErrorCode::ObjectNotFound)
        );
        assert_eq!(
            cold.load_row(LOG_HEADER_LEN as i64).err().map(|e| e.code()),
            Some(SnapErrorCode::RowNotFound)
        );
        assert!(cold.load(TXN_BASE + 1).is_err());
    }

    #[test]
    fn undecodable_bytes_are_log_corruption() {
        let dir = tempdir().expect("tempdir");
        let log = LogFile::open(&dir.path().join("c.sdblog"), &DbConfig::default()).expect("open");
        log.lock_writer().append(&[200, 1, 2]).expect("append");
        let err = Resolver::new(&log).load(LOG_HEADER_LEN as i64).err().expect("corrupt");
        assert_eq!(err.code(), SnapErrorCode::LogCorruption);
    }
}
