use crate::catalog::uid::{DisplayUid, TXN_BASE, Uid, is_transient};
use crate::commit::conflict;
use crate::commit::fixup::FixupMap;
use crate::commit::tx::Transaction;
use crate::error::{FormatError, ResourceType, SnapError};
use crate::snapshot::{Resolver, Snapshot};
use crate::wal::{CommitBuffer, LogWriter};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CommitResult {
    pub snapshot: Arc<Snapshot>,
    /// Permanent uid of every object the transaction created.
    pub fixups: FixupMap,
    /// Log offset of the first appended record.
    pub start: u64,
    /// Log length after the append, commit marker included.
    pub end: u64,
}

impl CommitResult {
    pub fn permanent(&self, transient: Uid) -> Option<Uid> {
        self.fixups.get(transient)
    }

    pub fn records(&self) -> usize {
        self.fixups.len()
    }
}

/// Commits `tx` on top of `current`, the snapshot published for the log
/// `writer` holds. The transaction is used up whether or not the commit
/// succeeds.
///
/// Pending objects are taken in creation order. Each one has its references
/// rewritten, is encoded into the commit buffer at the offset that becomes
/// its uid, and is installed into the snapshot being built. The buffer is
/// closed with a commit marker and reaches the log in one append only after
/// every object installed; any error before that leaves the log and
/// `current` as they were.
pub fn commit(
    writer: &LogWriter<'_>,
    current: &Arc<Snapshot>,
    tx: Transaction,
) -> Result<CommitResult, SnapError> {
    let log = writer.log();
    let start = writer.len();
    if current.curpos != start {
        return Err(SnapError::LogCorruption {
            offset: start,
            message: format!(
                "log length {start} does not match published snapshot at {}",
                current.curpos
            ),
        });
    }
    if tx.is_empty() {
        return Ok(CommitResult {
            snapshot: Arc::clone(current),
            fixups: FixupMap::new(),
            start,
            end: start,
        });
    }

    let base = tx.base();
    if base.curpos < current.curpos {
        let committed = conflict::read_committed(log, base.curpos, current.curpos)?;
        conflict::check(&committed, tx.pending().values())?;
    }

    let max = log.max_record_bytes();
    let mut buffer = CommitBuffer::new(start);
    let mut fixups = FixupMap::new();
    let mut snapshot = Snapshot::clone(current);
    let mut cursor = tx.pending().position_at(&TXN_BASE);
    while let Some(entry) = cursor {
        let transient = *entry.key();
        let object = entry.value().remap(|u| fixups.map(u));
        if let Some(dangling) = object.references().into_iter().find(|u| is_transient(*u)) {
            return Err(SnapError::not_found(
                ResourceType::Object,
                DisplayUid(dangling),
            ));
        }
        let (uid, len) = buffer.push(&object);
        if len > max {
            return Err(FormatError::Oversized {
                len: len as i64,
                max,
                offset: uid as u64,
            }
            .into());
        }
        fixups = fixups.record(transient, uid);
        let rows = Resolver::with_buffer(log, &buffer);
        snapshot = snapshot
            .install(&object, uid, &rows)?
            .advance(buffer.next_offset());
        cursor = entry.next();
    }

    buffer.seal(fixups.len());
    let snapshot = snapshot.advance(buffer.next_offset());
    let end = writer.append(buffer.bytes())?;
    debug!(
        database = %snapshot.name,
        objects = fixups.len(),
        bytes = buffer.len(),
        length = end,
        "commit appended"
    );
    Ok(CommitResult {
        snapshot: Arc::new(snapshot),
        fixups,
        start,
        end,
    })
}
