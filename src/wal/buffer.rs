use crate::catalog::DbObject;
use crate::catalog::uid::Uid;
use crate::error::FormatError;
use crate::wal::codec::SliceReader;
use crate::wal::record::{Origin, decode_object, encode_commit_end, encode_object};

/// Bytes encoded by a commit that has not reached the log yet. Offsets are
/// absolute log positions: the buffer starts where the log currently ends.
#[derive(Debug, Clone)]
pub struct CommitBuffer {
    base: u64,
    bytes: Vec<u8>,
}

impl CommitBuffer {
    pub fn new(base: u64) -> Self {
        Self {
            base,
            bytes: Vec::new(),
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    /// Log offset the next pushed object will occupy.
    pub fn next_offset(&self) -> u64 {
        self.base + self.bytes.len() as u64
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encodes `object` at the end of the buffer and returns its offset and
    /// encoded length.
    pub fn push(&mut self, object: &DbObject) -> (Uid, usize) {
        let at = self.next_offset();
        let before = self.bytes.len();
        encode_object(&mut self.bytes, object);
        (at as Uid, self.bytes.len() - before)
    }

    /// Closes the buffer with the marker recording how many objects the
    /// commit holds. Replay only keeps commits whose marker made it to disk.
    pub fn seal(&mut self, records: usize) {
        encode_commit_end(&mut self.bytes, records);
    }

    pub fn contains(&self, pos: Uid) -> bool {
        pos >= 0 && (pos as u64) >= self.base && (pos as u64) < self.next_offset()
    }

    /// Decodes the object at `pos`, or `None` when `pos` is outside the
    /// buffer.
    pub fn read_object(&self, pos: Uid, max: usize) -> Option<Result<DbObject, FormatError>> {
        if !self.contains(pos) {
            return None;
        }
        let mut reader = SliceReader::at(&self.bytes, self.base);
        reader.seek(pos as u64);
        Some(decode_object(&mut reader, Origin::Log, max))
    }
}
