use std::fmt;

/// Identifier of a database object.
///
/// Values in `0..TXN_BASE` are permanent: the log offset of the object's tag
/// byte. Values `>= TXN_BASE` belong to one uncommitted transaction.
pub type Uid = i64;

pub const TXN_BASE: Uid = 0x4000_0000_0000_0000;

/// Uid of an object decoded from something other than the durable log.
pub const DETACHED_UID: Uid = -1;

pub fn is_transient(uid: Uid) -> bool {
    uid >= TXN_BASE
}

pub fn is_permanent(uid: Uid) -> bool {
    (0..TXN_BASE).contains(&uid)
}

/// Human-readable uid: transaction-local ids are single-quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayUid(pub Uid);

impl fmt::Display for DisplayUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if is_transient(self.0) {
            write!(f, "'{}", self.0 - TXN_BASE)
        } else {
            write!(f, "{}", self.0)
        }
    }
}
