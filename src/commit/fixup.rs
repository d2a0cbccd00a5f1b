use crate::catalog::uid::Uid;
use crate::storage::PMap;

/// Transaction-local uid to permanent uid, built while one commit encodes
/// its objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixupMap(PMap<Uid, Uid>);

impl FixupMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, transient: Uid, permanent: Uid) -> Self {
        Self(self.0.add(transient, permanent))
    }

    pub fn get(&self, transient: Uid) -> Option<Uid> {
        self.0.lookup(&transient).copied()
    }

    /// `uid` translated if this commit assigned it, unchanged otherwise.
    pub fn map(&self, uid: Uid) -> Uid {
        self.get(uid).unwrap_or(uid)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Uid, Uid)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }
}
