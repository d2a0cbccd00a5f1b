pub mod install;
pub mod reader;

use crate::catalog::DbObject;
use crate::catalog::schema::{Index, Table, View};
use crate::catalog::uid::{DisplayUid, Uid};
use crate::error::{ResourceType, SnapError};
use crate::storage::PMap;
use crate::wal::LOG_HEADER_LEN;
use compact_str::CompactString;

pub use reader::{Resolver, RowSource};

/// One immutable state of a database.
///
/// `objects` holds tables, indexes and views by uid; `names` holds tables and
/// views by their current name. `curpos` is the log length this snapshot
/// reflects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub name: CompactString,
    pub objects: PMap<Uid, DbObject>,
    pub names: PMap<CompactString, DbObject>,
    pub curpos: u64,
}

impl Snapshot {
    /// The state of a log holding no records.
    pub fn empty(name: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            objects: PMap::new(),
            names: PMap::new(),
            curpos: LOG_HEADER_LEN,
        }
    }

    pub fn object(&self, uid: Uid) -> Option<&DbObject> {
        self.objects.lookup(&uid)
    }

    pub fn by_name(&self, name: &str) -> Option<&DbObject> {
        self.names.lookup(name)
    }

    pub fn table(&self, uid: Uid) -> Result<&Table, SnapError> {
        match self.objects.lookup(&uid) {
            Some(DbObject::Table(t)) => Ok(t),
            _ => Err(SnapError::not_found(ResourceType::Table, DisplayUid(uid))),
        }
    }

    pub fn table_by_name(&self, name: &str) -> Option<&Table> {
        match self.names.lookup(name) {
            Some(DbObject::Table(t)) => Some(t),
            _ => None,
        }
    }

    pub fn index(&self, uid: Uid) -> Result<&Index, SnapError> {
        match self.objects.lookup(&uid) {
            Some(DbObject::Index(i)) => Ok(i),
            _ => Err(SnapError::not_found(ResourceType::Index, DisplayUid(uid))),
        }
    }

    pub fn view_by_name(&self, name: &str) -> Option<&View> {
        match self.names.lookup(name) {
            Some(DbObject::View(v)) => Some(v),
            _ => None,
        }
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.objects.values().filter_map(|o| match o {
            DbObject::Table(t) => Some(t),
            _ => None,
        })
    }

    pub fn indexes(&self) -> impl Iterator<Item = &Index> {
        self.objects.values().filter_map(|o| match o {
            DbObject::Index(i) => Some(i),
            _ => None,
        })
    }

    pub fn views(&self) -> impl Iterator<Item = &View> {
        self.objects.values().filter_map(|o| match o {
            DbObject::View(v) => Some(v),
            _ => None,
        })
    }

    /// Indexes built over `table`, in uid order.
    pub fn indexes_for(&self, table: Uid) -> Vec<&Index> {
        self.indexes().filter(|i| i.table == table).collect()
    }

    /// The index foreign keys into `table` are checked against: its first
    /// primary index.
    pub fn primary_index(&self, table: Uid) -> Option<&Index> {
        self.indexes().find(|i| i.table == table && i.primary)
    }

    /// Indexes on any table whose foreign key points at `table`.
    pub fn referencing(&self, table: Uid) -> Vec<&Index> {
        self.indexes()
            .filter(|i| i.references == Some(table))
            .collect()
    }

    /// Writes `table` under its uid and its current name.
    pub(crate) fn put_table(&self, table: Table) -> Snapshot {
        let object = DbObject::Table(table);
        let name = object.name().map(CompactString::from).unwrap_or_default();
        Snapshot {
            objects: self.objects.add(object.uid(), object.clone()),
            names: self.names.add(name, object),
            ..self.clone()
        }
    }

    pub(crate) fn put_index(&self, index: Index) -> Snapshot {
        Snapshot {
            objects: self.objects.add(index.id, DbObject::Index(index)),
            ..self.clone()
        }
    }

    /// This snapshot marked complete through log length `curpos`.
    pub fn advance(&self, curpos: u64) -> Snapshot {
        Snapshot {
            curpos,
            ..self.clone()
        }
    }

    /// Number of live rows over all tables.
    pub fn row_count(&self) -> usize {
        self.tables().map(|t| t.rows.len()).sum()
    }
}
