use crate::catalog::Field;
use crate::catalog::types::{DataType, IndexKey, Value};
use crate::catalog::uid::Uid;
use crate::storage::PMap;
use compact_str::CompactString;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub id: Uid,
    pub name: CompactString,
    pub table: Uid,
    pub data_type: DataType,
}

/// A table value. `rows` maps each row's defining position to the uid of its
/// current version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub id: Uid,
    pub name: CompactString,
    pub columns: PMap<Uid, Column>,
    pub rows: PMap<Uid, Uid>,
}

impl Table {
    pub fn new(id: Uid, name: impl Into<CompactString>) -> Self {
        Self {
            id,
            name: name.into(),
            columns: PMap::new(),
            rows: PMap::new(),
        }
    }

    pub fn column(&self, id: Uid) -> Option<&Column> {
        self.columns.lookup(&id)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.values().find(|c| c.name == name)
    }

    /// Adds the column, or replaces the one with the same id.
    pub fn with_column(&self, column: Column) -> Self {
        Self {
            columns: self.columns.add(column.id, column),
            ..self.clone()
        }
    }

    pub fn without_column(&self, id: Uid) -> Self {
        Self {
            columns: self.columns.remove(&id),
            ..self.clone()
        }
    }

    pub fn renamed(&self, name: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn with_row(&self, defpos: Uid, current: Uid) -> Self {
        Self {
            rows: self.rows.add(defpos, current),
            ..self.clone()
        }
    }

    pub fn without_row(&self, defpos: Uid) -> Self {
        Self {
            rows: self.rows.remove(&defpos),
            ..self.clone()
        }
    }

    pub fn current_version(&self, defpos: Uid) -> Option<Uid> {
        self.rows.lookup(&defpos).copied()
    }
}

/// Row defpos values sharing one key.
pub type RowSet = PMap<Uid, ()>;

/// An index over one table.
///
/// A primary index holds at most one row per key. An index with `references`
/// is a foreign key: each of its keys must be present in the primary index of
/// the referenced table, and it may hold many rows per key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub id: Uid,
    pub table: Uid,
    pub primary: bool,
    pub columns: Vec<Uid>,
    pub references: Option<Uid>,
    pub entries: PMap<IndexKey, RowSet>,
}

impl Index {
    pub fn new(
        id: Uid,
        table: Uid,
        primary: bool,
        columns: Vec<Uid>,
        references: Option<Uid>,
    ) -> Self {
        Self {
            id,
            table,
            primary,
            columns,
            references,
            entries: PMap::new(),
        }
    }

    /// Key of a row under this index; absent fields read as `Null`.
    pub fn key_for(&self, fields: &[Field]) -> IndexKey {
        IndexKey::from_values(self.columns.iter().map(|col| {
            fields
                .iter()
                .find(|f| f.column == *col)
                .map(|f| f.value.clone())
                .unwrap_or(Value::Null)
        }))
    }

    /// First row carrying `key`.
    pub fn lookup(&self, key: &IndexKey) -> Option<Uid> {
        self.entries
            .lookup(key)
            .and_then(|rows| rows.keys().next().copied())
    }

    pub fn contains_key(&self, key: &IndexKey) -> bool {
        self.entries.lookup(key).is_some_and(|rows| !rows.is_empty())
    }

    pub fn rows_for(&self, key: &IndexKey) -> Vec<Uid> {
        self.entries
            .lookup(key)
            .map(|rows| rows.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn with_entry(&self, key: IndexKey, defpos: Uid) -> Self {
        let rows = self.entries.lookup(&key).cloned().unwrap_or_default();
        Self {
            entries: self.entries.add(key, rows.add(defpos, ())),
            ..self.clone()
        }
    }

    pub fn without_entry(&self, key: &IndexKey, defpos: Uid) -> Self {
        let Some(rows) = self.entries.lookup(key) else {
            return self.clone();
        };
        let rows = rows.remove(&defpos);
        let entries = if rows.is_empty() {
            self.entries.remove(key)
        } else {
            self.entries.add(key.clone(), rows)
        };
        Self {
            entries,
            ..self.clone()
        }
    }

    pub fn uses_column(&self, column: Uid) -> bool {
        self.columns.contains(&column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub id: Uid,
    pub name: CompactString,
    pub definition: CompactString,
}
