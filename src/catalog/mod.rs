pub mod schema;
pub mod types;
pub mod uid;

use crate::catalog::schema::{Column, Index, Table, View};
use crate::catalog::types::{DataType, Value};
use crate::catalog::uid::{DisplayUid, Uid};
use compact_str::CompactString;
use serde::Serialize;
use std::fmt;

/// One stored cell: the column it belongs to and its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub column: Uid,
    pub value: Value,
}

impl Field {
    pub fn new(column: Uid, value: Value) -> Self {
        Self { column, value }
    }
}

/// First version of a row. Its own uid is the row's defining position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: Uid,
    pub table: Uid,
    pub fields: Vec<Field>,
}

/// Later version of the row defined at `defpos`, carrying every field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub id: Uid,
    pub table: Uid,
    pub defpos: Uid,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delete {
    pub id: Uid,
    pub table: Uid,
    pub delpos: Uid,
}

/// Rename of a table (`parent == None`) or of a column of `parent`, with an
/// optional change of the column's declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alter {
    pub id: Uid,
    pub target: Uid,
    pub parent: Option<Uid>,
    pub name: CompactString,
    pub data_type: Option<DataType>,
}

/// Removal of a top-level object (`parent == None`) or of a column of
/// `parent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropObject {
    pub id: Uid,
    pub target: Uid,
    pub parent: Option<Uid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Table,
    Column,
    Record,
    Update,
    Delete,
    Alter,
    Drop,
    Index,
    View,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Table => "table",
            ObjectKind::Column => "column",
            ObjectKind::Record => "record",
            ObjectKind::Update => "update",
            ObjectKind::Delete => "delete",
            ObjectKind::Alter => "alter",
            ObjectKind::Drop => "drop",
            ObjectKind::Index => "index",
            ObjectKind::View => "view",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every kind of object the log can hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbObject {
    Table(Table),
    Column(Column),
    Record(Record),
    Update(Update),
    Delete(Delete),
    Alter(Alter),
    Drop(DropObject),
    Index(Index),
    View(View),
}

impl DbObject {
    pub fn uid(&self) -> Uid {
        match self {
            DbObject::Table(t) => t.id,
            DbObject::Column(c) => c.id,
            DbObject::Record(r) => r.id,
            DbObject::Update(u) => u.id,
            DbObject::Delete(d) => d.id,
            DbObject::Alter(a) => a.id,
            DbObject::Drop(d) => d.id,
            DbObject::Index(i) => i.id,
            DbObject::View(v) => v.id,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            DbObject::Table(_) => ObjectKind::Table,
            DbObject::Column(_) => ObjectKind::Column,
            DbObject::Record(_) => ObjectKind::Record,
            DbObject::Update(_) => ObjectKind::Update,
            DbObject::Delete(_) => ObjectKind::Delete,
            DbObject::Alter(_) => ObjectKind::Alter,
            DbObject::Drop(_) => ObjectKind::Drop,
            DbObject::Index(_) => ObjectKind::Index,
            DbObject::View(_) => ObjectKind::View,
        }
    }

    /// The same object re-identified as `uid`. Only the object's own id
    /// changes; embedded references are left to [`DbObject::remap`].
    pub fn with_uid(&self, uid: Uid) -> DbObject {
        let mut out = self.clone();
        match &mut out {
            DbObject::Table(t) => t.id = uid,
            DbObject::Column(c) => c.id = uid,
            DbObject::Record(r) => r.id = uid,
            DbObject::Update(u) => u.id = uid,
            DbObject::Delete(d) => d.id = uid,
            DbObject::Alter(a) => a.id = uid,
            DbObject::Drop(d) => d.id = uid,
            DbObject::Index(i) => i.id = uid,
            DbObject::View(v) => v.id = uid,
        }
        out
    }

    /// Rewrites every embedded reference through `map`.
    pub fn remap(&self, map: impl Fn(Uid) -> Uid) -> DbObject {
        let fields = |fields: &[Field]| -> Vec<Field> {
            fields
                .iter()
                .map(|f| Field::new(map(f.column), f.value.clone()))
                .collect()
        };
        match self {
            DbObject::Table(_) | DbObject::View(_) => self.clone(),
            DbObject::Column(c) => DbObject::Column(Column {
                table: map(c.table),
                ..c.clone()
            }),
            DbObject::Record(r) => DbObject::Record(Record {
                id: r.id,
                table: map(r.table),
                fields: fields(&r.fields),
            }),
            DbObject::Update(u) => DbObject::Update(Update {
                id: u.id,
                table: map(u.table),
                defpos: map(u.defpos),
                fields: fields(&u.fields),
            }),
            DbObject::Delete(d) => DbObject::Delete(Delete {
                id: d.id,
                table: map(d.table),
                delpos: map(d.delpos),
            }),
            DbObject::Alter(a) => DbObject::Alter(Alter {
                target: map(a.target),
                parent: a.parent.map(&map),
                ..a.clone()
            }),
            DbObject::Drop(d) => DbObject::Drop(DropObject {
                id: d.id,
                target: map(d.target),
                parent: d.parent.map(&map),
            }),
            DbObject::Index(i) => DbObject::Index(Index {
                table: map(i.table),
                columns: i.columns.iter().map(|c| map(*c)).collect(),
                references: i.references.map(&map),
                ..i.clone()
            }),
        }
    }

    /// Uids of other objects this one points at.
    pub fn references(&self) -> Vec<Uid> {
        let columns = |fields: &[Field]| fields.iter().map(|f| f.column).collect::<Vec<_>>();
        match self {
            DbObject::Table(_) | DbObject::View(_) => Vec::new(),
            DbObject::Column(c) => vec![c.table],
            DbObject::Record(r) => {
                let mut out = vec![r.table];
                out.extend(columns(&r.fields));
                out
            }
            DbObject::Update(u) => {
                let mut out = vec![u.table, u.defpos];
                out.extend(columns(&u.fields));
                out
            }
            DbObject::Delete(d) => vec![d.table, d.delpos],
            DbObject::Alter(a) => std::iter::once(a.target).chain(a.parent).collect(),
            DbObject::Drop(d) => std::iter::once(d.target).chain(d.parent).collect(),
            DbObject::Index(i) => std::iter::once(i.table)
                .chain(i.columns.iter().copied())
                .chain(i.references)
                .collect(),
        }
    }

    /// Row content carried by a record or update.
    pub fn row_image(&self) -> Option<RowImage> {
        match self {
            DbObject::Record(r) => Some(RowImage {
                uid: r.id,
                table: r.table,
                defpos: r.id,
                fields: r.fields.clone(),
            }),
            DbObject::Update(u) => Some(RowImage {
                uid: u.id,
                table: u.table,
                defpos: u.defpos,
                fields: u.fields.clone(),
            }),
            _ => None,
        }
    }

    /// Name under which the object is registered in a snapshot's `names`.
    pub fn name(&self) -> Option<&str> {
        match self {
            DbObject::Table(t) => Some(t.name.as_str()),
            DbObject::View(v) => Some(v.name.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for DbObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uid = DisplayUid(self.uid());
        match self {
            DbObject::Table(t) => write!(f, "table {} {uid}", t.name),
            DbObject::Column(c) => write!(
                f,
                "column {} {} of {}",
                c.name,
                c.data_type,
                DisplayUid(c.table)
            ),
            DbObject::Record(r) => {
                write!(f, "record {uid} in {} ", DisplayUid(r.table))?;
                write_fields(f, &r.fields)
            }
            DbObject::Update(u) => {
                write!(
                    f,
                    "update {uid} of {} in {} ",
                    DisplayUid(u.defpos),
                    DisplayUid(u.table)
                )?;
                write_fields(f, &u.fields)
            }
            DbObject::Delete(d) => write!(
                f,
                "delete {} from {}",
                DisplayUid(d.delpos),
                DisplayUid(d.table)
            ),
            DbObject::Alter(a) => {
                write!(f, "alter {} to {}", DisplayUid(a.target), a.name)?;
                if let Some(t) = a.data_type {
                    write!(f, " {t}")?;
                }
                Ok(())
            }
            DbObject::Drop(d) => write!(f, "drop {}", DisplayUid(d.target)),
            DbObject::Index(i) => {
                let kind = if i.primary { "primary index" } else { "index" };
                write!(f, "{kind} {uid} on {}", DisplayUid(i.table))?;
                if let Some(r) = i.references {
                    write!(f, " references {}", DisplayUid(r))?;
                }
                Ok(())
            }
            DbObject::View(v) => write!(f, "view {} {uid}", v.name),
        }
    }
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &[Field]) -> fmt::Result {
    f.write_str("(")?;
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{}={}", DisplayUid(field.column), field.value)?;
    }
    f.write_str(")")
}

/// Decoded content of one row version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowImage {
    pub uid: Uid,
    pub table: Uid,
    pub defpos: Uid,
    pub fields: Vec<Field>,
}

impl RowImage {
    pub fn get(&self, column: Uid) -> Option<&Value> {
        self.fields
            .iter()
            .find(|f| f.column == column)
            .map(|f| &f.value)
    }

    /// Copy of this image with `changes` replacing or extending its fields.
    pub fn merged(&self, changes: &[Field]) -> Vec<Field> {
        let mut out = self.fields.clone();
        for change in changes {
            match out.iter_mut().find(|f| f.column == change.column) {
                Some(existing) => existing.value = change.value.clone(),
                None => out.push(change.clone()),
            }
        }
        out
    }
}
