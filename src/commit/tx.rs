use crate::catalog::schema::{Column, Index, Table, View};
use crate::catalog::types::DataType;
use crate::catalog::uid::{DisplayUid, TXN_BASE, Uid};
use crate::catalog::{Alter, DbObject, Delete, DropObject, Field, Record, RowImage, Update};
use crate::error::{ResourceType, SnapError};
use crate::snapshot::Snapshot;
use crate::storage::PMap;
use compact_str::CompactString;
use std::sync::Arc;

/// Pending changes against one snapshot of a database.
///
/// Builder methods check names, references and value types against the base
/// snapshot plus everything already pending, and return the transaction-local
/// uid given to the new object. Constraint checks (keys, foreign keys) run at
/// commit. A transaction is not `Clone`: committing it moves it, so the same
/// pending set can reach the log only once.
#[derive(Debug)]
pub struct Transaction {
    base: Arc<Snapshot>,
    pending: PMap<Uid, DbObject>,
    next_uid: Uid,
    auto_commit: bool,
}

impl Transaction {
    pub fn new(base: Arc<Snapshot>, auto_commit: bool) -> Self {
        Self {
            base,
            pending: PMap::new(),
            next_uid: TXN_BASE,
            auto_commit,
        }
    }

    pub fn base(&self) -> &Arc<Snapshot> {
        &self.base
    }

    pub fn database(&self) -> &str {
        &self.base.name
    }

    pub fn pending(&self) -> &PMap<Uid, DbObject> {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn push(&mut self, object: DbObject) -> Uid {
        self.next_uid += 1;
        let uid = self.next_uid;
        self.pending = self.pending.add(uid, object.with_uid(uid));
        uid
    }

    pub fn create_table(&mut self, name: &str) -> Result<Uid, SnapError> {
        if self.name_in_use(name) {
            return Err(SnapError::already_exists(ResourceType::Table, name));
        }
        Ok(self.push(DbObject::Table(Table::new(0, name))))
    }

    pub fn add_column(
        &mut self,
        table: Uid,
        name: &str,
        data_type: DataType,
    ) -> Result<Uid, SnapError> {
        if self.columns_of(table)?.iter().any(|c| c.name == name) {
            return Err(SnapError::already_exists(
                ResourceType::Column,
                format!("{}.{name}", DisplayUid(table)),
            ));
        }
        Ok(self.push(DbObject::Column(Column {
            id: 0,
            name: name.into(),
            table,
            data_type,
        })))
    }

    pub fn insert(&mut self, table: Uid, fields: Vec<Field>) -> Result<Uid, SnapError> {
        self.check_fields(table, &fields)?;
        Ok(self.push(DbObject::Record(Record {
            id: 0,
            table,
            fields,
        })))
    }

    /// New version of the row `prior`, with `changes` merged over its fields.
    /// Fields of columns dropped since `prior` was written are left out.
    pub fn update(&mut self, prior: &RowImage, changes: Vec<Field>) -> Result<Uid, SnapError> {
        self.check_row(prior.table, prior.defpos)?;
        self.check_fields(prior.table, &changes)?;
        let columns = self.columns_of(prior.table)?;
        let mut fields = prior.merged(&changes);
        fields.retain(|f| columns.iter().any(|c| c.id == f.column));
        Ok(self.push(DbObject::Update(Update {
            id: 0,
            table: prior.table,
            defpos: prior.defpos,
            fields,
        })))
    }

    pub fn delete(&mut self, table: Uid, defpos: Uid) -> Result<Uid, SnapError> {
        self.check_row(table, defpos)?;
        Ok(self.push(DbObject::Delete(Delete {
            id: 0,
            table,
            delpos: defpos,
        })))
    }

    pub fn rename_table(&mut self, table: Uid, name: &str) -> Result<Uid, SnapError> {
        self.columns_of(table)?;
        if self.name_in_use(name) {
            return Err(SnapError::already_exists(ResourceType::Table, name));
        }
        Ok(self.push(DbObject::Alter(Alter {
            id: 0,
            target: table,
            parent: None,
            name: name.into(),
            data_type: None,
        })))
    }

    /// Renames a column and optionally changes its declared type.
    pub fn alter_column(
        &mut self,
        table: Uid,
        column: Uid,
        name: &str,
        data_type: Option<DataType>,
    ) -> Result<Uid, SnapError> {
        let columns = self.columns_of(table)?;
        if !columns.iter().any(|c| c.id == column) {
            return Err(SnapError::not_found(ResourceType::Column, DisplayUid(column)));
        }
        if columns.iter().any(|c| c.name == name && c.id != column) {
            return Err(SnapError::already_exists(ResourceType::Column, name));
        }
        Ok(self.push(DbObject::Alter(Alter {
            id: 0,
            target: column,
            parent: Some(table),
            name: name.into(),
            data_type,
        })))
    }

    pub fn drop_table(&mut self, table: Uid) -> Result<Uid, SnapError> {
        self.columns_of(table)?;
        self.drop_object(table)
    }

    /// Drops a table, index or view.
    pub fn drop_object(&mut self, target: Uid) -> Result<Uid, SnapError> {
        let exists = self.base.object(target).is_some()
            || self.pending.lookup(&target).is_some_and(|o| {
                matches!(o, DbObject::Table(_) | DbObject::Index(_) | DbObject::View(_))
            });
        if !exists || self.is_dropped(target) {
            return Err(SnapError::not_found(ResourceType::Object, DisplayUid(target)));
        }
        Ok(self.push(DbObject::Drop(DropObject {
            id: 0,
            target,
            parent: None,
        })))
    }

    pub fn drop_column(&mut self, table: Uid, column: Uid) -> Result<Uid, SnapError> {
        if !self.columns_of(table)?.iter().any(|c| c.id == column) {
            return Err(SnapError::not_found(ResourceType::Column, DisplayUid(column)));
        }
        Ok(self.push(DbObject::Drop(DropObject {
            id: 0,
            target: column,
            parent: Some(table),
        })))
    }

    pub fn create_index(
        &mut self,
        table: Uid,
        primary: bool,
        columns: Vec<Uid>,
        references: Option<Uid>,
    ) -> Result<Uid, SnapError> {
        let known = self.columns_of(table)?;
        if let Some(missing) = columns.iter().find(|c| !known.iter().any(|k| k.id == **c)) {
            return Err(SnapError::not_found(ResourceType::Column, DisplayUid(*missing)));
        }
        if let Some(target) = references {
            self.columns_of(target)?;
        }
        Ok(self.push(DbObject::Index(Index::new(
            0, table, primary, columns, references,
        ))))
    }

    pub fn create_view(&mut self, name: &str, definition: &str) -> Result<Uid, SnapError> {
        if self.name_in_use(name) {
            return Err(SnapError::already_exists(ResourceType::View, name));
        }
        Ok(self.push(DbObject::View(View {
            id: 0,
            name: name.into(),
            definition: definition.into(),
        })))
    }

    /// Row content of a record or update created by this transaction.
    pub fn pending_row(&self, uid: Uid) -> Option<RowImage> {
        self.pending.lookup(&uid).and_then(DbObject::row_image)
    }

    fn is_dropped(&self, uid: Uid) -> bool {
        self.pending
            .values()
            .any(|o| matches!(o, DbObject::Drop(d) if d.target == uid && d.parent.is_none()))
    }

    fn name_in_use(&self, name: &str) -> bool {
        let claimed = self.pending.values().any(|o| match o {
            DbObject::Table(t) => t.name == name,
            DbObject::View(v) => v.name == name,
            DbObject::Alter(a) => a.parent.is_none() && a.name == name,
            _ => false,
        });
        if claimed {
            return true;
        }
        let Some(existing) = self.base.by_name(name) else {
            return false;
        };
        let uid = existing.uid();
        let renamed_away = self
            .pending
            .values()
            .any(|o| matches!(o, DbObject::Alter(a) if a.target == uid && a.parent.is_none()));
        !self.is_dropped(uid) && !renamed_away
    }

    /// Columns of `table` as this transaction sees them.
    fn columns_of(&self, table: Uid) -> Result<Vec<Column>, SnapError> {
        if self.is_dropped(table) {
            return Err(SnapError::not_found(ResourceType::Table, DisplayUid(table)));
        }
        let mut columns: Vec<Column> = match self.base.table(table) {
            Ok(t) => t.columns.values().cloned().collect(),
            Err(_) if matches!(self.pending.lookup(&table), Some(DbObject::Table(_))) => {
                Vec::new()
            }
            Err(err) => return Err(err),
        };
        for object in self.pending.values() {
            match object {
                DbObject::Column(c) if c.table == table => columns.push(c.clone()),
                DbObject::Alter(a) if a.parent == Some(table) => {
                    if let Some(c) = columns.iter_mut().find(|c| c.id == a.target) {
                        c.name = CompactString::from(a.name.as_str());
                        c.data_type = a.data_type.unwrap_or(c.data_type);
                    }
                }
                DbObject::Drop(d) if d.parent == Some(table) => {
                    columns.retain(|c| c.id != d.target);
                }
                _ => {}
            }
        }
        Ok(columns)
    }

    fn check_fields(&self, table: Uid, fields: &[Field]) -> Result<(), SnapError> {
        let columns = self.columns_of(table)?;
        for field in fields {
            let column = columns
                .iter()
                .find(|c| c.id == field.column)
                .ok_or_else(|| SnapError::not_found(ResourceType::Column, DisplayUid(field.column)))?;
            if !field.value.fits(column.data_type) {
                return Err(SnapError::TypeMismatch {
                    column: column.name.to_string(),
                    expected: column.data_type.to_string(),
                    actual: field
                        .value
                        .data_type()
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "null".into()),
                });
            }
        }
        Ok(())
    }

    /// The row must be live in the base snapshot or inserted by this
    /// transaction, and not already deleted by it.
    fn check_row(&self, table: Uid, defpos: Uid) -> Result<(), SnapError> {
        self.columns_of(table)?;
        let in_base = self
            .base
            .table(table)
            .is_ok_and(|t| t.current_version(defpos).is_some());
        let inserted = matches!(
            self.pending.lookup(&defpos),
            Some(DbObject::Record(r)) if r.table == table
        );
        let deleted = self
            .pending
            .values()
            .any(|o| matches!(o, DbObject::Delete(d) if d.delpos == defpos));
        if (in_base || inserted) && !deleted {
            Ok(())
        } else {
            Err(SnapError::not_found(ResourceType::Row, DisplayUid(defpos)))
        }
    }
}
