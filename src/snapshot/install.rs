//! Folding one committed object into a snapshot.
//!
//! Every function here is pure: on error the receiver is untouched and the
//! partially built result is dropped.

use crate::catalog::schema::{Column, Index, Table, View};
use crate::catalog::types::{DataType, IndexKey};
use crate::catalog::uid::{DisplayUid, Uid};
use crate::catalog::{Alter, DbObject, Delete, DropObject, Field, Record, Update};
use crate::error::{ResourceType, SnapError};
use crate::snapshot::Snapshot;
use crate::snapshot::reader::RowSource;

impl Snapshot {
    /// The snapshot that results from committing `object` at `uid`.
    ///
    /// `rows` supplies row versions that are not held in the snapshot itself;
    /// during a commit it must also see the bytes encoded so far.
    pub fn install(
        &self,
        object: &DbObject,
        uid: Uid,
        rows: &dyn RowSource,
    ) -> Result<Snapshot, SnapError> {
        match object.with_uid(uid) {
            DbObject::Table(t) => self.install_table(t),
            DbObject::Column(c) => self.install_column(c),
            DbObject::Record(r) => self.install_record(r),
            DbObject::Update(u) => self.install_update(u, rows),
            DbObject::Delete(d) => self.install_delete(d, rows),
            DbObject::Alter(a) => self.install_alter(a),
            DbObject::Drop(d) => self.install_drop(d),
            DbObject::Index(i) => self.install_index(i, rows),
            DbObject::View(v) => self.install_view(v),
        }
    }

    fn install_table(&self, t: Table) -> Result<Snapshot, SnapError> {
        if self.names.contains(t.name.as_str()) {
            return Err(SnapError::already_exists(ResourceType::Table, &t.name));
        }
        Ok(self.put_table(Table::new(t.id, t.name)))
    }

    fn install_column(&self, c: Column) -> Result<Snapshot, SnapError> {
        let table = self.table(c.table)?;
        if table.column_by_name(&c.name).is_some() {
            return Err(SnapError::already_exists(
                ResourceType::Column,
                format!("{}.{}", table.name, c.name),
            ));
        }
        Ok(self.put_table(table.with_column(c)))
    }

    fn install_record(&self, r: Record) -> Result<Snapshot, SnapError> {
        let table = self.table(r.table)?;
        check_fields(table, &r.fields)?;
        let next = self.put_table(table.with_row(r.id, r.id));
        next.add_row_keys(r.table, r.id, &r.fields)
    }

    fn install_update(&self, u: Update, rows: &dyn RowSource) -> Result<Snapshot, SnapError> {
        let table = self.table(u.table)?;
        let current = table
            .current_version(u.defpos)
            .ok_or_else(|| SnapError::not_found(ResourceType::Row, DisplayUid(u.defpos)))?;
        let prior = rows.load_row(current)?;
        check_fields(table, &u.fields)?;

        let mut next = self.put_table(table.with_row(u.defpos, u.id));
        for id in index_ids(self, u.table) {
            let index = next.index(id)?;
            next = next.put_index(index.without_entry(&index.key_for(&prior.fields), u.defpos));
        }
        next.guard_removed_key(self, u.table, &prior.fields, Some(u.fields.as_slice()))?;
        next.add_row_keys(u.table, u.defpos, &u.fields)
    }

    fn install_delete(&self, d: Delete, rows: &dyn RowSource) -> Result<Snapshot, SnapError> {
        let table = self.table(d.table)?;
        let current = table
            .current_version(d.delpos)
            .ok_or_else(|| SnapError::not_found(ResourceType::Row, DisplayUid(d.delpos)))?;
        let prior = rows.load_row(current)?;

        let mut next = self.put_table(table.without_row(d.delpos));
        for id in index_ids(self, d.table) {
            let index = next.index(id)?;
            next = next.put_index(index.without_entry(&index.key_for(&prior.fields), d.delpos));
        }
        next.guard_removed_key(self, d.table, &prior.fields, None)?;
        Ok(next)
    }

    /// Adds a row version's keys to every index of its table, then checks
    /// the foreign keys among them.
    fn add_row_keys(&self, table: Uid, defpos: Uid, fields: &[Field]) -> Result<Snapshot, SnapError> {
        let mut next = self.clone();
        let ids = index_ids(self, table);
        for id in &ids {
            let index = next.index(*id)?;
            let key = index.key_for(fields);
            if index.primary && index.rows_for(&key).iter().any(|d| *d != defpos) {
                return Err(duplicate_key(index, &key));
            }
            next = next.put_index(index.with_entry(key, defpos));
        }
        for id in &ids {
            let index = next.index(*id)?;
            next.check_reference(index, &index.key_for(fields))?;
        }
        Ok(next)
    }

    /// Fails when the primary key a row carried before (in `before`) is gone
    /// from `table` but some foreign key still holds it.
    fn guard_removed_key(
        &self,
        before: &Snapshot,
        table: Uid,
        old: &[Field],
        new: Option<&[Field]>,
    ) -> Result<(), SnapError> {
        let Some(primary) = before.primary_index(table) else {
            return Ok(());
        };
        let key = primary.key_for(old);
        if key.has_null() || new.is_some_and(|f| primary.key_for(f) == key) {
            return Ok(());
        }
        for index in self.referencing(table) {
            if index.contains_key(&key) {
                let name = before.table(table)?.name.clone();
                return Err(SnapError::ReferentialConstraint {
                    table: name.to_string(),
                    detail: format!(
                        "key {key} is still referenced by index {}",
                        DisplayUid(index.id)
                    ),
                });
            }
        }
        Ok(())
    }

    /// Checks that `key` of a foreign-key index is present in the primary
    /// index of the referenced table. Keys with a null part are not checked.
    fn check_reference(&self, index: &Index, key: &IndexKey) -> Result<(), SnapError> {
        let Some(target) = index.references else {
            return Ok(());
        };
        if key.has_null() {
            return Ok(());
        }
        let target_table = self.table(target)?;
        let primary = self.primary_index(target).ok_or_else(|| {
            SnapError::not_found(
                ResourceType::Index,
                format!("primary index of {}", target_table.name),
            )
        })?;
        if primary.contains_key(key) {
            return Ok(());
        }
        let source = self.table(index.table)?;
        Err(SnapError::ReferentialConstraint {
            table: source.name.to_string(),
            detail: format!("key {key} has no matching row in {}", target_table.name),
        })
    }

    fn install_alter(&self, a: Alter) -> Result<Snapshot, SnapError> {
        let Some(parent) = a.parent else {
            return self.rename_top_level(a);
        };
        let table = self.table(parent)?;
        let column = table
            .column(a.target)
            .ok_or_else(|| SnapError::not_found(ResourceType::Column, DisplayUid(a.target)))?;
        if table
            .column_by_name(&a.name)
            .is_some_and(|c| c.id != a.target)
        {
            return Err(SnapError::already_exists(
                ResourceType::Column,
                format!("{}.{}", table.name, a.name),
            ));
        }
        let data_type = a.data_type.unwrap_or(column.data_type);
        if data_type != column.data_type && !table.rows.is_empty() {
            return Err(SnapError::TypeMismatch {
                column: column.name.to_string(),
                expected: column.data_type.to_string(),
                actual: data_type.to_string(),
            });
        }
        if data_type != column.data_type && self.in_foreign_key(parent, a.target) {
            return Err(SnapError::SchemaViolation {
                table: table.name.to_string(),
                detail: format!(
                    "column '{}' is part of a foreign key and keeps its type",
                    column.name
                ),
            });
        }
        let altered = Column {
            name: a.name,
            data_type,
            ..column.clone()
        };
        Ok(self.put_table(table.with_column(altered)))
    }

    /// True when `column` of `table` is a key column of a foreign-key index,
    /// or of the primary index such an index points at.
    fn in_foreign_key(&self, table: Uid, column: Uid) -> bool {
        let referencing = self
            .indexes_for(table)
            .iter()
            .any(|i| i.references.is_some() && i.columns.contains(&column));
        let referenced = !self.referencing(table).is_empty()
            && self
                .primary_index(table)
                .is_some_and(|p| p.columns.contains(&column));
        referencing || referenced
    }

    fn rename_top_level(&self, a: Alter) -> Result<Snapshot, SnapError> {
        let (old_name, resource) = match self.object(a.target) {
            Some(DbObject::Table(t)) => (t.name.clone(), ResourceType::Table),
            Some(DbObject::View(v)) => (v.name.clone(), ResourceType::View),
            _ => {
                return Err(SnapError::not_found(
                    ResourceType::Table,
                    DisplayUid(a.target),
                ));
            }
        };
        if old_name == a.name {
            return Ok(self.clone());
        }
        if self.names.contains(a.name.as_str()) {
            return Err(SnapError::already_exists(resource, &a.name));
        }
        let renamed = match self.object(a.target) {
            Some(DbObject::Table(t)) => DbObject::Table(t.renamed(a.name.clone())),
            Some(DbObject::View(v)) => DbObject::View(View {
                name: a.name.clone(),
                ..v.clone()
            }),
            _ => return Err(SnapError::not_found(resource, DisplayUid(a.target))),
        };
        Ok(Snapshot {
            objects: self.objects.add(a.target, renamed.clone()),
            names: self.names.remove(old_name.as_str()).add(a.name, renamed),
            ..self.clone()
        })
    }

    fn install_drop(&self, d: DropObject) -> Result<Snapshot, SnapError> {
        if let Some(parent) = d.parent {
            let table = self.table(parent)?;
            if table.column(d.target).is_none() {
                return Err(SnapError::not_found(
                    ResourceType::Column,
                    DisplayUid(d.target),
                ));
            }
            if let Some(index) = self
                .indexes_for(parent)
                .into_iter()
                .find(|i| i.uses_column(d.target))
            {
                return Err(SnapError::ReferentialConstraint {
                    table: table.name.to_string(),
                    detail: format!(
                        "column {} is used by index {}",
                        DisplayUid(d.target),
                        DisplayUid(index.id)
                    ),
                });
            }
            return Ok(self.put_table(table.without_column(d.target)));
        }
        match self.object(d.target) {
            Some(DbObject::Table(t)) => {
                if let Some(index) = self
                    .referencing(t.id)
                    .into_iter()
                    .find(|i| i.table != t.id)
                {
                    return Err(SnapError::ReferentialConstraint {
                        table: t.name.to_string(),
                        detail: format!(
                            "table is referenced by index {} on {}",
                            DisplayUid(index.id),
                            DisplayUid(index.table)
                        ),
                    });
                }
                let objects = index_ids(self, t.id)
                    .into_iter()
                    .fold(self.objects.remove(&t.id), |objects, id| objects.remove(&id));
                Ok(Snapshot {
                    objects,
                    names: self.names.remove(t.name.as_str()),
                    ..self.clone()
                })
            }
            Some(DbObject::Index(i)) => {
                let is_referenced_primary = self.primary_index(i.table).map(|p| p.id) == Some(i.id)
                    && self.referencing(i.table).iter().any(|r| r.id != i.id);
                if is_referenced_primary {
                    return Err(SnapError::ReferentialConstraint {
                        table: self.table(i.table)?.name.to_string(),
                        detail: format!(
                            "primary index {} is the target of foreign keys",
                            DisplayUid(i.id)
                        ),
                    });
                }
                Ok(Snapshot {
                    objects: self.objects.remove(&i.id),
                    ..self.clone()
                })
            }
            Some(DbObject::View(v)) => Ok(Snapshot {
                objects: self.objects.remove(&v.id),
                names: self.names.remove(v.name.as_str()),
                ..self.clone()
            }),
            _ => Err(SnapError::not_found(
                ResourceType::Object,
                DisplayUid(d.target),
            )),
        }
    }

    fn install_index(&self, i: Index, rows: &dyn RowSource) -> Result<Snapshot, SnapError> {
        if self.objects.contains(&i.id) {
            return Ok(self.clone());
        }
        let table = self.table(i.table)?;
        if let Some(missing) = i.columns.iter().find(|c| table.column(**c).is_none()) {
            return Err(SnapError::not_found(
                ResourceType::Column,
                DisplayUid(*missing),
            ));
        }
        if let Some(target) = i.references {
            let target_table = self.table(target)?;
            let Some(primary) = self.primary_index(target) else {
                return Err(SnapError::not_found(
                    ResourceType::Index,
                    format!("primary index of {}", target_table.name),
                ));
            };
            let key: Vec<DataType> = i
                .columns
                .iter()
                .filter_map(|c| table.column(*c).map(|c| c.data_type))
                .collect();
            let target_key: Vec<DataType> = primary
                .columns
                .iter()
                .filter_map(|c| target_table.column(*c).map(|c| c.data_type))
                .collect();
            if key != target_key {
                return Err(SnapError::SchemaViolation {
                    table: table.name.to_string(),
                    detail: format!(
                        "foreign key ({}) does not match the primary key ({}) of {}",
                        type_list(&key),
                        type_list(&target_key),
                        target_table.name
                    ),
                });
            }
        }

        let mut index = Index::new(i.id, i.table, i.primary, i.columns, i.references);
        for (defpos, current) in table.rows.iter() {
            let row = rows.load_row(*current)?;
            let key = index.key_for(&row.fields);
            if index.primary && index.contains_key(&key) {
                return Err(duplicate_key(&index, &key));
            }
            index = index.with_entry(key, *defpos);
        }
        let next = self.put_index(index.clone());
        for key in index.entries.keys() {
            next.check_reference(&index, key)?;
        }
        Ok(next)
    }

    fn install_view(&self, v: View) -> Result<Snapshot, SnapError> {
        if self.names.contains(v.name.as_str()) {
            return Err(SnapError::already_exists(ResourceType::View, &v.name));
        }
        let object = DbObject::View(v);
        Ok(Snapshot {
            objects: self.objects.add(object.uid(), object.clone()),
            names: self.names.add(
                object.name().map(Into::into).unwrap_or_default(),
                object,
            ),
            ..self.clone()
        })
    }
}

fn type_list(types: &[DataType]) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn index_ids(snapshot: &Snapshot, table: Uid) -> Vec<Uid> {
    snapshot.indexes_for(table).iter().map(|i| i.id).collect()
}

fn check_fields(table: &Table, fields: &[Field]) -> Result<(), SnapError> {
    for field in fields {
        let column = table
            .column(field.column)
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

fn duplicate_key(index: &Index, key: &IndexKey) -> SnapError {
    SnapError::DuplicateKey {
        index: DisplayUid(index.id).to_string(),
        key: key.to_string(),
    }
}
