use crate::catalog::Scope;
use crate::changes::{FieldChange, Transition};
use crate::database::Database;
use crate::error::{Result, SchemaError};
use crate::expr::Expr;
use crate::graph::Role;
use crate::name;
use crate::object::{
    CheckDef, CheckId, ColumnDef, ColumnId, ForeignKeyDef, ForeignKeyId, IndexColumn, IndexDef,
    IndexId, ObjectKind, ObjectType, PrimaryKeyDef, PrimaryKeyId, SchemaId, TableId,
};
use crate::types::{DataType, ForeignKeyAction};

use super::{CheckMut, ColumnMut, ForeignKeyMut, IndexMut, PrimaryKeyMut, TableMut};

/// Arguments of a new index.
pub(crate) struct NewIndex<'n> {
    pub(crate) name: Option<&'n str>,
    pub(crate) columns: Vec<IndexColumn>,
    pub(crate) unique: bool,
    pub(crate) is_virtual: bool,
    pub(crate) implicit: bool,
}

impl Database {
    /// The naming scope shared by a table's indexes and constraints.
    pub(crate) fn constraint_scope(&self, table: TableId) -> Result<Scope> {
        Ok(Scope::Schema(self.schema_of(table)?.id()))
    }

    /// Picks the given name or derives a default one.
    fn constraint_name(
        &self,
        table: TableId,
        name: Option<&str>,
        base: impl FnOnce(&Self) -> Result<String>,
        violations: &mut Vec<SchemaError>,
    ) -> Result<String> {
        let scope = self.constraint_scope(table)?;
        match name {
            Some(name) => {
                if let Err(err) = self.check_new_name(scope, name, None) {
                    violations.push(err);
                }
                Ok(name.to_string())
            }
            None => Ok(self.derive_name(scope, base(self)?, None)),
        }
    }

    fn register_index(&mut self, table: TableId, name: String, def: IndexDef) -> Result<IndexId> {
        let scope = self.constraint_scope(table)?;
        let columns: Vec<ColumnId> = def.column_ids().collect();
        let id = IndexId(self.allocate(name, Some(table.id()), scope, ObjectKind::Index(def)));
        for column in columns {
            self.graph.add_reference(column.id(), id.id(), Role::IndexColumn);
        }
        self.table_def_mut(table)?.indexes.push(id);
        Ok(id)
    }

    /// Validates and creates an index.
    pub(crate) fn insert_index(&mut self, table: TableId, new: NewIndex<'_>) -> Result<IndexId> {
        self.ensure_live(table.id())?;
        let mut violations = Vec::new();
        self.validate_key_columns(table, &new.columns, &mut violations)?;
        if new.is_virtual && new.unique {
            violations.push(SchemaError::violation(
                self.full_name(table)?,
                "a virtual index cannot be unique",
            ));
        }
        let name = self.constraint_name(
            table,
            new.name,
            |db| db.index_name_base(table, &new.columns, new.unique),
            &mut violations,
        )?;
        SchemaError::from_violations(violations)?;

        self.register_index(
            table,
            name,
            IndexDef {
                columns: new.columns,
                unique: new.unique,
                is_virtual: new.is_virtual,
                filter: None,
                primary_key: None,
                implicit: new.implicit,
            },
        )
    }

    fn index_name_base(&self, table: TableId, columns: &[IndexColumn], unique: bool) -> Result<String> {
        let names = self.column_names(columns.iter().map(|c| c.column))?;
        Ok(name::index_name(self.name(table)?, &names, unique))
    }

    /// Checks that every column is live and not nullable.
    fn validate_primary_key_columns(
        &self,
        table: TableId,
        columns: impl Iterator<Item = ColumnId>,
        violations: &mut Vec<SchemaError>,
    ) -> Result<()> {
        for column in columns {
            if let Ok(def) = self.column(column) {
                if def.nullable {
                    violations.push(SchemaError::violation(
                        self.full_name(table)?,
                        format!("primary key column '{}' is nullable", self.name(column)?),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Removes the current primary key of `table`, if any. An implicit
    /// backing index goes with it; an explicit one only loses its link.
    fn drop_primary_key(&mut self, table: TableId) -> Result<()> {
        if let Some(key) = self.table(table)?.primary_key {
            self.remove_object(key.id())?;
        }
        Ok(())
    }

    fn register_primary_key(
        &mut self,
        table: TableId,
        name: Option<&str>,
        index: IndexId,
    ) -> Result<PrimaryKeyId> {
        let scope = self.constraint_scope(table)?;
        let name = match name {
            Some(name) => name.to_string(),
            None => self.derive_name(scope, name::primary_key_name(self.name(table)?), None),
        };
        let id = PrimaryKeyId(self.allocate(
            name,
            Some(table.id()),
            scope,
            ObjectKind::PrimaryKey(PrimaryKeyDef { index }),
        ));
        self.graph
            .add_reference(index.id(), id.id(), Role::PrimaryKeyIndex);
        self.table_def_mut(table)?.primary_key = Some(id);
        Ok(id)
    }

    /// Validates a foreign key between `origin` columns of `table` and the
    /// referenced unique index.
    pub(crate) fn validate_foreign_key(
        &self,
        table: TableId,
        origin: &[ColumnId],
        referenced: IndexId,
        actions: [ForeignKeyAction; 2],
        violations: &mut Vec<SchemaError>,
    ) -> Result<()> {
        let owner = self.full_name(table)?;
        let target = match self.ensure_live(referenced.id()).and_then(|_| self.index(referenced)) {
            Ok(def) => def,
            Err(err) => {
                violations.push(err);
                return Ok(());
            }
        };
        let target_name = self.full_name(referenced)?;
        if !target.unique || target.filter.is_some() || target.is_virtual {
            violations.push(SchemaError::violation(
                &owner,
                format!("referenced index '{target_name}' must be unique, unfiltered and materialized"),
            ));
        }
        if target.columns.len() != origin.len() {
            violations.push(SchemaError::violation(
                &owner,
                format!(
                    "foreign key has {} columns but '{target_name}' has {}",
                    origin.len(),
                    target.columns.len()
                ),
            ));
        } else {
            for (column, key) in origin.iter().zip(&target.columns) {
                let (Ok(from), Ok(to)) = (self.column(*column), self.column(key.column)) else {
                    continue;
                };
                if !from.data_type.is_key_compatible(&to.data_type) {
                    violations.push(SchemaError::TypeIncompatibility(format!(
                        "column '{}' ({}) cannot reference '{}' ({})",
                        self.full_name(*column)?,
                        from.data_type,
                        self.full_name(key.column)?,
                        to.data_type
                    )));
                }
            }
        }
        if actions.contains(&ForeignKeyAction::SetNull) {
            for column in origin {
                if self.column(*column).is_ok_and(|c| !c.nullable) {
                    violations.push(SchemaError::violation(
                        &owner,
                        format!(
                            "SET NULL needs nullable column '{}'",
                            self.name(*column)?
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    fn register_foreign_key(
        &mut self,
        table: TableId,
        name: String,
        origin: IndexId,
        referenced: IndexId,
    ) -> Result<ForeignKeyId> {
        let scope = self.constraint_scope(table)?;
        let id = ForeignKeyId(self.allocate(
            name,
            Some(table.id()),
            scope,
            ObjectKind::ForeignKey(ForeignKeyDef {
                origin,
                referenced,
                on_delete: ForeignKeyAction::NoAction,
                on_update: ForeignKeyAction::NoAction,
            }),
        ));
        self.graph
            .add_reference(origin.id(), id.id(), Role::ForeignKeyOrigin);
        self.graph
            .add_reference(referenced.id(), id.id(), Role::ForeignKeyTarget);
        self.table_def_mut(table)?.foreign_keys.push(id);
        Ok(id)
    }

    fn foreign_key_name_base(
        &self,
        table: TableId,
        columns: &[ColumnId],
        referenced: IndexId,
    ) -> Result<String> {
        let names = self.column_names(columns.iter().copied())?;
        let referenced_table = self.name(self.table_of(referenced)?)?;
        Ok(name::foreign_key_name(self.name(table)?, &names, referenced_table))
    }
}

impl TableMut<'_> {
    fn scope(&self) -> Scope {
        Scope::Table(self.id.id())
    }

    /// Returns the owning schema.
    pub fn schema(&self) -> Result<SchemaId> {
        self.db.schema_of(self.id)
    }

    /// Creates a nullable column without a default.
    pub fn create_column(&mut self, name: &str, data_type: DataType) -> Result<ColumnMut<'_>> {
        self.db.ensure_live(self.id.id())?;
        let scope = self.scope();
        self.db.check_new_name(scope, name, None)?;
        let id = ColumnId(self.db.allocate(
            name.to_string(),
            Some(self.id.id()),
            scope,
            ObjectKind::Column(ColumnDef {
                data_type,
                nullable: true,
                default: None,
            }),
        ));
        self.db.table_def_mut(self.id)?.columns.push(id);
        Ok(ColumnMut {
            db: &mut *self.db,
            id,
        })
    }

    /// Returns the column called `name`, creating it if needed. An existing
    /// column keeps its type.
    pub fn get_or_create_column(
        &mut self,
        name: &str,
        data_type: DataType,
    ) -> Result<ColumnMut<'_>> {
        match self.try_get_column(name) {
            Some(id) => self.db.column_mut(id),
            None => self.create_column(name, data_type),
        }
    }

    /// Returns whether the table has a column called `name`.
    #[must_use]
    pub fn contains_column(&self, name: &str) -> bool {
        self.try_get_column(name).is_some()
    }

    /// Returns the column called `name`.
    pub fn get_column(&self, name: &str) -> Result<ColumnId> {
        self.db
            .get_named(self.scope(), name, ObjectType::Column)
            .map(ColumnId)
    }

    /// Returns the column called `name`, if any.
    #[must_use]
    pub fn try_get_column(&self, name: &str) -> Option<ColumnId> {
        self.db
            .find(self.scope(), name, ObjectType::Column)
            .map(ColumnId)
    }

    /// Removes the column called `name`. Returns `false` if there is none.
    pub fn remove_column(&mut self, name: &str) -> Result<bool> {
        match self.try_get_column(name) {
            Some(id) => self.db.remove_object(id.into()).map(|()| true),
            None => Ok(false),
        }
    }

    /// Creates an index with a default name.
    pub fn create_index<C>(
        &mut self,
        columns: impl IntoIterator<Item = C>,
        unique: bool,
    ) -> Result<IndexMut<'_>>
    where
        C: Into<IndexColumn>,
    {
        self.add_index(None, columns.into_iter().map(Into::into).collect(), unique)
    }

    /// Creates a named index.
    pub fn create_index_named<C>(
        &mut self,
        name: &str,
        columns: impl IntoIterator<Item = C>,
        unique: bool,
    ) -> Result<IndexMut<'_>>
    where
        C: Into<IndexColumn>,
    {
        self.add_index(Some(name), columns.into_iter().map(Into::into).collect(), unique)
    }

    fn add_index(
        &mut self,
        name: Option<&str>,
        columns: Vec<IndexColumn>,
        unique: bool,
    ) -> Result<IndexMut<'_>> {
        let id = self.db.insert_index(
            self.id,
            NewIndex {
                name,
                columns,
                unique,
                is_virtual: false,
                implicit: false,
            },
        )?;
        Ok(IndexMut {
            db: &mut *self.db,
            id,
        })
    }

    /// Creates the primary key over `columns`, backed by a new unique index.
    /// An existing primary key is replaced.
    ///
    /// Every column must already be NOT NULL.
    pub fn set_primary_key<C>(&mut self, columns: impl IntoIterator<Item = C>) -> Result<PrimaryKeyMut<'_>>
    where
        C: Into<IndexColumn>,
    {
        self.add_primary_key(None, columns.into_iter().map(Into::into).collect())
    }

    /// Creates a named primary key over `columns`.
    pub fn set_primary_key_named<C>(
        &mut self,
        name: &str,
        columns: impl IntoIterator<Item = C>,
    ) -> Result<PrimaryKeyMut<'_>>
    where
        C: Into<IndexColumn>,
    {
        self.add_primary_key(Some(name), columns.into_iter().map(Into::into).collect())
    }

    fn add_primary_key(
        &mut self,
        name: Option<&str>,
        columns: Vec<IndexColumn>,
    ) -> Result<PrimaryKeyMut<'_>> {
        let db = &mut *self.db;
        let table = self.id;
        db.ensure_live(table.id())?;
        let current = db.table(table)?.primary_key;
        let mut violations = Vec::new();
        db.validate_key_columns(table, &columns, &mut violations)?;
        db.validate_primary_key_columns(table, columns.iter().map(|c| c.column), &mut violations)?;
        if let Some(name) = name {
            let scope = db.constraint_scope(table)?;
            if let Err(err) = db.check_new_name(scope, name, current.map(PrimaryKeyId::id)) {
                violations.push(err);
            }
        }
        SchemaError::from_violations(violations)?;
        db.drop_primary_key(table)?;

        let scope = db.constraint_scope(table)?;
        let index_name = db.derive_name(scope, db.index_name_base(table, &columns, true)?, None);
        let index = db.register_index(
            table,
            index_name,
            IndexDef {
                columns,
                unique: true,
                is_virtual: false,
                filter: None,
                primary_key: None,
                implicit: true,
            },
        )?;
        let id = db.register_primary_key(table, name, index)?;
        db.index_def_mut(index)?.primary_key = Some(id);
        Ok(PrimaryKeyMut { db, id })
    }

    /// Promotes an existing unique index of this table to the primary key,
    /// replacing any current one.
    pub fn set_primary_key_index(&mut self, index: IndexId) -> Result<PrimaryKeyMut<'_>> {
        let db = &mut *self.db;
        let table = self.id;
        db.ensure_live(table.id())?;
        db.ensure_live(index.id())?;
        let current = db.table(table)?.primary_key;
        if let Some(current) = current {
            if db.primary_key(current)?.index == index {
                return Ok(PrimaryKeyMut { db, id: current });
            }
        }
        let table_name = db.full_name(table)?;
        let def = db.index(index)?;
        let mut violations = Vec::new();
        if db.parent(index)? != Some(table.id()) {
            violations.push(SchemaError::violation(
                &table_name,
                format!("index '{}' belongs to another table", db.full_name(index)?),
            ));
        }
        if !def.unique || def.filter.is_some() || def.is_virtual {
            violations.push(SchemaError::violation(
                &table_name,
                format!(
                    "index '{}' must be unique, unfiltered and materialized to become the primary key",
                    db.name(index)?
                ),
            ));
        }
        db.validate_primary_key_columns(table, def.column_ids(), &mut violations)?;
        SchemaError::from_violations(violations)?;
        db.drop_primary_key(table)?;

        let id = db.register_primary_key(table, None, index)?;
        db.index_def_mut(index)?.primary_key = Some(id);
        db.tracker.changed(
            index.id(),
            FieldChange::PrimaryKey(Transition::new(None, Some(id))),
        );
        Ok(PrimaryKeyMut { db, id })
    }

    /// Creates a foreign key from an existing index of this table to a
    /// unique index.
    pub fn create_foreign_key(
        &mut self,
        origin: IndexId,
        referenced: IndexId,
    ) -> Result<ForeignKeyMut<'_>> {
        let db = &mut *self.db;
        let table = self.id;
        db.ensure_live(table.id())?;
        db.ensure_live(origin.id())?;
        let mut violations = Vec::new();
        if db.parent(origin)? != Some(table.id()) {
            violations.push(SchemaError::violation(
                db.full_name(table)?,
                format!("index '{}' belongs to another table", db.full_name(origin)?),
            ));
        }
        let columns: Vec<ColumnId> = db.index(origin)?.column_ids().collect();
        db.validate_foreign_key(
            table,
            &columns,
            referenced,
            [ForeignKeyAction::NoAction; 2],
            &mut violations,
        )?;
        SchemaError::from_violations(violations)?;

        let scope = db.constraint_scope(table)?;
        let name = db.derive_name(scope, db.foreign_key_name_base(table, &columns, referenced)?, None);
        let id = db.register_foreign_key(table, name, origin, referenced)?;
        Ok(ForeignKeyMut { db, id })
    }

    /// Creates a foreign key over `columns`, backed by a new virtual index
    /// that is removed together with the key.
    pub fn create_foreign_key_on<C>(
        &mut self,
        columns: impl IntoIterator<Item = C>,
        referenced: IndexId,
    ) -> Result<ForeignKeyMut<'_>>
    where
        C: Into<IndexColumn>,
    {
        let columns: Vec<IndexColumn> = columns.into_iter().map(Into::into).collect();
        let db = &mut *self.db;
        let table = self.id;
        db.ensure_live(table.id())?;
        let column_ids: Vec<ColumnId> = columns.iter().map(|c| c.column).collect();
        let mut violations = Vec::new();
        db.validate_key_columns(table, &columns, &mut violations)?;
        if violations.is_empty() {
            db.validate_foreign_key(
                table,
                &column_ids,
                referenced,
                [ForeignKeyAction::NoAction; 2],
                &mut violations,
            )?;
        }
        SchemaError::from_violations(violations)?;

        let scope = db.constraint_scope(table)?;
        let index_name = db.derive_name(scope, db.index_name_base(table, &columns, false)?, None);
        let origin = db.register_index(
            table,
            index_name,
            IndexDef {
                columns,
                unique: false,
                is_virtual: true,
                filter: None,
                primary_key: None,
                implicit: true,
            },
        )?;
        let name = db.derive_name(
            scope,
            db.foreign_key_name_base(table, &column_ids, referenced)?,
            None,
        );
        let id = db.register_foreign_key(table, name, origin, referenced)?;
        Ok(ForeignKeyMut { db, id })
    }

    /// Creates a check constraint with a default name.
    pub fn create_check(&mut self, condition: Expr) -> Result<CheckMut<'_>> {
        self.add_check(None, condition)
    }

    /// Creates a named check constraint.
    pub fn create_check_named(&mut self, name: &str, condition: Expr) -> Result<CheckMut<'_>> {
        self.add_check(Some(name), condition)
    }

    fn add_check(&mut self, name: Option<&str>, condition: Expr) -> Result<CheckMut<'_>> {
        let db = &mut *self.db;
        let table = self.id;
        db.ensure_live(table.id())?;
        let mut violations = Vec::new();
        db.validate_table_expression(table, &condition, "check condition", &mut violations);
        let suffix = name::check_suffix(
            db.name(table)?,
            &format!("{condition:?}"),
            db.check_sequence,
        );
        let name = db.constraint_name(
            table,
            name,
            |db| Ok(name::check_name(db.name(table)?, &suffix)),
            &mut violations,
        )?;
        SchemaError::from_violations(violations)?;

        db.check_sequence += 1;
        let scope = db.constraint_scope(table)?;
        let columns = condition.referenced_columns();
        let id = CheckId(db.allocate(
            name,
            Some(table.id()),
            scope,
            ObjectKind::Check(CheckDef {
                condition,
                name_suffix: suffix,
            }),
        ));
        for column in columns {
            db.graph
                .add_reference(column.id(), id.id(), Role::CheckCondition);
        }
        db.table_def_mut(table)?.checks.push(id);
        Ok(CheckMut { db, id })
    }
}
