//! Builder API: typed mutable handles over a [`Database`].
//!
//! Every mutation validates first, collecting all violations, and only then
//! touches the model, so a failing call leaves the catalog, the reference
//! graph and the change log exactly as they were.

mod column;
mod constraint;
mod index;
mod schema;
mod table;
mod view;

use std::collections::HashSet;

use crate::catalog::Scope;
use crate::changes::{ChangeRecord, FieldChange, Transition};
use crate::database::{not_found, Database};
use crate::error::{Result, SchemaError};
use crate::expr::Expr;
use crate::name::{self, disambiguate, truncate, validate_identifier};
use crate::object::{
    CheckId, ColumnId, ForeignKeyId, IndexColumn, IndexId, Object, ObjectId, ObjectKind, ObjectType,
    PrimaryKeyId, SchemaId, TableId, ViewId,
};

macro_rules! handles {
    ($($(#[$meta:meta])* $handle:ident: $id:ident => $getter:ident via $def:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug)]
            pub struct $handle<'a> {
                pub(crate) db: &'a mut Database,
                pub(crate) id: $id,
            }

            impl $handle<'_> {
                /// Returns the id of the handled object.
                #[must_use]
                pub const fn id(&self) -> $id {
                    self.id
                }

                /// Returns the owning database for reads.
                #[must_use]
                pub fn database(&self) -> &Database {
                    self.db
                }

                /// Returns the current name.
                pub fn name(&self) -> Result<&str> {
                    self.db.name(self.id)
                }

                /// Renames the object. Renaming to the current name is a no-op.
                pub fn set_name(&mut self, name: &str) -> Result<&mut Self> {
                    self.db.rename_object(self.id.into(), name)?;
                    Ok(self)
                }

                /// Removes the object together with everything it owns.
                pub fn remove(self) -> Result<()> {
                    self.db.remove_object(self.id.into())
                }
            }

            impl Database {
                #[doc = concat!("Returns a [`", stringify!($handle), "`] for `id`.")]
                pub fn $getter(&mut self, id: $id) -> Result<$handle<'_>> {
                    self.$def(id)?;
                    Ok($handle { db: self, id })
                }
            }
        )*
    };
}

handles! {
    /// Mutable handle to a schema.
    SchemaMut: SchemaId => schema_mut via schema;
    /// Mutable handle to a table.
    TableMut: TableId => table_mut via table;
    /// Mutable handle to a column.
    ColumnMut: ColumnId => column_mut via column;
    /// Mutable handle to an index.
    IndexMut: IndexId => index_mut via index;
    /// Mutable handle to a primary key.
    PrimaryKeyMut: PrimaryKeyId => primary_key_mut via primary_key;
    /// Mutable handle to a foreign key.
    ForeignKeyMut: ForeignKeyId => foreign_key_mut via foreign_key;
    /// Mutable handle to a check constraint.
    CheckMut: CheckId => check_mut via check;
    /// Mutable handle to a view.
    ViewMut: ViewId => view_mut via view;
}

impl Database {
    /// Returns the object if it exists and has not been removed.
    pub(crate) fn ensure_live(&self, id: ObjectId) -> Result<&Object> {
        let object = self.lookup(id)?;
        if object.removed {
            return Err(SchemaError::ObjectRemoved(format!(
                "{} '{}'",
                object.object_type(),
                self.full_name(id)?
            )));
        }
        Ok(object)
    }

    /// The naming scope an object is registered in.
    pub(crate) fn scope_of(&self, id: ObjectId) -> Result<Scope> {
        let object = self.lookup(id)?;
        let parent = object.parent.ok_or_else(|| not_found("Parent", id));
        Ok(match object.object_type() {
            ObjectType::Schema => Scope::Database,
            ObjectType::Table | ObjectType::View => Scope::Schema(parent?),
            ObjectType::Column => Scope::Table(parent?),
            _ => {
                let table = parent?;
                let schema = self.lookup(table)?.parent.ok_or_else(|| not_found("Schema", table))?;
                Scope::Schema(schema)
            }
        })
    }

    pub(crate) fn scope_label(&self, scope: Scope) -> String {
        match scope {
            Scope::Database => String::from("database"),
            Scope::Schema(id) => format!("schema '{}'", self.name(id).unwrap_or_default()),
            Scope::Table(id) => format!("table '{}'", self.full_name(id).unwrap_or_default()),
        }
    }

    /// Finds a live object of one type by name.
    pub(crate) fn find(&self, scope: Scope, name: &str, object_type: ObjectType) -> Option<ObjectId> {
        self.catalog
            .get(scope, name)
            .filter(|id| self.object_type(*id).ok() == Some(object_type))
    }

    pub(crate) fn get_named(
        &self,
        scope: Scope,
        name: &str,
        object_type: ObjectType,
    ) -> Result<ObjectId> {
        self.find(scope, name, object_type)
            .ok_or_else(|| SchemaError::NotFound {
                kind: object_type.label(),
                name: name.to_string(),
            })
    }

    /// Validates a name for an object entering `scope`.
    pub(crate) fn check_new_name(
        &self,
        scope: Scope,
        name: &str,
        except: Option<ObjectId>,
    ) -> Result<()> {
        validate_identifier(name, false, self.dialect.capabilities().max_identifier_length)?;
        self.catalog
            .check_available(scope, name, except, || self.scope_label(scope))
    }

    /// Turns a derived base name into a free name in `scope`.
    pub(crate) fn derive_name(&self, scope: Scope, base: String, except: Option<ObjectId>) -> String {
        let max_length = self.dialect.capabilities().max_identifier_length;
        let base = truncate(base, max_length.saturating_sub(4));
        disambiguate(&base, |candidate| match self.catalog.get(scope, candidate) {
            None => true,
            Some(owner) => Some(owner) == except,
        })
    }

    /// Adds an object to the arena and the catalog and logs its creation.
    pub(crate) fn allocate(
        &mut self,
        name: String,
        parent: Option<ObjectId>,
        scope: Scope,
        kind: ObjectKind,
    ) -> ObjectId {
        #[allow(clippy::cast_possible_truncation)]
        let id = ObjectId {
            database: self.nonce,
            slot: self.objects.len() as u32,
        };
        self.catalog.insert(scope, &name, id);
        self.objects.push(Object {
            name,
            parent,
            removed: false,
            kind,
        });
        self.tracker.record(ChangeRecord::Created(id));
        id
    }

    /// Renames an object. Renaming to the current name does nothing.
    pub(crate) fn rename_object(&mut self, id: ObjectId, new_name: &str) -> Result<()> {
        let current = self.ensure_live(id)?.name.clone();
        if current == new_name {
            return Ok(());
        }
        let scope = self.scope_of(id)?;
        self.check_new_name(scope, new_name, Some(id))?;

        self.catalog.rename(scope, &current, new_name, id);
        self.lookup_mut(id)?.name = new_name.to_string();
        self.tracker.changed(
            id,
            FieldChange::Name(Transition::new(current, new_name.to_string())),
        );
        Ok(())
    }

    /// Renames an object to its derived default name.
    pub(crate) fn rename_to_default(&mut self, id: ObjectId) -> Result<()> {
        self.ensure_live(id)?;
        let base = self.default_name_base(id)?;
        let scope = self.scope_of(id)?;
        let name = self.derive_name(scope, base, Some(id));
        self.rename_object(id, &name)
    }

    /// The undisambiguated default name of an index or constraint.
    pub(crate) fn default_name_base(&self, id: ObjectId) -> Result<String> {
        let table = self.table_of(id)?;
        let table_name = self.name(table)?;
        Ok(match &self.lookup(id)?.kind {
            ObjectKind::Index(def) => {
                let columns = self.column_names(def.column_ids())?;
                name::index_name(table_name, &columns, def.unique)
            }
            ObjectKind::PrimaryKey(_) => name::primary_key_name(table_name),
            ObjectKind::ForeignKey(def) => {
                let columns = self.column_names(self.index(def.origin)?.column_ids())?;
                let referenced = self.name(self.table_of(def.referenced)?)?;
                name::foreign_key_name(table_name, &columns, referenced)
            }
            ObjectKind::Check(def) => name::check_name(table_name, &def.name_suffix),
            _ => return Err(not_found("Constraint", id)),
        })
    }

    pub(crate) fn column_names(
        &self,
        columns: impl Iterator<Item = ColumnId>,
    ) -> Result<Vec<&str>> {
        columns.map(|c| self.name(c)).collect()
    }

    /// Owned objects removed together with `id`, `id` first.
    fn cascade(&self, id: ObjectId) -> Result<Vec<ObjectId>> {
        let mut members = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if members.contains(&next) {
                continue;
            }
            members.push(next);
            let owned: Vec<ObjectId> = match &self.lookup(next)?.kind {
                ObjectKind::Schema(def) => def
                    .views
                    .iter()
                    .map(|v| v.id())
                    .chain(def.tables.iter().map(|t| t.id()))
                    .collect(),
                ObjectKind::Table(def) => def
                    .foreign_keys
                    .iter()
                    .map(|f| f.id())
                    .chain(def.checks.iter().map(|c| c.id()))
                    .chain(def.primary_key.map(|p| p.id()))
                    .chain(def.indexes.iter().map(|i| i.id()))
                    .chain(def.columns.iter().map(|c| c.id()))
                    .collect(),
                ObjectKind::PrimaryKey(def) if self.index(def.index)?.implicit => {
                    vec![def.index.id()]
                }
                ObjectKind::ForeignKey(def) if self.index(def.origin)?.implicit => {
                    vec![def.origin.id()]
                }
                _ => Vec::new(),
            };
            pending.extend(owned.into_iter().rev());
        }
        Ok(members)
    }

    /// Removes an object and everything it owns.
    ///
    /// Fails if anything outside the cascade still references a member.
    pub(crate) fn remove_object(&mut self, id: ObjectId) -> Result<()> {
        self.ensure_live(id)?;
        if let ObjectKind::Schema(def) = &self.lookup(id)?.kind {
            if def.is_default {
                return Err(SchemaError::violation(
                    self.full_name(id)?,
                    "the default schema cannot be removed",
                ));
            }
        }

        let members = self.cascade(id)?;
        let in_cascade: HashSet<ObjectId> = members.iter().copied().collect();
        let mut violations = Vec::new();
        for member in &members {
            let blockers = self
                .graph
                .referencing_objects(*member)
                .into_iter()
                .filter(|r| !in_cascade.contains(r))
                .map(|r| Ok(format!("{} '{}'", self.object_type(r)?, self.full_name(r)?)))
                .collect::<Result<Vec<_>>>()?;
            if !blockers.is_empty() {
                violations.push(SchemaError::violation(
                    self.full_name(*member)?,
                    format!("still referenced by {}", blockers.join(", ")),
                ));
            }
        }
        SchemaError::from_violations(violations)?;

        for member in &members {
            self.remove_member(*member, &in_cascade)?;
        }
        Ok(())
    }

    fn remove_member(&mut self, id: ObjectId, in_cascade: &HashSet<ObjectId>) -> Result<()> {
        let scope = self.scope_of(id)?;
        let object = self.lookup(id)?;
        let name = object.name.clone();
        let object_type = object.object_type();
        let parent = object.parent;
        let parent_in_cascade = parent.is_some_and(|p| in_cascade.contains(&p));
        let wrapped_index = match &object.kind {
            ObjectKind::PrimaryKey(def) if !in_cascade.contains(&def.index.id()) => Some(def.index),
            _ => None,
        };

        if matches!(
            object_type,
            ObjectType::Schema | ObjectType::Table | ObjectType::View
        ) || !parent_in_cascade
        {
            self.tracker.record(ChangeRecord::Removed(id));
        }

        if let Some(index) = wrapped_index {
            self.index_def_mut(index)?.primary_key = None;
            self.tracker.changed(
                index.id(),
                FieldChange::PrimaryKey(Transition::new(Some(PrimaryKeyId(id)), None)),
            );
        }

        if !parent_in_cascade {
            self.detach_from_parent(id, object_type, parent)?;
        }
        self.catalog.remove(scope, &name, id);
        self.graph.detach(id);
        self.lookup_mut(id)?.removed = true;
        Ok(())
    }

    fn detach_from_parent(
        &mut self,
        id: ObjectId,
        object_type: ObjectType,
        parent: Option<ObjectId>,
    ) -> Result<()> {
        let Some(parent) = parent else {
            self.schemas.retain(|s| s.id() != id);
            return Ok(());
        };
        match object_type {
            ObjectType::Schema => {}
            ObjectType::Table => self
                .schema_def_mut(SchemaId(parent))?
                .tables
                .retain(|t| t.id() != id),
            ObjectType::View => self
                .schema_def_mut(SchemaId(parent))?
                .views
                .retain(|v| v.id() != id),
            ObjectType::Column => self
                .table_def_mut(TableId(parent))?
                .columns
                .retain(|c| c.id() != id),
            ObjectType::Index => self
                .table_def_mut(TableId(parent))?
                .indexes
                .retain(|i| i.id() != id),
            ObjectType::PrimaryKey => self.table_def_mut(TableId(parent))?.primary_key = None,
            ObjectType::ForeignKey => self
                .table_def_mut(TableId(parent))?
                .foreign_keys
                .retain(|f| f.id() != id),
            ObjectType::Check => self
                .table_def_mut(TableId(parent))?
                .checks
                .retain(|c| c.id() != id),
        }
        Ok(())
    }

    /// Checks that an index key lists distinct live columns of `table`.
    pub(crate) fn validate_key_columns(
        &self,
        table: TableId,
        columns: &[IndexColumn],
        violations: &mut Vec<SchemaError>,
    ) -> Result<()> {
        let table_name = self.full_name(table)?;
        if columns.is_empty() {
            violations.push(SchemaError::violation(
                &table_name,
                "a key needs at least one column",
            ));
        }
        let mut seen = HashSet::new();
        for key in columns {
            let id = key.column.id();
            match self.lookup(id) {
                Err(err) => violations.push(err),
                Ok(object) if object.object_type() != ObjectType::Column => {
                    violations.push(not_found("Column", id));
                }
                Ok(object) if object.removed => {
                    violations.push(SchemaError::ObjectRemoved(format!(
                        "Column '{}'",
                        self.full_name(id)?
                    )));
                }
                Ok(object) if object.parent != Some(table.id()) => {
                    violations.push(SchemaError::violation(
                        &table_name,
                        format!("column '{}' belongs to another table", self.full_name(id)?),
                    ));
                }
                Ok(object) => {
                    if !seen.insert(id) {
                        violations.push(SchemaError::violation(
                            &table_name,
                            format!("column '{}' is listed more than once", object.name),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Checks that a check condition or index filter is deterministic and
    /// only reads live columns of `table`.
    pub(crate) fn validate_table_expression(
        &self,
        table: TableId,
        expr: &Expr,
        what: &str,
        violations: &mut Vec<SchemaError>,
    ) {
        if let Some(function) = expr.volatile_function() {
            violations.push(SchemaError::InvalidExpression(format!(
                "{what} uses non-deterministic function {function}"
            )));
        }
        for column in expr.referenced_columns() {
            let id = column.id();
            let name = self.full_name(id).unwrap_or_else(|_| id.to_string());
            match self.lookup(id) {
                Err(err) => violations.push(err),
                Ok(object) if object.removed => violations.push(SchemaError::InvalidExpression(
                    format!("{what} references removed column '{name}'"),
                )),
                Ok(object)
                    if object.object_type() != ObjectType::Column
                        || object.parent != Some(table.id()) =>
                {
                    violations.push(SchemaError::InvalidExpression(format!(
                        "{what} references '{name}' outside its table"
                    )));
                }
                Ok(_) => {}
            }
        }
    }

    /// Whether an index is the primary key or the target of a foreign key.
    pub(crate) fn is_key_target(&self, index: IndexId) -> Result<bool> {
        let def = self.index(index)?;
        Ok(def.primary_key.is_some()
            || !self
                .graph
                .referencing_with_role(index.id(), crate::graph::Role::ForeignKeyTarget)
                .is_empty())
    }
}
