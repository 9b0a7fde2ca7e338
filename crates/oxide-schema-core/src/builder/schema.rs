use std::collections::HashSet;

use crate::catalog::Scope;
use crate::database::Database;
use crate::error::{Result, SchemaError};
use crate::expr::{QueryRef, ViewQuery};
use crate::graph::Role;
use crate::object::{ObjectKind, ObjectType, SchemaDef, SchemaId, TableDef, TableId, ViewDef, ViewId};

use super::{SchemaMut, TableMut, ViewMut};

impl Database {
    /// Creates a schema.
    pub fn create_schema(&mut self, name: &str) -> Result<SchemaMut<'_>> {
        self.check_new_name(Scope::Database, name, None)?;
        let id = SchemaId(self.allocate(
            name.to_string(),
            None,
            Scope::Database,
            ObjectKind::Schema(SchemaDef::default()),
        ));
        self.schemas.push(id);
        Ok(SchemaMut { db: self, id })
    }

    /// Returns the schema called `name`, creating it if needed.
    pub fn get_or_create_schema(&mut self, name: &str) -> Result<SchemaMut<'_>> {
        match self.try_get_schema(name) {
            Some(id) => self.schema_mut(id),
            None => self.create_schema(name),
        }
    }

    /// Returns whether a schema called `name` exists.
    #[must_use]
    pub fn contains_schema(&self, name: &str) -> bool {
        self.try_get_schema(name).is_some()
    }

    /// Returns the schema called `name`.
    pub fn get_schema(&self, name: &str) -> Result<SchemaId> {
        self.get_named(Scope::Database, name, ObjectType::Schema)
            .map(SchemaId)
    }

    /// Returns the schema called `name`, if any.
    #[must_use]
    pub fn try_get_schema(&self, name: &str) -> Option<SchemaId> {
        self.find(Scope::Database, name, ObjectType::Schema)
            .map(SchemaId)
    }

    /// Removes the schema called `name` with its tables and views.
    ///
    /// Returns `false` if there is no such schema.
    pub fn remove_schema(&mut self, name: &str) -> Result<bool> {
        match self.try_get_schema(name) {
            Some(id) => self.remove_object(id.into()).map(|()| true),
            None => Ok(false),
        }
    }

    /// Checks a view query: placeholders, bound objects and, for an existing
    /// view, that the query does not make the view depend on itself.
    pub(crate) fn validate_view_query(&self, view: Option<ViewId>, query: &ViewQuery) -> Result<()> {
        let mut violations = Vec::new();
        if let Err(err) = query.validate() {
            violations.push(err);
        }
        for binding in query.bindings() {
            if let Err(err) = self.ensure_live(binding.id()) {
                violations.push(err);
                continue;
            }
            let bound_view = match *binding {
                QueryRef::Table(t) => self.table(t).err(),
                QueryRef::Column(c) => self.column(c).err(),
                QueryRef::View(v) => match self.view(v) {
                    Err(err) => Some(err),
                    Ok(_) => {
                        if let Some(view) = view {
                            if v == view || self.view_depends_on(v, view) {
                                violations.push(SchemaError::InvalidExpression(
                                    format!(
                                        "query would make view '{}' depend on itself",
                                        self.full_name(view)?
                                    ),
                                ));
                            }
                        }
                        None
                    }
                },
            };
            violations.extend(bound_view);
        }
        SchemaError::from_violations(violations)
    }

    /// Whether `view` reads `target` through any chain of views.
    pub(crate) fn view_depends_on(&self, view: ViewId, target: ViewId) -> bool {
        let mut stack = vec![view.id()];
        let mut seen = HashSet::new();
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            for source in self.graph.referenced_objects(next) {
                if source == target.id() {
                    return true;
                }
                if self.object_type(source).ok() == Some(ObjectType::View) {
                    stack.push(source);
                }
            }
        }
        false
    }
}

impl SchemaMut<'_> {
    fn scope(&self) -> Scope {
        Scope::Schema(self.id.id())
    }

    /// Creates a table. Tables start without columns.
    pub fn create_table(&mut self, name: &str) -> Result<TableMut<'_>> {
        self.db.ensure_live(self.id.id())?;
        let scope = self.scope();
        self.db.check_new_name(scope, name, None)?;
        let id = TableId(self.db.allocate(
            name.to_string(),
            Some(self.id.id()),
            scope,
            ObjectKind::Table(TableDef::default()),
        ));
        self.db.schema_def_mut(self.id)?.tables.push(id);
        Ok(TableMut { db: &mut *self.db, id })
    }

    /// Returns the table called `name`, creating it if needed.
    pub fn get_or_create_table(&mut self, name: &str) -> Result<TableMut<'_>> {
        match self.try_get_table(name) {
            Some(id) => self.db.table_mut(id),
            None => self.create_table(name),
        }
    }

    /// Returns whether a table called `name` exists in this schema.
    #[must_use]
    pub fn contains_table(&self, name: &str) -> bool {
        self.try_get_table(name).is_some()
    }

    /// Returns the table called `name`.
    pub fn get_table(&self, name: &str) -> Result<TableId> {
        self.db
            .get_named(self.scope(), name, ObjectType::Table)
            .map(TableId)
    }

    /// Returns the table called `name`, if any.
    #[must_use]
    pub fn try_get_table(&self, name: &str) -> Option<TableId> {
        self.db
            .find(self.scope(), name, ObjectType::Table)
            .map(TableId)
    }

    /// Removes the table called `name`. Returns `false` if there is none.
    pub fn remove_table(&mut self, name: &str) -> Result<bool> {
        match self.try_get_table(name) {
            Some(id) => self.db.remove_object(id.into()).map(|()| true),
            None => Ok(false),
        }
    }

    /// Creates a view.
    pub fn create_view(&mut self, name: &str, query: ViewQuery) -> Result<ViewMut<'_>> {
        self.db.ensure_live(self.id.id())?;
        let scope = self.scope();
        self.db.check_new_name(scope, name, None)?;
        self.db.validate_view_query(None, &query)?;

        let sources: Vec<_> = query.bindings().iter().map(|b| b.id()).collect();
        let id = ViewId(self.db.allocate(
            name.to_string(),
            Some(self.id.id()),
            scope,
            ObjectKind::View(ViewDef { query }),
        ));
        for source in sources {
            self.db.graph.add_reference(source, id.id(), Role::ViewSource);
        }
        self.db.schema_def_mut(self.id)?.views.push(id);
        Ok(ViewMut { db: &mut *self.db, id })
    }

    /// Returns the view called `name`, creating it with `query` if needed.
    /// An existing view keeps its query.
    pub fn get_or_create_view(&mut self, name: &str, query: ViewQuery) -> Result<ViewMut<'_>> {
        match self.try_get_view(name) {
            Some(id) => self.db.view_mut(id),
            None => self.create_view(name, query),
        }
    }

    /// Returns whether a view called `name` exists in this schema.
    #[must_use]
    pub fn contains_view(&self, name: &str) -> bool {
        self.try_get_view(name).is_some()
    }

    /// Returns the view called `name`.
    pub fn get_view(&self, name: &str) -> Result<ViewId> {
        self.db
            .get_named(self.scope(), name, ObjectType::View)
            .map(ViewId)
    }

    /// Returns the view called `name`, if any.
    #[must_use]
    pub fn try_get_view(&self, name: &str) -> Option<ViewId> {
        self.db.find(self.scope(), name, ObjectType::View).map(ViewId)
    }

    /// Removes the view called `name`. Returns `false` if there is none.
    pub fn remove_view(&mut self, name: &str) -> Result<bool> {
        match self.try_get_view(name) {
            Some(id) => self.db.remove_object(id.into()).map(|()| true),
            None => Ok(false),
        }
    }
}
