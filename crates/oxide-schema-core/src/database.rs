//! The database: object arena, catalog, reference graph and change tracker.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, trace, warn};

use crate::action::{ActionCallback, PendingAction, PlannedAction};
use crate::catalog::{Catalog, Scope};
use crate::changes::{reconcile, ChangeTracker, CommitMode, TrackingMode};
use crate::dialect::{Dialect, DialectContext};
use crate::error::{Result, SchemaError};
use crate::graph::ReferenceGraph;
use crate::name::QualifiedName;
use crate::object::{
    CheckDef, CheckId, ColumnDef, ColumnId, ForeignKeyDef, ForeignKeyId, IndexDef, IndexId, Object,
    ObjectId, ObjectKind, ObjectType, PrimaryKeyDef, PrimaryKeyId, SchemaDef, SchemaId, TableDef,
    TableId, ViewDef, ViewId,
};
use crate::planner;
use crate::types::SqlValue;

static NEXT_NONCE: AtomicU32 = AtomicU32::new(1);

macro_rules! definition_accessors {
    ($($(#[$meta:meta])* $name:ident, $name_mut:ident: $id:ty => $variant:ident($def:ty);)*) => {
        $(
            $(#[$meta])*
            pub fn $name(&self, id: $id) -> Result<&$def> {
                match &self.lookup(id.into())?.kind {
                    ObjectKind::$variant(def) => Ok(def),
                    _ => Err(not_found(stringify!($variant), id.into())),
                }
            }

            pub(crate) fn $name_mut(&mut self, id: $id) -> Result<&mut $def> {
                match &mut self.lookup_mut(id.into())?.kind {
                    ObjectKind::$variant(def) => Ok(def),
                    _ => Err(not_found(stringify!($variant), id.into())),
                }
            }
        )*
    };
}

pub(crate) fn not_found(kind: &'static str, id: ObjectId) -> SchemaError {
    SchemaError::NotFound {
        kind,
        name: id.to_string(),
    }
}

/// An in-memory database schema that tracks its own changes.
///
/// Every database owns its catalog, reference graph and change log; several
/// databases can live side by side in one process. Ids handed out by one
/// database are rejected by every other.
#[derive(Debug)]
pub struct Database {
    pub(crate) nonce: u32,
    pub(crate) dialect: Dialect,
    pub(crate) objects: Vec<Object>,
    pub(crate) catalog: Catalog,
    pub(crate) graph: ReferenceGraph,
    pub(crate) schemas: Vec<SchemaId>,
    pub(crate) default_schema: SchemaId,
    pub(crate) tracker: ChangeTracker,
    pub(crate) check_sequence: u64,
}

impl Database {
    /// Creates an empty database for a dialect.
    ///
    /// The default schema is created with the dialect's default schema name
    /// and is part of the baseline. Tracking starts attached and committing.
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        let nonce = NEXT_NONCE.fetch_add(1, Ordering::Relaxed);
        let default_id = ObjectId { database: nonce, slot: 0 };
        let default_name = dialect.capabilities().default_schema.clone();

        let mut catalog = Catalog::new();
        catalog.insert(Scope::Database, &default_name, default_id);

        let schema = Object {
            name: default_name,
            parent: None,
            removed: false,
            kind: ObjectKind::Schema(SchemaDef {
                is_default: true,
                ..SchemaDef::default()
            }),
        };

        debug!(dialect = dialect.kind().name(), "Creating database");
        Self {
            nonce,
            dialect,
            objects: vec![schema],
            catalog,
            graph: ReferenceGraph::new(),
            schemas: vec![SchemaId(default_id)],
            default_schema: SchemaId(default_id),
            tracker: ChangeTracker::default(),
            check_sequence: 0,
        }
    }

    /// Returns the target dialect.
    #[must_use]
    pub const fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Returns the default schema.
    #[must_use]
    pub const fn default_schema(&self) -> SchemaId {
        self.default_schema
    }

    /// Returns the live schemas in creation order.
    #[must_use]
    pub fn schemas(&self) -> &[SchemaId] {
        &self.schemas
    }

    pub(crate) fn lookup(&self, id: ObjectId) -> Result<&Object> {
        if id.database != self.nonce {
            return Err(not_found("Object", id));
        }
        self.objects.get(id.slot()).ok_or_else(|| not_found("Object", id))
    }

    pub(crate) fn lookup_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        if id.database != self.nonce {
            return Err(not_found("Object", id));
        }
        self.objects
            .get_mut(id.slot())
            .ok_or_else(|| not_found("Object", id))
    }

    /// Returns the object's name.
    pub fn name(&self, id: impl Into<ObjectId>) -> Result<&str> {
        Ok(&self.lookup(id.into())?.name)
    }

    /// Returns whether the object has been removed.
    pub fn is_removed(&self, id: impl Into<ObjectId>) -> Result<bool> {
        Ok(self.lookup(id.into())?.removed)
    }

    /// Returns the object's type.
    pub fn object_type(&self, id: impl Into<ObjectId>) -> Result<ObjectType> {
        Ok(self.lookup(id.into())?.object_type())
    }

    /// Returns the owner: the schema of a table or view, the table of a
    /// column, index or constraint, `None` for a schema.
    pub fn parent(&self, id: impl Into<ObjectId>) -> Result<Option<ObjectId>> {
        Ok(self.lookup(id.into())?.parent)
    }

    /// Returns the table owning a column, index or constraint.
    pub fn table_of(&self, id: impl Into<ObjectId>) -> Result<TableId> {
        let id = id.into();
        let object = self.lookup(id)?;
        match (object.object_type(), object.parent) {
            (ObjectType::Column, Some(parent)) => Ok(TableId(parent)),
            (t, Some(parent)) if t.is_table_constraint() => Ok(TableId(parent)),
            _ => Err(not_found("Table", id)),
        }
    }

    /// Returns the schema owning a table or view.
    pub fn schema_of(&self, id: impl Into<ObjectId>) -> Result<SchemaId> {
        let id = id.into();
        let object = self.lookup(id)?;
        match (object.object_type(), object.parent) {
            (ObjectType::Table | ObjectType::View, Some(parent)) => Ok(SchemaId(parent)),
            _ => Err(not_found("Schema", id)),
        }
    }

    /// Returns the schema-qualified name of a table, view, index or
    /// constraint (indexes and constraints are qualified by their table's
    /// schema). A schema yields its own name with an empty qualifier.
    pub fn qualified_name(&self, id: impl Into<ObjectId>) -> Result<QualifiedName> {
        let id = id.into();
        let object = self.lookup(id)?;
        let schema = match object.object_type() {
            ObjectType::Schema => return Ok(QualifiedName::new("", object.name.clone())),
            ObjectType::Table | ObjectType::View => object.parent,
            ObjectType::Column => return Err(not_found("Relation", id)),
            _ => match object.parent {
                Some(table) => self.lookup(table)?.parent,
                None => None,
            },
        };
        let schema_name = match schema {
            Some(schema) => self.lookup(schema)?.name.clone(),
            None => String::new(),
        };
        Ok(QualifiedName::new(schema_name, object.name.clone()))
    }

    /// Returns the name qualified by every owner, e.g. `sales.orders.id`.
    pub fn full_name(&self, id: impl Into<ObjectId>) -> Result<String> {
        let id = id.into();
        let object = self.lookup(id)?;
        match object.object_type() {
            ObjectType::Schema | ObjectType::Table | ObjectType::View => {
                Ok(self.qualified_name(id)?.flattened())
            }
            _ => match object.parent {
                Some(table) => Ok(format!("{}.{}", self.full_name(table)?, object.name)),
                None => Ok(object.name.clone()),
            },
        }
    }

    definition_accessors! {
        /// Returns a schema definition.
        schema, schema_def_mut: SchemaId => Schema(SchemaDef);
        /// Returns a table definition.
        table, table_def_mut: TableId => Table(TableDef);
        /// Returns a column definition.
        column, column_def_mut: ColumnId => Column(ColumnDef);
        /// Returns an index definition.
        index, index_def_mut: IndexId => Index(IndexDef);
        /// Returns a primary key definition.
        primary_key, primary_key_def_mut: PrimaryKeyId => PrimaryKey(PrimaryKeyDef);
        /// Returns a foreign key definition.
        foreign_key, foreign_key_def_mut: ForeignKeyId => ForeignKey(ForeignKeyDef);
        /// Returns a check constraint definition.
        check, check_def_mut: CheckId => Check(CheckDef);
        /// Returns a view definition.
        view, view_def_mut: ViewId => View(ViewDef);
    }

    /// Returns the objects that reference `id`.
    pub fn referencing_objects(&self, id: impl Into<ObjectId>) -> Result<BTreeSet<ObjectId>> {
        let id = id.into();
        self.lookup(id)?;
        Ok(self.graph.referencing_objects(id))
    }

    /// Returns the objects `id` references.
    pub fn referenced_objects(&self, id: impl Into<ObjectId>) -> Result<BTreeSet<ObjectId>> {
        let id = id.into();
        self.lookup(id)?;
        Ok(self.graph.referenced_objects(id))
    }

    /// Returns the current tracking and commit modes.
    #[must_use]
    pub const fn mode(&self) -> (TrackingMode, CommitMode) {
        (self.tracker.tracking, self.tracker.commit)
    }

    /// Switches modes. Leaving attached mode plans everything logged so far
    /// into the pending queue.
    pub fn set_mode(&mut self, tracking: TrackingMode, commit: CommitMode) -> Result<()> {
        if self.tracker.tracking == TrackingMode::Attached && tracking == TrackingMode::Detached {
            self.plan_window()?;
        }
        debug!(?tracking, ?commit, "Switching change tracking mode");
        self.tracker.tracking = tracking;
        self.tracker.commit = commit;
        Ok(())
    }

    /// Returns whether any change is logged or any action is waiting.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        !self.tracker.log.is_empty() || !self.tracker.ready.is_empty()
    }

    /// Plans everything logged since the last flush and returns the ordered
    /// action list, clearing the queue.
    ///
    /// In attached mode every live table is validated first; on failure the
    /// log is left untouched so the caller can fix the model and retry.
    pub fn pending_actions(&mut self) -> Result<Vec<PendingAction>> {
        if self.tracker.validates() {
            self.validate_tables()?;
        }
        self.plan_window()?;
        let actions = std::mem::take(&mut self.tracker.ready);
        debug!(count = actions.len(), "Flushed pending actions");
        Ok(actions)
    }

    /// Adds a raw statement at the current position of the pending queue.
    pub fn add_statement(&mut self, sql: impl Into<String>) -> Result<()> {
        self.push_statement(sql.into(), Vec::new(), None, None)
    }

    /// Adds a raw statement with bound parameters.
    pub fn add_parameterized_statement(
        &mut self,
        sql: impl Into<String>,
        params: Vec<SqlValue>,
    ) -> Result<()> {
        self.push_statement(sql.into(), params, None, None)
    }

    /// Adds a raw statement with callbacks run around its execution.
    pub fn add_statement_with_callbacks(
        &mut self,
        sql: impl Into<String>,
        before: Option<ActionCallback>,
        after: Option<ActionCallback>,
    ) -> Result<()> {
        self.push_statement(sql.into(), Vec::new(), before, after)
    }

    fn push_statement(
        &mut self,
        sql: String,
        params: Vec<SqlValue>,
        before: Option<ActionCallback>,
        after: Option<ActionCallback>,
    ) -> Result<()> {
        if !self.tracker.is_recording() {
            return Ok(());
        }
        self.plan_window()?;
        let mut action = PendingAction::new(
            PlannedAction::RawSql {
                sql: sql.clone(),
                params,
            },
            vec![sql],
        );
        action.before = before;
        action.after = after;
        self.tracker.ready.push(action);
        Ok(())
    }

    /// Checks the structural rules deferred to flush time.
    fn validate_tables(&self) -> Result<()> {
        let requires_primary_key = self.dialect.capabilities().requires_primary_key;
        let mut violations = Vec::new();
        for schema in &self.schemas {
            for table in &self.schema(*schema)?.tables {
                let def = self.table(*table)?;
                if def.columns.is_empty() {
                    violations.push(SchemaError::violation(
                        self.full_name(*table)?,
                        "table has no columns",
                    ));
                }
                if requires_primary_key && def.primary_key.is_none() {
                    violations.push(SchemaError::violation(
                        self.full_name(*table)?,
                        "table has no primary key",
                    ));
                }
            }
        }
        if !violations.is_empty() {
            warn!(count = violations.len(), "Flush validation failed");
        }
        SchemaError::from_violations(violations)
    }

    /// Plans the current log window into the pending queue.
    fn plan_window(&mut self) -> Result<()> {
        if self.tracker.log.is_empty() {
            return Ok(());
        }
        let reconciled = reconcile(&self.tracker.log, self);
        debug!(records = self.tracker.log.len(), "Reconciling change log");
        let planned = if reconciled.is_empty() {
            Vec::new()
        } else {
            planner::plan(self, &reconciled)?
        };

        let emitter = self.dialect.emitter();
        let ctx = DialectContext::new(self, emitter);
        let mut rendered = Vec::with_capacity(planned.len());
        for action in planned {
            let statements = emitter.render(&action, &ctx)?;
            trace!(action = action.label(), ?statements, "Planned action");
            rendered.push(PendingAction::new(action, statements));
        }

        self.tracker.log.clear();
        self.tracker.ready.extend(rendered);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_database_has_default_schema() {
        let db = Database::new(Dialect::postgres());
        let schema = db.default_schema();
        assert_eq!(db.name(schema).unwrap(), "public");
        assert!(db.schema(schema).unwrap().is_default);
        assert_eq!(db.schemas(), &[schema]);
        assert_eq!(db.object_type(schema).unwrap(), ObjectType::Schema);
    }

    #[test]
    fn test_ids_are_scoped_to_their_database() {
        let a = Database::new(Dialect::sqlite());
        let b = Database::new(Dialect::sqlite());
        let err = b.name(a.default_schema()).unwrap_err();
        assert!(matches!(err, SchemaError::NotFound { .. }));
    }

    #[test]
    fn test_wrong_kind_is_not_found() {
        let db = Database::new(Dialect::sqlite());
        let as_table = TableId(db.default_schema().id());
        assert!(db.table(as_table).is_err());
    }

    #[test]
    fn test_raw_statement_ignored_when_detached() {
        let mut db = Database::new(Dialect::sqlite());
        db.set_mode(TrackingMode::Detached, CommitMode::Commit).unwrap();
        db.add_statement("SELECT 1").unwrap();
        assert!(db.pending_actions().unwrap().is_empty());
    }

    #[test]
    fn test_raw_statement_queued() {
        let mut db = Database::new(Dialect::sqlite());
        db.add_parameterized_statement("DELETE FROM t WHERE id = ?", vec![SqlValue::Int(4)])
            .unwrap();
        let actions = db.pending_actions().unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].statements, vec!["DELETE FROM t WHERE id = ?"]);
        assert_eq!(actions[0].params, vec![SqlValue::Int(4)]);
        assert!(!db.has_pending_changes());
    }
}
