//! Turns the net effect of a change window into ordered, dialect neutral
//! actions.
//!
//! Actions are planned against the final state of the model. Objects that
//! still exist are referenced by id and render with their current names;
//! objects that are dropped, or renamed later in the plan, are referenced by
//! the names they carry when the action runs.
//!
//! The plan runs in phases: views that depend on anything touched are dropped
//! first, followed by constraints, indexes, columns, tables and schemas.
//! Schemas are then created and renamed, tables and columns renamed, tables
//! created or rebuilt, in-place alterations applied, foreign keys added and
//! finally views recreated.
//!
//! In-place statements therefore do not follow log order across kinds: every
//! rename runs before any alteration, so alterations always address objects
//! by their final names. Within the alteration phase, log order is kept.

mod order;
mod rebuild;

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::action::{ColumnAlteration, PlannedAction};
use crate::catalog::Scope;
use crate::changes::{solve_renames, Field, FieldChange, NetChange, Reconciled, Rename};
use crate::database::{not_found, Database};
use crate::dialect::Capabilities;
use crate::error::Result;
use crate::expr::{QueryRef, ViewQuery};
use crate::name::{catalog_key, QualifiedName};
use crate::object::{
    ColumnId, ForeignKeyId, IndexId, ObjectId, ObjectType, PrimaryKeyId, SchemaId, TableId, ViewId,
};

use order::{tables_by_reference, views_by_source};

/// Residual changes of one table that existed before the window.
#[derive(Debug, Default)]
pub(crate) struct TableDelta {
    /// Columns, indexes and constraints created in the window.
    pub(crate) created: Vec<ObjectId>,
    /// Columns, indexes and constraints removed in the window, in log order.
    pub(crate) removed: Vec<ObjectId>,
    /// Columns, indexes and constraints with field changes.
    pub(crate) changed: Vec<ObjectId>,
}

impl TableDelta {
    pub(crate) fn is_empty(&self) -> bool {
        self.created.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// A table, index or primary key renamed in the shared relation namespace of
/// a schema. A primary key counts as a relation where it names its backing
/// index.
#[derive(Debug, Clone, Copy)]
enum Relation {
    Table(TableId),
    Index(IndexId),
    PrimaryKey(TableId),
}

pub(crate) struct Planner<'a> {
    db: &'a Database,
    changes: &'a Reconciled,
    caps: &'a Capabilities,
    deltas: BTreeMap<TableId, TableDelta>,
    rebuilt: BTreeSet<TableId>,
    /// Kept views to drop and recreate, sources first.
    invalidated: Vec<ViewId>,
    /// Foreign keys added once every table has its final shape.
    foreign_keys: Vec<ForeignKeyId>,
    actions: Vec<PlannedAction>,
}

/// Plans the reconciled window of `db`.
pub(crate) fn plan(db: &Database, changes: &Reconciled) -> Result<Vec<PlannedAction>> {
    let mut planner = Planner::new(db, changes)?;
    planner.drop_views()?;
    planner.drop_constraints_and_indexes()?;
    planner.drop_columns()?;
    planner.drop_tables()?;
    planner.drop_schemas();
    planner.create_schemas()?;
    planner.rename_schemas()?;
    planner.rename_relations()?;
    planner.rename_constraints()?;
    planner.rename_columns()?;
    planner.create_tables()?;
    planner.rebuild_tables()?;
    planner.alter_tables()?;
    planner.add_foreign_keys();
    planner.create_views()?;

    debug!(
        actions = planner.actions.len(),
        rebuilt = planner.rebuilt.len(),
        views = planner.invalidated.len(),
        "Planned change window"
    );
    Ok(planner.actions)
}

impl<'a> Planner<'a> {
    fn new(db: &'a Database, changes: &'a Reconciled) -> Result<Self> {
        let mut planner = Self {
            db,
            changes,
            caps: db.dialect().capabilities(),
            deltas: BTreeMap::new(),
            rebuilt: BTreeSet::new(),
            invalidated: Vec::new(),
            foreign_keys: Vec::new(),
            actions: Vec::new(),
        };
        planner.collect_deltas()?;
        planner.collect_rebuilds()?;
        planner.collect_invalidated_views()?;
        Ok(planner)
    }

    fn collect_deltas(&mut self) -> Result<()> {
        let db = self.db;
        let changes = self.changes;
        let member_table = |id: ObjectId| -> Result<Option<TableId>> {
            let object_type = db.object_type(id)?;
            if object_type != ObjectType::Column && !object_type.is_table_constraint() {
                return Ok(None);
            }
            let table = db.table_of(id)?;
            Ok(changes.existed(table, db).then_some(table))
        };

        for (id, _) in changes.created() {
            if let Some(table) = member_table(id)? {
                self.deltas.entry(table).or_default().created.push(id);
            }
        }
        for id in changes.removed() {
            if let Some(table) = member_table(*id)? {
                self.deltas.entry(table).or_default().removed.push(*id);
            }
        }
        for id in changes.changed() {
            if let Some(table) = member_table(id)? {
                self.deltas.entry(table).or_default().changed.push(id);
            }
        }
        Ok(())
    }

    fn collect_rebuilds(&mut self) -> Result<()> {
        let empty = TableDelta::default();
        for table in self.kept_tables()? {
            let delta = self.deltas.get(&table).unwrap_or(&empty);
            if self.requires_rebuild(table, delta)? {
                debug!(table = %self.db.full_name(table)?, "Table needs a rebuild");
                self.rebuilt.insert(table);
            }
        }
        Ok(())
    }

    fn collect_invalidated_views(&mut self) -> Result<()> {
        let kept: Vec<ViewId> = self
            .live_views()?
            .into_iter()
            .filter(|view| !self.changes.is_created(*view))
            .collect();
        let mut invalid = BTreeSet::new();
        for view in views_by_source(self.db, &kept)? {
            if self.view_invalidated(view, &invalid)? {
                invalid.insert(view);
                self.invalidated.push(view);
            }
        }
        Ok(())
    }

    /// Whether a kept view no longer matches the definition stored in the
    /// database, or reads something that is dropped or renamed.
    fn view_invalidated(&self, view: ViewId, invalid: &BTreeSet<ViewId>) -> Result<bool> {
        if self.qualified_renamed(view.id())? || self.changes.change(view, Field::Query).is_some() {
            return Ok(true);
        }
        for binding in self.db.view(view)?.query.bindings() {
            let touched = match *binding {
                QueryRef::Table(table) => {
                    self.table_touched(table)?
                        || self.deltas.get(&table).is_some_and(|delta| {
                            delta.removed.iter().chain(&delta.changed).any(|id| {
                                self.db.object_type(*id).ok() == Some(ObjectType::Column)
                            })
                        })
                }
                QueryRef::View(source) => invalid.contains(&source),
                QueryRef::Column(column) => {
                    self.changes.is_renamed(column)
                        || self.changes.change(column, Field::Type).is_some()
                        || self.table_touched(self.db.table_of(column)?)?
                }
            };
            if touched {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn table_touched(&self, table: TableId) -> Result<bool> {
        Ok(self.rebuilt.contains(&table) || self.qualified_renamed(table.id())?)
    }

    // Phase 1: views.

    fn drop_views(&mut self) -> Result<()> {
        let mut dropped: Vec<ViewId> = self
            .changes
            .removed()
            .iter()
            .filter(|id| self.db.object_type(**id).ok() == Some(ObjectType::View))
            .map(|id| ViewId(*id))
            .collect();
        dropped.extend(self.invalidated.iter().copied());

        // Dependencies as they were when the window opened.
        let sorted = order::dependency_order(&dropped, |view| {
            Ok(self
                .start_query(view)?
                .bindings()
                .iter()
                .filter_map(|binding| match binding {
                    QueryRef::View(source) => Some(*source),
                    _ => None,
                })
                .collect())
        })?;
        for view in sorted.into_iter().rev() {
            let name = self.original_qualified(view.id())?;
            self.actions.push(PlannedAction::DropView { name });
        }
        Ok(())
    }

    fn start_query(&self, view: ViewId) -> Result<&'a ViewQuery> {
        let changes: &'a Reconciled = self.changes;
        let db: &'a Database = self.db;
        if let Some(NetChange {
            change: FieldChange::Query(t),
            ..
        }) = changes.change(view, Field::Query)
        {
            return Ok(&t.old);
        }
        Ok(&db.view(view)?.query)
    }

    // Phase 2: constraints and indexes.

    fn drop_constraints_and_indexes(&mut self) -> Result<()> {
        let mut foreign_keys = Vec::new();
        let mut constraints = Vec::new();
        let mut indexes = Vec::new();

        for (table, delta) in &self.deltas {
            if self.rebuilt.contains(table) {
                for id in delta.removed.iter().chain(&delta.changed) {
                    if self.db.object_type(*id)? != ObjectType::Index {
                        continue;
                    }
                    let index = IndexId(*id);
                    let gone = self.changes.is_removed(index)
                        || self.physically_renamed(index.id())?
                        || !self.db.index(index)?.is_materialized();
                    if self.was_materialized(index)? && gone {
                        indexes.push(index);
                    }
                }
                continue;
            }

            for id in &delta.removed {
                match self.db.object_type(*id)? {
                    ObjectType::ForeignKey => foreign_keys.push(*id),
                    ObjectType::PrimaryKey | ObjectType::Check => constraints.push(*id),
                    ObjectType::Index if self.was_materialized(IndexId(*id))? => {
                        indexes.push(IndexId(*id));
                    }
                    _ => {}
                }
            }
            for id in &delta.changed {
                match self.db.object_type(*id)? {
                    ObjectType::ForeignKey if self.constraint_recreated(*id) => {
                        foreign_keys.push(*id);
                    }
                    ObjectType::Check if self.constraint_recreated(*id) => constraints.push(*id),
                    ObjectType::Index if self.index_dropped(IndexId(*id))? => {
                        indexes.push(IndexId(*id));
                    }
                    _ => {}
                }
            }
        }

        if !self.caps.inline_foreign_keys {
            for fk in self.foreign_keys_to_readd()? {
                let table = self.db.table_of(fk)?;
                if !self.rebuilt.contains(&table) {
                    foreign_keys.push(fk.id());
                }
                self.foreign_keys.push(fk);
            }
        }

        for id in foreign_keys.into_iter().chain(constraints) {
            let table = self.db.table_of(id)?;
            self.actions.push(PlannedAction::DropConstraint {
                table: self.original_qualified(table.id())?,
                name: self.changes.original_name(id, self.db),
            });
        }
        for index in indexes {
            let name = self.original_qualified(index.id())?;
            self.actions.push(PlannedAction::DropIndex { name });
        }
        Ok(())
    }

    /// Unchanged foreign keys whose definition in the database breaks while
    /// the plan runs: their table or referenced table is rebuilt, the
    /// referenced table is renamed without references following, or the
    /// referenced index is dropped.
    fn foreign_keys_to_readd(&self) -> Result<Vec<ForeignKeyId>> {
        let mut result = Vec::new();
        for table in self.kept_tables()? {
            for fk in &self.db.table(table)?.foreign_keys {
                if !self.existed(*fk) || self.constraint_recreated(fk.id()) {
                    continue;
                }
                let referenced = self.db.foreign_key(*fk)?.referenced;
                let target = self.db.table_of(referenced)?;
                let breaks = self.rebuilt.contains(&table)
                    || self.rebuilt.contains(&target)
                    || (!self.caps.rename_updates_references
                        && self.existed(target)
                        && self.qualified_renamed(target.id())?)
                    || (self.existed(referenced) && self.index_dropped(referenced)?);
                if breaks {
                    result.push(*fk);
                }
            }
        }
        Ok(result)
    }

    // Phase 3: columns.

    fn drop_columns(&mut self) -> Result<()> {
        let mut dropped = Vec::new();
        for (table, delta) in &self.deltas {
            if self.rebuilt.contains(table) {
                continue;
            }
            for id in &delta.removed {
                if self.db.object_type(*id)? == ObjectType::Column {
                    dropped.push(PlannedAction::DropColumn {
                        table: self.original_qualified(table.id())?,
                        name: self.changes.original_name(*id, self.db),
                    });
                }
            }
        }
        self.actions.extend(dropped);
        Ok(())
    }

    // Phases 4 and 5: tables and schemas.

    fn drop_tables(&mut self) -> Result<()> {
        let removed = self.removed_of::<TableId>(ObjectType::Table, TableId);
        for table in tables_by_reference(self.db, &removed)?.into_iter().rev() {
            let name = self.original_qualified(table.id())?;
            self.actions.push(PlannedAction::DropTable { name });
        }
        Ok(())
    }

    fn drop_schemas(&mut self) {
        if !self.caps.native_schemas {
            return;
        }
        for schema in self.removed_of::<SchemaId>(ObjectType::Schema, SchemaId) {
            let name = self.changes.original_name(schema, self.db);
            self.actions.push(PlannedAction::DropSchema { name });
        }
    }

    // Phases 6 and 7: schema creation and renames.

    fn create_schemas(&mut self) -> Result<()> {
        if !self.caps.native_schemas {
            return Ok(());
        }
        for (id, _) in self.changes.created() {
            if self.db.object_type(id)? == ObjectType::Schema {
                let name = self.db.name(id)?.to_string();
                self.actions.push(PlannedAction::CreateSchema { name });
            }
        }
        Ok(())
    }

    fn rename_schemas(&mut self) -> Result<()> {
        if !self.caps.native_schemas {
            return Ok(());
        }
        let mut renames = Vec::new();
        for schema in self.db.schemas() {
            if self.changes.is_renamed(*schema) {
                renames.push(Rename::new(
                    *schema,
                    self.changes.original_name(*schema, self.db),
                    self.db.name(*schema)?,
                ));
            }
        }
        let db = self.db;
        for step in solve_renames(renames, self.caps.max_identifier_length, |name| {
            db.catalog.contains(Scope::Database, name)
        }) {
            self.actions.push(PlannedAction::RenameSchema {
                from: step.from,
                to: step.to,
            });
        }
        Ok(())
    }

    // Phase 8: tables and indexes share the relation namespace of a schema.

    fn rename_relations(&mut self) -> Result<()> {
        let native = self.caps.native_schemas;
        let mut groups: BTreeMap<Option<SchemaId>, Vec<Rename<Relation>>> = BTreeMap::new();

        let mut push = |this: &Self, id: ObjectId, key: Relation| -> Result<()> {
            let schema = match key {
                Relation::Table(table) | Relation::PrimaryKey(table) => this.db.schema_of(table)?,
                Relation::Index(index) => this.db.schema_of(this.db.table_of(index)?)?,
            };
            let from = this.original_qualified(id)?;
            let to = this.db.qualified_name(id)?;
            let rename = if native {
                Rename::new(key, from.name, to.name)
            } else {
                Rename::new(key, from.flattened(), to.flattened())
            };
            groups.entry(native.then_some(schema)).or_default().push(rename);
            Ok(())
        };

        for table in self.kept_tables()? {
            if self.physically_renamed(table.id())? {
                push(self, table.id(), Relation::Table(table))?;
            }
            if let Some(key) = self.shared_name_key(table)? {
                push(self, key.id(), Relation::PrimaryKey(table))?;
            }
            if !self.caps.rename_index || self.rebuilt.contains(&table) {
                continue;
            }
            for index in &self.db.table(table)?.indexes {
                let kept = self.existed(*index)
                    && self.was_materialized(*index)?
                    && self.db.index(*index)?.is_materialized()
                    && !self.index_dropped(*index)?;
                if kept && self.physically_renamed(index.id())? {
                    push(self, index.id(), Relation::Index(*index))?;
                }
            }
        }

        for (schema, renames) in groups {
            let steps = match schema {
                Some(schema) => solve_renames(renames, self.caps.max_identifier_length, |name| {
                    self.db.catalog.contains(Scope::Schema(schema.id()), name)
                }),
                None => solve_renames(renames, self.caps.max_identifier_length, |name| {
                    self.flattened_name_taken(name)
                }),
            };
            let schema_name = match schema {
                Some(schema) => self.db.name(schema)?.to_string(),
                None => String::new(),
            };
            for step in steps {
                let from = QualifiedName::new(schema_name.clone(), step.from);
                let to = QualifiedName::new(schema_name.clone(), step.to);
                self.actions.push(match step.key {
                    Relation::Table(_) => PlannedAction::RenameTable { from, to },
                    Relation::Index(_) => PlannedAction::RenameIndex { from, to },
                    Relation::PrimaryKey(table) => PlannedAction::RenameConstraint {
                        table,
                        from: from.name,
                        to: to.name,
                    },
                });
            }
        }
        Ok(())
    }

    /// The primary key of `table` when it is renamed in place on a dialect
    /// where the key's name is also the name of its backing index.
    fn shared_name_key(&self, table: TableId) -> Result<Option<PrimaryKeyId>> {
        if !self.caps.native_schemas
            || !self.caps.rename_constraint
            || self.rebuilt.contains(&table)
        {
            return Ok(None);
        }
        Ok(self.db.table(table)?.primary_key.filter(|key| {
            self.existed(*key)
                && self.changes.is_renamed(key.id())
                && !self.constraint_recreated(key.id())
        }))
    }

    /// Whether a flattened `schema.name` identifier is held by a live object.
    fn flattened_name_taken(&self, name: &str) -> bool {
        let key = catalog_key(name);
        self.db.schemas().iter().any(|schema| {
            let schema_name = self.db.name(*schema).unwrap_or_default();
            self.db
                .catalog
                .entries(Scope::Schema(schema.id()))
                .any(|(entry, _)| {
                    catalog_key(&QualifiedName::new(schema_name, entry).flattened()) == key
                })
        })
    }

    fn rename_constraints(&mut self) -> Result<()> {
        if !self.caps.rename_constraint {
            return Ok(());
        }
        let readded: BTreeSet<ForeignKeyId> = self.foreign_keys.iter().copied().collect();
        for (table, delta) in &self.deltas {
            if self.rebuilt.contains(table) {
                continue;
            }
            let mut renames = Vec::new();
            for id in &delta.changed {
                let object_type = self.db.object_type(*id)?;
                let constraint = matches!(
                    object_type,
                    ObjectType::PrimaryKey | ObjectType::ForeignKey | ObjectType::Check
                );
                if !constraint
                    || !self.changes.is_renamed(*id)
                    || self.shared_name_key(*table)? == Some(PrimaryKeyId(*id))
                    || self.constraint_recreated(*id)
                    || readded.contains(&ForeignKeyId(*id))
                {
                    continue;
                }
                renames.push(Rename::new(
                    *id,
                    self.changes.original_name(*id, self.db),
                    self.db.name(*id)?,
                ));
            }
            let scope = Scope::Schema(self.db.schema_of(*table)?.id());
            for step in solve_renames(renames, self.caps.max_identifier_length, |name| {
                self.db.catalog.contains(scope, name)
            }) {
                self.actions.push(PlannedAction::RenameConstraint {
                    table: *table,
                    from: step.from,
                    to: step.to,
                });
            }
        }
        Ok(())
    }

    // Phase 9: columns.

    fn rename_columns(&mut self) -> Result<()> {
        for (table, delta) in &self.deltas {
            if self.rebuilt.contains(table) {
                continue;
            }
            let mut renames = Vec::new();
            for id in &delta.changed {
                if self.db.object_type(*id)? == ObjectType::Column && self.changes.is_renamed(*id) {
                    renames.push(Rename::new(
                        *id,
                        self.changes.original_name(*id, self.db),
                        self.db.name(*id)?,
                    ));
                }
            }
            let scope = Scope::Table(table.id());
            for step in solve_renames(renames, self.caps.max_identifier_length, |name| {
                self.db.catalog.contains(scope, name)
            }) {
                self.actions.push(PlannedAction::RenameColumn {
                    table: *table,
                    from: step.from,
                    to: step.to,
                });
            }
        }
        Ok(())
    }

    // Phases 10 and 11: new and rebuilt tables.

    fn create_tables(&mut self) -> Result<()> {
        let created: Vec<TableId> = self
            .changes
            .created()
            .filter(|(id, _)| self.db.object_type(*id).ok() == Some(ObjectType::Table))
            .map(|(id, _)| TableId(id))
            .collect();
        for table in tables_by_reference(self.db, &created)? {
            self.actions.push(PlannedAction::CreateTable { table });
            self.create_materialized_indexes(table)?;
            if !self.caps.inline_foreign_keys {
                self.foreign_keys
                    .extend(self.db.table(table)?.foreign_keys.iter().copied());
            }
        }
        Ok(())
    }

    fn rebuild_tables(&mut self) -> Result<()> {
        let rebuilt: Vec<TableId> = self.rebuilt.iter().copied().collect();
        for table in tables_by_reference(self.db, &rebuilt)? {
            let plan = self.rebuild_plan(table)?;
            self.actions.push(PlannedAction::RebuildTable(plan));
            self.create_materialized_indexes(table)?;
            if !self.caps.inline_foreign_keys {
                self.foreign_keys
                    .extend(self.db.table(table)?.foreign_keys.iter().copied());
            }
        }
        Ok(())
    }

    fn create_materialized_indexes(&mut self, table: TableId) -> Result<()> {
        for index in &self.db.table(table)?.indexes {
            if self.db.index(*index)?.is_materialized() {
                self.actions.push(PlannedAction::CreateIndex { index: *index });
            }
        }
        Ok(())
    }

    // Phase 12: in-place changes, in the order they were made.

    fn alter_tables(&mut self) -> Result<()> {
        let mut steps: Vec<(usize, PlannedAction)> = Vec::new();
        let mut foreign_keys: Vec<(usize, ForeignKeyId)> = Vec::new();

        for (table, delta) in &self.deltas {
            if self.rebuilt.contains(table) {
                continue;
            }
            for id in &delta.created {
                let seq = self.changes.created_seq(*id).unwrap_or_default();
                match self.db.object_type(*id)? {
                    ObjectType::Column => {
                        steps.push((seq, PlannedAction::AddColumn { column: ColumnId(*id) }));
                    }
                    ObjectType::Index => {
                        if self.db.index(IndexId(*id))?.is_materialized() {
                            steps.push((seq, PlannedAction::CreateIndex { index: IndexId(*id) }));
                        }
                    }
                    ObjectType::PrimaryKey | ObjectType::Check => {
                        steps.push((seq, PlannedAction::AddConstraint { constraint: *id }));
                    }
                    ObjectType::ForeignKey => foreign_keys.push((seq, ForeignKeyId(*id))),
                    _ => {}
                }
            }
            for id in &delta.changed {
                let last = self
                    .changes
                    .changes_of(*id)
                    .map(|net| net.seq)
                    .max()
                    .unwrap_or_default();
                match self.db.object_type(*id)? {
                    ObjectType::Column => {
                        for (field, alteration) in [
                            (Field::Type, ColumnAlteration::Type),
                            (Field::Nullability, ColumnAlteration::Nullability),
                            (Field::Default, ColumnAlteration::Default),
                        ] {
                            if let Some(net) = self.changes.change(*id, field) {
                                steps.push((
                                    net.seq,
                                    PlannedAction::AlterColumn {
                                        column: ColumnId(*id),
                                        alteration,
                                    },
                                ));
                            }
                        }
                    }
                    ObjectType::Index => {
                        let index = IndexId(*id);
                        let now = self.db.index(index)?.is_materialized();
                        if now && (!self.was_materialized(index)? || self.index_dropped(index)?) {
                            steps.push((last, PlannedAction::CreateIndex { index }));
                        }
                    }
                    ObjectType::Check if self.constraint_recreated(*id) => {
                        steps.push((last, PlannedAction::AddConstraint { constraint: *id }));
                    }
                    ObjectType::ForeignKey if self.constraint_recreated(*id) => {
                        foreign_keys.push((last, ForeignKeyId(*id)));
                    }
                    _ => {}
                }
            }
        }

        steps.sort_by_key(|(seq, _)| *seq);
        self.actions.extend(steps.into_iter().map(|(_, action)| action));
        foreign_keys.sort_by_key(|(seq, _)| *seq);
        self.foreign_keys
            .extend(foreign_keys.into_iter().map(|(_, fk)| fk));
        Ok(())
    }

    // Phase 13: foreign keys, once every table exists in its final shape.

    fn add_foreign_keys(&mut self) {
        if self.caps.inline_foreign_keys {
            return;
        }
        let mut seen = BTreeSet::new();
        for fk in std::mem::take(&mut self.foreign_keys) {
            if seen.insert(fk) {
                self.actions.push(PlannedAction::AddConstraint { constraint: fk.id() });
            }
        }
    }

    // Phase 14: views.

    fn create_views(&mut self) -> Result<()> {
        let mut views: Vec<ViewId> = self
            .changes
            .created()
            .filter(|(id, _)| self.db.object_type(*id).ok() == Some(ObjectType::View))
            .map(|(id, _)| ViewId(id))
            .collect();
        views.extend(self.invalidated.iter().copied());
        for view in views_by_source(self.db, &views)? {
            self.actions.push(PlannedAction::CreateView { view });
        }
        Ok(())
    }

    // Helpers.

    /// Tables that existed before the window and still exist.
    fn kept_tables(&self) -> Result<Vec<TableId>> {
        let mut tables = Vec::new();
        for schema in self.db.schemas() {
            for table in &self.db.schema(*schema)?.tables {
                if !self.changes.is_created(*table) {
                    tables.push(*table);
                }
            }
        }
        Ok(tables)
    }

    fn live_views(&self) -> Result<Vec<ViewId>> {
        let mut views = Vec::new();
        for schema in self.db.schemas() {
            views.extend(self.db.schema(*schema)?.views.iter().copied());
        }
        Ok(views)
    }

    fn removed_of<T>(&self, object_type: ObjectType, wrap: fn(ObjectId) -> T) -> Vec<T> {
        self.changes
            .removed()
            .iter()
            .filter(|id| self.db.object_type(**id).ok() == Some(object_type))
            .map(|id| wrap(*id))
            .collect()
    }

    /// The table or view an object belongs to (itself for relations).
    fn relation_of(&self, id: ObjectId) -> Result<ObjectId> {
        match self.db.object_type(id)? {
            ObjectType::Table | ObjectType::View => Ok(id),
            _ => Ok(self.db.table_of(id)?.id()),
        }
    }

    /// Qualified name an object carried when the window opened.
    fn original_qualified(&self, id: ObjectId) -> Result<QualifiedName> {
        let relation = self.relation_of(id)?;
        let schema = self
            .db
            .parent(relation)?
            .ok_or_else(|| not_found("Schema", relation))?;
        Ok(QualifiedName::new(
            self.changes.original_name(schema, self.db),
            self.changes.original_name(id, self.db),
        ))
    }

    fn schema_renamed(&self, id: ObjectId) -> Result<bool> {
        let relation = self.relation_of(id)?;
        Ok(self.changes.is_renamed(self.db.schema_of(relation)?))
    }

    /// Whether the schema-qualified name changed.
    pub(super) fn qualified_renamed(&self, id: ObjectId) -> Result<bool> {
        Ok(self.changes.is_renamed(id) || self.schema_renamed(id)?)
    }

    /// Whether the identifier the database knows the object by changed. With
    /// emulated schemas the schema name is part of that identifier.
    fn physically_renamed(&self, id: ObjectId) -> Result<bool> {
        Ok(self.changes.is_renamed(id) || (!self.caps.native_schemas && self.schema_renamed(id)?))
    }

    pub(super) fn start_nullable(&self, column: ColumnId) -> Result<bool> {
        Ok(match self.changes.change(column, Field::Nullability) {
            Some(NetChange {
                change: FieldChange::Nullability(t),
                ..
            }) => t.old,
            _ => self.db.column(column)?.nullable,
        })
    }

    /// Whether the index existed in the database when the window opened.
    fn was_materialized(&self, index: IndexId) -> Result<bool> {
        if self.changes.is_created(index) {
            return Ok(false);
        }
        let def = self.db.index(index)?;
        let is_virtual = match self.changes.change(index, Field::Virtuality) {
            Some(NetChange {
                change: FieldChange::Virtuality(t),
                ..
            }) => t.old,
            _ => def.is_virtual,
        };
        let primary_key: Option<PrimaryKeyId> = match self.changes.change(index, Field::PrimaryKey) {
            Some(NetChange {
                change: FieldChange::PrimaryKey(t),
                ..
            }) => t.old,
            _ => def.primary_key,
        };
        Ok(!is_virtual && primary_key.is_none())
    }

    /// Whether a kept index on a table altered in place must be dropped
    /// before the table changes.
    fn index_dropped(&self, index: IndexId) -> Result<bool> {
        if !self.was_materialized(index)? {
            return Ok(false);
        }
        Ok(!self.db.index(index)?.is_materialized()
            || self.changes.change(index, Field::Uniqueness).is_some()
            || self.changes.change(index, Field::Filter).is_some()
            || (!self.caps.rename_index && self.physically_renamed(index.id())?))
    }

    /// Whether a kept constraint changed in a way only drop and re-add express.
    fn constraint_recreated(&self, id: ObjectId) -> bool {
        [Field::Condition, Field::Target, Field::OnDelete, Field::OnUpdate]
            .into_iter()
            .any(|field| self.changes.change(id, field).is_some())
    }
}

#[cfg(test)]
mod tests {
    use crate::changes::reconcile;
    use crate::dialect::Dialect;
    use crate::expr::Expr;
    use crate::types::DataType;

    use super::*;

    fn planned(db: &mut Database) -> Vec<PlannedAction> {
        let reconciled = reconcile(&db.tracker.log, db);
        let actions = plan(db, &reconciled).unwrap();
        db.tracker.log.clear();
        actions
    }

    fn users(db: &mut Database) -> (TableId, ColumnId) {
        let schema = db.default_schema();
        let mut schema = db.schema_mut(schema).unwrap();
        let mut table = schema.create_table("users").unwrap();
        let mut id = table.create_column("id", DataType::Integer).unwrap();
        id.mark_as_nullable(false).unwrap();
        let id = id.id();
        table.set_primary_key([id]).unwrap();
        (table.id(), id)
    }

    #[test]
    fn test_new_table_with_indexes() {
        let mut db = Database::new(Dialect::postgres());
        let (table, id) = users(&mut db);
        let index = db
            .table_mut(table)
            .unwrap()
            .create_index([id], false)
            .unwrap()
            .id();
        let actions = planned(&mut db);
        assert_eq!(
            actions,
            vec![
                PlannedAction::CreateTable { table },
                PlannedAction::CreateIndex { index },
            ]
        );
    }

    #[test]
    fn test_in_place_changes_follow_log_order() {
        let mut db = Database::new(Dialect::postgres());
        let (table, id) = users(&mut db);
        planned(&mut db);

        let email = db
            .table_mut(table)
            .unwrap()
            .create_column("email", DataType::Text)
            .unwrap()
            .id();
        db.column_mut(id).unwrap().set_type(DataType::Bigint).unwrap();
        let check = db
            .table_mut(table)
            .unwrap()
            .create_check(Expr::col(email).is_not_null())
            .unwrap()
            .id();
        let actions = planned(&mut db);
        assert_eq!(
            actions,
            vec![
                PlannedAction::AddColumn { column: email },
                PlannedAction::AlterColumn {
                    column: id,
                    alteration: ColumnAlteration::Type,
                },
                PlannedAction::AddConstraint {
                    constraint: check.id(),
                },
            ]
        );
    }

    #[test]
    fn test_sqlite_rebuilds_once_per_table() {
        let mut db = Database::new(Dialect::sqlite());
        let (table, id) = users(&mut db);
        planned(&mut db);

        let name = db
            .table_mut(table)
            .unwrap()
            .create_column("name", DataType::Text)
            .unwrap()
            .id();
        db.column_mut(name).unwrap().mark_as_nullable(false).unwrap();
        db.column_mut(id).unwrap().set_type(DataType::Bigint).unwrap();
        let actions = planned(&mut db);
        assert_eq!(actions.len(), 1);
        let PlannedAction::RebuildTable(plan) = &actions[0] else {
            panic!("expected a rebuild, got {actions:?}");
        };
        assert_eq!(plan.table, table);
        assert_eq!(plan.copies.len(), 2);
        assert_eq!(plan.copies[0].source.as_deref(), Some("id"));
        assert!(plan.copies[0].cast);
        assert_eq!(plan.copies[1].source, None);
        assert!(plan.copies[1].fallback.is_some());
        assert!(plan.shadow.name.starts_with("users_"));
    }

    #[test]
    fn test_removed_table_drops_dependents_first() {
        let mut db = Database::new(Dialect::postgres());
        let (users, _) = users(&mut db);
        let key = db.table(users).unwrap().primary_key.unwrap();
        let key = db.primary_key(key).unwrap().index;
        let schema = db.default_schema();
        let orders = {
            let mut schema = db.schema_mut(schema).unwrap();
            let mut orders = schema.create_table("orders").unwrap();
            let user = orders.create_column("user_id", DataType::Integer).unwrap().id();
            orders.create_foreign_key_on([user], key).unwrap();
            orders.id()
        };
        planned(&mut db);

        db.table_mut(orders).unwrap().remove().unwrap();
        db.table_mut(users).unwrap().remove().unwrap();
        let actions = planned(&mut db);
        assert_eq!(
            actions,
            vec![
                PlannedAction::DropTable {
                    name: QualifiedName::new("public", "orders"),
                },
                PlannedAction::DropTable {
                    name: QualifiedName::new("public", "users"),
                },
            ]
        );
    }

    #[test]
    fn test_renamed_view_source_recreates_view() {
        let mut db = Database::new(Dialect::postgres());
        let (users, _) = users(&mut db);
        let schema = db.default_schema();
        let view = db
            .schema_mut(schema)
            .unwrap()
            .create_view("active", ViewQuery::new("SELECT * FROM {0}").bind(users))
            .unwrap()
            .id();
        planned(&mut db);

        db.table_mut(users).unwrap().set_name("people").unwrap();
        let actions = planned(&mut db);
        assert_eq!(
            actions,
            vec![
                PlannedAction::DropView {
                    name: QualifiedName::new("public", "active"),
                },
                PlannedAction::RenameTable {
                    from: QualifiedName::new("public", "users"),
                    to: QualifiedName::new("public", "people"),
                },
                PlannedAction::CreateView { view },
            ]
        );
    }
}
