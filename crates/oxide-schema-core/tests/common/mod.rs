#![allow(dead_code)]

use oxide_schema_core::{
    ColumnId, CommitMode, DataType, Database, Dialect, IndexId, PendingAction, PlannedAction,
    SchemaId, TableId, TrackingMode,
};

/// Creates a database whose objects form the baseline until [`attach`].
pub fn baseline(dialect: Dialect) -> Database {
    let mut db = Database::new(dialect);
    db.set_mode(TrackingMode::Detached, CommitMode::Commit)
        .unwrap();
    db
}

/// Starts tracking changes against everything built so far.
pub fn attach(db: &mut Database) {
    db.set_mode(TrackingMode::Attached, CommitMode::Commit)
        .unwrap();
}

pub fn flush(db: &mut Database) -> Vec<PendingAction> {
    db.pending_actions()
        .unwrap_or_else(|e| panic!("Flush failed: {e}"))
}

pub fn actions(pending: &[PendingAction]) -> Vec<PlannedAction> {
    pending.iter().map(|p| p.action.clone()).collect()
}

pub fn labels(pending: &[PendingAction]) -> Vec<&'static str> {
    pending.iter().map(|p| p.action.label()).collect()
}

pub fn statements(pending: &[PendingAction]) -> Vec<String> {
    pending
        .iter()
        .flat_map(|p| p.statements.iter().cloned())
        .collect()
}

/// Creates `name` with a NOT NULL integer `id` primary key. Returns the
/// table, the key column and the index backing the key.
pub fn keyed_table(db: &mut Database, schema: SchemaId, name: &str) -> (TableId, ColumnId, IndexId) {
    let mut schema = db.schema_mut(schema).unwrap();
    let mut table = schema.create_table(name).unwrap();
    let mut id = table.create_column("id", DataType::Integer).unwrap();
    id.mark_as_nullable(false).unwrap();
    let id = id.id();
    let key = table.set_primary_key([id]).unwrap().index().unwrap();
    (table.id(), id, key)
}

/// Adds a nullable column.
pub fn add_column(db: &mut Database, table: TableId, name: &str, data_type: DataType) -> ColumnId {
    db.table_mut(table)
        .unwrap()
        .create_column(name, data_type)
        .unwrap()
        .id()
}
