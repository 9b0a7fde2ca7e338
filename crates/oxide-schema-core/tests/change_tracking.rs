//! Change log behavior: no-op renames, identity collapse, cancellation and
//! tracking modes.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{add_column, attach, baseline, flush, keyed_table, labels};
use oxide_schema_core::{
    ActionCallback, Capabilities, ColumnId, CommitMode, DataType, Database, Dialect, DialectKind,
    ErrorKind, Expr, TableId, TrackingMode,
};

fn users_baseline() -> (Database, TableId, ColumnId) {
    let mut db = baseline(Dialect::sqlite());
    let schema = db.default_schema();
    let (users, _, _) = keyed_table(&mut db, schema, "users");
    let email = add_column(&mut db, users, "email", DataType::Text);
    attach(&mut db);
    (db, users, email)
}

#[test]
fn rename_to_current_name_is_noop() {
    let (mut db, users, email) = users_baseline();
    db.table_mut(users).unwrap().set_name("users").unwrap();
    db.column_mut(email).unwrap().set_name("email").unwrap();
    assert!(!db.has_pending_changes());
    assert!(flush(&mut db).is_empty());
}

#[test]
fn mutation_and_inverse_collapse() {
    let (mut db, users, email) = users_baseline();
    db.table_mut(users).unwrap().set_name("people").unwrap();
    db.table_mut(users).unwrap().set_name("users").unwrap();

    let mut column = db.column_mut(email).unwrap();
    column
        .set_type(DataType::Varchar(Some(120)))
        .unwrap()
        .mark_as_nullable(false)
        .unwrap()
        .set_default_value(Some(Expr::lit("none")))
        .unwrap();
    column
        .set_default_value(None)
        .unwrap()
        .mark_as_nullable(true)
        .unwrap()
        .set_type(DataType::Text)
        .unwrap();

    assert!(db.has_pending_changes());
    assert!(flush(&mut db).is_empty());
}

#[test]
fn create_then_remove_cancels() {
    let (mut db, _, _) = users_baseline();
    let schema = db.default_schema();
    let (audit, _, _) = keyed_table(&mut db, schema, "audit");
    db.table_mut(audit).unwrap().remove().unwrap();

    assert!(db.is_removed(audit).unwrap());
    assert!(!db.schema_mut(schema).unwrap().contains_table("audit"));
    assert!(flush(&mut db).is_empty());
}

#[test]
fn created_and_removed_column_leaves_no_trace() {
    let (mut db, users, _) = users_baseline();
    let note = add_column(&mut db, users, "note", DataType::Text);
    db.column_mut(note).unwrap().set_name("remark").unwrap();
    assert!(db.table_mut(users).unwrap().remove_column("remark").unwrap());
    assert!(db.is_removed(note).unwrap());
    assert!(!db.table(users).unwrap().columns.contains(&note));
    assert!(flush(&mut db).is_empty());
}

#[test]
fn failed_mutation_records_nothing() {
    let (mut db, users, email) = users_baseline();
    let err = db
        .table_mut(users)
        .unwrap()
        .create_column("EMAIL", DataType::Text)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateName);

    let id = db.table_mut(users).unwrap().get_column("id").unwrap();
    let err = db
        .column_mut(id)
        .unwrap()
        .set_default_value(Some(Expr::lit("abc")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeIncompatibility);
    assert_eq!(db.column(id).unwrap().default, None);

    let err = db.column_mut(id).unwrap().set_type(DataType::Blob).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeIncompatibility);
    assert_eq!(db.column(email).unwrap().data_type, DataType::Text);
    assert!(!db.has_pending_changes());
}

#[test]
fn no_changes_mode_validates_without_planning() {
    let (mut db, users, _) = users_baseline();
    db.set_mode(TrackingMode::Attached, CommitMode::NoChanges)
        .unwrap();
    add_column(&mut db, users, "note", DataType::Text);
    let err = db
        .table_mut(users)
        .unwrap()
        .create_column("bad\"name", DataType::Text)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidName);
    assert!(flush(&mut db).is_empty());
}

#[test]
fn flush_rejects_table_without_columns_and_keeps_log() {
    let mut db = Database::new(Dialect::sqlite());
    let schema = db.default_schema();
    let table = db
        .schema_mut(schema)
        .unwrap()
        .create_table("empty")
        .unwrap()
        .id();
    let err = db.pending_actions().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert!(db.has_pending_changes());

    add_column(&mut db, table, "a", DataType::Integer);
    assert_eq!(labels(&flush(&mut db)), vec!["create_table"]);
}

#[test]
fn primary_key_required_when_dialect_demands_it() {
    let mut capabilities = Capabilities::sqlite();
    capabilities.requires_primary_key = true;
    let mut db = Database::new(Dialect::new(DialectKind::Sqlite, capabilities));
    let schema = db.default_schema();
    let table = db
        .schema_mut(schema)
        .unwrap()
        .create_table("t")
        .unwrap()
        .id();
    add_column(&mut db, table, "a", DataType::Integer);
    let err = db.pending_actions().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert!(err.to_string().contains("primary key"));
}

#[test]
fn raw_statements_keep_their_position() {
    let mut db = Database::new(Dialect::sqlite());
    let schema = db.default_schema();
    keyed_table(&mut db, schema, "a");
    db.add_statement("INSERT INTO \"a\" (\"id\") VALUES (1)")
        .unwrap();
    keyed_table(&mut db, schema, "b");

    let pending = flush(&mut db);
    assert_eq!(labels(&pending), vec!["create_table", "raw_sql", "create_table"]);
}

#[test]
fn statement_callbacks_are_attached() {
    let mut db = Database::new(Dialect::sqlite());
    let counter = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&counter);
    db.add_statement_with_callbacks(
        "VACUUM",
        None,
        Some(ActionCallback::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        })),
    )
    .unwrap();

    let pending = flush(&mut db);
    assert!(pending[0].before.is_none());
    pending[0].after.as_ref().unwrap().call();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn detaching_plans_logged_changes() {
    let mut db = Database::new(Dialect::sqlite());
    let schema = db.default_schema();
    keyed_table(&mut db, schema, "a");
    db.set_mode(TrackingMode::Detached, CommitMode::Commit)
        .unwrap();
    keyed_table(&mut db, schema, "b");

    let pending = flush(&mut db);
    assert_eq!(labels(&pending), vec!["create_table"]);
    assert!(pending[0].sql().contains("\"a\""));
}
