//! Cascading removal and the guard against removing referenced objects.

mod common;

use common::{add_column, attach, baseline, flush, keyed_table, labels, statements};
use oxide_schema_core::{DataType, Database, Dialect, ErrorKind, Expr, ViewQuery};

#[test]
fn removing_table_removes_everything_it_owns() {
    let mut db = Database::new(Dialect::postgres());
    let schema = db.default_schema();
    let (parent, _, parent_key) = keyed_table(&mut db, schema, "parent");
    let (child, child_id, _) = keyed_table(&mut db, schema, "child");
    let parent_id = add_column(&mut db, child, "parent_id", DataType::Integer);

    let mut table = db.table_mut(child).unwrap();
    let index = table.create_index([parent_id], false).unwrap().id();
    let fk = table
        .create_foreign_key_on([parent_id], parent_key)
        .unwrap()
        .id();
    let check = table
        .create_check(Expr::col(child_id).gt(Expr::lit(0)))
        .unwrap()
        .id();
    let pk = db.table(child).unwrap().primary_key.unwrap();
    let fk_origin = db.foreign_key(fk).unwrap().origin;

    db.table_mut(child).unwrap().remove().unwrap();

    for id in [
        child.id(),
        child_id.id(),
        parent_id.id(),
        index.id(),
        fk.id(),
        fk_origin.id(),
        check.id(),
        pk.id(),
    ] {
        assert!(db.is_removed(id).unwrap(), "{id} should be removed");
    }
    assert!(!db
        .referencing_objects(parent_key)
        .unwrap()
        .contains(&fk.id()));
    assert!(!db.is_removed(parent).unwrap());

    // Every name is free again.
    let mut schema_handle = db.schema_mut(schema).unwrap();
    assert!(!schema_handle.contains_table("child"));
    let mut again = schema_handle.create_table("child").unwrap();
    let column = again.create_column("parent_id", DataType::Integer).unwrap().id();
    let index = again.create_index([column], false).unwrap().id();
    assert_eq!(db.name(index).unwrap(), "IX_child_parent_id");
    assert_eq!(db.name(db.table(parent).unwrap().primary_key.unwrap()).unwrap(), "PK_parent");
}

#[test]
fn removed_objects_stay_inspectable_but_frozen() {
    let mut db = Database::new(Dialect::sqlite());
    let schema = db.default_schema();
    let (table, _, _) = keyed_table(&mut db, schema, "t");
    let note = add_column(&mut db, table, "note", DataType::Text);
    assert!(db.table_mut(table).unwrap().remove_column("note").unwrap());
    assert!(!db.table_mut(table).unwrap().remove_column("note").unwrap());

    assert_eq!(db.name(note).unwrap(), "note");
    assert_eq!(db.table_of(note).unwrap(), table);
    let err = db.column_mut(note).unwrap().set_name("other").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ObjectRemoved);
    let err = db.column_mut(note).unwrap().remove().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ObjectRemoved);
}

#[test]
fn column_removal_guarded_by_index_check_and_view() {
    let mut db = Database::new(Dialect::postgres());
    let schema = db.default_schema();
    let (table, _, _) = keyed_table(&mut db, schema, "accounts");
    let email = add_column(&mut db, table, "email", DataType::Text);

    let index = db
        .table_mut(table)
        .unwrap()
        .create_index([email], true)
        .unwrap()
        .id();
    let check = db
        .table_mut(table)
        .unwrap()
        .create_check(Expr::col(email).is_not_null())
        .unwrap()
        .id();
    let view = db
        .schema_mut(schema)
        .unwrap()
        .create_view("emails", ViewQuery::new("SELECT {0} FROM {1}").bind(email).bind(table))
        .unwrap()
        .id();

    let err = db.table_mut(table).unwrap().remove_column("email").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    let message = err.to_string();
    assert!(message.contains("Index"), "{message}");
    assert!(message.contains("Check"), "{message}");
    assert!(message.contains("View"), "{message}");
    assert!(!db.is_removed(email).unwrap());

    db.index_mut(index).unwrap().remove().unwrap();
    db.check_mut(check).unwrap().remove().unwrap();
    assert!(db.table_mut(table).unwrap().remove_column("email").is_err());
    db.view_mut(view).unwrap().remove().unwrap();
    assert!(db.table_mut(table).unwrap().remove_column("email").unwrap());
}

#[test]
fn referenced_table_removal_is_rejected_atomically() {
    let mut db = Database::new(Dialect::postgres());
    let schema = db.default_schema();
    let (users, _, users_key) = keyed_table(&mut db, schema, "users");
    let (orders, _, _) = keyed_table(&mut db, schema, "orders");
    let user_id = add_column(&mut db, orders, "user_id", DataType::Integer);
    db.table_mut(orders)
        .unwrap()
        .create_foreign_key_on([user_id], users_key)
        .unwrap();

    let err = db.table_mut(users).unwrap().remove().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert!(!db.is_removed(users).unwrap());
    assert!(!db.is_removed(users_key).unwrap());
    assert!(db.schema_mut(schema).unwrap().contains_table("users"));
}

#[test]
fn schema_removal_cascades_and_plans_drops() {
    let mut db = baseline(Dialect::postgres());
    let sales = db.create_schema("sales").unwrap().id();
    let (orders, _, _) = keyed_table(&mut db, sales, "orders");
    db.schema_mut(sales)
        .unwrap()
        .create_view("recent", ViewQuery::new("SELECT * FROM {0}").bind(orders))
        .unwrap();
    attach(&mut db);

    let err = db.remove_schema("public").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert!(!db.remove_schema("missing").unwrap());
    assert!(db.remove_schema("sales").unwrap());
    assert!(db.is_removed(orders).unwrap());
    assert!(!db.contains_schema("sales"));

    let pending = flush(&mut db);
    assert_eq!(labels(&pending), vec!["drop_view", "drop_table", "drop_schema"]);
    assert_eq!(
        statements(&pending),
        vec![
            "DROP VIEW \"sales\".\"recent\"",
            "DROP TABLE \"sales\".\"orders\"",
            "DROP SCHEMA \"sales\"",
        ]
    );
}
