//! Script files replayed through the library entry points and the binary.

mod common;

use std::process::Command;

use common::{script, write_file, USERS_BASELINE};
use oxide_schema::{load_dialect, plan_file, ScriptError};
use oxide_schema_core::{Dialect, DialectKind, SchemaError};

#[test]
fn sqlite_column_rename() {
    let (_dir, path) = write_file(
        "rename.json",
        &script(
            USERS_BASELINE,
            r#"[ { "op": "rename_column", "table": "users", "column": "email", "to": "mail" } ]"#,
        ),
    );
    let sql = plan_file(&path, Dialect::sqlite()).unwrap();
    assert_eq!(
        sql,
        "-- rename_column\nALTER TABLE \"users\" RENAME COLUMN \"email\" TO \"mail\";\n"
    );
}

#[test]
fn sqlite_not_null_rebuilds_table() {
    let (_dir, path) = write_file(
        "not_null.json",
        &script(
            USERS_BASELINE,
            r#"[ { "op": "set_nullable", "table": "users", "column": "email", "nullable": false } ]"#,
        ),
    );
    let sql = plan_file(&path, Dialect::sqlite()).unwrap();
    assert!(sql.starts_with("-- rebuild_table\nCREATE TABLE \"users_"), "{sql}");
    assert!(sql.contains("SELECT \"id\", COALESCE(\"email\", '') FROM \"users\";\n"), "{sql}");
    assert!(sql.contains("DROP TABLE \"users\";\n"), "{sql}");
    assert!(sql.ends_with("RENAME TO \"users\";\n"), "{sql}");
}

#[test]
fn postgres_added_column_and_index() {
    let (_dir, path) = write_file(
        "add.json",
        &script(
            USERS_BASELINE,
            r#"[
                { "op": "add_column", "table": "users", "column": "note", "type": "text",
                  "default": { "literal": { "text": "n/a" } } },
                { "op": "create_index", "table": "users", "columns": ["note"] }
            ]"#,
        ),
    );
    let dialect = load_dialect(DialectKind::Postgres, None).unwrap();
    let sql = plan_file(&path, dialect).unwrap();
    assert_eq!(
        sql,
        "-- add_column\n\
         ALTER TABLE \"public\".\"users\" ADD COLUMN \"note\" TEXT DEFAULT 'n/a';\n\
         -- create_index\n\
         CREATE INDEX \"IX_users_note\" ON \"public\".\"users\" (\"note\");\n"
    );
}

#[test]
fn postgres_schema_rename_recreates_views() {
    let (_dir, path) = write_file(
        "schema.json",
        &script(
            r#"[
                { "op": "create_schema", "name": "sales" },
                { "op": "create_table", "schema": "sales", "table": "orders" },
                { "op": "add_column", "schema": "sales", "table": "orders", "column": "id",
                  "type": "bigint", "nullable": false },
                { "op": "create_view", "schema": "sales", "view": "recent", "query": {
                    "template": "SELECT * FROM {0}",
                    "bind": [ { "kind": "table", "schema": "sales", "table": "orders" } ] } }
            ]"#,
            r#"[ { "op": "rename_schema", "schema": "sales", "to": "shop" } ]"#,
        ),
    );
    let sql = plan_file(&path, Dialect::postgres()).unwrap();
    assert_eq!(
        sql,
        "-- drop_view\nDROP VIEW \"sales\".\"recent\";\n\
         -- rename_schema\nALTER SCHEMA \"sales\" RENAME TO \"shop\";\n\
         -- create_view\nCREATE VIEW \"shop\".\"recent\" AS SELECT * FROM \"shop\".\"orders\";\n"
    );
}

#[test]
fn dialect_config_overrides_capabilities() {
    let (_config_dir, config) = write_file(
        "dialect.json",
        r#"{ "kind": "sqlite", "capabilities": { "drop_column": true } }"#,
    );
    let (_dir, path) = write_file(
        "drop.json",
        &script(
            USERS_BASELINE,
            r#"[ { "op": "remove_column", "table": "users", "column": "email" } ]"#,
        ),
    );

    let dialect = load_dialect(DialectKind::Postgres, Some(&config)).unwrap();
    assert_eq!(dialect.kind(), DialectKind::Sqlite);
    assert!(dialect.capabilities().drop_column);
    let sql = plan_file(&path, dialect).unwrap();
    assert_eq!(sql, "-- drop_column\nALTER TABLE \"users\" DROP COLUMN \"email\";\n");
}

#[test]
fn invalid_dialect_config_is_rejected() {
    let (_dir, config) = write_file(
        "dialect.json",
        r#"{ "kind": "sqlite", "capabilities": { "time_travel": true } }"#,
    );
    let err = load_dialect(DialectKind::Sqlite, Some(&config)).unwrap_err();
    assert!(matches!(err, ScriptError::Schema(SchemaError::Config(_))), "{err:?}");
}

#[test]
fn missing_script_reports_path() {
    let (dir, _) = write_file("present.json", "{}");
    let missing = dir.path().join("absent.json");
    let err = plan_file(&missing, Dialect::sqlite()).unwrap_err();
    assert!(matches!(err, ScriptError::Io { .. }));
    assert!(err.to_string().contains("absent.json"));
}

#[test]
fn rejected_step_names_its_position() {
    let (_dir, path) = write_file(
        "bad.json",
        &script(
            USERS_BASELINE,
            r#"[
                { "op": "rename_table", "table": "users", "to": "people" },
                { "op": "rename_table", "table": "users", "to": "members" }
            ]"#,
        ),
    );
    let err = plan_file(&path, Dialect::sqlite()).unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("Step 2 (rename_table) failed"), "{message}");
    assert!(message.contains("Table 'users' not found"), "{message}");
}

#[test]
fn binary_prints_planned_sql() {
    let (_dir, path) = write_file(
        "cli.json",
        &script(
            USERS_BASELINE,
            r#"[ { "op": "rename_table", "table": "users", "to": "people" } ]"#,
        ),
    );
    let output = Command::new(env!("CARGO_BIN_EXE_oxide-schema"))
        .args(["--dialect", "postgres", "plan"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        "-- rename_table\nALTER TABLE \"public\".\"users\" RENAME TO \"people\";\n"
    );
}

#[test]
fn binary_fails_on_invalid_script() {
    let (_dir, path) = write_file("broken.json", r#"{ "changes": [ { "op": "explode" } ] }"#);
    let output = Command::new(env!("CARGO_BIN_EXE_oxide-schema"))
        .arg("plan")
        .arg(&path)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}
