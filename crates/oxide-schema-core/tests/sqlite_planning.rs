//! Planning against the SQLite profile: table rebuilds, emulated schemas and
//! rename cycles.

mod common;

use common::{actions, add_column, attach, baseline, flush, keyed_table, labels, statements};
use oxide_schema_core::{
    DataType, Database, Dialect, Expr, PlannedAction, QualifiedName, RebuildPlan, ViewQuery,
};

fn rebuild_of(action: &PlannedAction) -> &RebuildPlan {
    match action {
        PlannedAction::RebuildTable(plan) => plan,
        other => panic!("Expected a rebuild, got {other:?}"),
    }
}

#[test]
fn new_table_then_not_null_rebuild() {
    let mut db = Database::new(Dialect::sqlite());
    let schema = db.default_schema();
    let (table, _, _) = keyed_table(&mut db, schema, "T");
    let c2 = add_column(&mut db, table, "C2", DataType::Text);

    let pending = flush(&mut db);
    assert_eq!(labels(&pending), vec!["create_table"]);
    assert_eq!(
        pending[0].sql(),
        "CREATE TABLE \"T\" (\n    \"id\" INTEGER NOT NULL,\n    \"C2\" TEXT,\n    \
         CONSTRAINT \"PK_T\" PRIMARY KEY (\"id\")\n)"
    );

    db.column_mut(c2).unwrap().mark_as_nullable(false).unwrap();
    let pending = flush(&mut db);
    assert_eq!(pending.len(), 1);
    let plan = rebuild_of(&pending[0].action);
    assert_eq!(plan.table, table);
    assert!(plan.copies[1].fallback.is_some());

    let shadow = &plan.shadow.name;
    assert_eq!(
        pending[0].statements,
        vec![
            format!(
                "CREATE TABLE \"{shadow}\" (\n    \"id\" INTEGER NOT NULL,\n    \
                 \"C2\" TEXT NOT NULL,\n    CONSTRAINT \"PK_T\" PRIMARY KEY (\"id\")\n)"
            ),
            format!(
                "INSERT INTO \"{shadow}\" (\"id\", \"C2\") SELECT \"id\", COALESCE(\"C2\", '') FROM \"T\""
            ),
            String::from("DROP TABLE \"T\""),
            format!("ALTER TABLE \"{shadow}\" RENAME TO \"T\""),
        ]
    );
}

#[test]
fn many_changes_on_one_table_rebuild_once() {
    let mut db = baseline(Dialect::sqlite());
    let schema = db.default_schema();
    let (table, id, _) = keyed_table(&mut db, schema, "items");
    let price = add_column(&mut db, table, "price", DataType::Integer);
    let label = add_column(&mut db, table, "label", DataType::Text);
    add_column(&mut db, table, "legacy", DataType::Text);
    attach(&mut db);

    db.column_mut(price).unwrap().set_type(DataType::Double).unwrap();
    db.column_mut(label)
        .unwrap()
        .set_default_value(Some(Expr::lit("n/a")))
        .unwrap()
        .mark_as_nullable(false)
        .unwrap();
    db.table_mut(table).unwrap().remove_column("legacy").unwrap();
    db.table_mut(table)
        .unwrap()
        .create_check(Expr::col(price).gt_eq(Expr::lit(0)))
        .unwrap();
    db.column_mut(id).unwrap().set_name("item_id").unwrap();
    let stock = add_column(&mut db, table, "stock", DataType::Integer);

    let pending = flush(&mut db);
    assert_eq!(pending.len(), 1);
    let plan = rebuild_of(&pending[0].action);
    let sources: Vec<_> = plan
        .copies
        .iter()
        .map(|c| (c.column, c.source.as_deref(), c.cast))
        .collect();
    assert_eq!(
        sources,
        vec![
            (id, Some("id"), false),
            (price, Some("price"), true),
            (label, Some("label"), false),
        ]
    );
    assert!(plan.copies.iter().all(|c| c.column != stock));
    assert!(pending[0].statements[1].contains("COALESCE(\"label\", 'n/a')"));
    assert!(pending[0].statements[1].contains("CAST(\"price\" AS REAL)"));
}

#[test]
fn nullable_added_column_is_added_in_place() {
    let mut db = baseline(Dialect::sqlite());
    let schema = db.default_schema();
    let (table, _, _) = keyed_table(&mut db, schema, "t");
    attach(&mut db);

    let note = add_column(&mut db, table, "note", DataType::Text);
    let pending = flush(&mut db);
    assert_eq!(actions(&pending), vec![PlannedAction::AddColumn { column: note }]);
    assert_eq!(pending[0].sql(), "ALTER TABLE \"t\" ADD COLUMN \"note\" TEXT");
}

#[test]
fn column_rename_cycle_uses_one_temporary_name() {
    let mut db = baseline(Dialect::sqlite());
    let schema = db.default_schema();
    let (table, _, _) = keyed_table(&mut db, schema, "t");
    let a = add_column(&mut db, table, "A", DataType::Integer);
    let b = add_column(&mut db, table, "B", DataType::Integer);
    let c = add_column(&mut db, table, "C", DataType::Integer);
    attach(&mut db);

    // A->B, B->C, C->A, reached through a scratch name in the model.
    db.column_mut(c).unwrap().set_name("scratch").unwrap();
    db.column_mut(b).unwrap().set_name("C").unwrap();
    db.column_mut(a).unwrap().set_name("B").unwrap();
    db.column_mut(c).unwrap().set_name("A").unwrap();

    let pending = flush(&mut db);
    let renames: Vec<(String, String)> = actions(&pending)
        .into_iter()
        .map(|action| match action {
            PlannedAction::RenameColumn { table: t, from, to } => {
                assert_eq!(t, table);
                (from, to)
            }
            other => panic!("Expected a column rename, got {other:?}"),
        })
        .collect();
    assert_eq!(renames.len(), 4);

    let final_names = ["A", "B", "C"];
    let temporaries: Vec<&String> = renames
        .iter()
        .map(|(_, to)| to)
        .filter(|to| !final_names.contains(&to.as_str()))
        .collect();
    assert_eq!(temporaries.len(), 1);
    assert!(temporaries[0].starts_with("A_"));

    // Replaying the steps never collides and ends at the requested names.
    let mut names = vec![String::from("A"), String::from("B"), String::from("C")];
    for (from, to) in &renames {
        assert!(!names.contains(to), "{to} is still taken");
        let slot = names.iter().position(|n| n == from).unwrap();
        names[slot] = to.clone();
    }
    assert_eq!(names, vec!["B", "C", "A"]);
    assert_eq!(db.name(a).unwrap(), "B");
}

#[test]
fn schema_rename_renames_owned_tables_and_rebuilds_referencing_tables() {
    let mut db = baseline(Dialect::sqlite());
    let foo = db.create_schema("foo").unwrap().id();
    let (_, _, key) = keyed_table(&mut db, foo, "t");
    keyed_table(&mut db, foo, "u");
    let main = db.default_schema();
    let (referencing, _, _) = keyed_table(&mut db, main, "d");
    let t_id = add_column(&mut db, referencing, "t_id", DataType::Integer);
    db.table_mut(referencing)
        .unwrap()
        .create_foreign_key_on([t_id], key)
        .unwrap();
    keyed_table(&mut db, main, "unrelated");
    let other = db.create_schema("other").unwrap().id();
    keyed_table(&mut db, other, "x");
    attach(&mut db);

    db.schema_mut(foo).unwrap().set_name("bar").unwrap();
    let pending = flush(&mut db);
    let planned = actions(&pending);
    assert_eq!(planned.len(), 3, "{planned:?}");

    let mut renamed: Vec<_> = planned[..2]
        .iter()
        .map(|action| match action {
            PlannedAction::RenameTable { from, to } => (from.flattened(), to.flattened()),
            other => panic!("Expected a table rename, got {other:?}"),
        })
        .collect();
    renamed.sort();
    assert_eq!(
        renamed,
        vec![
            (String::from("foo.t"), String::from("bar.t")),
            (String::from("foo.u"), String::from("bar.u")),
        ]
    );
    assert_eq!(rebuild_of(&planned[2]).table, referencing);

    let sql = statements(&pending);
    assert!(sql.contains(&String::from("ALTER TABLE \"foo.t\" RENAME TO \"bar.t\"")));
    assert!(sql[2].contains("REFERENCES \"bar.t\" (\"id\")"));
    assert!(sql.iter().all(|s| !s.contains("unrelated") && !s.contains("\"other.x\"")));
}

#[test]
fn index_rename_drops_and_recreates() {
    let mut db = baseline(Dialect::sqlite());
    let schema = db.default_schema();
    let (table, _, _) = keyed_table(&mut db, schema, "t");
    let a = add_column(&mut db, table, "a", DataType::Text);
    let index = db
        .table_mut(table)
        .unwrap()
        .create_index([a], false)
        .unwrap()
        .id();
    attach(&mut db);

    db.index_mut(index).unwrap().set_name("t_by_a").unwrap();
    let pending = flush(&mut db);
    assert_eq!(
        actions(&pending),
        vec![
            PlannedAction::DropIndex {
                name: QualifiedName::new("", "IX_t_a"),
            },
            PlannedAction::CreateIndex { index },
        ]
    );
    assert_eq!(
        statements(&pending),
        vec![
            "DROP INDEX \"IX_t_a\"",
            "CREATE INDEX \"t_by_a\" ON \"t\" (\"a\")",
        ]
    );
}

#[test]
fn rebuilt_table_recreates_views_and_indexes() {
    let mut db = baseline(Dialect::sqlite());
    let schema = db.default_schema();
    let (table, _, _) = keyed_table(&mut db, schema, "t");
    let a = add_column(&mut db, table, "a", DataType::Integer);
    let index = db
        .table_mut(table)
        .unwrap()
        .create_index([a], true)
        .unwrap()
        .id();
    let view = db
        .schema_mut(schema)
        .unwrap()
        .create_view("v", ViewQuery::new("SELECT {0} FROM {1}").bind(a).bind(table))
        .unwrap()
        .id();
    attach(&mut db);

    db.column_mut(a).unwrap().set_default_value(Some(Expr::lit(1))).unwrap();
    let pending = flush(&mut db);
    assert_eq!(
        labels(&pending),
        vec!["drop_view", "rebuild_table", "create_index", "create_view"]
    );
    assert_eq!(pending[2].action, PlannedAction::CreateIndex { index });
    assert_eq!(pending[3].action, PlannedAction::CreateView { view });
    assert_eq!(
        pending[3].sql(),
        "CREATE VIEW \"v\" AS SELECT \"t\".\"a\" FROM \"t\""
    );
}

#[test]
fn removed_table_and_created_table_in_one_flush() {
    let mut db = baseline(Dialect::sqlite());
    let schema = db.default_schema();
    let (old, _, _) = keyed_table(&mut db, schema, "old");
    attach(&mut db);

    db.table_mut(old).unwrap().remove().unwrap();
    let (new, _, _) = keyed_table(&mut db, schema, "old");
    let pending = flush(&mut db);
    assert_eq!(
        actions(&pending),
        vec![
            PlannedAction::DropTable {
                name: QualifiedName::new("", "old"),
            },
            PlannedAction::CreateTable { table: new },
        ]
    );
}

#[test]
fn replaced_primary_key_rebuilds_once() {
    let mut db = baseline(Dialect::sqlite());
    let schema = db.default_schema();
    let (table, _, _) = keyed_table(&mut db, schema, "t");
    let b = add_column(&mut db, table, "b", DataType::Integer);
    db.column_mut(b).unwrap().mark_as_nullable(false).unwrap();
    attach(&mut db);

    db.table_mut(table).unwrap().set_primary_key([b]).unwrap();

    let pending = flush(&mut db);
    assert_eq!(labels(&pending), vec!["rebuild_table"]);
    let create = &pending[0].statements[0];
    assert!(create.contains("CONSTRAINT \"PK_t\" PRIMARY KEY (\"b\")"), "{create}");
    assert!(!create.contains("PRIMARY KEY (\"id\")"), "{create}");
}
