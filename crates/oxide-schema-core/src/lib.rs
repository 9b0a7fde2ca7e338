//! # oxide-schema-core
//!
//! An in-memory model of a relational database schema that records its own
//! changes and plans them into ordered DDL.
//!
//! This crate provides:
//! - Typed handles for building schemas, tables, columns, indexes,
//!   constraints and views, validated on every mutation
//! - A change log folded into net effects at flush time
//! - A planner that picks in-place ALTER statements where the dialect allows
//!   them and shadow-copy table rebuilds where it does not
//! - SQLite and PostgreSQL statement emitters driven by capability profiles
//!
//! ## Building a schema
//!
//! ```rust
//! use oxide_schema_core::{DataType, Database, Dialect};
//!
//! let mut db = Database::new(Dialect::sqlite());
//! let schema = db.default_schema();
//! let mut schema = db.schema_mut(schema).unwrap();
//! let mut users = schema.create_table("users").unwrap();
//! let mut id = users.create_column("id", DataType::Integer).unwrap();
//! id.mark_as_nullable(false).unwrap();
//! let id = id.id();
//! users.set_primary_key([id]).unwrap();
//!
//! let actions = db.pending_actions().unwrap();
//! assert_eq!(actions.len(), 1);
//! assert!(actions[0].sql().starts_with("CREATE TABLE \"users\""));
//! ```
//!
//! ## Baselines
//!
//! Objects built while tracking is detached form the baseline: they are
//! assumed to exist already and produce no actions. Later changes plan
//! against that baseline.
//!
//! ```rust
//! use oxide_schema_core::{CommitMode, DataType, Database, Dialect, TrackingMode};
//!
//! let mut db = Database::new(Dialect::sqlite());
//! db.set_mode(TrackingMode::Detached, CommitMode::Commit).unwrap();
//! let schema = db.default_schema();
//! let table = db
//!     .schema_mut(schema)
//!     .unwrap()
//!     .create_table("t")
//!     .unwrap()
//!     .id();
//! let column = db
//!     .table_mut(table)
//!     .unwrap()
//!     .create_column("a", DataType::Integer)
//!     .unwrap()
//!     .id();
//! db.set_mode(TrackingMode::Attached, CommitMode::Commit).unwrap();
//!
//! db.column_mut(column).unwrap().set_name("b").unwrap();
//! let actions = db.pending_actions().unwrap();
//! assert_eq!(actions[0].sql(), "ALTER TABLE \"t\" RENAME COLUMN \"a\" TO \"b\"");
//! ```

pub mod action;
pub mod builder;
mod catalog;
pub mod changes;
pub mod database;
pub mod dialect;
pub mod error;
pub mod expr;
pub mod graph;
pub mod name;
pub mod object;
mod planner;
pub mod types;

pub use action::{
    ActionCallback, ColumnAlteration, ColumnCopy, PendingAction, PlannedAction, RebuildPlan,
};
pub use builder::{
    CheckMut, ColumnMut, ForeignKeyMut, IndexMut, PrimaryKeyMut, SchemaMut, TableMut, ViewMut,
};
pub use changes::{CommitMode, TrackingMode};
pub use database::Database;
pub use dialect::{
    Capabilities, Dialect, DialectConfig, DialectContext, DialectKind, PostgresEmitter,
    SqliteEmitter, StatementEmitter,
};
pub use error::{ErrorKind, Result, SchemaError};
pub use expr::{BinaryOp, Expr, QueryRef, RenderContext, UnaryOp, ViewQuery};
pub use graph::Role;
pub use name::{validate_identifier, QualifiedName};
pub use object::{
    CheckDef, CheckId, ColumnDef, ColumnId, ForeignKeyDef, ForeignKeyId, IndexColumn, IndexDef,
    IndexId, ObjectId, ObjectType, PrimaryKeyDef, PrimaryKeyId, SchemaDef, SchemaId, TableDef,
    TableId, ViewDef, ViewId,
};
pub use types::{DataType, ForeignKeyAction, SortOrder, SqlValue, TypeFamily};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        ColumnAlteration, CommitMode, DataType, Database, Dialect, Expr, ForeignKeyAction,
        PendingAction, PlannedAction, SchemaError, SortOrder, SqlValue, TrackingMode, ViewQuery,
    };
}
