//! Planned actions and the pending-action queue entries handed to callers.
//!
//! A [`PlannedAction`] is dialect neutral. Objects that still exist when the
//! action runs are referenced by id and rendered with their current names;
//! objects that are gone (or renamed later in the same plan) are referenced by
//! the names they carry at that point of the plan.

use core::fmt;
use std::sync::Arc;

use crate::expr::Expr;
use crate::name::QualifiedName;
use crate::object::{ColumnId, IndexId, ObjectId, TableId, ViewId};
use crate::types::SqlValue;

/// One column of a rebuilt table and where its data comes from.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnCopy {
    /// The target column.
    pub column: ColumnId,
    /// Name of the source column in the original table (`None` for a new column).
    pub source: Option<String>,
    /// Whether the source value must be cast to the new type.
    pub cast: bool,
    /// Value used when the source is NULL or absent.
    pub fallback: Option<Expr>,
}

/// Everything needed to rebuild a table through a shadow copy.
#[derive(Debug, Clone, PartialEq)]
pub struct RebuildPlan {
    /// The table being rebuilt; its current shape is the target shape.
    pub table: TableId,
    /// Name of the shadow table.
    pub shadow: QualifiedName,
    /// Columns populated by the copy step.
    pub copies: Vec<ColumnCopy>,
}

/// A column level alteration executed in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnAlteration {
    /// Change the data type.
    Type,
    /// Change nullability.
    Nullability,
    /// Set or drop the default.
    Default,
}

/// A dialect neutral step of a migration plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedAction {
    /// CREATE SCHEMA.
    CreateSchema {
        /// Schema name.
        name: String,
    },
    /// DROP SCHEMA.
    DropSchema {
        /// Schema name.
        name: String,
    },
    /// Rename a schema.
    RenameSchema {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// CREATE TABLE with its columns and table constraints.
    CreateTable {
        /// The created table.
        table: TableId,
    },
    /// DROP TABLE.
    DropTable {
        /// Name of the dropped table.
        name: QualifiedName,
    },
    /// Rename a table.
    RenameTable {
        /// Current name.
        from: QualifiedName,
        /// New name.
        to: QualifiedName,
    },
    /// Shadow-copy rebuild of a table.
    RebuildTable(RebuildPlan),
    /// ALTER TABLE ADD COLUMN.
    AddColumn {
        /// The added column.
        column: ColumnId,
    },
    /// ALTER TABLE DROP COLUMN.
    DropColumn {
        /// Owning table.
        table: QualifiedName,
        /// Column name.
        name: String,
    },
    /// ALTER TABLE RENAME COLUMN.
    RenameColumn {
        /// Owning table.
        table: TableId,
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// ALTER TABLE ALTER COLUMN.
    AlterColumn {
        /// The altered column.
        column: ColumnId,
        /// What changes.
        alteration: ColumnAlteration,
    },
    /// CREATE INDEX.
    CreateIndex {
        /// The created index.
        index: IndexId,
    },
    /// DROP INDEX.
    DropIndex {
        /// Index name, qualified by its schema.
        name: QualifiedName,
    },
    /// Rename an index.
    RenameIndex {
        /// Current name.
        from: QualifiedName,
        /// New name.
        to: QualifiedName,
    },
    /// ALTER TABLE ADD CONSTRAINT for a primary key, foreign key or check.
    AddConstraint {
        /// The constraint.
        constraint: ObjectId,
    },
    /// ALTER TABLE DROP CONSTRAINT.
    DropConstraint {
        /// Owning table.
        table: QualifiedName,
        /// Constraint name.
        name: String,
    },
    /// ALTER TABLE RENAME CONSTRAINT.
    RenameConstraint {
        /// Owning table.
        table: TableId,
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// CREATE VIEW.
    CreateView {
        /// The created view.
        view: ViewId,
    },
    /// DROP VIEW.
    DropView {
        /// Name of the dropped view.
        name: QualifiedName,
    },
    /// A caller supplied statement.
    RawSql {
        /// Statement text.
        sql: String,
        /// Bound parameters.
        params: Vec<SqlValue>,
    },
}

impl PlannedAction {
    /// Returns a short label for logging.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::CreateSchema { .. } => "create_schema",
            Self::DropSchema { .. } => "drop_schema",
            Self::RenameSchema { .. } => "rename_schema",
            Self::CreateTable { .. } => "create_table",
            Self::DropTable { .. } => "drop_table",
            Self::RenameTable { .. } => "rename_table",
            Self::RebuildTable(_) => "rebuild_table",
            Self::AddColumn { .. } => "add_column",
            Self::DropColumn { .. } => "drop_column",
            Self::RenameColumn { .. } => "rename_column",
            Self::AlterColumn { .. } => "alter_column",
            Self::CreateIndex { .. } => "create_index",
            Self::DropIndex { .. } => "drop_index",
            Self::RenameIndex { .. } => "rename_index",
            Self::AddConstraint { .. } => "add_constraint",
            Self::DropConstraint { .. } => "drop_constraint",
            Self::RenameConstraint { .. } => "rename_constraint",
            Self::CreateView { .. } => "create_view",
            Self::DropView { .. } => "drop_view",
            Self::RawSql { .. } => "raw_sql",
        }
    }
}

/// Callback run around the execution of a pending action.
#[derive(Clone)]
pub struct ActionCallback(Arc<dyn Fn() + Send + Sync>);

impl ActionCallback {
    /// Wraps a closure.
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invokes the callback.
    pub fn call(&self) {
        (self.0)();
    }
}

impl fmt::Debug for ActionCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActionCallback(..)")
    }
}

/// A planned action together with the SQL rendered for it.
#[derive(Debug, Clone)]
pub struct PendingAction {
    /// The neutral action.
    pub action: PlannedAction,
    /// Rendered statements, in execution order.
    pub statements: Vec<String>,
    /// Parameters of a parameterized raw statement.
    pub params: Vec<SqlValue>,
    /// Run before the statements execute.
    pub before: Option<ActionCallback>,
    /// Run after the statements execute.
    pub after: Option<ActionCallback>,
}

impl PendingAction {
    pub(crate) fn new(action: PlannedAction, statements: Vec<String>) -> Self {
        let params = match &action {
            PlannedAction::RawSql { params, .. } => params.clone(),
            _ => Vec::new(),
        };
        Self {
            action,
            statements,
            params,
            before: None,
            after: None,
        }
    }

    /// Returns all statements joined into one script.
    #[must_use]
    pub fn sql(&self) -> String {
        self.statements.join(";\n")
    }
}
