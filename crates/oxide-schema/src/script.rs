//! The JSON change-script model.
//!
//! A script has two step lists. `baseline` steps describe the schema as it
//! already exists and are applied with tracking detached. `changes` steps are
//! tracked and planned into migration statements.
//!
//! ```json
//! {
//!   "baseline": [
//!     { "op": "create_table", "table": "users" },
//!     { "op": "add_column", "table": "users", "column": "id",
//!       "type": "integer", "nullable": false },
//!     { "op": "set_primary_key", "table": "users", "columns": ["id"] }
//!   ],
//!   "changes": [
//!     { "op": "add_column", "table": "users", "column": "email", "type": "text" }
//!   ]
//! }
//! ```
//!
//! Objects are named, never numbered. `schema` is optional everywhere and
//! defaults to the dialect's default schema.

use std::path::Path;

use oxide_schema_core::{BinaryOp, DataType, ForeignKeyAction, SqlValue, UnaryOp};
use serde::Deserialize;

use crate::error::{Result, ScriptError};

/// A complete change script.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Steps building the existing schema.
    #[serde(default)]
    pub baseline: Vec<Step>,
    /// Steps whose effect is planned.
    #[serde(default)]
    pub changes: Vec<Step>,
}

impl Script {
    /// Parses a script document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a script file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}

/// Names a table, optionally qualified by its schema.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableRef {
    /// Owning schema; the default schema when absent.
    #[serde(default)]
    pub schema: Option<String>,
    /// Table name.
    pub table: String,
}

/// One placeholder binding of a view query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Binding {
    /// A table.
    Table {
        #[serde(default)]
        schema: Option<String>,
        table: String,
    },
    /// Another view.
    View {
        #[serde(default)]
        schema: Option<String>,
        view: String,
    },
    /// A column of a table.
    Column {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        column: String,
    },
}

/// A view query: template text plus its bindings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuerySpec {
    /// SQL with `{0}`, `{1}`, ... placeholders.
    pub template: String,
    /// Bindings, in placeholder order.
    #[serde(default)]
    pub bind: Vec<Binding>,
}

/// An expression. Column names resolve against the table the expression
/// belongs to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprSpec {
    /// Column of the owning table.
    Column(String),
    /// Literal value, e.g. `{ "int": 0 }` or `"null"`.
    Literal(SqlValue),
    /// Unary operation.
    Unary {
        op: UnaryOp,
        operand: Box<ExprSpec>,
    },
    /// Binary operation.
    Binary {
        op: BinaryOp,
        left: Box<ExprSpec>,
        right: Box<ExprSpec>,
    },
    /// Function call.
    Function {
        name: String,
        #[serde(default)]
        args: Vec<ExprSpec>,
    },
    /// Type cast.
    Cast {
        expr: Box<ExprSpec>,
        #[serde(rename = "type")]
        data_type: DataType,
    },
}

fn default_true() -> bool {
    true
}

/// One builder call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    CreateSchema {
        name: String,
    },
    RenameSchema {
        schema: String,
        to: String,
    },
    RemoveSchema {
        schema: String,
    },
    CreateTable {
        #[serde(default)]
        schema: Option<String>,
        table: String,
    },
    RenameTable {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        to: String,
    },
    RemoveTable {
        #[serde(default)]
        schema: Option<String>,
        table: String,
    },
    AddColumn {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        column: String,
        #[serde(rename = "type")]
        data_type: DataType,
        #[serde(default = "default_true")]
        nullable: bool,
        #[serde(default)]
        default: Option<ExprSpec>,
    },
    RenameColumn {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        column: String,
        to: String,
    },
    SetColumnType {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        column: String,
        #[serde(rename = "type")]
        data_type: DataType,
    },
    SetNullable {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        column: String,
        nullable: bool,
    },
    SetDefault {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        column: String,
        #[serde(default)]
        default: Option<ExprSpec>,
    },
    RemoveColumn {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        column: String,
    },
    SetPrimaryKey {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        columns: Vec<String>,
        #[serde(default)]
        name: Option<String>,
    },
    CreateIndex {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        columns: Vec<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        unique: bool,
        #[serde(default)]
        filter: Option<ExprSpec>,
    },
    RenameIndex {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        index: String,
        to: String,
    },
    CreateForeignKey {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        columns: Vec<String>,
        references: TableRef,
        /// Referenced index; the referenced table's primary key when absent.
        #[serde(default)]
        index: Option<String>,
        #[serde(default)]
        on_delete: Option<ForeignKeyAction>,
        #[serde(default)]
        on_update: Option<ForeignKeyAction>,
    },
    CreateCheck {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        #[serde(default)]
        name: Option<String>,
        condition: ExprSpec,
    },
    SetCheckCondition {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        check: String,
        condition: ExprSpec,
    },
    RenameConstraint {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        constraint: String,
        to: String,
    },
    /// Removes an index, primary key, foreign key or check by name.
    RemoveConstraint {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        constraint: String,
    },
    CreateView {
        #[serde(default)]
        schema: Option<String>,
        view: String,
        query: QuerySpec,
    },
    SetViewQuery {
        #[serde(default)]
        schema: Option<String>,
        view: String,
        query: QuerySpec,
    },
    RenameView {
        #[serde(default)]
        schema: Option<String>,
        view: String,
        to: String,
    },
    RemoveView {
        #[serde(default)]
        schema: Option<String>,
        view: String,
    },
    RawSql {
        sql: String,
        #[serde(default)]
        params: Vec<SqlValue>,
    },
}

impl Step {
    /// Returns the operation name used in the script.
    #[must_use]
    pub const fn op(&self) -> &'static str {
        match self {
            Self::CreateSchema { .. } => "create_schema",
            Self::RenameSchema { .. } => "rename_schema",
            Self::RemoveSchema { .. } => "remove_schema",
            Self::CreateTable { .. } => "create_table",
            Self::RenameTable { .. } => "rename_table",
            Self::RemoveTable { .. } => "remove_table",
            Self::AddColumn { .. } => "add_column",
            Self::RenameColumn { .. } => "rename_column",
            Self::SetColumnType { .. } => "set_column_type",
            Self::SetNullable { .. } => "set_nullable",
            Self::SetDefault { .. } => "set_default",
            Self::RemoveColumn { .. } => "remove_column",
            Self::SetPrimaryKey { .. } => "set_primary_key",
            Self::CreateIndex { .. } => "create_index",
            Self::RenameIndex { .. } => "rename_index",
            Self::CreateForeignKey { .. } => "create_foreign_key",
            Self::CreateCheck { .. } => "create_check",
            Self::SetCheckCondition { .. } => "set_check_condition",
            Self::RenameConstraint { .. } => "rename_constraint",
            Self::RemoveConstraint { .. } => "remove_constraint",
            Self::CreateView { .. } => "create_view",
            Self::SetViewQuery { .. } => "set_view_query",
            Self::RenameView { .. } => "rename_view",
            Self::RemoveView { .. } => "remove_view",
            Self::RawSql { .. } => "raw_sql",
        }
    }
}
