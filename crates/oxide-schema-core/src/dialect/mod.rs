//! Dialect capability profiles and statement emitters.
//!
//! The planner only looks at [`Capabilities`]: what a target engine can do in
//! place and what forces a table rebuild. Turning a planned action into SQL
//! text is the job of a [`StatementEmitter`], selected by [`DialectKind`].

mod postgres;
mod sqlite;

pub use postgres::PostgresEmitter;
pub use sqlite::SqliteEmitter;

use serde::{Deserialize, Serialize};

use crate::action::{ColumnAlteration, ColumnCopy, PlannedAction, RebuildPlan};
use crate::database::Database;
use crate::error::{Result, SchemaError};
use crate::expr::RenderContext;
use crate::name::QualifiedName;
use crate::object::{
    CheckId, ColumnId, ForeignKeyId, IndexId, ObjectId, ObjectType, PrimaryKeyId, TableId, ViewId,
};
use crate::types::{DataType, ForeignKeyAction, SortOrder, SqlValue};

/// Which statement emitter renders actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectKind {
    /// SQLite.
    Sqlite,
    /// PostgreSQL.
    Postgres,
}

impl DialectKind {
    /// Returns the dialect name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgresql",
        }
    }
}

/// What a target engine can express as a direct statement.
///
/// Anything a table needs that is not covered here is carried out by
/// rebuilding the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Capabilities {
    /// ALTER TABLE RENAME COLUMN.
    pub rename_column: bool,
    /// ALTER TABLE ADD COLUMN.
    pub add_column: bool,
    /// ALTER TABLE DROP COLUMN.
    pub drop_column: bool,
    /// ALTER COLUMN ... TYPE.
    pub alter_column_type: bool,
    /// ALTER COLUMN ... SET/DROP NOT NULL.
    pub alter_column_nullability: bool,
    /// ALTER COLUMN ... SET/DROP DEFAULT.
    pub alter_column_default: bool,
    /// ALTER TABLE ADD CONSTRAINT.
    pub add_constraint: bool,
    /// ALTER TABLE DROP CONSTRAINT.
    pub drop_constraint: bool,
    /// ALTER TABLE RENAME CONSTRAINT.
    pub rename_constraint: bool,
    /// ALTER INDEX RENAME.
    pub rename_index: bool,
    /// Schemas exist in the engine; otherwise they are emulated by
    /// prefixing object names with `schema.`.
    pub native_schemas: bool,
    /// Foreign keys can only be declared inside CREATE TABLE.
    pub inline_foreign_keys: bool,
    /// Renaming a table rewrites foreign keys pointing at it.
    pub rename_updates_references: bool,
    /// Every table must have a primary key at flush time.
    pub requires_primary_key: bool,
    /// Any change to an existing table rebuilds it.
    pub rebuild_on_any_change: bool,
    /// Maximum identifier length in bytes.
    pub max_identifier_length: usize,
    /// Name of the default schema.
    pub default_schema: String,
}

impl Capabilities {
    /// SQLite profile.
    #[must_use]
    pub fn sqlite() -> Self {
        Self {
            rename_column: true,
            add_column: true,
            drop_column: false,
            alter_column_type: false,
            alter_column_nullability: false,
            alter_column_default: false,
            add_constraint: false,
            drop_constraint: false,
            rename_constraint: false,
            rename_index: false,
            native_schemas: false,
            inline_foreign_keys: true,
            rename_updates_references: false,
            requires_primary_key: false,
            rebuild_on_any_change: false,
            max_identifier_length: 128,
            default_schema: String::new(),
        }
    }

    /// PostgreSQL profile.
    #[must_use]
    pub fn postgres() -> Self {
        Self {
            rename_column: true,
            add_column: true,
            drop_column: true,
            alter_column_type: true,
            alter_column_nullability: true,
            alter_column_default: true,
            add_constraint: true,
            drop_constraint: true,
            rename_constraint: true,
            rename_index: true,
            native_schemas: true,
            inline_foreign_keys: false,
            rename_updates_references: true,
            requires_primary_key: false,
            rebuild_on_any_change: false,
            max_identifier_length: 63,
            default_schema: String::from("public"),
        }
    }

    /// Returns the capability profile of a built-in dialect.
    #[must_use]
    pub fn for_kind(kind: DialectKind) -> Self {
        match kind {
            DialectKind::Sqlite => Self::sqlite(),
            DialectKind::Postgres => Self::postgres(),
        }
    }

    /// Returns whether a column alteration can run in place.
    #[must_use]
    pub const fn can_alter(&self, alteration: ColumnAlteration) -> bool {
        match alteration {
            ColumnAlteration::Type => self.alter_column_type,
            ColumnAlteration::Nullability => self.alter_column_nullability,
            ColumnAlteration::Default => self.alter_column_default,
        }
    }
}

/// Serialized dialect selection with capability overrides.
///
/// ```json
/// { "kind": "sqlite", "capabilities": { "drop_column": true } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialectConfig {
    /// The base dialect.
    pub kind: DialectKind,
    /// Capability fields overriding the base profile.
    #[serde(default)]
    pub capabilities: serde_json::Map<String, serde_json::Value>,
}

impl DialectConfig {
    /// Parses a configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A target dialect: capability profile plus emitter selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    kind: DialectKind,
    capabilities: Capabilities,
}

impl Dialect {
    /// Creates a dialect with explicit capabilities.
    #[must_use]
    pub const fn new(kind: DialectKind, capabilities: Capabilities) -> Self {
        Self { kind, capabilities }
    }

    /// Built-in SQLite dialect.
    #[must_use]
    pub fn sqlite() -> Self {
        Self::new(DialectKind::Sqlite, Capabilities::sqlite())
    }

    /// Built-in PostgreSQL dialect.
    #[must_use]
    pub fn postgres() -> Self {
        Self::new(DialectKind::Postgres, Capabilities::postgres())
    }

    /// Builds a dialect from a configuration, applying its overrides to the
    /// base profile.
    pub fn from_config(config: &DialectConfig) -> Result<Self> {
        let mut value = serde_json::to_value(Capabilities::for_kind(config.kind))?;
        if let serde_json::Value::Object(fields) = &mut value {
            for (key, override_value) in &config.capabilities {
                fields.insert(key.clone(), override_value.clone());
            }
        }
        let capabilities: Capabilities = serde_json::from_value(value)?;
        Ok(Self::new(config.kind, capabilities))
    }

    /// Returns the dialect kind.
    #[must_use]
    pub const fn kind(&self) -> DialectKind {
        self.kind
    }

    /// Returns the capability profile.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Returns the statement emitter for this dialect.
    #[must_use]
    pub fn emitter(&self) -> &'static dyn StatementEmitter {
        match self.kind {
            DialectKind::Sqlite => &SqliteEmitter,
            DialectKind::Postgres => &PostgresEmitter,
        }
    }
}

/// Name resolution for statement rendering, backed by a database's
/// current state.
pub struct DialectContext<'a> {
    db: &'a Database,
    emitter: &'a dyn StatementEmitter,
}

impl<'a> DialectContext<'a> {
    /// Creates a context rendering with `emitter`.
    #[must_use]
    pub fn new(db: &'a Database, emitter: &'a dyn StatementEmitter) -> Self {
        Self { db, emitter }
    }

    /// Returns the database.
    #[must_use]
    pub const fn database(&self) -> &'a Database {
        self.db
    }

    /// Returns the capability profile.
    #[must_use]
    pub fn capabilities(&self) -> &'a Capabilities {
        self.db.dialect().capabilities()
    }

    /// Quotes an identifier.
    #[must_use]
    pub fn quote(&self, name: &str) -> String {
        self.emitter.quote_identifier(name)
    }

    /// Renders a reference to a table, view or index.
    #[must_use]
    pub fn relation(&self, name: &QualifiedName) -> String {
        if !self.capabilities().native_schemas || name.schema.is_empty() {
            self.quote(&name.flattened())
        } else {
            format!("{}.{}", self.quote(&name.schema), self.quote(&name.name))
        }
    }

    /// Renders the name given to an object being created or renamed.
    /// Native schemas take the schema from context.
    #[must_use]
    pub fn object_name(&self, name: &QualifiedName) -> String {
        if self.capabilities().native_schemas {
            self.quote(&name.name)
        } else {
            self.quote(&name.flattened())
        }
    }

    /// Renders the current name of a table, view or index.
    pub fn current_relation(&self, id: impl Into<ObjectId>) -> Result<String> {
        Ok(self.relation(&self.db.qualified_name(id)?))
    }

    /// Renders the current, unqualified name of any object.
    pub fn current_name(&self, id: impl Into<ObjectId>) -> Result<String> {
        Ok(self.quote(self.db.name(id)?))
    }

    /// Renders the key column list of an index.
    pub fn index_columns(&self, index: IndexId, with_order: bool) -> Result<String> {
        let def = self.db.index(index)?;
        let mut columns = Vec::with_capacity(def.columns.len());
        for key in &def.columns {
            let mut column = self.current_name(key.column)?;
            if with_order && key.order == SortOrder::Desc {
                column.push_str(" DESC");
            }
            columns.push(column);
        }
        Ok(columns.join(", "))
    }
}

impl RenderContext for DialectContext<'_> {
    fn column_name(&self, column: ColumnId) -> String {
        self.current_name(column).unwrap_or_default()
    }

    fn qualified_column_name(&self, column: ColumnId) -> String {
        let table = self
            .db
            .parent(column)
            .ok()
            .flatten()
            .and_then(|table| self.current_relation(table).ok())
            .unwrap_or_default();
        format!("{table}.{}", self.column_name(column))
    }

    fn relation_name(&self, relation: ObjectId) -> String {
        self.current_relation(relation).unwrap_or_default()
    }

    fn type_name(&self, data_type: &DataType) -> String {
        self.emitter.type_name(data_type)
    }

    fn literal(&self, value: &SqlValue) -> String {
        self.emitter.literal(value)
    }
}

/// Renders planned actions as dialect SQL.
///
/// The provided methods produce standard SQL; emitters override what their
/// engine spells differently.
pub trait StatementEmitter: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the SQL type name for a data type.
    fn type_name(&self, data_type: &DataType) -> String;

    /// Generates SQL for ALTER COLUMN.
    fn alter_column(
        &self,
        column: ColumnId,
        alteration: ColumnAlteration,
        ctx: &DialectContext<'_>,
    ) -> Result<Vec<String>>;

    /// Quotes an identifier.
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{name}\"")
    }

    /// Renders a literal value.
    fn literal(&self, value: &SqlValue) -> String {
        value.to_sql_inline()
    }

    /// Renders an action as one or more statements.
    fn render(&self, action: &PlannedAction, ctx: &DialectContext<'_>) -> Result<Vec<String>> {
        let sql = match action {
            PlannedAction::CreateSchema { name } => {
                format!("CREATE SCHEMA {}", self.quote_identifier(name))
            }
            PlannedAction::DropSchema { name } => {
                format!("DROP SCHEMA {}", self.quote_identifier(name))
            }
            PlannedAction::RenameSchema { from, to } => format!(
                "ALTER SCHEMA {} RENAME TO {}",
                self.quote_identifier(from),
                self.quote_identifier(to)
            ),
            PlannedAction::CreateTable { table } => self.create_table(*table, ctx)?,
            PlannedAction::DropTable { name } => format!("DROP TABLE {}", ctx.relation(name)),
            PlannedAction::RenameTable { from, to } => format!(
                "ALTER TABLE {} RENAME TO {}",
                ctx.relation(from),
                ctx.object_name(to)
            ),
            PlannedAction::RebuildTable(plan) => return self.rebuild_table(plan, ctx),
            PlannedAction::AddColumn { column } => self.add_column(*column, ctx)?,
            PlannedAction::DropColumn { table, name } => format!(
                "ALTER TABLE {} DROP COLUMN {}",
                ctx.relation(table),
                self.quote_identifier(name)
            ),
            PlannedAction::RenameColumn { table, from, to } => format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                ctx.current_relation(*table)?,
                self.quote_identifier(from),
                self.quote_identifier(to)
            ),
            PlannedAction::AlterColumn { column, alteration } => {
                return self.alter_column(*column, *alteration, ctx)
            }
            PlannedAction::CreateIndex { index } => self.create_index(*index, ctx)?,
            PlannedAction::DropIndex { name } => format!("DROP INDEX {}", ctx.relation(name)),
            PlannedAction::RenameIndex { from, to } => self.rename_index(from, to, ctx),
            PlannedAction::AddConstraint { constraint } => {
                let table = ctx.database().parent(*constraint)?.ok_or_else(|| {
                    SchemaError::NotFound {
                        kind: "Table",
                        name: constraint.to_string(),
                    }
                })?;
                format!(
                    "ALTER TABLE {} ADD {}",
                    ctx.current_relation(table)?,
                    self.constraint_clause(*constraint, ctx)?
                )
            }
            PlannedAction::DropConstraint { table, name } => format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                ctx.relation(table),
                self.quote_identifier(name)
            ),
            PlannedAction::RenameConstraint { table, from, to } => format!(
                "ALTER TABLE {} RENAME CONSTRAINT {} TO {}",
                ctx.current_relation(*table)?,
                self.quote_identifier(from),
                self.quote_identifier(to)
            ),
            PlannedAction::CreateView { view } => self.create_view(*view, ctx)?,
            PlannedAction::DropView { name } => format!("DROP VIEW {}", ctx.relation(name)),
            PlannedAction::RawSql { sql, .. } => sql.clone(),
        };
        Ok(vec![sql])
    }

    /// Generates SQL for CREATE TABLE.
    fn create_table(&self, table: TableId, ctx: &DialectContext<'_>) -> Result<String> {
        let name = ctx.current_relation(table)?;
        self.create_table_as(&name, table, ctx)
    }

    /// Generates CREATE TABLE for the shape of `table` under the given name.
    fn create_table_as(&self, name: &str, table: TableId, ctx: &DialectContext<'_>) -> Result<String> {
        let body = self.table_body(table, ctx)?;
        Ok(format!("CREATE TABLE {name} (\n    {}\n)", body.join(",\n    ")))
    }

    /// Column definitions followed by table constraints.
    fn table_body(&self, table: TableId, ctx: &DialectContext<'_>) -> Result<Vec<String>> {
        let db = ctx.database();
        let def = db.table(table)?;
        let mut lines = Vec::new();
        for column in &def.columns {
            lines.push(self.column_definition(*column, ctx)?);
        }
        if let Some(pk) = def.primary_key {
            lines.push(self.constraint_clause(pk.into(), ctx)?);
        }
        if ctx.capabilities().inline_foreign_keys {
            for fk in &def.foreign_keys {
                lines.push(self.constraint_clause((*fk).into(), ctx)?);
            }
        }
        for check in &def.checks {
            lines.push(self.constraint_clause((*check).into(), ctx)?);
        }
        Ok(lines)
    }

    /// Generates SQL for a column definition.
    fn column_definition(&self, column: ColumnId, ctx: &DialectContext<'_>) -> Result<String> {
        let def = ctx.database().column(column)?;
        let mut sql = format!(
            "{} {}",
            ctx.current_name(column)?,
            self.type_name(&def.data_type)
        );
        if !def.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &def.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.render(ctx));
        }
        Ok(sql)
    }

    /// Generates the clause declaring a primary key, foreign key or check.
    fn constraint_clause(&self, constraint: ObjectId, ctx: &DialectContext<'_>) -> Result<String> {
        let db = ctx.database();
        let name = ctx.current_name(constraint)?;
        let body = match db.object_type(constraint)? {
            ObjectType::PrimaryKey => {
                let def = db.primary_key(PrimaryKeyId(constraint))?;
                format!("PRIMARY KEY ({})", ctx.index_columns(def.index, false)?)
            }
            ObjectType::ForeignKey => {
                let def = db.foreign_key(ForeignKeyId(constraint))?;
                let referenced_table = db.parent(def.referenced)?.ok_or_else(|| {
                    SchemaError::NotFound {
                        kind: "Table",
                        name: def.referenced.id().to_string(),
                    }
                })?;
                let mut sql = format!(
                    "FOREIGN KEY ({}) REFERENCES {} ({})",
                    ctx.index_columns(def.origin, false)?,
                    ctx.current_relation(referenced_table)?,
                    ctx.index_columns(def.referenced, false)?
                );
                if def.on_delete != ForeignKeyAction::NoAction {
                    sql.push_str(" ON DELETE ");
                    sql.push_str(def.on_delete.as_sql());
                }
                if def.on_update != ForeignKeyAction::NoAction {
                    sql.push_str(" ON UPDATE ");
                    sql.push_str(def.on_update.as_sql());
                }
                sql
            }
            ObjectType::Check => {
                let def = db.check(CheckId(constraint))?;
                format!("CHECK ({})", def.condition.render(ctx))
            }
            other => {
                return Err(SchemaError::NotFound {
                    kind: "Constraint",
                    name: format!("{other} {constraint}"),
                })
            }
        };
        Ok(format!("CONSTRAINT {name} {body}"))
    }

    /// Generates SQL for ADD COLUMN.
    fn add_column(&self, column: ColumnId, ctx: &DialectContext<'_>) -> Result<String> {
        let table = ctx.database().parent(column)?.ok_or_else(|| SchemaError::NotFound {
            kind: "Table",
            name: column.id().to_string(),
        })?;
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            ctx.current_relation(table)?,
            self.column_definition(column, ctx)?
        ))
    }

    /// Generates SQL for CREATE INDEX.
    fn create_index(&self, index: IndexId, ctx: &DialectContext<'_>) -> Result<String> {
        let db = ctx.database();
        let def = db.index(index)?;
        let table = db.parent(index)?.ok_or_else(|| SchemaError::NotFound {
            kind: "Table",
            name: index.id().to_string(),
        })?;
        let mut sql = String::from("CREATE ");
        if def.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        sql.push_str(&ctx.object_name(&db.qualified_name(index)?));
        sql.push_str(" ON ");
        sql.push_str(&ctx.current_relation(table)?);
        sql.push_str(" (");
        sql.push_str(&ctx.index_columns(index, true)?);
        sql.push(')');
        if let Some(filter) = &def.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&filter.render(ctx));
        }
        Ok(sql)
    }

    /// Generates SQL for renaming an index.
    fn rename_index(&self, from: &QualifiedName, to: &QualifiedName, ctx: &DialectContext<'_>) -> String {
        format!(
            "ALTER INDEX {} RENAME TO {}",
            ctx.relation(from),
            ctx.object_name(to)
        )
    }

    /// Generates SQL for CREATE VIEW.
    fn create_view(&self, view: ViewId, ctx: &DialectContext<'_>) -> Result<String> {
        let def = ctx.database().view(view)?;
        Ok(format!(
            "CREATE VIEW {} AS {}",
            ctx.current_relation(view)?,
            def.query.render(ctx)?
        ))
    }

    /// Generates the statements of a shadow-copy rebuild.
    fn rebuild_table(&self, plan: &RebuildPlan, ctx: &DialectContext<'_>) -> Result<Vec<String>> {
        let db = ctx.database();
        let original = db.qualified_name(plan.table)?;
        let source = ctx.relation(&original);
        let shadow = ctx.relation(&plan.shadow);

        let mut statements = vec![self.create_table_as(&shadow, plan.table, ctx)?];
        if !plan.copies.is_empty() {
            let mut targets = Vec::with_capacity(plan.copies.len());
            let mut values = Vec::with_capacity(plan.copies.len());
            for copy in &plan.copies {
                targets.push(ctx.current_name(copy.column)?);
                values.push(self.copy_expression(copy, ctx)?);
            }
            statements.push(format!(
                "INSERT INTO {shadow} ({}) SELECT {} FROM {source}",
                targets.join(", "),
                values.join(", ")
            ));
        }
        statements.push(format!("DROP TABLE {source}"));
        statements.push(format!(
            "ALTER TABLE {shadow} RENAME TO {}",
            ctx.object_name(&original)
        ));
        Ok(statements)
    }

    /// Renders the value copied into one column of a shadow table.
    fn copy_expression(&self, copy: &ColumnCopy, ctx: &DialectContext<'_>) -> Result<String> {
        let data_type = &ctx.database().column(copy.column)?.data_type;
        let fallback = copy.fallback.as_ref().map(|f| f.render(ctx));
        let Some(source) = &copy.source else {
            return Ok(fallback.unwrap_or_else(|| String::from("NULL")));
        };
        let mut value = self.quote_identifier(source);
        if copy.cast {
            value = format!("CAST({value} AS {})", self.type_name(data_type));
        }
        Ok(match fallback {
            Some(fallback) => format!("COALESCE({value}, {fallback})"),
            None => value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles() {
        let sqlite = Dialect::sqlite();
        assert_eq!(sqlite.kind(), DialectKind::Sqlite);
        assert!(!sqlite.capabilities().native_schemas);
        assert!(sqlite.capabilities().inline_foreign_keys);
        assert_eq!(sqlite.emitter().name(), "sqlite");

        let postgres = Dialect::postgres();
        assert!(postgres.capabilities().alter_column_type);
        assert_eq!(postgres.capabilities().default_schema, "public");
        assert_eq!(postgres.emitter().name(), "postgresql");
    }

    #[test]
    fn test_config_overrides() {
        let config =
            DialectConfig::from_json(r#"{"kind":"sqlite","capabilities":{"drop_column":true}}"#)
                .unwrap();
        let dialect = Dialect::from_config(&config).unwrap();
        assert!(dialect.capabilities().drop_column);
        assert!(!dialect.capabilities().alter_column_type);
    }

    #[test]
    fn test_config_rejects_unknown_capability() {
        let config =
            DialectConfig::from_json(r#"{"kind":"postgres","capabilities":{"teleport":true}}"#)
                .unwrap();
        let err = Dialect::from_config(&config).unwrap_err();
        assert!(matches!(err, SchemaError::Config(_)));
    }

    #[test]
    fn test_config_without_overrides() {
        let config = DialectConfig::from_json(r#"{"kind":"postgres"}"#).unwrap();
        assert_eq!(Dialect::from_config(&config).unwrap(), Dialect::postgres());
    }
}
