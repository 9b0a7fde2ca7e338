//! Replays a script against a fresh database and collects the plan.

use oxide_schema_core::{
    CheckId, ColumnId, CommitMode, Database, Dialect, Expr, ForeignKeyId, IndexId, PendingAction,
    PrimaryKeyId, SchemaId, TableId, TrackingMode, ViewId, ViewQuery,
};
use tracing::{debug, info, trace};

use crate::error::{Result, ScriptError};
use crate::script::{Binding, ExprSpec, QuerySpec, Script, Step};

/// Builds the baseline, applies the tracked changes and returns the planned
/// actions with their statements.
pub fn plan(script: &Script, dialect: Dialect) -> Result<Vec<PendingAction>> {
    let mut db = Database::new(dialect);

    db.set_mode(TrackingMode::Detached, CommitMode::Commit)?;
    apply_all(&mut db, &script.baseline)?;
    debug!(steps = script.baseline.len(), "Baseline built");

    db.set_mode(TrackingMode::Attached, CommitMode::Commit)?;
    apply_all(&mut db, &script.changes)?;

    let actions = db.pending_actions()?;
    info!(
        steps = script.changes.len(),
        actions = actions.len(),
        "Planned changes"
    );
    Ok(actions)
}

/// Renders planned actions as one SQL script, each action preceded by a
/// comment naming it.
#[must_use]
pub fn render(actions: &[PendingAction]) -> String {
    let mut out = String::new();
    for action in actions {
        out.push_str("-- ");
        out.push_str(action.action.label());
        out.push('\n');
        for statement in &action.statements {
            out.push_str(statement);
            out.push_str(";\n");
        }
    }
    out
}

fn apply_all(db: &mut Database, steps: &[Step]) -> Result<()> {
    for (i, step) in steps.iter().enumerate() {
        trace!(step = i + 1, op = step.op(), "Applying step");
        apply(db, step).map_err(|source| ScriptError::Step {
            step: i + 1,
            op: step.op(),
            source: Box::new(source),
        })?;
    }
    Ok(())
}

fn apply(db: &mut Database, step: &Step) -> Result<()> {
    match step {
        Step::CreateSchema { name } => {
            db.create_schema(name)?;
        }
        Step::RenameSchema { schema, to } => {
            let id = db.get_schema(schema)?;
            db.schema_mut(id)?.set_name(to)?;
        }
        Step::RemoveSchema { schema } => {
            if !db.remove_schema(schema)? {
                return Err(unknown("Schema", schema));
            }
        }
        Step::CreateTable { schema, table } => {
            let schema = schema_id(db, schema.as_deref())?;
            db.schema_mut(schema)?.create_table(table)?;
        }
        Step::RenameTable { schema, table, to } => {
            let id = table_id(db, schema.as_deref(), table)?;
            db.table_mut(id)?.set_name(to)?;
        }
        Step::RemoveTable { schema, table } => {
            let id = table_id(db, schema.as_deref(), table)?;
            db.table_mut(id)?.remove()?;
        }
        Step::AddColumn {
            schema,
            table,
            column,
            data_type,
            nullable,
            default,
        } => {
            let table = table_id(db, schema.as_deref(), table)?;
            let default = default
                .as_ref()
                .map(|spec| expr(db, table, spec))
                .transpose()?;
            let mut handle = db.table_mut(table)?;
            let mut column = handle.create_column(column, data_type.clone())?;
            if default.is_some() {
                column.set_default_value(default)?;
            }
            if !nullable {
                column.mark_as_nullable(false)?;
            }
        }
        Step::RenameColumn {
            schema,
            table,
            column,
            to,
        } => {
            let id = column_id(db, schema.as_deref(), table, column)?;
            db.column_mut(id)?.set_name(to)?;
        }
        Step::SetColumnType {
            schema,
            table,
            column,
            data_type,
        } => {
            let id = column_id(db, schema.as_deref(), table, column)?;
            db.column_mut(id)?.set_type(data_type.clone())?;
        }
        Step::SetNullable {
            schema,
            table,
            column,
            nullable,
        } => {
            let id = column_id(db, schema.as_deref(), table, column)?;
            db.column_mut(id)?.mark_as_nullable(*nullable)?;
        }
        Step::SetDefault {
            schema,
            table,
            column,
            default,
        } => {
            let table = table_id(db, schema.as_deref(), table)?;
            let id = db.table_mut(table)?.get_column(column)?;
            let default = default
                .as_ref()
                .map(|spec| expr(db, table, spec))
                .transpose()?;
            db.column_mut(id)?.set_default_value(default)?;
        }
        Step::RemoveColumn {
            schema,
            table,
            column,
        } => {
            let table = table_id(db, schema.as_deref(), table)?;
            if !db.table_mut(table)?.remove_column(column)? {
                return Err(unknown("Column", column));
            }
        }
        Step::SetPrimaryKey {
            schema,
            table,
            columns,
            name,
        } => {
            let table = table_id(db, schema.as_deref(), table)?;
            let columns = columns_of(db, table, columns)?;
            let mut handle = db.table_mut(table)?;
            match name {
                Some(name) => handle.set_primary_key_named(name, columns)?,
                None => handle.set_primary_key(columns)?,
            };
        }
        Step::CreateIndex {
            schema,
            table,
            columns,
            name,
            unique,
            filter,
        } => {
            let table = table_id(db, schema.as_deref(), table)?;
            let columns = columns_of(db, table, columns)?;
            let filter = filter
                .as_ref()
                .map(|spec| expr(db, table, spec))
                .transpose()?;
            let mut handle = db.table_mut(table)?;
            let mut index = match name {
                Some(name) => handle.create_index_named(name, columns, *unique)?,
                None => handle.create_index(columns, *unique)?,
            };
            if filter.is_some() {
                index.set_filter(filter)?;
            }
        }
        Step::RenameIndex {
            schema,
            table,
            index,
            to,
        } => {
            let table = table_id(db, schema.as_deref(), table)?;
            let id = find_index(db, table, index)?;
            db.index_mut(id)?.set_name(to)?;
        }
        Step::CreateForeignKey {
            schema,
            table,
            columns,
            references,
            index,
            on_delete,
            on_update,
        } => {
            let table = table_id(db, schema.as_deref(), table)?;
            let columns = columns_of(db, table, columns)?;
            let target = table_id(db, references.schema.as_deref(), &references.table)?;
            let referenced = match index {
                Some(name) => find_index(db, target, name)?,
                None => primary_key_index(db, target)?,
            };
            let mut handle = db.table_mut(table)?;
            let mut fk = handle.create_foreign_key_on(columns, referenced)?;
            if let Some(action) = on_delete {
                fk.set_on_delete(*action)?;
            }
            if let Some(action) = on_update {
                fk.set_on_update(*action)?;
            }
        }
        Step::CreateCheck {
            schema,
            table,
            name,
            condition,
        } => {
            let table = table_id(db, schema.as_deref(), table)?;
            let condition = expr(db, table, condition)?;
            let mut handle = db.table_mut(table)?;
            match name {
                Some(name) => handle.create_check_named(name, condition)?,
                None => handle.create_check(condition)?,
            };
        }
        Step::SetCheckCondition {
            schema,
            table,
            check,
            condition,
        } => {
            let table = table_id(db, schema.as_deref(), table)?;
            let Some(Constraint::Check(id)) = find_constraint(db, table, check)? else {
                return Err(unknown("Check", check));
            };
            let condition = expr(db, table, condition)?;
            db.check_mut(id)?.set_condition(condition)?;
        }
        Step::RenameConstraint {
            schema,
            table,
            constraint,
            to,
        } => {
            let table = table_id(db, schema.as_deref(), table)?;
            match find_constraint(db, table, constraint)? {
                Some(Constraint::PrimaryKey(id)) => {
                    db.primary_key_mut(id)?.set_name(to)?;
                }
                Some(Constraint::ForeignKey(id)) => {
                    db.foreign_key_mut(id)?.set_name(to)?;
                }
                Some(Constraint::Check(id)) => {
                    db.check_mut(id)?.set_name(to)?;
                }
                Some(Constraint::Index(id)) => {
                    db.index_mut(id)?.set_name(to)?;
                }
                None => return Err(unknown("Constraint", constraint)),
            }
        }
        Step::RemoveConstraint {
            schema,
            table,
            constraint,
        } => {
            let table = table_id(db, schema.as_deref(), table)?;
            match find_constraint(db, table, constraint)? {
                Some(Constraint::PrimaryKey(id)) => db.primary_key_mut(id)?.remove()?,
                Some(Constraint::ForeignKey(id)) => db.foreign_key_mut(id)?.remove()?,
                Some(Constraint::Check(id)) => db.check_mut(id)?.remove()?,
                Some(Constraint::Index(id)) => db.index_mut(id)?.remove()?,
                None => return Err(unknown("Constraint", constraint)),
            }
        }
        Step::CreateView {
            schema,
            view,
            query,
        } => {
            let schema = schema_id(db, schema.as_deref())?;
            let query = view_query(db, query)?;
            db.schema_mut(schema)?.create_view(view, query)?;
        }
        Step::SetViewQuery {
            schema,
            view,
            query,
        } => {
            let id = view_id(db, schema.as_deref(), view)?;
            let query = view_query(db, query)?;
            db.view_mut(id)?.set_query(query)?;
        }
        Step::RenameView { schema, view, to } => {
            let id = view_id(db, schema.as_deref(), view)?;
            db.view_mut(id)?.set_name(to)?;
        }
        Step::RemoveView { schema, view } => {
            let id = view_id(db, schema.as_deref(), view)?;
            db.view_mut(id)?.remove()?;
        }
        Step::RawSql { sql, params } => {
            if params.is_empty() {
                db.add_statement(sql.clone())?;
            } else {
                db.add_parameterized_statement(sql.clone(), params.clone())?;
            }
        }
    }
    Ok(())
}

fn unknown(kind: &'static str, name: &str) -> ScriptError {
    ScriptError::UnknownObject {
        kind,
        name: name.to_string(),
    }
}

fn schema_id(db: &Database, schema: Option<&str>) -> Result<SchemaId> {
    match schema {
        Some(name) => Ok(db.get_schema(name)?),
        None => Ok(db.default_schema()),
    }
}

fn table_id(db: &mut Database, schema: Option<&str>, table: &str) -> Result<TableId> {
    let schema = schema_id(db, schema)?;
    Ok(db.schema_mut(schema)?.get_table(table)?)
}

fn view_id(db: &mut Database, schema: Option<&str>, view: &str) -> Result<ViewId> {
    let schema = schema_id(db, schema)?;
    Ok(db.schema_mut(schema)?.get_view(view)?)
}

fn column_id(db: &mut Database, schema: Option<&str>, table: &str, column: &str) -> Result<ColumnId> {
    let table = table_id(db, schema, table)?;
    Ok(db.table_mut(table)?.get_column(column)?)
}

fn columns_of(db: &mut Database, table: TableId, names: &[String]) -> Result<Vec<ColumnId>> {
    let mut handle = db.table_mut(table)?;
    let mut columns = Vec::with_capacity(names.len());
    for name in names {
        columns.push(handle.get_column(name)?);
    }
    Ok(columns)
}

fn named(db: &Database, id: impl Into<oxide_schema_core::ObjectId>, name: &str) -> bool {
    db.name(id).is_ok_and(|current| current.eq_ignore_ascii_case(name))
}

fn find_index(db: &Database, table: TableId, name: &str) -> Result<IndexId> {
    db.table(table)?
        .indexes
        .iter()
        .copied()
        .find(|index| named(db, *index, name))
        .ok_or_else(|| unknown("Index", name))
}

fn primary_key_index(db: &Database, table: TableId) -> Result<IndexId> {
    match db.table(table)?.primary_key {
        Some(pk) => Ok(db.primary_key(pk)?.index),
        None => Err(unknown("Primary key", &db.full_name(table)?)),
    }
}

/// A named object in the constraint namespace of a table.
enum Constraint {
    PrimaryKey(PrimaryKeyId),
    ForeignKey(ForeignKeyId),
    Check(CheckId),
    Index(IndexId),
}

fn find_constraint(db: &Database, table: TableId, name: &str) -> Result<Option<Constraint>> {
    let def = db.table(table)?;
    if let Some(pk) = def.primary_key.filter(|pk| named(db, *pk, name)) {
        return Ok(Some(Constraint::PrimaryKey(pk)));
    }
    if let Some(fk) = def.foreign_keys.iter().find(|fk| named(db, **fk, name)) {
        return Ok(Some(Constraint::ForeignKey(*fk)));
    }
    if let Some(check) = def.checks.iter().find(|check| named(db, **check, name)) {
        return Ok(Some(Constraint::Check(*check)));
    }
    Ok(def
        .indexes
        .iter()
        .find(|index| named(db, **index, name))
        .map(|index| Constraint::Index(*index)))
}

fn expr(db: &mut Database, table: TableId, spec: &ExprSpec) -> Result<Expr> {
    Ok(match spec {
        ExprSpec::Column(name) => Expr::col(db.table_mut(table)?.get_column(name)?),
        ExprSpec::Literal(value) => Expr::Literal(value.clone()),
        ExprSpec::Unary { op, operand } => Expr::Unary {
            op: *op,
            operand: Box::new(expr(db, table, operand)?),
        },
        ExprSpec::Binary { op, left, right } => Expr::Binary {
            op: *op,
            left: Box::new(expr(db, table, left)?),
            right: Box::new(expr(db, table, right)?),
        },
        ExprSpec::Function { name, args } => {
            let args = args
                .iter()
                .map(|arg| expr(db, table, arg))
                .collect::<Result<Vec<_>>>()?;
            Expr::func(name.clone(), args)
        }
        ExprSpec::Cast { expr: inner, data_type } => expr(db, table, inner)?.cast(data_type.clone()),
    })
}

fn view_query(db: &mut Database, spec: &QuerySpec) -> Result<ViewQuery> {
    let mut query = ViewQuery::new(spec.template.clone());
    for binding in &spec.bind {
        query = match binding {
            Binding::Table { schema, table } => query.bind(table_id(db, schema.as_deref(), table)?),
            Binding::View { schema, view } => query.bind(view_id(db, schema.as_deref(), view)?),
            Binding::Column {
                schema,
                table,
                column,
            } => query.bind(column_id(db, schema.as_deref(), table, column)?),
        };
    }
    Ok(query)
}
