//! PostgreSQL statement emitter.

use crate::action::ColumnAlteration;
use crate::error::Result;
use crate::expr::Expr;
use crate::object::ColumnId;
use crate::types::{DataType, SqlValue};

use super::{DialectContext, StatementEmitter};

/// PostgreSQL emitter.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresEmitter;

impl PostgresEmitter {
    /// Creates a new PostgreSQL emitter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl StatementEmitter for PostgresEmitter {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn type_name(&self, data_type: &DataType) -> String {
        match data_type {
            DataType::Double => "DOUBLE PRECISION".to_string(),
            DataType::Blob => "BYTEA".to_string(), // PostgreSQL uses BYTEA
            DataType::Varbinary(len) => match len {
                Some(n) => format!("VARBIT({n})"),
                None => "BYTEA".to_string(),
            },
            other => other.to_sql(),
        }
    }

    fn literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Blob(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
                format!("'\\x{hex}'::bytea")
            }
            other => other.to_sql_inline(),
        }
    }

    fn alter_column(
        &self,
        column: ColumnId,
        alteration: ColumnAlteration,
        ctx: &DialectContext<'_>,
    ) -> Result<Vec<String>> {
        let db = ctx.database();
        let def = db.column(column)?;
        let table = match db.parent(column)? {
            Some(table) => ctx.current_relation(table)?,
            None => return Ok(Vec::new()),
        };
        let name = ctx.current_name(column)?;

        let statements = match alteration {
            ColumnAlteration::Type => {
                let type_name = self.type_name(&def.data_type);
                vec![format!(
                    "ALTER TABLE {table} ALTER COLUMN {name} TYPE {type_name} USING {name}::{type_name}"
                )]
            }
            ColumnAlteration::Nullability if def.nullable => {
                vec![format!("ALTER TABLE {table} ALTER COLUMN {name} DROP NOT NULL")]
            }
            ColumnAlteration::Nullability => {
                // Existing NULLs would make SET NOT NULL fail.
                let fallback = def
                    .default
                    .clone()
                    .unwrap_or_else(|| Expr::Literal(def.data_type.zero_value()));
                vec![
                    format!(
                        "UPDATE {table} SET {name} = {} WHERE {name} IS NULL",
                        fallback.render(ctx)
                    ),
                    format!("ALTER TABLE {table} ALTER COLUMN {name} SET NOT NULL"),
                ]
            }
            ColumnAlteration::Default => match &def.default {
                Some(default) => vec![format!(
                    "ALTER TABLE {table} ALTER COLUMN {name} SET DEFAULT {}",
                    default.render(ctx)
                )],
                None => vec![format!("ALTER TABLE {table} ALTER COLUMN {name} DROP DEFAULT")],
            },
        };
        Ok(statements)
    }
}
