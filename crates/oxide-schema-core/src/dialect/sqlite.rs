//! SQLite statement emitter.
//!
//! SQLite has limited ALTER TABLE support. The SQLite capability profile
//! routes column and constraint changes through table rebuilds, so the
//! in-place forms below only run when a caller overrides those capabilities.

use crate::action::ColumnAlteration;
use crate::error::Result;
use crate::name::QualifiedName;
use crate::object::ColumnId;
use crate::types::{DataType, SqlValue};

use super::{DialectContext, StatementEmitter};

/// SQLite emitter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteEmitter;

impl SqliteEmitter {
    /// Creates a new SQLite emitter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl StatementEmitter for SqliteEmitter {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn type_name(&self, data_type: &DataType) -> String {
        // SQLite has dynamic typing with type affinity
        match data_type {
            DataType::Smallint | DataType::Integer | DataType::Bigint => "INTEGER".to_string(),
            DataType::Real | DataType::Double | DataType::Decimal { .. } => "REAL".to_string(),
            DataType::Char(_) | DataType::Varchar(_) | DataType::Text => "TEXT".to_string(),
            DataType::Blob | DataType::Varbinary(_) => "BLOB".to_string(),
            DataType::Date | DataType::Time | DataType::Timestamp => "TEXT".to_string(),
            DataType::Boolean => "INTEGER".to_string(), // SQLite has no bool, use 0/1
            DataType::Custom(name) => name.clone(),
        }
    }

    fn literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Bool(b) => String::from(if *b { "1" } else { "0" }),
            other => other.to_sql_inline(),
        }
    }

    fn alter_column(
        &self,
        column: ColumnId,
        alteration: ColumnAlteration,
        ctx: &DialectContext<'_>,
    ) -> Result<Vec<String>> {
        let name = ctx.database().full_name(column)?;
        Ok(vec![format!(
            "-- ALTER COLUMN ({alteration:?}) not directly supported in SQLite. \
             Table recreation required for: {name}"
        )])
    }

    fn rename_index(
        &self,
        from: &QualifiedName,
        to: &QualifiedName,
        _ctx: &DialectContext<'_>,
    ) -> String {
        format!(
            "-- RENAME INDEX not supported in SQLite. \
             Drop {from} and create {to} instead."
        )
    }
}
