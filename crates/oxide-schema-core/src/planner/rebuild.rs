//! Deciding which tables are rebuilt and describing the shadow copy.

use crate::action::{ColumnCopy, RebuildPlan};
use crate::catalog::Scope;
use crate::changes::Field;
use crate::error::Result;
use crate::expr::Expr;
use crate::name::{temporary, truncate, QualifiedName};
use crate::object::{ColumnId, ObjectId, ObjectType, TableId};

use super::{Planner, TableDelta};

impl Planner<'_> {
    /// Whether any residual item of `table` cannot be expressed in place.
    pub(super) fn requires_rebuild(&self, table: TableId, delta: &TableDelta) -> Result<bool> {
        let caps = self.caps;
        if caps.rebuild_on_any_change && !delta.is_empty() {
            return Ok(true);
        }
        let constraints_in_place = caps.add_constraint && caps.drop_constraint;

        for id in &delta.created {
            let direct = match self.db.object_type(*id)? {
                ObjectType::Column => {
                    let def = self.db.column(ColumnId(*id))?;
                    caps.add_column && (def.nullable || def.default.is_some())
                }
                ObjectType::PrimaryKey | ObjectType::Check => caps.add_constraint,
                ObjectType::ForeignKey => !caps.inline_foreign_keys && caps.add_constraint,
                _ => true,
            };
            if !direct {
                return Ok(true);
            }
        }

        for id in &delta.removed {
            let direct = match self.db.object_type(*id)? {
                ObjectType::Column => caps.drop_column,
                ObjectType::PrimaryKey | ObjectType::Check => caps.drop_constraint,
                ObjectType::ForeignKey => !caps.inline_foreign_keys && caps.drop_constraint,
                _ => true,
            };
            if !direct {
                return Ok(true);
            }
        }

        for id in &delta.changed {
            let object_type = self.db.object_type(*id)?;
            for net in self.changes.changes_of(*id) {
                let direct = match net.change.field() {
                    Field::Name => match object_type {
                        ObjectType::Column => caps.rename_column,
                        ObjectType::Index => true,
                        _ => caps.rename_constraint,
                    },
                    Field::Type => caps.alter_column_type,
                    Field::Nullability => caps.alter_column_nullability,
                    Field::Default => caps.alter_column_default,
                    Field::Condition => constraints_in_place,
                    Field::Target | Field::OnDelete | Field::OnUpdate => {
                        !caps.inline_foreign_keys && constraints_in_place
                    }
                    Field::Uniqueness
                    | Field::Virtuality
                    | Field::Filter
                    | Field::PrimaryKey
                    | Field::Query => true,
                };
                if !direct {
                    return Ok(true);
                }
            }
        }

        if caps.inline_foreign_keys && !caps.rename_updates_references {
            for fk in &self.db.table(table)?.foreign_keys {
                let target = self.db.table_of(self.db.foreign_key(*fk)?.referenced)?;
                if self.existed(target) && self.qualified_renamed(target.id())? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Describes how the rows of `table` move into its rebuilt shape.
    ///
    /// New nullable columns are left to their defaults. New NOT NULL columns
    /// and columns that stopped accepting NULL fall back to their default or
    /// the type's zero value.
    pub(super) fn rebuild_plan(&self, table: TableId) -> Result<RebuildPlan> {
        let db = self.db;
        let mut copies = Vec::new();
        for column in &db.table(table)?.columns {
            let def = db.column(*column)?;
            let fallback = || {
                def.default
                    .clone()
                    .unwrap_or_else(|| Expr::Literal(def.data_type.zero_value()))
            };
            if self.changes.is_created(*column) {
                if !def.nullable {
                    copies.push(ColumnCopy {
                        column: *column,
                        source: None,
                        cast: false,
                        fallback: Some(fallback()),
                    });
                }
                continue;
            }
            let tightened = !def.nullable && self.start_nullable(*column)?;
            copies.push(ColumnCopy {
                column: *column,
                source: Some(self.changes.original_name(*column, db)),
                cast: self.changes.change(*column, Field::Type).is_some(),
                fallback: tightened.then(fallback),
            });
        }

        let current = db.qualified_name(table)?;
        let scope = Scope::Schema(db.schema_of(table)?.id());
        let base = truncate(
            current.name.clone(),
            self.caps.max_identifier_length.saturating_sub(9),
        );
        let shadow = temporary(&base, |candidate| !db.catalog.contains(scope, candidate));
        Ok(RebuildPlan {
            table,
            shadow: QualifiedName::new(current.schema, shadow),
            copies,
        })
    }

    pub(super) fn existed(&self, id: impl Into<ObjectId>) -> bool {
        self.changes.existed(id, self.db)
    }
}
