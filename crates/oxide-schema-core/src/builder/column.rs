use crate::changes::{FieldChange, Transition};
use crate::database::Database;
use crate::error::{Result, SchemaError};
use crate::expr::Expr;
use crate::graph::Role;
use crate::object::{ColumnId, ForeignKeyId, IndexId, TableId};
use crate::types::{DataType, ForeignKeyAction};

use super::ColumnMut;

impl Database {
    /// Columns on the other side of every foreign key using `column`, paired
    /// with the foreign key.
    pub(crate) fn key_counterparts(&self, column: ColumnId) -> Result<Vec<(ForeignKeyId, ColumnId)>> {
        let mut counterparts = Vec::new();
        for index in self.graph.referencing_with_role(column.id(), Role::IndexColumn) {
            let index = IndexId(index);
            let Some(position) = self.index(index)?.column_ids().position(|c| c == column) else {
                continue;
            };
            for (role, origin_side) in [(Role::ForeignKeyOrigin, true), (Role::ForeignKeyTarget, false)] {
                for fk in self.graph.referencing_with_role(index.id(), role) {
                    let fk = ForeignKeyId(fk);
                    let def = self.foreign_key(fk)?;
                    let other = if origin_side { def.referenced } else { def.origin };
                    if let Some(counterpart) = self.index(other)?.column_ids().nth(position) {
                        counterparts.push((fk, counterpart));
                    }
                }
            }
        }
        Ok(counterparts)
    }

    /// Foreign keys whose referencing columns include `column`.
    fn foreign_keys_from(&self, column: ColumnId) -> Vec<ForeignKeyId> {
        self.graph
            .referencing_with_role(column.id(), Role::IndexColumn)
            .into_iter()
            .flat_map(|index| self.graph.referencing_with_role(index, Role::ForeignKeyOrigin))
            .map(ForeignKeyId)
            .collect()
    }

    /// Whether `column` is a key column of its table's primary key.
    fn is_primary_key_column(&self, column: ColumnId) -> Result<bool> {
        for index in self.graph.referencing_with_role(column.id(), Role::IndexColumn) {
            if self.index(IndexId(index))?.primary_key.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn validate_default(
        &self,
        data_type: &DataType,
        default: Option<&Expr>,
        violations: &mut Vec<SchemaError>,
    ) {
        let Some(default) = default else {
            return;
        };
        if !default.referenced_columns().is_empty() {
            violations.push(SchemaError::InvalidExpression(
                "a default value cannot reference columns".to_string(),
            ));
        }
        if let Some(value) = default.as_literal() {
            if !data_type.accepts(value) {
                violations.push(SchemaError::TypeIncompatibility(format!(
                    "default {} is not a valid {data_type} value",
                    value.to_sql_inline()
                )));
            }
        }
    }
}

impl ColumnMut<'_> {
    /// Returns the owning table.
    pub fn table(&self) -> Result<TableId> {
        self.db.table_of(self.id)
    }

    /// Changes the data type. Existing values must be convertible and every
    /// foreign key partner column must stay key-compatible.
    pub fn set_type(&mut self, data_type: DataType) -> Result<&mut Self> {
        let db = &*self.db;
        db.ensure_live(self.id.id())?;
        let def = db.column(self.id)?;
        let mut violations = Vec::new();
        if !def.data_type.can_convert_to(&data_type) {
            violations.push(SchemaError::TypeIncompatibility(format!(
                "column '{}' cannot be converted from {} to {data_type}",
                db.full_name(self.id)?,
                def.data_type
            )));
        }
        for (fk, counterpart) in db.key_counterparts(self.id)? {
            let other = &db.column(counterpart)?.data_type;
            if !data_type.is_key_compatible(other) {
                violations.push(SchemaError::TypeIncompatibility(format!(
                    "{data_type} is not compatible with '{}' ({other}) used by foreign key '{}'",
                    db.full_name(counterpart)?,
                    db.name(fk)?
                )));
            }
        }
        db.validate_default(&data_type, def.default.as_ref(), &mut violations);
        SchemaError::from_violations(violations)?;

        let old = std::mem::replace(&mut self.db.column_def_mut(self.id)?.data_type, data_type.clone());
        self.db
            .tracker
            .changed(self.id.id(), FieldChange::Type(Transition::new(old, data_type)));
        Ok(self)
    }

    /// Allows or forbids NULL.
    ///
    /// Primary key columns cannot become nullable; a column used by a
    /// `SET NULL` foreign key cannot become NOT NULL.
    pub fn mark_as_nullable(&mut self, nullable: bool) -> Result<&mut Self> {
        let db = &*self.db;
        db.ensure_live(self.id.id())?;
        let column = db.full_name(self.id)?;
        if nullable && db.is_primary_key_column(self.id)? {
            return Err(SchemaError::violation(
                column,
                "a primary key column cannot be nullable",
            ));
        }
        if !nullable {
            let mut violations = Vec::new();
            for fk in db.foreign_keys_from(self.id) {
                let def = db.foreign_key(fk)?;
                if def.on_delete == ForeignKeyAction::SetNull
                    || def.on_update == ForeignKeyAction::SetNull
                {
                    violations.push(SchemaError::violation(
                        &column,
                        format!("foreign key '{}' sets it to NULL", db.name(fk)?),
                    ));
                }
            }
            SchemaError::from_violations(violations)?;
        }

        let old = std::mem::replace(&mut self.db.column_def_mut(self.id)?.nullable, nullable);
        self.db.tracker.changed(
            self.id.id(),
            FieldChange::Nullability(Transition::new(old, nullable)),
        );
        Ok(self)
    }

    /// Sets or clears the default value.
    pub fn set_default_value(&mut self, default: Option<Expr>) -> Result<&mut Self> {
        let db = &*self.db;
        db.ensure_live(self.id.id())?;
        let mut violations = Vec::new();
        db.validate_default(&db.column(self.id)?.data_type, default.as_ref(), &mut violations);
        SchemaError::from_violations(violations)?;

        let old = std::mem::replace(&mut self.db.column_def_mut(self.id)?.default, default.clone());
        self.db
            .tracker
            .changed(self.id.id(), FieldChange::Default(Transition::new(old, default)));
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::dialect::Dialect;
    use crate::error::ErrorKind;
    use crate::object::ColumnDef;

    use super::*;

    fn table(db: &mut Database) -> TableId {
        let schema = db.default_schema();
        db.schema_mut(schema)
            .unwrap()
            .create_table("items")
            .unwrap()
            .id()
    }

    #[test]
    fn test_column_defaults() {
        let mut db = Database::new(Dialect::postgres());
        let items = table(&mut db);
        let price = db
            .table_mut(items)
            .unwrap()
            .create_column("price", DataType::Integer)
            .unwrap()
            .id();
        assert_eq!(
            db.column(price).unwrap(),
            &ColumnDef {
                data_type: DataType::Integer,
                nullable: true,
                default: None,
            }
        );
        assert_eq!(db.full_name(price).unwrap(), "public.items.price");
    }

    #[test]
    fn test_chained_mutations() {
        let mut db = Database::new(Dialect::postgres());
        let items = table(&mut db);
        let mut table = db.table_mut(items).unwrap();
        let mut column = table.create_column("qty", DataType::Smallint).unwrap();
        column
            .set_type(DataType::Bigint)
            .unwrap()
            .mark_as_nullable(false)
            .unwrap()
            .set_default_value(Some(Expr::lit(1)))
            .unwrap()
            .set_name("quantity")
            .unwrap();
        let id = column.id();
        let def = db.column(id).unwrap();
        assert_eq!(def.data_type, DataType::Bigint);
        assert!(!def.nullable);
        assert_eq!(db.name(id).unwrap(), "quantity");
    }

    #[test]
    fn test_set_type_requires_convertible_type() {
        let mut db = Database::new(Dialect::postgres());
        let items = table(&mut db);
        let mut table = db.table_mut(items).unwrap();
        let mut column = table.create_column("born", DataType::Date).unwrap();
        let err = column.set_type(DataType::Integer).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeIncompatibility);
        column.set_type(DataType::Text).unwrap();
    }

    #[test]
    fn test_default_rules() {
        let mut db = Database::new(Dialect::postgres());
        let items = table(&mut db);
        let mut table = db.table_mut(items).unwrap();
        let other = table.create_column("other", DataType::Integer).unwrap().id();
        let mut column = table.create_column("qty", DataType::Integer).unwrap();

        let err = column.set_default_value(Some(Expr::col(other))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidExpression);
        let err = column.set_default_value(Some(Expr::lit("many"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeIncompatibility);
        column
            .set_default_value(Some(Expr::func("now", vec![])))
            .unwrap();
    }

    #[test]
    fn test_primary_key_column_cannot_become_nullable() {
        let mut db = Database::new(Dialect::postgres());
        let items = table(&mut db);
        let mut table = db.table_mut(items).unwrap();
        let id = {
            let mut column = table.create_column("id", DataType::Integer).unwrap();
            column.mark_as_nullable(false).unwrap();
            column.id()
        };
        table.set_primary_key([id]).unwrap();
        let err = db.column_mut(id).unwrap().mark_as_nullable(true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    }

    #[test]
    fn test_removed_column_rejects_mutation() {
        let mut db = Database::new(Dialect::postgres());
        let items = table(&mut db);
        let id = db
            .table_mut(items)
            .unwrap()
            .create_column("gone", DataType::Text)
            .unwrap()
            .id();
        assert!(db.table_mut(items).unwrap().remove_column("gone").unwrap());
        assert!(db.is_removed(id).unwrap());
        let err = db.column_mut(id).unwrap().set_type(DataType::Text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ObjectRemoved);
        assert!(db.table(items).unwrap().columns.is_empty());
    }
}
