use crate::changes::{FieldChange, Transition};
use crate::error::{Result, SchemaError};
use crate::expr::Expr;
use crate::graph::Role;
use crate::object::TableId;

use super::IndexMut;

impl IndexMut<'_> {
    /// Returns the owning table.
    pub fn table(&self) -> Result<TableId> {
        self.db.table_of(self.id)
    }

    /// Renames the index to its derived default name.
    pub fn set_default_name(&mut self) -> Result<&mut Self> {
        self.db.rename_to_default(self.id.id())?;
        Ok(self)
    }

    fn violation(&self, message: &str) -> Result<SchemaError> {
        Ok(SchemaError::violation(self.db.full_name(self.id)?, message))
    }

    /// Makes the index unique or not.
    ///
    /// A virtual index cannot be unique, and an index backing a primary key
    /// or referenced by a foreign key cannot lose uniqueness.
    pub fn mark_as_unique(&mut self, unique: bool) -> Result<&mut Self> {
        self.db.ensure_live(self.id.id())?;
        let def = self.db.index(self.id)?;
        if unique && def.is_virtual {
            return Err(self.violation("a virtual index cannot be unique")?);
        }
        if !unique && self.db.is_key_target(self.id)? {
            return Err(self.violation("a key index must stay unique")?);
        }

        let old = std::mem::replace(&mut self.db.index_def_mut(self.id)?.unique, unique);
        self.db.tracker.changed(
            self.id.id(),
            FieldChange::Uniqueness(Transition::new(old, unique)),
        );
        Ok(self)
    }

    /// Makes the index virtual (model-only) or materialized.
    pub fn mark_as_virtual(&mut self, is_virtual: bool) -> Result<&mut Self> {
        self.db.ensure_live(self.id.id())?;
        if is_virtual {
            let def = self.db.index(self.id)?;
            let mut violations = Vec::new();
            if def.unique {
                violations.push(self.violation("a unique index cannot be virtual")?);
            }
            if def.filter.is_some() {
                violations.push(self.violation("a filtered index cannot be virtual")?);
            }
            if self.db.is_key_target(self.id)? {
                violations.push(self.violation("a key index cannot be virtual")?);
            }
            SchemaError::from_violations(violations)?;
        }

        let old = std::mem::replace(&mut self.db.index_def_mut(self.id)?.is_virtual, is_virtual);
        self.db.tracker.changed(
            self.id.id(),
            FieldChange::Virtuality(Transition::new(old, is_virtual)),
        );
        Ok(self)
    }

    /// Sets or clears the partial index condition.
    pub fn set_filter(&mut self, filter: Option<Expr>) -> Result<&mut Self> {
        self.db.ensure_live(self.id.id())?;
        if let Some(condition) = &filter {
            let def = self.db.index(self.id)?;
            let mut violations = Vec::new();
            if def.is_virtual {
                violations.push(self.violation("a virtual index cannot be filtered")?);
            }
            if self.db.is_key_target(self.id)? {
                violations.push(self.violation("a key index cannot be filtered")?);
            }
            let table = self.db.table_of(self.id)?;
            self.db
                .validate_table_expression(table, condition, "index filter", &mut violations);
            SchemaError::from_violations(violations)?;
        }

        let columns = filter
            .as_ref()
            .map(|f| f.referenced_columns())
            .unwrap_or_default();
        let old = std::mem::replace(&mut self.db.index_def_mut(self.id)?.filter, filter.clone());
        self.db.graph.replace_references(
            self.id.id(),
            Role::IndexFilter,
            columns.into_iter().map(|c| c.id()),
        );
        self.db
            .tracker
            .changed(self.id.id(), FieldChange::Filter(Transition::new(old, filter)));
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::database::Database;
    use crate::dialect::Dialect;
    use crate::error::ErrorKind;
    use crate::object::{ColumnId, IndexId};
    use crate::types::DataType;

    use super::*;

    fn setup() -> (Database, TableId, ColumnId, IndexId) {
        let mut db = Database::new(Dialect::postgres());
        let schema = db.default_schema();
        let mut schema = db.schema_mut(schema).unwrap();
        let mut table = schema.create_table("accounts").unwrap();
        let email = table.create_column("email", DataType::Text).unwrap().id();
        let index = table.create_index([email], false).unwrap().id();
        let table = table.id();
        (db, table, email, index)
    }

    #[test]
    fn test_virtual_and_unique_are_exclusive() {
        let (mut db, _, _, index) = setup();
        let mut handle = db.index_mut(index).unwrap();
        handle.mark_as_virtual(true).unwrap();
        let err = handle.mark_as_unique(true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        handle.mark_as_virtual(false).unwrap().mark_as_unique(true).unwrap();
        let err = handle.mark_as_virtual(true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    }

    #[test]
    fn test_referenced_index_keeps_uniqueness() {
        let (mut db, accounts, email, index) = setup();
        db.index_mut(index).unwrap().mark_as_unique(true).unwrap();
        let alias = db
            .table_mut(accounts)
            .unwrap()
            .create_column("alias", DataType::Text)
            .unwrap()
            .id();
        db.table_mut(accounts)
            .unwrap()
            .create_foreign_key_on([alias], index)
            .unwrap();

        let mut handle = db.index_mut(index).unwrap();
        assert!(handle.mark_as_unique(false).is_err());
        let err = handle
            .set_filter(Some(Expr::col(email).is_not_null()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    }

    #[test]
    fn test_filter_updates_references() {
        let (mut db, accounts, email, index) = setup();
        let active = db
            .table_mut(accounts)
            .unwrap()
            .create_column("active", DataType::Boolean)
            .unwrap()
            .id();
        db.index_mut(index)
            .unwrap()
            .set_filter(Some(Expr::col(active).eq(Expr::lit(true))))
            .unwrap();
        assert!(db.referencing_objects(active).unwrap().contains(&index.id()));

        let err = db.table_mut(accounts).unwrap().remove_column("active").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);

        db.index_mut(index).unwrap().set_filter(None).unwrap();
        assert!(db.referencing_objects(active).unwrap().is_empty());
        assert!(db.referencing_objects(email).unwrap().contains(&index.id()));
        assert!(db.table_mut(accounts).unwrap().remove_column("active").unwrap());
    }

    #[test]
    fn test_set_default_name_follows_columns() {
        let (mut db, _, email, index) = setup();
        db.column_mut(email).unwrap().set_name("mail").unwrap();
        assert_eq!(db.name(index).unwrap(), "IX_accounts_email");
        db.index_mut(index).unwrap().set_default_name().unwrap();
        assert_eq!(db.name(index).unwrap(), "IX_accounts_mail");
    }
}
