use crate::changes::{FieldChange, Transition};
use crate::error::Result;
use crate::expr::ViewQuery;
use crate::graph::Role;
use crate::object::SchemaId;

use super::ViewMut;

impl ViewMut<'_> {
    /// Returns the owning schema.
    pub fn schema(&self) -> Result<SchemaId> {
        self.db.schema_of(self.id)
    }

    /// Replaces the query. The new query may not read this view, directly or
    /// through other views.
    pub fn set_query(&mut self, query: ViewQuery) -> Result<&mut Self> {
        self.db.ensure_live(self.id.id())?;
        self.db.validate_view_query(Some(self.id), &query)?;

        let sources: Vec<_> = query.bindings().iter().map(|b| b.id()).collect();
        let old = std::mem::replace(&mut self.db.view_def_mut(self.id)?.query, query.clone());
        self.db
            .graph
            .replace_references(self.id.id(), Role::ViewSource, sources);
        self.db
            .tracker
            .changed(self.id.id(), FieldChange::Query(Transition::new(old, query)));
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::database::Database;
    use crate::dialect::Dialect;
    use crate::error::ErrorKind;
    use crate::types::DataType;

    use super::*;

    #[test]
    fn test_view_cycles_are_rejected() {
        let mut db = Database::new(Dialect::postgres());
        let schema = db.default_schema();
        let mut schema = db.schema_mut(schema).unwrap();
        let table = {
            let mut table = schema.create_table("t").unwrap();
            table.create_column("a", DataType::Integer).unwrap();
            table.id()
        };
        let first = schema
            .create_view("v1", ViewQuery::new("SELECT * FROM {0}").bind(table))
            .unwrap()
            .id();
        let second = schema
            .create_view("v2", ViewQuery::new("SELECT * FROM {0}").bind(first))
            .unwrap()
            .id();

        let mut view = db.view_mut(first).unwrap();
        let err = view
            .set_query(ViewQuery::new("SELECT * FROM {0}").bind(second))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidExpression);
        let err = view
            .set_query(ViewQuery::new("SELECT * FROM {0}").bind(first))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidExpression);
    }

    #[test]
    fn test_view_referenced_by_view_cannot_be_removed() {
        let mut db = Database::new(Dialect::postgres());
        let schema = db.default_schema();
        let mut schema = db.schema_mut(schema).unwrap();
        let table = schema.create_table("t").unwrap().id();
        let base = schema
            .create_view("base", ViewQuery::new("SELECT 1 FROM {0}").bind(table))
            .unwrap()
            .id();
        schema
            .create_view("top", ViewQuery::new("SELECT * FROM {0}").bind(base))
            .unwrap();

        let err = db.view_mut(base).unwrap().remove().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);

        let other = db
            .schema_mut(db.default_schema())
            .unwrap()
            .create_table("u")
            .unwrap()
            .id();
        db.view_mut(base)
            .unwrap()
            .set_query(ViewQuery::new("SELECT 1 FROM {0}").bind(other))
            .unwrap();
        assert!(db.referencing_objects(table).unwrap().is_empty());
        assert!(db.referencing_objects(other).unwrap().contains(&base.id()));
    }
}
