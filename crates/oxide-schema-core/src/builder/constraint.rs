use crate::changes::{FieldChange, Transition};
use crate::error::{Result, SchemaError};
use crate::expr::Expr;
use crate::graph::Role;
use crate::object::{ColumnId, IndexId, TableId};
use crate::types::ForeignKeyAction;

use super::{CheckMut, ForeignKeyMut, PrimaryKeyMut};

macro_rules! constraint_common {
    ($($handle:ident),*) => {
        $(
            impl $handle<'_> {
                /// Returns the owning table.
                pub fn table(&self) -> Result<TableId> {
                    self.db.table_of(self.id)
                }

                /// Renames the constraint to its derived default name.
                pub fn set_default_name(&mut self) -> Result<&mut Self> {
                    self.db.rename_to_default(self.id.id())?;
                    Ok(self)
                }
            }
        )*
    };
}

constraint_common!(PrimaryKeyMut, ForeignKeyMut, CheckMut);

impl PrimaryKeyMut<'_> {
    /// Returns the wrapped unique index.
    pub fn index(&self) -> Result<IndexId> {
        Ok(self.db.primary_key(self.id)?.index)
    }
}

impl ForeignKeyMut<'_> {
    fn origin_columns(&self) -> Result<Vec<ColumnId>> {
        let origin = self.db.foreign_key(self.id)?.origin;
        Ok(self.db.index(origin)?.column_ids().collect())
    }

    fn check_actions(&self, actions: [ForeignKeyAction; 2]) -> Result<()> {
        let table = self.db.table_of(self.id)?;
        let referenced = self.db.foreign_key(self.id)?.referenced;
        let mut violations = Vec::new();
        self.db.validate_foreign_key(
            table,
            &self.origin_columns()?,
            referenced,
            actions,
            &mut violations,
        )?;
        SchemaError::from_violations(violations)
    }

    /// Sets the ON DELETE action.
    pub fn set_on_delete(&mut self, action: ForeignKeyAction) -> Result<&mut Self> {
        self.db.ensure_live(self.id.id())?;
        self.check_actions([action, self.db.foreign_key(self.id)?.on_update])?;

        let old = std::mem::replace(&mut self.db.foreign_key_def_mut(self.id)?.on_delete, action);
        self.db.tracker.changed(
            self.id.id(),
            FieldChange::OnDelete(Transition::new(old, action)),
        );
        Ok(self)
    }

    /// Sets the ON UPDATE action.
    pub fn set_on_update(&mut self, action: ForeignKeyAction) -> Result<&mut Self> {
        self.db.ensure_live(self.id.id())?;
        self.check_actions([self.db.foreign_key(self.id)?.on_delete, action])?;

        let old = std::mem::replace(&mut self.db.foreign_key_def_mut(self.id)?.on_update, action);
        self.db.tracker.changed(
            self.id.id(),
            FieldChange::OnUpdate(Transition::new(old, action)),
        );
        Ok(self)
    }

    /// Points the key at another unique index.
    pub fn set_referenced_index(&mut self, referenced: IndexId) -> Result<&mut Self> {
        self.db.ensure_live(self.id.id())?;
        let def = self.db.foreign_key(self.id)?;
        let actions = [def.on_delete, def.on_update];
        let table = self.db.table_of(self.id)?;
        let mut violations = Vec::new();
        self.db.validate_foreign_key(
            table,
            &self.origin_columns()?,
            referenced,
            actions,
            &mut violations,
        )?;
        SchemaError::from_violations(violations)?;

        let old = std::mem::replace(
            &mut self.db.foreign_key_def_mut(self.id)?.referenced,
            referenced,
        );
        self.db.graph.replace_references(
            self.id.id(),
            Role::ForeignKeyTarget,
            [referenced.id()],
        );
        self.db
            .tracker
            .changed(self.id.id(), FieldChange::Target(Transition::new(old, referenced)));
        Ok(self)
    }
}

impl CheckMut<'_> {
    /// Replaces the condition.
    pub fn set_condition(&mut self, condition: Expr) -> Result<&mut Self> {
        self.db.ensure_live(self.id.id())?;
        let table = self.db.table_of(self.id)?;
        let mut violations = Vec::new();
        self.db
            .validate_table_expression(table, &condition, "check condition", &mut violations);
        SchemaError::from_violations(violations)?;

        let columns = condition.referenced_columns();
        let old = std::mem::replace(
            &mut self.db.check_def_mut(self.id)?.condition,
            condition.clone(),
        );
        self.db.graph.replace_references(
            self.id.id(),
            Role::CheckCondition,
            columns.into_iter().map(|c| c.id()),
        );
        self.db
            .tracker
            .changed(self.id.id(), FieldChange::Condition(Transition::new(old, condition)));
        Ok(self)
    }
}
