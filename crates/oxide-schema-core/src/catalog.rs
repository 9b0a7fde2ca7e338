//! Object catalog: the authoritative name registry of a database.
//!
//! Names live in scopes. Schemas are registered in the database scope;
//! tables, views, indexes and constraints of a schema share that schema's
//! scope; columns are registered in their table's scope. Lookups are
//! case-insensitive, display case is kept on the object itself.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Result, SchemaError};
use crate::name::catalog_key;
use crate::object::ObjectId;

/// A naming scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Scope {
    /// Schemas of the database.
    Database,
    /// Tables, views, indexes and constraints of a schema.
    Schema(ObjectId),
    /// Columns of a table.
    Table(ObjectId),
}

#[derive(Debug, Default)]
pub(crate) struct Catalog {
    scopes: HashMap<Scope, BTreeMap<String, ObjectId>>,
}

impl Catalog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the object registered under `name`.
    pub(crate) fn get(&self, scope: Scope, name: &str) -> Option<ObjectId> {
        self.scopes
            .get(&scope)
            .and_then(|names| names.get(&catalog_key(name)))
            .copied()
    }

    pub(crate) fn contains(&self, scope: Scope, name: &str) -> bool {
        self.get(scope, name).is_some()
    }

    /// Fails with `DuplicateName` if `name` is taken by anything but `except`.
    pub(crate) fn check_available(
        &self,
        scope: Scope,
        name: &str,
        except: Option<ObjectId>,
        scope_label: impl FnOnce() -> String,
    ) -> Result<()> {
        match self.get(scope, name) {
            Some(existing) if Some(existing) != except => Err(SchemaError::DuplicateName {
                name: name.to_string(),
                scope: scope_label(),
            }),
            _ => Ok(()),
        }
    }

    /// Registers `id` under `name`; the caller has checked availability.
    pub(crate) fn insert(&mut self, scope: Scope, name: &str, id: ObjectId) {
        self.scopes
            .entry(scope)
            .or_default()
            .insert(catalog_key(name), id);
    }

    /// Unregisters `name` if it belongs to `id`.
    pub(crate) fn remove(&mut self, scope: Scope, name: &str, id: ObjectId) -> bool {
        let Some(names) = self.scopes.get_mut(&scope) else {
            return false;
        };
        let key = catalog_key(name);
        if names.get(&key) == Some(&id) {
            names.remove(&key);
            if names.is_empty() {
                self.scopes.remove(&scope);
            }
            true
        } else {
            false
        }
    }

    /// Moves `id` from `old` to `new`; the caller has checked availability.
    pub(crate) fn rename(&mut self, scope: Scope, old: &str, new: &str, id: ObjectId) {
        self.remove(scope, old, id);
        self.insert(scope, new, id);
    }

    /// Drops a whole scope (used when its owner is removed).
    pub(crate) fn drop_scope(&mut self, scope: Scope) {
        self.scopes.remove(&scope);
    }

    /// Returns all ids registered in a scope, ordered by key.
    pub(crate) fn entries(&self, scope: Scope) -> impl Iterator<Item = (&str, ObjectId)> {
        self.scopes
            .get(&scope)
            .into_iter()
            .flat_map(|names| names.iter().map(|(k, v)| (k.as_str(), *v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(slot: u32) -> ObjectId {
        ObjectId { database: 0, slot }
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let mut catalog = Catalog::new();
        catalog.insert(Scope::Database, "Main", id(1));
        assert_eq!(catalog.get(Scope::Database, "main"), Some(id(1)));
        assert!(catalog.contains(Scope::Database, "MAIN"));
    }

    #[test]
    fn test_check_available_ignores_own_slot() {
        let mut catalog = Catalog::new();
        let scope = Scope::Schema(id(0));
        catalog.insert(scope, "users", id(1));
        assert!(catalog
            .check_available(scope, "Users", Some(id(1)), String::new)
            .is_ok());
        let err = catalog
            .check_available(scope, "users", Some(id(2)), || "schema".into())
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateName { .. }));
    }

    #[test]
    fn test_rename_moves_slot() {
        let mut catalog = Catalog::new();
        let scope = Scope::Table(id(0));
        catalog.insert(scope, "a", id(1));
        catalog.rename(scope, "a", "b", id(1));
        assert!(!catalog.contains(scope, "a"));
        assert_eq!(catalog.get(scope, "b"), Some(id(1)));
    }

    #[test]
    fn test_remove_only_owner() {
        let mut catalog = Catalog::new();
        catalog.insert(Scope::Database, "a", id(1));
        assert!(!catalog.remove(Scope::Database, "a", id(2)));
        assert!(catalog.remove(Scope::Database, "a", id(1)));
        assert_eq!(catalog.entries(Scope::Database).count(), 0);
    }
}
