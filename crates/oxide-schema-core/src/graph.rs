//! Reference graph between schema objects.
//!
//! Edges point from a referencing object to the object it depends on and are
//! tagged with a [`Role`], so the same pair can be linked more than once
//! (an index referencing a column as a key column and inside its filter).
//! Ownership is not recorded here; it follows the arena's parent links.

use std::collections::{BTreeSet, HashMap};

use crate::object::ObjectId;

/// Why one object references another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// Index key column.
    IndexColumn,
    /// Column used in an index filter.
    IndexFilter,
    /// Column used in a check condition.
    CheckCondition,
    /// Index wrapped by a primary key.
    PrimaryKeyIndex,
    /// Referencing index of a foreign key.
    ForeignKeyOrigin,
    /// Referenced index of a foreign key.
    ForeignKeyTarget,
    /// Table, view or column used by a view query.
    ViewSource,
}

type Edge = (ObjectId, Role);

#[derive(Debug, Default)]
pub(crate) struct ReferenceGraph {
    /// subject -> objects referencing it
    referenced_by: HashMap<ObjectId, BTreeSet<Edge>>,
    /// referencer -> objects it references
    references: HashMap<ObjectId, BTreeSet<Edge>>,
}

impl ReferenceGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_reference(&mut self, subject: ObjectId, referenced_by: ObjectId, role: Role) {
        self.referenced_by
            .entry(subject)
            .or_default()
            .insert((referenced_by, role));
        self.references
            .entry(referenced_by)
            .or_default()
            .insert((subject, role));
    }

    pub(crate) fn remove_reference(
        &mut self,
        subject: ObjectId,
        referenced_by: ObjectId,
        role: Role,
    ) -> bool {
        let removed = Self::remove_edge(&mut self.referenced_by, subject, (referenced_by, role));
        Self::remove_edge(&mut self.references, referenced_by, (subject, role));
        removed
    }

    fn remove_edge(map: &mut HashMap<ObjectId, BTreeSet<Edge>>, key: ObjectId, edge: Edge) -> bool {
        let Some(edges) = map.get_mut(&key) else {
            return false;
        };
        let removed = edges.remove(&edge);
        if edges.is_empty() {
            map.remove(&key);
        }
        removed
    }

    /// Objects referencing `subject`, in any role.
    pub(crate) fn referencing_objects(&self, subject: ObjectId) -> BTreeSet<ObjectId> {
        self.referenced_by
            .get(&subject)
            .map(|edges| edges.iter().map(|(id, _)| *id).collect())
            .unwrap_or_default()
    }

    /// Objects referencing `subject` in the given role.
    pub(crate) fn referencing_with_role(&self, subject: ObjectId, role: Role) -> BTreeSet<ObjectId> {
        self.referenced_by
            .get(&subject)
            .map(|edges| {
                edges
                    .iter()
                    .filter(|(_, r)| *r == role)
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Objects `subject` references, in any role.
    pub(crate) fn referenced_objects(&self, subject: ObjectId) -> BTreeSet<ObjectId> {
        self.references
            .get(&subject)
            .map(|edges| edges.iter().map(|(id, _)| *id).collect())
            .unwrap_or_default()
    }

    /// Replaces every edge `referencer` holds in `role` by edges to `subjects`.
    pub(crate) fn replace_references(
        &mut self,
        referencer: ObjectId,
        role: Role,
        subjects: impl IntoIterator<Item = ObjectId>,
    ) {
        let stale: Vec<ObjectId> = self
            .references
            .get(&referencer)
            .map(|edges| {
                edges
                    .iter()
                    .filter(|(_, r)| *r == role)
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default();
        for subject in stale {
            self.remove_reference(subject, referencer, role);
        }
        for subject in subjects {
            self.add_reference(subject, referencer, role);
        }
    }

    /// Removes every edge touching `object`.
    pub(crate) fn detach(&mut self, object: ObjectId) {
        if let Some(edges) = self.references.remove(&object) {
            for (subject, role) in edges {
                Self::remove_edge(&mut self.referenced_by, subject, (object, role));
            }
        }
        if let Some(edges) = self.referenced_by.remove(&object) {
            for (referencer, role) in edges {
                Self::remove_edge(&mut self.references, referencer, (object, role));
            }
        }
    }
}
