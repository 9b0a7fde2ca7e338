use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::database::Database;
use crate::object::{ObjectId, ObjectType};

use super::{ChangeRecord, Field, FieldChange};

/// Net change of one field together with the log position of its last edit.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NetChange {
    pub(crate) change: FieldChange,
    pub(crate) seq: usize,
}

/// The net effect of a change log.
#[derive(Debug, Default)]
pub(crate) struct Reconciled {
    /// Objects created in the window and still alive, with their log position.
    created: BTreeMap<ObjectId, usize>,
    /// Objects that existed before the window and were removed, in log order.
    removed: Vec<ObjectId>,
    removed_set: HashSet<ObjectId>,
    /// Non-identity field changes of objects that existed before the window
    /// and still exist.
    changes: BTreeMap<ObjectId, BTreeMap<Field, NetChange>>,
    /// Field changes of removed objects, kept for their start values.
    removed_changes: HashMap<ObjectId, BTreeMap<Field, NetChange>>,
    /// Names objects carried when the window opened.
    original_names: HashMap<ObjectId, String>,
}

impl Reconciled {
    pub(crate) fn is_empty(&self) -> bool {
        self.created.is_empty() && self.removed.is_empty() && self.changes.is_empty()
    }

    pub(crate) fn is_created(&self, id: impl Into<ObjectId>) -> bool {
        self.created.contains_key(&id.into())
    }

    pub(crate) fn created_seq(&self, id: impl Into<ObjectId>) -> Option<usize> {
        self.created.get(&id.into()).copied()
    }

    pub(crate) fn created(&self) -> impl Iterator<Item = (ObjectId, usize)> + '_ {
        self.created.iter().map(|(id, seq)| (*id, *seq))
    }

    pub(crate) fn removed(&self) -> &[ObjectId] {
        &self.removed
    }

    pub(crate) fn is_removed(&self, id: impl Into<ObjectId>) -> bool {
        self.removed_set.contains(&id.into())
    }

    /// Net change of one field, for live and removed objects alike.
    pub(crate) fn change(&self, id: impl Into<ObjectId>, field: Field) -> Option<&NetChange> {
        let id = id.into();
        self.changes
            .get(&id)
            .or_else(|| self.removed_changes.get(&id))
            .and_then(|fields| fields.get(&field))
    }

    pub(crate) fn changes_of(&self, id: impl Into<ObjectId>) -> impl Iterator<Item = &NetChange> {
        self.changes.get(&id.into()).into_iter().flat_map(BTreeMap::values)
    }

    pub(crate) fn changed(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.changes.keys().copied()
    }

    /// Whether the object existed before the window and still exists.
    pub(crate) fn existed(&self, id: impl Into<ObjectId>, db: &Database) -> bool {
        let id = id.into();
        !self.is_created(id) && !db.is_removed(id).unwrap_or(true)
    }

    /// Name of the object when the window opened.
    pub(crate) fn original_name(&self, id: impl Into<ObjectId>, db: &Database) -> String {
        let id = id.into();
        match self.original_names.get(&id) {
            Some(name) => name.clone(),
            None => db.name(id).map(str::to_string).unwrap_or_default(),
        }
    }

    /// Whether the object's name differs from its name when the window opened.
    pub(crate) fn is_renamed(&self, id: impl Into<ObjectId>) -> bool {
        self.change(id, Field::Name).is_some()
    }
}

/// The table owning a column or table constraint.
fn owning_table(db: &Database, id: ObjectId) -> Option<ObjectId> {
    let object_type = db.object_type(id).ok()?;
    if object_type == ObjectType::Column || object_type.is_table_constraint() {
        db.parent(id).ok().flatten()
    } else {
        None
    }
}

/// Folds a change log into its net effect.
///
/// - Changes of the same field fold into one change from the first old value
///   to the last new value; identity results vanish.
/// - An object created and removed in the window leaves no trace.
/// - Records of columns and constraints whose table was created or removed in
///   the window are covered by the table's own record.
pub(crate) fn reconcile(log: &[ChangeRecord], db: &Database) -> Reconciled {
    let mut created_in_window = HashSet::new();
    let mut removed_in_window = HashSet::new();
    let mut original_names = HashMap::new();
    for record in log {
        match record {
            ChangeRecord::Created(id) => {
                created_in_window.insert(*id);
            }
            ChangeRecord::Removed(id) => {
                removed_in_window.insert(*id);
            }
            ChangeRecord::Changed(id, FieldChange::Name(t)) => {
                original_names.entry(*id).or_insert_with(|| t.old.clone());
            }
            ChangeRecord::Changed(..) => {}
        }
    }

    let subsumed: BTreeSet<ObjectId> = log
        .iter()
        .map(ChangeRecord::object)
        .filter(|id| {
            owning_table(db, *id).is_some_and(|table| {
                created_in_window.contains(&table) || removed_in_window.contains(&table)
            })
        })
        .collect();

    let mut result = Reconciled {
        original_names,
        ..Reconciled::default()
    };
    for (seq, record) in log.iter().enumerate() {
        let id = record.object();
        if subsumed.contains(&id) {
            continue;
        }
        let created = created_in_window.contains(&id);
        let removed = removed_in_window.contains(&id);
        match record {
            ChangeRecord::Created(_) if !removed => {
                result.created.insert(id, seq);
            }
            ChangeRecord::Removed(_) if !created => {
                if result.removed_set.insert(id) {
                    result.removed.push(id);
                }
            }
            ChangeRecord::Changed(_, change) if !created => {
                let fields = if removed {
                    result.removed_changes.entry(id).or_default()
                } else {
                    result.changes.entry(id).or_default()
                };
                let net = match fields.remove(&change.field()) {
                    Some(previous) => previous.change.merge(change.clone()),
                    None => change.clone(),
                };
                fields.insert(net.field(), NetChange { change: net, seq });
            }
            _ => {}
        }
    }

    for fields in result
        .changes
        .values_mut()
        .chain(result.removed_changes.values_mut())
    {
        fields.retain(|_, net| !net.change.is_identity());
    }
    result.changes.retain(|_, fields| !fields.is_empty());
    result.removed_changes.retain(|_, fields| !fields.is_empty());
    result
}

#[cfg(test)]
mod tests {
    use crate::changes::Transition;
    use crate::dialect::Dialect;
    use crate::object::TableId;
    use crate::types::DataType;

    use super::*;

    fn baseline() -> (Database, TableId) {
        let mut db = Database::new(Dialect::postgres());
        let schema = db.default_schema();
        let table = {
            let mut schema = db.schema_mut(schema).unwrap();
            let mut table = schema.create_table("t").unwrap();
            table.create_column("a", DataType::Integer).unwrap();
            table.id()
        };
        db.pending_actions().unwrap();
        (db, table)
    }

    #[test]
    fn test_rename_and_back_is_identity() {
        let (mut db, table) = baseline();
        db.table_mut(table).unwrap().set_name("u").unwrap();
        db.table_mut(table).unwrap().set_name("t").unwrap();
        assert_eq!(db.tracker.log.len(), 2);
        assert!(reconcile(&db.tracker.log, &db).is_empty());
    }

    #[test]
    fn test_changes_fold_to_first_old_last_new() {
        let (mut db, table) = baseline();
        db.table_mut(table).unwrap().set_name("u").unwrap();
        db.table_mut(table).unwrap().set_name("v").unwrap();
        let reconciled = reconcile(&db.tracker.log, &db);
        let net = reconciled.change(table, Field::Name).unwrap();
        assert_eq!(
            net.change,
            FieldChange::Name(Transition::new("t".into(), "v".into()))
        );
        assert_eq!(net.seq, 1);
        assert_eq!(reconciled.original_name(table, &db), "t");
    }

    #[test]
    fn test_created_then_removed_cancels() {
        let (mut db, table) = baseline();
        let column = db
            .table_mut(table)
            .unwrap()
            .create_column("b", DataType::Text)
            .unwrap()
            .id();
        db.column_mut(column).unwrap().set_name("c").unwrap();
        db.column_mut(column).unwrap().remove().unwrap();
        assert!(reconcile(&db.tracker.log, &db).is_empty());
    }

    #[test]
    fn test_children_of_created_table_are_subsumed() {
        let (mut db, _) = baseline();
        let schema = db.default_schema();
        let (table, column) = {
            let mut schema = db.schema_mut(schema).unwrap();
            let mut table = schema.create_table("n").unwrap();
            let column = table.create_column("x", DataType::Integer).unwrap().id();
            (table.id(), column)
        };
        db.column_mut(column).unwrap().set_type(DataType::Bigint).unwrap();
        let reconciled = reconcile(&db.tracker.log, &db);
        assert!(reconciled.is_created(table));
        assert!(!reconciled.is_created(column));
        assert!(reconciled.changed().next().is_none());
    }

    #[test]
    fn test_removed_objects_keep_start_values() {
        let (mut db, table) = baseline();
        let column = db.table(table).unwrap().columns[0];
        db.column_mut(column).unwrap().set_type(DataType::Text).unwrap();
        db.column_mut(column).unwrap().remove().unwrap();
        let reconciled = reconcile(&db.tracker.log, &db);
        assert_eq!(reconciled.removed(), &[column.id()]);
        assert!(reconciled.changed().next().is_none());
        assert!(reconciled.change(column, Field::Type).is_some());
    }
}
