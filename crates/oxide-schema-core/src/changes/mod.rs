//! Change tracking.
//!
//! Builder calls append [`ChangeRecord`]s to a database-wide log while the
//! tracker is attached and committing. Flushing folds the log into its net
//! effect ([`reconcile`]) and hands that to the planner.

mod reconcile;
mod rename;

pub(crate) use reconcile::{reconcile, NetChange, Reconciled};
pub(crate) use rename::{solve_renames, Rename};

use tracing::trace;

use crate::action::PendingAction;
use crate::expr::{Expr, ViewQuery};
use crate::object::{IndexId, ObjectId, PrimaryKeyId};
use crate::types::{DataType, ForeignKeyAction};

/// Whether mutations are tracked at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TrackingMode {
    /// Mutations are validated and logged.
    #[default]
    Attached,
    /// Mutations only change the model; the result is accepted as baseline.
    Detached,
}

/// Whether tracked mutations produce actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommitMode {
    /// Logged mutations are planned on flush.
    #[default]
    Commit,
    /// Mutations are validated like attached ones but never produce actions.
    NoChanges,
}

/// Old and new value of a field.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Transition<T> {
    pub(crate) old: T,
    pub(crate) new: T,
}

impl<T> Transition<T> {
    pub(crate) const fn new(old: T, new: T) -> Self {
        Self { old, new }
    }
}

macro_rules! field_changes {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        /// A change of one field of one object.
        #[derive(Debug, Clone, PartialEq)]
        pub(crate) enum FieldChange {
            $($variant(Transition<$ty>),)*
        }

        /// The field a [`FieldChange`] touches.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub(crate) enum Field {
            $($variant,)*
        }

        impl FieldChange {
            pub(crate) const fn field(&self) -> Field {
                match self {
                    $(Self::$variant(_) => Field::$variant,)*
                }
            }

            /// Whether the change leaves the field as it was.
            pub(crate) fn is_identity(&self) -> bool {
                match self {
                    $(Self::$variant(t) => t.old == t.new,)*
                }
            }

            /// Combines this change with a later change of the same field.
            pub(crate) fn merge(self, later: Self) -> Self {
                match (self, later) {
                    $((Self::$variant(first), Self::$variant(last)) => {
                        Self::$variant(Transition::new(first.old, last.new))
                    })*
                    (_, later) => later,
                }
            }
        }
    };
}

field_changes! {
    Name(String),
    Type(DataType),
    Nullability(bool),
    Default(Option<Expr>),
    Uniqueness(bool),
    Virtuality(bool),
    Filter(Option<Expr>),
    PrimaryKey(Option<PrimaryKeyId>),
    Condition(Expr),
    Target(IndexId),
    OnDelete(ForeignKeyAction),
    OnUpdate(ForeignKeyAction),
    Query(ViewQuery),
}

/// One entry of the change log.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ChangeRecord {
    Created(ObjectId),
    Removed(ObjectId),
    Changed(ObjectId, FieldChange),
}

impl ChangeRecord {
    pub(crate) const fn object(&self) -> ObjectId {
        match self {
            Self::Created(id) | Self::Removed(id) | Self::Changed(id, _) => *id,
        }
    }
}

/// Mode flags, the change log and the queue of planned actions.
#[derive(Debug, Default)]
pub(crate) struct ChangeTracker {
    pub(crate) tracking: TrackingMode,
    pub(crate) commit: CommitMode,
    pub(crate) log: Vec<ChangeRecord>,
    pub(crate) ready: Vec<PendingAction>,
}

impl ChangeTracker {
    /// Whether mutations are currently logged.
    pub(crate) fn is_recording(&self) -> bool {
        self.tracking == TrackingMode::Attached && self.commit == CommitMode::Commit
    }

    /// Whether flush-time validation applies.
    pub(crate) fn validates(&self) -> bool {
        self.tracking == TrackingMode::Attached
    }

    pub(crate) fn record(&mut self, record: ChangeRecord) {
        if self.is_recording() {
            trace!(?record, "Recording change");
            self.log.push(record);
        }
    }

    pub(crate) fn changed(&mut self, object: ObjectId, change: FieldChange) {
        if !change.is_identity() {
            self.record(ChangeRecord::Changed(object, change));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_first_old_and_last_new() {
        let first = FieldChange::Name(Transition::new("a".into(), "b".into()));
        let last = FieldChange::Name(Transition::new("b".into(), "a".into()));
        let merged = first.merge(last);
        assert_eq!(merged.field(), Field::Name);
        assert!(merged.is_identity());
    }

    #[test]
    fn test_recording_depends_on_mode() {
        let id = ObjectId { database: 0, slot: 1 };
        let mut tracker = ChangeTracker::default();
        tracker.record(ChangeRecord::Created(id));
        assert_eq!(tracker.log.len(), 1);

        tracker.commit = CommitMode::NoChanges;
        tracker.record(ChangeRecord::Removed(id));
        assert_eq!(tracker.log.len(), 1);
        assert!(tracker.validates());

        tracker.tracking = TrackingMode::Detached;
        assert!(!tracker.validates());
    }

    #[test]
    fn test_identity_change_not_recorded() {
        let id = ObjectId { database: 0, slot: 1 };
        let mut tracker = ChangeTracker::default();
        tracker.changed(id, FieldChange::Nullability(Transition::new(true, true)));
        assert!(tracker.log.is_empty());
    }
}
