//! Object identifiers and the per-kind definitions stored in the arena.
//!
//! Every schema object lives in its database's arena and is addressed by an
//! [`ObjectId`]. The typed wrappers ([`TableId`], [`ColumnId`], ...) are what
//! the builder API hands out; they always point at an object of their kind.

use core::fmt;

use crate::expr::{Expr, ViewQuery};
use crate::types::{DataType, ForeignKeyAction, SortOrder};

/// Identifier of an object inside one [`Database`](crate::Database).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    pub(crate) database: u32,
    pub(crate) slot: u32,
}

impl ObjectId {
    pub(crate) const fn slot(self) -> usize {
        self.slot as usize
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.database, self.slot)
    }
}

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) ObjectId);

        impl $name {
            /// Returns the untyped id.
            #[must_use]
            pub const fn id(self) -> ObjectId {
                self.0
            }
        }

        impl From<$name> for ObjectId {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

typed_id!(
    /// Handle to a schema.
    SchemaId
);
typed_id!(
    /// Handle to a table.
    TableId
);
typed_id!(
    /// Handle to a column.
    ColumnId
);
typed_id!(
    /// Handle to an index.
    IndexId
);
typed_id!(
    /// Handle to a primary key.
    PrimaryKeyId
);
typed_id!(
    /// Handle to a foreign key.
    ForeignKeyId
);
typed_id!(
    /// Handle to a check constraint.
    CheckId
);
typed_id!(
    /// Handle to a view.
    ViewId
);

/// The kind of a schema object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// A schema.
    Schema,
    /// A table.
    Table,
    /// A column.
    Column,
    /// An index.
    Index,
    /// A primary key.
    PrimaryKey,
    /// A foreign key.
    ForeignKey,
    /// A check constraint.
    Check,
    /// A view.
    View,
}

impl ObjectType {
    /// Returns a human readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Schema => "Schema",
            Self::Table => "Table",
            Self::Column => "Column",
            Self::Index => "Index",
            Self::PrimaryKey => "Primary key",
            Self::ForeignKey => "Foreign key",
            Self::Check => "Check",
            Self::View => "View",
        }
    }

    /// Returns whether objects of this type are constraints or indexes of a table.
    #[must_use]
    pub const fn is_table_constraint(self) -> bool {
        matches!(
            self,
            Self::Index | Self::PrimaryKey | Self::ForeignKey | Self::Check
        )
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Definition of a schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaDef {
    /// Live tables, in creation order.
    pub tables: Vec<TableId>,
    /// Live views, in creation order.
    pub views: Vec<ViewId>,
    /// Whether this is the database's default schema.
    pub is_default: bool,
}

/// Definition of a table.
#[derive(Debug, Clone, Default)]
pub struct TableDef {
    /// Columns in declaration order.
    pub columns: Vec<ColumnId>,
    /// Indexes (including the one wrapped by the primary key).
    pub indexes: Vec<IndexId>,
    /// The primary key, if any.
    pub primary_key: Option<PrimaryKeyId>,
    /// Outgoing foreign keys.
    pub foreign_keys: Vec<ForeignKeyId>,
    /// Check constraints.
    pub checks: Vec<CheckId>,
}

/// Definition of a column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Data type.
    pub data_type: DataType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Default value expression.
    pub default: Option<Expr>,
}

/// One key column of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexColumn {
    /// The indexed column.
    pub column: ColumnId,
    /// Sort direction.
    pub order: SortOrder,
}

impl IndexColumn {
    /// Creates a descending key column.
    #[must_use]
    pub const fn desc(column: ColumnId) -> Self {
        Self {
            column,
            order: SortOrder::Desc,
        }
    }
}

impl From<ColumnId> for IndexColumn {
    fn from(column: ColumnId) -> Self {
        Self {
            column,
            order: SortOrder::Asc,
        }
    }
}

/// Definition of an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDef {
    /// Key columns in order.
    pub columns: Vec<IndexColumn>,
    /// Whether the key is unique.
    pub unique: bool,
    /// Virtual indexes exist only in the model and are never materialized.
    pub is_virtual: bool,
    /// Partial index condition.
    pub filter: Option<Expr>,
    /// The primary key wrapping this index, if any.
    pub primary_key: Option<PrimaryKeyId>,
    /// Whether the index was created implicitly by its primary key.
    pub(crate) implicit: bool,
}

impl IndexDef {
    /// Returns whether the index exists as its own object in the database.
    #[must_use]
    pub const fn is_materialized(&self) -> bool {
        !self.is_virtual && self.primary_key.is_none()
    }

    /// Returns the key column ids.
    pub fn column_ids(&self) -> impl Iterator<Item = ColumnId> + '_ {
        self.columns.iter().map(|c| c.column)
    }
}

/// Definition of a primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryKeyDef {
    /// The wrapped unique index.
    pub index: IndexId,
}

/// Definition of a foreign key.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyDef {
    /// Index over the referencing columns.
    pub origin: IndexId,
    /// Unique index over the referenced columns.
    pub referenced: IndexId,
    /// ON DELETE behavior.
    pub on_delete: ForeignKeyAction,
    /// ON UPDATE behavior.
    pub on_update: ForeignKeyAction,
}

/// Definition of a check constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckDef {
    /// Boolean condition.
    pub condition: Expr,
    /// Opaque suffix used by the default name; fixed for the check's lifetime.
    pub(crate) name_suffix: String,
}

/// Definition of a view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewDef {
    /// The view's query.
    pub query: ViewQuery,
}

#[derive(Debug, Clone)]
pub(crate) enum ObjectKind {
    Schema(SchemaDef),
    Table(TableDef),
    Column(ColumnDef),
    Index(IndexDef),
    PrimaryKey(PrimaryKeyDef),
    ForeignKey(ForeignKeyDef),
    Check(CheckDef),
    View(ViewDef),
}

impl ObjectKind {
    pub(crate) const fn object_type(&self) -> ObjectType {
        match self {
            Self::Schema(_) => ObjectType::Schema,
            Self::Table(_) => ObjectType::Table,
            Self::Column(_) => ObjectType::Column,
            Self::Index(_) => ObjectType::Index,
            Self::PrimaryKey(_) => ObjectType::PrimaryKey,
            Self::ForeignKey(_) => ObjectType::ForeignKey,
            Self::Check(_) => ObjectType::Check,
            Self::View(_) => ObjectType::View,
        }
    }
}

/// An arena entry.
#[derive(Debug, Clone)]
pub(crate) struct Object {
    pub(crate) name: String,
    /// Schema for tables and views, table for columns and constraints.
    pub(crate) parent: Option<ObjectId>,
    pub(crate) removed: bool,
    pub(crate) kind: ObjectKind,
}

impl Object {
    pub(crate) const fn object_type(&self) -> ObjectType {
        self.kind.object_type()
    }
}
