//! Column data types, foreign key actions and literal values.

use core::fmt;

use serde::{Deserialize, Serialize};

/// SQL data types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    // Integer types
    /// Small integer (2 bytes).
    Smallint,
    /// Integer (4 bytes).
    Integer,
    /// Big integer (8 bytes).
    Bigint,

    // Floating point
    /// Real (4-byte float).
    Real,
    /// Double precision (8-byte float).
    Double,
    /// Decimal with precision and scale.
    Decimal {
        /// Total number of digits.
        precision: Option<u16>,
        /// Number of digits after decimal point.
        scale: Option<u16>,
    },

    // String types
    /// Fixed-length character string.
    Char(Option<u32>),
    /// Variable-length character string.
    Varchar(Option<u32>),
    /// Text (variable length, no limit).
    Text,

    // Binary types
    /// Binary large object.
    Blob,
    /// Variable-length binary.
    Varbinary(Option<u32>),

    // Date/time types
    /// Date.
    Date,
    /// Time.
    Time,
    /// Timestamp.
    Timestamp,

    // Boolean
    /// Boolean.
    Boolean,

    /// Custom type (for database-specific types).
    Custom(String),
}

/// Broad grouping of data types used for conversion and key compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    /// Whole numbers.
    Integer,
    /// Floating point and fixed point numbers.
    Numeric,
    /// Character data.
    Text,
    /// Byte strings.
    Binary,
    /// Dates and times.
    Temporal,
    /// Booleans.
    Boolean,
    /// Anything the model does not understand.
    Custom,
}

impl DataType {
    /// Returns the family of this type.
    #[must_use]
    pub const fn family(&self) -> TypeFamily {
        match self {
            Self::Smallint | Self::Integer | Self::Bigint => TypeFamily::Integer,
            Self::Real | Self::Double | Self::Decimal { .. } => TypeFamily::Numeric,
            Self::Char(_) | Self::Varchar(_) | Self::Text => TypeFamily::Text,
            Self::Blob | Self::Varbinary(_) => TypeFamily::Binary,
            Self::Date | Self::Time | Self::Timestamp => TypeFamily::Temporal,
            Self::Boolean => TypeFamily::Boolean,
            Self::Custom(_) => TypeFamily::Custom,
        }
    }

    /// Returns whether existing values of this type can be cast to `target`.
    #[must_use]
    pub fn can_convert_to(&self, target: &Self) -> bool {
        use TypeFamily as F;
        match (self.family(), target.family()) {
            (a, b) if a == b => match (self, target) {
                (Self::Custom(a), Self::Custom(b)) => a.eq_ignore_ascii_case(b),
                _ => true,
            },
            (_, F::Text) | (F::Text, _) => true,
            (F::Integer | F::Numeric | F::Boolean, F::Integer | F::Numeric | F::Boolean) => true,
            _ => false,
        }
    }

    /// Returns whether a foreign key may relate a column of this type to a
    /// column of type `other`.
    #[must_use]
    pub fn is_key_compatible(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Custom(a), Self::Custom(b)) => a.eq_ignore_ascii_case(b),
            _ => self.family() == other.family(),
        }
    }

    /// Returns whether a literal can be stored in a column of this type.
    #[must_use]
    pub fn accepts(&self, value: &SqlValue) -> bool {
        use TypeFamily as F;
        match (value.family(), self.family()) {
            (None, _) | (_, F::Text | F::Custom) => true,
            (Some(a), b) if a == b => true,
            (Some(F::Integer | F::Numeric | F::Boolean), F::Integer | F::Numeric | F::Boolean) => {
                true
            }
            (Some(F::Text), F::Temporal) => true,
            _ => false,
        }
    }

    /// Returns the value existing rows receive when the column becomes
    /// mandatory and no default is declared.
    #[must_use]
    pub fn zero_value(&self) -> SqlValue {
        match self.family() {
            TypeFamily::Integer => SqlValue::Int(0),
            TypeFamily::Numeric => SqlValue::Float(0.0),
            TypeFamily::Text | TypeFamily::Custom => SqlValue::Text(String::new()),
            TypeFamily::Binary => SqlValue::Blob(Vec::new()),
            TypeFamily::Boolean => SqlValue::Bool(false),
            TypeFamily::Temporal => match self {
                Self::Date => SqlValue::Text("1970-01-01".to_string()),
                Self::Time => SqlValue::Text("00:00:00".to_string()),
                _ => SqlValue::Text("1970-01-01 00:00:00".to_string()),
            },
        }
    }

    /// Returns the generic SQL spelling of the type.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Smallint => String::from("SMALLINT"),
            Self::Integer => String::from("INTEGER"),
            Self::Bigint => String::from("BIGINT"),
            Self::Real => String::from("REAL"),
            Self::Double => String::from("DOUBLE"),
            Self::Decimal { precision, scale } => match (precision, scale) {
                (Some(p), Some(s)) => format!("DECIMAL({p}, {s})"),
                (Some(p), None) => format!("DECIMAL({p})"),
                _ => String::from("DECIMAL"),
            },
            Self::Char(len) => match len {
                Some(n) => format!("CHAR({n})"),
                None => String::from("CHAR"),
            },
            Self::Varchar(len) => match len {
                Some(n) => format!("VARCHAR({n})"),
                None => String::from("VARCHAR"),
            },
            Self::Text => String::from("TEXT"),
            Self::Blob => String::from("BLOB"),
            Self::Varbinary(len) => match len {
                Some(n) => format!("VARBINARY({n})"),
                None => String::from("VARBINARY"),
            },
            Self::Date => String::from("DATE"),
            Self::Time => String::from("TIME"),
            Self::Timestamp => String::from("TIMESTAMP"),
            Self::Boolean => String::from("BOOLEAN"),
            Self::Custom(name) => name.clone(),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Foreign key referential action (ON DELETE / ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    /// No action (error if referenced row is deleted/updated).
    #[default]
    NoAction,
    /// Restrict (same as NoAction but checked immediately).
    Restrict,
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Set the referencing columns to NULL.
    SetNull,
    /// Set the referencing columns to their default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// Sort direction of an index column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Ascending (the default).
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// A literal SQL value, used for expression literals and statement parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlValue {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Binary blob value.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns the SQL representation for inline use (escaped).
    #[must_use]
    pub fn to_sql_inline(&self) -> String {
        match self {
            Self::Null => String::from("NULL"),
            Self::Bool(b) => {
                if *b {
                    String::from("TRUE")
                } else {
                    String::from("FALSE")
                }
            }
            Self::Int(n) => format!("{n}"),
            Self::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{f:.1}")
                } else {
                    format!("{f}")
                }
            }
            Self::Text(s) => {
                // Escape single quotes by doubling them
                let escaped = s.replace('\'', "''");
                format!("'{escaped}'")
            }
            Self::Blob(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
                format!("X'{hex}'")
            }
        }
    }

    /// Returns the family of the value, or `None` for NULL.
    #[must_use]
    pub const fn family(&self) -> Option<TypeFamily> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(TypeFamily::Boolean),
            Self::Int(_) => Some(TypeFamily::Integer),
            Self::Float(_) => Some(TypeFamily::Numeric),
            Self::Text(_) => Some(TypeFamily::Text),
            Self::Blob(_) => Some(TypeFamily::Binary),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}
