//! Error types for the schema builder and planner.

use core::fmt;

/// Errors raised by builder calls and by flushing pending changes.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A name is empty or contains characters the dialect cannot use.
    #[error("Invalid name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why the name was rejected.
        reason: String,
    },

    /// A name is already taken in its scope.
    #[error("Name '{name}' is already used in {scope}")]
    DuplicateName {
        /// The colliding name.
        name: String,
        /// Human readable scope (e.g. `schema "main"`).
        scope: String,
    },

    /// A lookup missed.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind of object looked up.
        kind: &'static str,
        /// Name (or id) that was looked up.
        name: String,
    },

    /// A mutation was attempted on a removed object.
    #[error("{0} has been removed")]
    ObjectRemoved(String),

    /// Two types cannot be converted or related.
    #[error("Type incompatibility: {0}")]
    TypeIncompatibility(String),

    /// A structural rule would be broken.
    #[error("Constraint violation on {object}: {message}")]
    ConstraintViolation {
        /// Full name of the offending object.
        object: String,
        /// What went wrong.
        message: String,
    },

    /// An expression references something it must not.
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    /// A dialect configuration could not be loaded.
    #[error("Invalid dialect configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Multiple errors occurred.
    #[error("Multiple errors occurred:\n{}", .0.iter().map(|e| format!("  - {e}")).collect::<Vec<_>>().join("\n"))]
    Multiple(Vec<SchemaError>),
}

/// Error kinds, independent of their payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`SchemaError::InvalidName`].
    InvalidName,
    /// See [`SchemaError::DuplicateName`].
    DuplicateName,
    /// See [`SchemaError::NotFound`].
    NotFound,
    /// See [`SchemaError::ObjectRemoved`].
    ObjectRemoved,
    /// See [`SchemaError::TypeIncompatibility`].
    TypeIncompatibility,
    /// See [`SchemaError::ConstraintViolation`].
    ConstraintViolation,
    /// See [`SchemaError::InvalidExpression`].
    InvalidExpression,
    /// See [`SchemaError::Config`].
    Config,
    /// A [`SchemaError::Multiple`] whose members have different kinds.
    Multiple,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl SchemaError {
    /// Returns the kind of this error.
    ///
    /// An aggregate reports the kind shared by all of its members, or
    /// [`ErrorKind::Multiple`] if they differ.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidName { .. } => ErrorKind::InvalidName,
            Self::DuplicateName { .. } => ErrorKind::DuplicateName,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ObjectRemoved(_) => ErrorKind::ObjectRemoved,
            Self::TypeIncompatibility(_) => ErrorKind::TypeIncompatibility,
            Self::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            Self::InvalidExpression(_) => ErrorKind::InvalidExpression,
            Self::Config(_) => ErrorKind::Config,
            Self::Multiple(errors) => {
                let mut kinds = errors.iter().map(Self::kind);
                match kinds.next() {
                    Some(first) if kinds.all(|k| k == first) => first,
                    _ => ErrorKind::Multiple,
                }
            }
        }
    }

    /// Returns the individual errors (one for a non-aggregate error).
    #[must_use]
    pub fn errors(&self) -> Vec<&SchemaError> {
        match self {
            Self::Multiple(errors) => errors.iter().flat_map(Self::errors).collect(),
            other => vec![other],
        }
    }

    /// Folds accumulated violations into a result.
    pub fn from_violations(mut violations: Vec<SchemaError>) -> Result<()> {
        match violations.len() {
            0 => Ok(()),
            1 => Err(violations.remove(0)),
            _ => Err(Self::Multiple(violations)),
        }
    }

    pub(crate) fn violation(object: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            object: object.into(),
            message: message.into(),
        }
    }
}

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
