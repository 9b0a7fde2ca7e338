//! Identifier validation, qualified names and default name derivation.

use core::fmt;

use sha2::{Digest, Sha256};

use crate::error::{Result, SchemaError};

/// A schema-qualified name as it exists in the database at some point in time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    /// Schema name (empty for the unnamed default schema).
    pub schema: String,
    /// Object name.
    pub name: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    #[must_use]
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Returns the single identifier used when schemas are emulated by prefixing.
    #[must_use]
    pub fn flattened(&self) -> String {
        if self.schema.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.flattened())
    }
}

/// Validates an identifier.
///
/// Rejects:
/// - Empty or whitespace-only names (unless `allow_empty` and the name is empty)
/// - Quotes, dots, NUL and control characters
/// - Names longer than `max_length` bytes
pub fn validate_identifier(name: &str, allow_empty: bool, max_length: usize) -> Result<()> {
    let invalid = |reason: &str| SchemaError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return if allow_empty {
            Ok(())
        } else {
            Err(invalid("name cannot be empty"))
        };
    }
    if name.trim().is_empty() {
        return Err(invalid("name cannot be whitespace only"));
    }
    if let Some(c) = name.chars().find(|c| matches!(c, '"' | '.') || c.is_control()) {
        return Err(invalid(&format!("character {c:?} is not allowed")));
    }
    if name.len() > max_length {
        return Err(invalid(&format!(
            "name exceeds maximum length of {max_length} bytes"
        )));
    }
    Ok(())
}

/// Key used for case-insensitive catalog lookups.
pub(crate) fn catalog_key(name: &str) -> String {
    name.to_lowercase()
}

/// Default name of an index.
pub(crate) fn index_name(table: &str, columns: &[&str], unique: bool) -> String {
    let prefix = if unique { "UX" } else { "IX" };
    format!("{prefix}_{table}_{}", columns.join("_"))
}

/// Default name of a primary key.
pub(crate) fn primary_key_name(table: &str) -> String {
    format!("PK_{table}")
}

/// Default name of a foreign key.
pub(crate) fn foreign_key_name(table: &str, columns: &[&str], referenced_table: &str) -> String {
    format!("FK_{table}_{}_{referenced_table}", columns.join("_"))
}

/// Default name of a check constraint.
pub(crate) fn check_name(table: &str, suffix: &str) -> String {
    format!("CK_{table}_{suffix}")
}

/// Opaque suffix for an anonymous check: eight hex digits of a SHA-256 over
/// the table name, the condition and a per-database sequence number.
pub(crate) fn check_suffix(table: &str, condition: &str, sequence: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(table.as_bytes());
    hasher.update([0]);
    hasher.update(condition.as_bytes());
    hasher.update(sequence.to_le_bytes());
    let digest = hasher.finalize();
    digest[..4].iter().map(|b| format!("{b:02x}")).collect()
}

/// Trims a derived name to the identifier length limit without splitting a
/// UTF-8 sequence.
pub(crate) fn truncate(mut name: String, max_length: usize) -> String {
    if name.len() > max_length {
        let mut cut = max_length;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        name.truncate(cut);
    }
    name
}

/// Returns `base`, or `base_N` for the smallest `N` that `is_free` accepts.
pub(crate) fn disambiguate(base: &str, is_free: impl Fn(&str) -> bool) -> String {
    if is_free(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| is_free(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Returns a name derived from `base` with a random suffix that `is_free` accepts.
pub(crate) fn temporary(base: &str, is_free: impl Fn(&str) -> bool) -> String {
    loop {
        let candidate = format!("{base}_{:08x}", rand::random::<u32>());
        if is_free(&candidate) {
            return candidate;
        }
    }
}
