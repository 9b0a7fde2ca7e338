//! Change-script replay for `oxide-schema-core`.
//!
//! A script describes an existing schema (its `baseline`) and a list of
//! changes made to it. Replaying the script plans the changes for a target
//! dialect and renders them as SQL.
//!
//! # Example
//!
//! ```rust
//! use oxide_schema::{plan, render, Script};
//! use oxide_schema_core::Dialect;
//!
//! let script = Script::from_json(r#"{
//!     "baseline": [
//!         { "op": "create_table", "table": "t" },
//!         { "op": "add_column", "table": "t", "column": "a", "type": "integer" }
//!     ],
//!     "changes": [
//!         { "op": "rename_table", "table": "t", "to": "items" }
//!     ]
//! }"#).unwrap();
//!
//! let actions = plan(&script, Dialect::sqlite()).unwrap();
//! assert_eq!(render(&actions), "-- rename_table\nALTER TABLE \"t\" RENAME TO \"items\";\n");
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Plan a script for SQLite
//! oxide-schema plan changes.json
//!
//! # Plan for PostgreSQL
//! oxide-schema --dialect postgres plan changes.json
//!
//! # Override capabilities of a built-in profile
//! oxide-schema --dialect-config dialect.json plan changes.json
//! ```

pub mod error;
pub mod replay;
pub mod script;

use std::path::Path;

use oxide_schema_core::{Dialect, DialectConfig, DialectKind};

pub use error::{Result, ScriptError};
pub use replay::{plan, render};
pub use script::{Binding, ExprSpec, QuerySpec, Script, Step, TableRef};

/// Resolves the target dialect: a configuration file wins over the
/// built-in profile of `kind`.
pub fn load_dialect(kind: DialectKind, config: Option<&Path>) -> Result<Dialect> {
    let Some(path) = config else {
        return Ok(match kind {
            DialectKind::Sqlite => Dialect::sqlite(),
            DialectKind::Postgres => Dialect::postgres(),
        });
    };
    let json = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = DialectConfig::from_json(&json)?;
    Ok(Dialect::from_config(&config)?)
}

/// Loads a script file and renders its planned SQL.
pub fn plan_file(path: &Path, dialect: Dialect) -> Result<String> {
    let script = Script::load(path)?;
    let actions = plan(&script, dialect)?;
    Ok(render(&actions))
}
