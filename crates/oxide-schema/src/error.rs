//! Error types for loading and replaying change scripts.

use std::path::PathBuf;

use oxide_schema_core::SchemaError;

/// Errors that can occur while loading or replaying a script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// IO error (reading a script or configuration file).
    #[error("IO error on '{}': {source}", .path.display())]
    Io {
        /// The file being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The script is not valid JSON or does not match the step model.
    #[error("Failed to parse script: {0}")]
    Parse(#[from] serde_json::Error),

    /// A step names an object that does not exist.
    #[error("{kind} '{name}' not found")]
    UnknownObject {
        /// Kind of object looked up.
        kind: &'static str,
        /// Name that was looked up.
        name: String,
    },

    /// A builder call rejected a step.
    #[error("Step {step} ({op}) failed: {source}")]
    Step {
        /// Position of the step in its list, starting at 1.
        step: usize,
        /// Operation name of the step.
        op: &'static str,
        /// Underlying error.
        source: Box<ScriptError>,
    },

    /// Error raised by the schema model.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Result type for script operations.
pub type Result<T> = std::result::Result<T, ScriptError>;
