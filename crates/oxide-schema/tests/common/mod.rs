#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;

use tempfile::TempDir;

/// Baseline shared by most scripts: `users(id INTEGER NOT NULL PRIMARY KEY, email TEXT)`.
pub const USERS_BASELINE: &str = r#"[
    { "op": "create_table", "table": "users" },
    { "op": "add_column", "table": "users", "column": "id", "type": "integer", "nullable": false },
    { "op": "set_primary_key", "table": "users", "columns": ["id"] },
    { "op": "add_column", "table": "users", "column": "email", "type": "text" }
]"#;

/// Builds a script document from a baseline and a change list.
pub fn script(baseline: &str, changes: &str) -> String {
    format!(r#"{{ "baseline": {baseline}, "changes": {changes} }}"#)
}

/// Writes `contents` to `name` inside a fresh temporary directory.
pub fn write_file(name: &str, contents: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    (dir, path)
}
