//! Purpose: Database-directory and database-name path resolution helpers.
//! Exports: `default_db_dir` and `resolve_db_path`.
//! Role: Keep CLI path semantics in one place.
//! Invariants: Default database directory remains `~/.userstream`.
//! Invariants: Bare names resolve inside the directory; anything with a path
//! Invariants: separator is used as given.

use std::path::{Path, PathBuf};

pub(crate) const DEFAULT_DB_NAME: &str = "users";

pub(crate) fn default_db_dir() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".userstream")
}

pub(crate) fn resolve_db_path(name: &str, db_dir: &Path) -> PathBuf {
    if name.contains('/') {
        return PathBuf::from(name);
    }
    if name.ends_with(".db") {
        return db_dir.join(name);
    }
    db_dir.join(format!("{name}.db"))
}
