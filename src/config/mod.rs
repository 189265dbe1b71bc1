//! Configuration and path resolution.
//!
//! tasktrail keeps a single global database at
//! `~/.tasktrail/data/tasktrail.db`; attachment blobs and the
//! notification outbox live next to it. Everything can be redirected
//! for tests or scripting via environment variables or the `--db`
//! flag.

use std::path::{Path, PathBuf};

/// Get the global tasktrail directory location.
///
/// Always `~/.tasktrail/`, so every invocation shares the same data.
#[must_use]
pub fn global_tasktrail_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".tasktrail"))
}

/// Check if test mode is enabled.
///
/// Test mode is enabled by setting `TT_TEST_DB=1` (or any non-empty
/// value). This redirects all database operations to an isolated test
/// database.
#[must_use]
pub fn is_test_mode() -> bool {
    std::env::var("TT_TEST_DB")
        .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
        .unwrap_or(false)
}

/// Get the test database path: `~/.tasktrail/test/tasktrail.db`.
#[must_use]
pub fn test_db_path() -> Option<PathBuf> {
    global_tasktrail_dir().map(|dir| dir.join("test").join("tasktrail.db"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. Explicit path from the `--db` flag
/// 2. `TT_TEST_DB` set → isolated test database
/// 3. `TT_DB` environment variable
/// 4. Global location: `~/.tasktrail/data/tasktrail.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if is_test_mode() {
        return test_db_path();
    }

    if let Ok(db_path) = std::env::var("TT_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_tasktrail_dir().map(|dir| dir.join("data").join("tasktrail.db"))
}

/// Directory for attachment blobs, next to the database.
#[must_use]
pub fn attachments_dir(db_path: &Path) -> PathBuf {
    data_sibling(db_path, "attachments")
}

/// The notification outbox file, next to the database.
#[must_use]
pub fn outbox_path(db_path: &Path) -> PathBuf {
    data_sibling(db_path, "outbox.jsonl")
}

fn data_sibling(db_path: &Path, name: &str) -> PathBuf {
    db_path
        .parent()
        .map_or_else(|| PathBuf::from(name), |dir| dir.join(name))
}

/// Content types recorded for common extensions regardless of what the
/// caller declared. Everything else keeps its declared type, or falls
/// back to `application/octet-stream`.
#[must_use]
pub fn mime_overrides() -> std::collections::HashMap<String, String> {
    [
        ("txt", "text/plain"),
        ("log", "text/plain"),
        ("md", "text/plain"),
        ("patch", "text/plain"),
        ("diff", "text/plain"),
        ("png", "image/png"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("gif", "image/gif"),
        ("pdf", "application/pdf"),
        ("gz", "application/gzip"),
        ("zip", "application/zip"),
    ]
    .into_iter()
    .map(|(ext, mime)| (ext.to_string(), mime.to_string()))
    .collect()
}

/// Get the default acting user id.
///
/// Priority: `TT_ACTOR` environment variable, else 0 (anonymous). A
/// non-numeric value counts as unset.
#[must_use]
pub fn default_actor() -> i64 {
    std::env::var("TT_ACTOR")
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}
