//! Initialize the tasktrail database.
//!
//! Creates the database file (default `~/.tasktrail/data/tasktrail.db`,
//! or wherever `--db`/`TT_DB` points), applies the schema, and seeds
//! the reference lists: statuses, resolutions, and task types.

use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use crate::storage::TaskStore;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
    attachments: PathBuf,
    outbox: PathBuf,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns [`Error::AlreadyInitialized`] if the database exists and
/// `--force` was not given, or an error if it cannot be created.
pub fn execute(db: Option<&PathBuf>, force: bool, json: bool) -> Result<()> {
    let db_path = resolve_db_path(db.map(PathBuf::as_path)).ok_or_else(|| {
        Error::Config("could not determine the tasktrail data directory".to_string())
    })?;

    if db_path.exists() {
        if !force {
            return Err(Error::AlreadyInitialized { path: db_path });
        }
        fs::remove_file(&db_path)?;
    }

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Opening applies the schema and seeds the reference lists.
    let store = TaskStore::open(&db_path)?;
    drop(store);

    let attachments = crate::config::attachments_dir(&db_path);
    fs::create_dir_all(&attachments)?;
    let outbox = crate::config::outbox_path(&db_path);

    if json {
        let output = InitOutput {
            database: db_path,
            attachments,
            outbox,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if !crate::is_silent() {
        println!("Initialized tasktrail database");
        println!("  Database:    {}", db_path.display());
        println!("  Attachments: {}", attachments.display());
        println!("  Outbox:      {}", outbox.display());
        println!();
        println!("Next: create a project with 'tt project add --title <name>'.");
    }

    Ok(())
}
