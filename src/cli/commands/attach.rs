//! Attachment commands.

use crate::cli::AttachCommands;
use crate::error::{Error, Result};
use crate::perms::Actor;
use std::path::PathBuf;

/// Execute attachment commands.
pub fn execute(
    command: &AttachCommands,
    db: Option<&PathBuf>,
    actor: &Actor,
    json: bool,
) -> Result<()> {
    match command {
        AttachCommands::Add {
            task,
            files,
            comment,
        } => add(*task, files, *comment, db, actor, json),
        AttachCommands::Rm { ids } => rm(ids, db, actor, json),
    }
}

fn add(
    task_id: i64,
    files: &[PathBuf],
    comment_id: i64,
    db: Option<&PathBuf>,
    actor: &Actor,
    json: bool,
) -> Result<()> {
    if files.is_empty() {
        return Err(Error::RequiredField { field: "files" });
    }
    let mut service = super::build_service(db)?;
    let uploads = super::read_uploads(files)?;
    let stored = service.attach_files(actor, task_id, comment_id, uploads)?;

    if json {
        println!(
            "{}",
            serde_json::json!({"task_id": task_id, "stored": stored})
        );
    } else if !crate::is_silent() {
        if stored {
            println!("Attached {} file(s) to task {task_id}", files.len());
        } else {
            println!("Nothing attached (permission denied or no usable files)");
        }
    }
    Ok(())
}

fn rm(ids: &[i64], db: Option<&PathBuf>, actor: &Actor, json: bool) -> Result<()> {
    let mut service = super::build_service(db)?;
    let report = service.delete_attachments(actor, ids)?;
    super::task::print_report("attach rm", &report, json)
}
