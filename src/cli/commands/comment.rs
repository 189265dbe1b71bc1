//! Comment command.

use crate::error::{Error, Result};
use crate::perms::Actor;
use colored::Colorize;
use std::path::PathBuf;

/// Add a comment, optionally with attached files.
pub fn execute(
    task_id: i64,
    text: &str,
    files: &[PathBuf],
    db: Option<&PathBuf>,
    actor: &Actor,
    json: bool,
) -> Result<()> {
    let mut service = super::build_service(db)?;
    let uploads = super::read_uploads(files)?;
    let Some(comment_id) = service.add_comment(actor, task_id, text, uploads)? else {
        return Err(Error::InvalidArgument(
            "permission denied: the actor may not comment on this task".to_string(),
        ));
    };

    if json {
        println!(
            "{}",
            serde_json::json!({"task_id": task_id, "comment_id": comment_id})
        );
    } else if crate::is_silent() {
        println!("{comment_id}");
    } else {
        println!(
            "Added comment {} to task {task_id}",
            comment_id.to_string().bold()
        );
    }
    Ok(())
}
