//! Watch-list commands.

use crate::error::Result;
use crate::perms::Actor;
use std::path::PathBuf;

/// Subscribe a user (default: the actor) to tasks.
pub fn execute_watch(
    tasks: &[i64],
    user: Option<i64>,
    force: bool,
    db: Option<&PathBuf>,
    actor: &Actor,
    json: bool,
) -> Result<()> {
    let mut service = super::build_service(db)?;
    let report = service.add_notification(actor, user.unwrap_or(actor.id), tasks, force)?;
    super::task::print_report("watch", &report, json)
}

/// Remove a user (default: the actor) from tasks' watch lists.
pub fn execute_unwatch(
    tasks: &[i64],
    user: Option<i64>,
    db: Option<&PathBuf>,
    actor: &Actor,
    json: bool,
) -> Result<()> {
    let mut service = super::build_service(db)?;
    let report = service.remove_notification(actor, user.unwrap_or(actor.id), tasks)?;
    super::task::print_report("unwatch", &report, json)
}
