//! Task lifecycle commands.

use crate::cli::{TaskCommands, TaskOpenArgs};
use crate::error::{Error, Result};
use crate::model::NewTask;
use crate::perms::Actor;
use crate::tasks::BatchReport;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct TaskOpenOutput {
    task_id: i64,
    project_id: i64,
    summary: String,
}

/// Execute task commands.
pub fn execute(
    command: &TaskCommands,
    db: Option<&PathBuf>,
    actor: &Actor,
    json: bool,
) -> Result<()> {
    match command {
        TaskCommands::Open(args) => open(args, db, actor, json),
        TaskCommands::Close {
            id,
            reason,
            comment,
            no_complete,
        } => close(*id, *reason, comment, !no_complete, db, actor, json),
        TaskCommands::Take { ids } => take(ids, db, actor, json),
        TaskCommands::Assign { tasks, user, force } => {
            assign(tasks, user.unwrap_or(actor.id), *force, db, json)
        }
        TaskCommands::Vote { id } => vote(*id, db, actor, json),
        TaskCommands::Remind {
            id,
            message,
            every,
            user,
            start,
        } => remind(*id, message, *every, *user, *start, db, actor, json),
    }
}

fn open(args: &TaskOpenArgs, db: Option<&PathBuf>, actor: &Actor, json: bool) -> Result<()> {
    let mut service = super::build_service(db)?;

    let mut new_task = NewTask::new(args.project, &args.summary, &args.desc)
        .with_severity(args.severity)
        .with_category(args.category)
        .with_assignees(args.assign.clone());
    new_task.task_type = args.task_type;
    new_task.product_version = args.reported_in;
    new_task.operating_system = args.os;
    new_task.notify_self = args.notify_self;
    if let Some(priority) = args.priority {
        new_task = new_task.with_priority(priority);
    }
    if let Some(due_version) = args.due_version {
        new_task.closedby_version = due_version;
    }
    if let Some(status) = args.status {
        new_task = new_task.with_status(status);
    }
    if let Some(due) = &args.due {
        new_task = new_task.with_due_date(super::parse_date_end_of_day(due)?);
    }

    let files = super::read_uploads(&args.file)?;
    let Some(task_id) = service.create_task(actor, new_task, files)? else {
        return Err(Error::InvalidArgument(
            "permission denied: the actor may not open tasks in this project".to_string(),
        ));
    };

    if json {
        let output = TaskOpenOutput {
            task_id,
            project_id: args.project,
            summary: args.summary.clone(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if crate::is_silent() {
        println!("{task_id}");
    } else {
        println!("Opened task {} ({})", task_id.to_string().bold(), args.summary);
    }
    Ok(())
}

fn close(
    task_id: i64,
    reason: i64,
    comment: &str,
    mark_complete: bool,
    db: Option<&PathBuf>,
    actor: &Actor,
    json: bool,
) -> Result<()> {
    let mut service = super::build_service(db)?;
    let closed = service.close_task(actor, task_id, reason, comment, mark_complete)?;

    if json {
        println!(
            "{}",
            serde_json::json!({"task_id": task_id, "closed": closed})
        );
    } else if !crate::is_silent() {
        if closed {
            println!("Closed task {task_id}");
        } else {
            println!("Task {task_id} not closed (permission denied or already closed)");
        }
    }
    Ok(())
}

fn take(ids: &[i64], db: Option<&PathBuf>, actor: &Actor, json: bool) -> Result<()> {
    let mut service = super::build_service(db)?;
    let report = service.assign_to_me(actor.id, ids)?;
    print_report("take", &report, json)
}

fn assign(tasks: &[i64], user: i64, force: bool, db: Option<&PathBuf>, json: bool) -> Result<()> {
    let mut service = super::build_service(db)?;
    let report = service.add_to_assignees(user, tasks, force)?;
    print_report("assign", &report, json)
}

fn vote(task_id: i64, db: Option<&PathBuf>, actor: &Actor, json: bool) -> Result<()> {
    let mut service = super::build_service(db)?;
    let counted = service.add_vote(actor.id, task_id)?;

    if json {
        println!(
            "{}",
            serde_json::json!({"task_id": task_id, "counted": counted})
        );
    } else if !crate::is_silent() {
        if counted {
            println!("Vote recorded for task {task_id}");
        } else {
            println!("Vote not counted (already voted or not eligible)");
        }
    }
    Ok(())
}

fn remind(
    task_id: i64,
    message: &str,
    every_secs: i64,
    user: Option<i64>,
    start: Option<i64>,
    db: Option<&PathBuf>,
    actor: &Actor,
    json: bool,
) -> Result<()> {
    if every_secs <= 0 {
        return Err(Error::InvalidArgument(
            "reminder interval must be positive".to_string(),
        ));
    }
    let mut service = super::build_service(db)?;
    let added = service.add_reminder(actor, task_id, message, every_secs * 1000, start, user)?;

    if json {
        println!(
            "{}",
            serde_json::json!({"task_id": task_id, "scheduled": added})
        );
    } else if !crate::is_silent() {
        if added {
            println!("Reminder scheduled on task {task_id}");
        } else {
            println!("Reminder not scheduled (permission denied or already present)");
        }
    }
    Ok(())
}

/// Shared rendering of batch results.
pub(super) fn print_report(op: &str, report: &BatchReport, json: bool) -> Result<()> {
    if json {
        let items: Vec<serde_json::Value> = report
            .items
            .iter()
            .map(|(id, outcome)| serde_json::json!({"id": id, "outcome": outcome.as_str()}))
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "op": op,
                "changed": report.changed_count(),
                "items": items,
            })
        );
        return Ok(());
    }

    if crate::is_silent() {
        return Ok(());
    }
    for (id, outcome) in &report.items {
        println!("{id}: {}", outcome.as_str());
    }
    println!(
        "{} of {} changed",
        report.changed_count().to_string().bold(),
        report.items.len()
    );
    Ok(())
}
