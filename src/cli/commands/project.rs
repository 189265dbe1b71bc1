//! Project administration commands.

use crate::cli::ProjectCommands;
use crate::error::Result;
use crate::model::Project;
use crate::storage::sqlite::{insert_project, list_projects};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct ProjectAddOutput {
    project_id: i64,
    project_title: String,
}

/// Execute project commands.
pub fn execute(command: &ProjectCommands, db: Option<&PathBuf>, json: bool) -> Result<()> {
    match command {
        ProjectCommands::Add {
            title,
            default_owner,
            auto_assign,
        } => add(title, *default_owner, *auto_assign, db, json),
        ProjectCommands::List => list(db, json),
    }
}

fn add(
    title: &str,
    default_owner: i64,
    auto_assign: bool,
    db: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let (store, _) = super::open_store(db)?;
    let project = Project::new(title)
        .with_default_owner(default_owner)
        .with_auto_assign(auto_assign);
    let project_id = insert_project(store.conn(), &project)?;

    if json {
        let output = ProjectAddOutput {
            project_id,
            project_title: title.to_string(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if crate::is_silent() {
        println!("{project_id}");
    } else {
        println!("Created project {} ({})", project_id.to_string().bold(), title);
    }
    Ok(())
}

fn list(db: Option<&PathBuf>, json: bool) -> Result<()> {
    let (store, _) = super::open_store(db)?;
    let projects = list_projects(store.conn())?;

    if json {
        println!("{}", serde_json::to_string(&projects)?);
        return Ok(());
    }

    if projects.is_empty() {
        println!("No projects.");
        return Ok(());
    }
    for p in projects {
        let flags = if p.auto_assign { " [auto-assign]" } else { "" };
        println!("{:>4}  {}{}", p.project_id, p.project_title.bold(), flags);
    }
    Ok(())
}
