//! Category administration commands.

use crate::cli::CategoryCommands;
use crate::error::{Error, Result};
use crate::storage::sqlite::{get_category, get_project, insert_category, load_categories};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct CategoryAddOutput {
    category_id: i64,
    category_name: String,
    project_id: i64,
}

/// Execute category commands.
pub fn execute(
    command: &CategoryCommands,
    db: Option<&PathBuf>,
    actor: i64,
    json: bool,
) -> Result<()> {
    match command {
        CategoryCommands::Add {
            project,
            name,
            parent,
            owner,
        } => add(*project, name, *parent, *owner, db, actor, json),
        CategoryCommands::List { project } => list(*project, db, json),
    }
}

fn add(
    project_id: i64,
    name: &str,
    parent: Option<i64>,
    owner: i64,
    db: Option<&PathBuf>,
    actor: i64,
    json: bool,
) -> Result<()> {
    let (mut store, _) = super::open_store(db)?;
    if get_project(store.conn(), project_id)?.is_none() {
        return Err(Error::ProjectNotFound { id: project_id });
    }

    if let Some(parent_id) = parent {
        get_category(store.conn(), parent_id)?
            .filter(|c| c.project_id == project_id)
            .ok_or(Error::CategoryNotFound { id: parent_id })?;
    }

    // The nested-set bound shift and the insert must land together.
    let category_id = store.mutate("create_category", actor, |tx, _ctx| {
        insert_category(tx, project_id, name, owner, parent)
    })?;

    if json {
        let output = CategoryAddOutput {
            category_id,
            category_name: name.to_string(),
            project_id,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if crate::is_silent() {
        println!("{category_id}");
    } else {
        println!("Created category {} ({})", category_id.to_string().bold(), name);
    }
    Ok(())
}

fn list(project_id: i64, db: Option<&PathBuf>, json: bool) -> Result<()> {
    let (store, _) = super::open_store(db)?;
    let categories = load_categories(store.conn(), project_id)?;

    if json {
        println!("{}", serde_json::to_string(&categories)?);
        return Ok(());
    }

    if categories.is_empty() {
        println!("No categories.");
        return Ok(());
    }

    // Tree order with depth from the open nested-set bounds.
    let mut open: Vec<i64> = Vec::new();
    for cat in &categories {
        while open.last().is_some_and(|&rgt| rgt < cat.lft) {
            open.pop();
        }
        let indent = "  ".repeat(open.len());
        let owner = if cat.category_owner != 0 {
            format!("  (owner {})", cat.category_owner)
        } else {
            String::new()
        };
        println!(
            "{:>4}  {indent}{}{owner}",
            cat.category_id,
            cat.category_name.bold()
        );
        open.push(cat.rgt);
    }
    Ok(())
}
