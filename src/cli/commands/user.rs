//! User administration commands.

use crate::cli::UserCommands;
use crate::error::{Error, Result};
use crate::model::NewUser;
use crate::perms::Actor;
use crate::storage::sqlite::list_users;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct UserAddOutput {
    user_id: i64,
    user_name: String,
}

/// Execute user commands.
pub fn execute(
    command: &UserCommands,
    db: Option<&PathBuf>,
    actor: &Actor,
    json: bool,
) -> Result<()> {
    match command {
        UserCommands::Add {
            name,
            pass,
            real_name,
            email,
            jabber,
            notify,
        } => add(
            name,
            pass.as_deref(),
            real_name.as_deref(),
            email.as_deref(),
            jabber.as_deref(),
            *notify,
            db,
            actor,
            json,
        ),
        UserCommands::Del { id } => del(*id, db, actor, json),
        UserCommands::List => list(db, json),
    }
}

#[allow(clippy::too_many_arguments)]
fn add(
    name: &str,
    pass: Option<&str>,
    real_name: Option<&str>,
    email: Option<&str>,
    jabber: Option<&str>,
    notify: i64,
    db: Option<&PathBuf>,
    actor: &Actor,
    json: bool,
) -> Result<()> {
    let mut service = super::build_service(db)?;

    let mut new_user = NewUser::new(name).with_notify_type(notify);
    if let Some(pass) = pass {
        new_user = new_user.with_password(pass);
    }
    if let Some(real_name) = real_name {
        new_user = new_user.with_real_name(real_name);
    }
    if let Some(email) = email {
        new_user = new_user.with_email(email);
    }
    if let Some(jabber) = jabber {
        new_user = new_user.with_jabber(jabber);
    }

    let user_id = service.create_user(actor, &new_user)?;

    if json {
        let output = UserAddOutput {
            user_id,
            user_name: name.to_string(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if crate::is_silent() {
        println!("{user_id}");
    } else {
        println!("Created user {} ({})", user_id.to_string().bold(), name);
        if pass.is_none() {
            println!("A password was generated; see the new-user notification.");
        }
    }
    Ok(())
}

fn del(user_id: i64, db: Option<&PathBuf>, actor: &Actor, json: bool) -> Result<()> {
    let mut service = super::build_service(db)?;
    let deleted = service.delete_user(actor, user_id)?;
    if !deleted {
        return Err(Error::UserNotFound {
            id: user_id.to_string(),
        });
    }

    if json {
        println!("{}", serde_json::json!({"deleted": user_id}));
    } else if !crate::is_silent() {
        println!("Deleted user {user_id}");
    }
    Ok(())
}

fn list(db: Option<&PathBuf>, json: bool) -> Result<()> {
    let (store, _) = super::open_store(db)?;
    let users = list_users(store.conn())?;

    if json {
        println!("{}", serde_json::to_string(&users)?);
        return Ok(());
    }

    if users.is_empty() {
        println!("No users.");
        return Ok(());
    }
    for u in users {
        let real = if u.real_name.is_empty() {
            String::new()
        } else {
            format!("  ({})", u.real_name)
        };
        let state = if u.account_enabled { "" } else { "  [disabled]" };
        println!("{:>4}  {}{real}{state}", u.user_id, u.user_name.bold());
    }
    Ok(())
}
