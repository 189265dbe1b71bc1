//! Capability grant and revoke commands.
//!
//! Not permission-gated: this is a local admin surface. User 0 is the
//! everyone-baseline; project 0 means all projects.

use crate::error::Result;
use crate::perms;
use crate::validate::normalize_capability;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct GrantOutput<'a> {
    user: i64,
    capability: &'a str,
    project: i64,
    changed: bool,
}

/// Execute a grant.
pub fn execute_grant(
    user: i64,
    capability: &str,
    project: i64,
    db: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let cap = normalize_capability(capability)?;
    let (store, _) = super::open_store(db)?;
    perms::grant(store.conn(), user, project, cap)?;
    report(user, cap.as_str(), project, true, "Granted", json)
}

/// Execute a revoke.
pub fn execute_revoke(
    user: i64,
    capability: &str,
    project: i64,
    db: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let cap = normalize_capability(capability)?;
    let (store, _) = super::open_store(db)?;
    let changed = perms::revoke(store.conn(), user, project, cap)?;
    report(user, cap.as_str(), project, changed, "Revoked", json)
}

fn report(
    user: i64,
    capability: &str,
    project: i64,
    changed: bool,
    verb: &str,
    json: bool,
) -> Result<()> {
    if json {
        let output = GrantOutput {
            user,
            capability,
            project,
            changed,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if !crate::is_silent() {
        let scope = if project == 0 {
            "all projects".to_string()
        } else {
            format!("project {project}")
        };
        let who = if user == 0 {
            "everyone".to_string()
        } else {
            format!("user {user}")
        };
        if changed {
            println!("{verb} {capability} for {who} in {scope}");
        } else {
            println!("No change: {capability} for {who} in {scope}");
        }
    }
    Ok(())
}
