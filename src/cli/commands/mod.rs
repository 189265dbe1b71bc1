//! Command implementations.

pub mod attach;
pub mod category;
pub mod comment;
pub mod completions;
pub mod grant;
pub mod history;
pub mod init;
pub mod list;
pub mod project;
pub mod task;
pub mod user;
pub mod version;
pub mod watch;

use crate::attach::{AttachmentManager, DiskStore, FileUpload};
use crate::config::{attachments_dir, mime_overrides, outbox_path, resolve_db_path};
use crate::error::{Error, Result};
use crate::notify::{NotificationCoordinator, OutboxDelivery};
use crate::perms::Actor;
use crate::storage::TaskStore;
use crate::tasks::TaskService;
use std::path::PathBuf;

/// Open the store behind an initialized database.
pub(crate) fn open_store(db: Option<&PathBuf>) -> Result<(TaskStore, PathBuf)> {
    let db_path = resolve_db_path(db.map(PathBuf::as_path)).ok_or(Error::NotInitialized)?;
    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }
    let store = TaskStore::open(&db_path)?;
    Ok((store, db_path))
}

/// Wire up the full mutation service: store, outbox notifier, and the
/// on-disk attachment manager, all rooted next to the database.
pub(crate) fn build_service(db: Option<&PathBuf>) -> Result<TaskService> {
    let (store, db_path) = open_store(db)?;
    let notifier =
        NotificationCoordinator::new(Box::new(OutboxDelivery::new(outbox_path(&db_path))));
    let attachments = AttachmentManager::new(
        Box::new(DiskStore::new(attachments_dir(&db_path))),
        mime_overrides(),
    );
    Ok(TaskService::new(store, notifier, attachments))
}

/// Build the acting identity from the global flags.
#[must_use]
pub fn resolve_actor(
    actor: Option<i64>,
    anon_email: Option<&str>,
    token: Option<&str>,
) -> Actor {
    let id = actor.unwrap_or_else(crate::config::default_actor);
    let mut resolved = Actor::user(id);
    if let Some(email) = anon_email {
        resolved = resolved.with_email(email);
    }
    if let Some(token) = token {
        resolved = resolved.with_token(token);
    }
    resolved
}

/// Read local files into upload payloads.
pub(crate) fn read_uploads(paths: &[PathBuf]) -> Result<Vec<FileUpload>> {
    let mut uploads = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().to_string());
        // The manager's extension overrides refine this.
        uploads.push(FileUpload::ok(&name, "application/octet-stream", bytes));
    }
    Ok(uploads)
}

/// Parse a `YYYY-MM-DD` date to Unix milliseconds at midnight UTC.
pub(crate) fn parse_date(value: &str) -> Result<i64> {
    let date = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        Error::InvalidArgument(format!("invalid date `{value}`; expected YYYY-MM-DD"))
    })?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::InvalidArgument(format!("invalid date `{value}`")))?;
    Ok(midnight.and_utc().timestamp_millis())
}

/// Parse a `YYYY-MM-DD` date to the last millisecond of that day.
///
/// Due dates and inclusive "to" bounds cover the whole day; a task due
/// on a date is not overdue until that date has fully passed.
pub(crate) fn parse_date_end_of_day(value: &str) -> Result<i64> {
    const DAY_MS: i64 = 86_400_000;
    Ok(parse_date(value)? + DAY_MS - 1)
}

/// Render a millisecond timestamp for human output.
pub(crate) fn format_ms(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map_or_else(|| ms.to_string(), |dt| dt.format("%Y-%m-%d %H:%M").to_string())
}
