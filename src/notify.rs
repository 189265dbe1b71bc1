//! Notification fan-out.
//!
//! Mutations describe what happened; the [`NotificationCoordinator`]
//! decides who hears about it and hands a typed event to a
//! [`Delivery`] collaborator. Transport is out of scope here: the
//! bundled delivery appends events to a JSONL outbox for an external
//! sender to drain.
//!
//! Delivery is best-effort. A failed or empty send never fails the
//! mutation that triggered it; problems are logged and dropped.

use crate::error::Result;
use crate::storage::sqlite::{get_assignees, get_subscribers};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// What happened, from the recipient's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A task's assignee set was replaced.
    OwnershipChanged,
    /// Users joined a task's assignee set.
    NewAssignee,
    /// A comment was posted. The payload `with_files` flag says
    /// whether files came with it.
    CommentAdded,
    /// A task was opened.
    TaskOpened,
    /// A task was closed.
    TaskClosed,
    /// An anonymous reporter opened a task; carries their access
    /// token back to them.
    AnonTaskOpened,
    /// A user account was registered.
    NewUser,
}

impl NotificationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OwnershipChanged => "ownership_changed",
            Self::NewAssignee => "new_assignee",
            Self::CommentAdded => "comment_added",
            Self::TaskOpened => "task_opened",
            Self::TaskClosed => "task_closed",
            Self::AnonTaskOpened => "anon_task_opened",
            Self::NewUser => "new_user",
        }
    }
}

/// Where a notification should go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    /// A registered user; the sender applies their notify preference.
    User(i64),
    /// A bare address, for anonymous reporters.
    Email(String),
}

/// Transport hint for the delivery collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Each recipient's own preference.
    #[default]
    Preferred,
    Email,
    Jabber,
}

/// One notification handed to the delivery collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    /// Task the event concerns (0 for global events like new_user).
    pub task_id: i64,
    /// User who caused the event.
    pub actor: i64,
    pub recipients: Vec<Recipient>,
    /// Free-form event payload.
    pub payload: serde_json::Value,
    pub channel: Channel,
    /// Unix timestamp in milliseconds.
    pub created_at: i64,
}

/// External delivery collaborator. Solely responsible for transport.
pub trait Delivery {
    /// Hand one event over for sending.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be handed off. The
    /// coordinator logs and swallows it.
    fn deliver(&self, event: &NotificationEvent) -> Result<()>;
}

/// Decides recipients and dispatches notification events.
pub struct NotificationCoordinator {
    delivery: Box<dyn Delivery>,
}

impl NotificationCoordinator {
    #[must_use]
    pub fn new(delivery: Box<dyn Delivery>) -> Self {
        Self { delivery }
    }

    /// Fan an event out.
    ///
    /// Recipients default to the task's watchers plus its assignees,
    /// minus the actor; pass `recipients` to override (e.g. the
    /// registration-watch list, or an anonymous reporter's address).
    /// An empty recipient list is a no-op send. Never fails.
    pub fn notify(
        &self,
        conn: &Connection,
        kind: NotificationKind,
        task_id: i64,
        actor: i64,
        recipients: Option<Vec<Recipient>>,
        payload: serde_json::Value,
    ) {
        let recipients = match recipients {
            Some(explicit) => explicit,
            None => match default_recipients(conn, task_id, actor) {
                Ok(derived) => derived,
                Err(err) => {
                    tracing::warn!(kind = kind.as_str(), task_id, error = %err,
                        "could not derive notification recipients");
                    return;
                }
            },
        };

        if recipients.is_empty() {
            tracing::debug!(kind = kind.as_str(), task_id, "no recipients, skipping send");
            return;
        }

        let event = NotificationEvent {
            kind,
            task_id,
            actor,
            recipients,
            payload,
            channel: Channel::Preferred,
            created_at: chrono::Utc::now().timestamp_millis(),
        };

        if let Err(err) = self.delivery.deliver(&event) {
            tracing::warn!(kind = kind.as_str(), task_id, error = %err,
                "notification delivery failed");
        }
    }
}

/// Watchers plus assignees, deduplicated, without the actor.
fn default_recipients(conn: &Connection, task_id: i64, actor: i64) -> Result<Vec<Recipient>> {
    let mut ids = get_subscribers(conn, task_id)?;
    ids.extend(get_assignees(conn, task_id)?);
    ids.sort_unstable();
    ids.dedup();
    ids.retain(|&id| id != actor && id != 0);
    Ok(ids.into_iter().map(Recipient::User).collect())
}

/// Delivery that appends each event as one JSON line to an outbox
/// file. External senders drain the file on their own schedule.
pub struct OutboxDelivery {
    path: PathBuf,
}

impl OutboxDelivery {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Delivery for OutboxDelivery {
    fn deliver(&self, event: &NotificationEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;

        let line = serde_json::to_string(event)?;
        writeln!(file, "{line}")?;
        file.sync_all()?;

        Ok(())
    }
}

/// Test double that records every delivered event.
#[cfg(test)]
pub struct RecordingDelivery {
    pub events: std::sync::Arc<std::sync::Mutex<Vec<NotificationEvent>>>,
}

#[cfg(test)]
impl RecordingDelivery {
    pub fn new() -> (Self, std::sync::Arc<std::sync::Mutex<Vec<NotificationEvent>>>) {
        let events = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        (
            Self {
                events: std::sync::Arc::clone(&events),
            },
            events,
        )
    }
}

#[cfg(test)]
impl Delivery for RecordingDelivery {
    fn deliver(&self, event: &NotificationEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
