//! Audit event storage and retrieval.
//!
//! Every mutation appends events here, inside the same transaction as
//! its state change. Rows are never updated or deleted; history
//! rendering reconstructs a task's timeline from them.

use rusqlite::{Connection, Result};

/// Event types for audit logging.
///
/// The string codes are a stable contract: downstream history rendering
/// matches on them, so they must not change across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    // Task lifecycle
    Opened,
    Closed,
    FieldChanged,

    // Task content
    CommentAdded,
    AttachmentAdded,
    AttachmentRemoved,

    // Membership
    AssignmentChanged,
    NotificationSubscribed,
    NotificationUnsubscribed,

    // Scheduling and voting
    ReminderAdded,
    VoteAdded,

    // Global (task_id 0)
    UserCreated,
    UserDeleted,
}

impl EventType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Closed => "closed",
            Self::FieldChanged => "field_changed",
            Self::CommentAdded => "comment_added",
            Self::AttachmentAdded => "attachment_added",
            Self::AttachmentRemoved => "attachment_removed",
            Self::AssignmentChanged => "assignment_changed",
            Self::NotificationSubscribed => "notification_subscribed",
            Self::NotificationUnsubscribed => "notification_unsubscribed",
            Self::ReminderAdded => "reminder_added",
            Self::VoteAdded => "vote_added",
            Self::UserCreated => "user_created",
            Self::UserDeleted => "user_deleted",
        }
    }
}

/// An audit event record.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    /// Task reference (0 = system/global event)
    pub task_id: i64,
    pub event_type: EventType,
    /// Acting user (0 = anonymous)
    pub user_id: i64,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    /// Field name for `FieldChanged` events
    pub field_name: Option<String>,
    pub created_at: i64,
}

impl Event {
    /// Create a new event (id will be assigned by the database).
    #[must_use]
    pub fn new(task_id: i64, event_type: EventType, user_id: i64) -> Self {
        Self {
            id: 0,
            task_id,
            event_type,
            user_id,
            old_value: None,
            new_value: None,
            field_name: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Add old/new values.
    #[must_use]
    pub fn with_values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }

    /// Mark as a change of one named field.
    #[must_use]
    pub fn with_field(mut self, field: &str) -> Self {
        self.field_name = Some(field.to_string());
        self
    }
}

/// Insert an event into the database.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (task_id, event_type, user_id, old_value, new_value, field_name, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            event.task_id,
            event.event_type.as_str(),
            event.user_id,
            event.old_value,
            event.new_value,
            event.field_name,
            event.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get events for a task (task id 0 = global events), oldest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_events(conn: &Connection, task_id: i64, limit: Option<u32>) -> Result<Vec<Event>> {
    let limit = limit.unwrap_or(100);
    let mut stmt = conn.prepare(
        "SELECT id, task_id, event_type, user_id, old_value, new_value, field_name, created_at
         FROM events
         WHERE task_id = ?1
         ORDER BY created_at ASC, id ASC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(rusqlite::params![task_id, limit], |row| {
        Ok(Event {
            id: row.get(0)?,
            task_id: row.get(1)?,
            event_type: parse_event_type(row.get::<_, String>(2)?.as_str()),
            user_id: row.get(3)?,
            old_value: row.get(4)?,
            new_value: row.get(5)?,
            field_name: row.get(6)?,
            created_at: row.get(7)?,
        })
    })?;

    rows.collect()
}

fn parse_event_type(s: &str) -> EventType {
    match s {
        "opened" => EventType::Opened,
        "closed" => EventType::Closed,
        "comment_added" => EventType::CommentAdded,
        "attachment_added" => EventType::AttachmentAdded,
        "attachment_removed" => EventType::AttachmentRemoved,
        "assignment_changed" => EventType::AssignmentChanged,
        "notification_subscribed" => EventType::NotificationSubscribed,
        "notification_unsubscribed" => EventType::NotificationUnsubscribed,
        "reminder_added" => EventType::ReminderAdded,
        "vote_added" => EventType::VoteAdded,
        "user_created" => EventType::UserCreated,
        "user_deleted" => EventType::UserDeleted,
        "field_changed" => EventType::FieldChanged,
        other => {
            tracing::warn!(code = other, "unknown event code, treating as field change");
            EventType::FieldChanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::apply_schema;

    #[test]
    fn test_event_insert_and_get() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let event = Event::new(42, EventType::Closed, 7)
            .with_values(Some("6".to_string()), Some("duplicate of TT#12".to_string()));

        let id = insert_event(&conn, &event).unwrap();
        assert!(id > 0);

        let events = get_events(&conn, 42, Some(10)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_id, 7);
        assert_eq!(events[0].event_type, EventType::Closed);
        assert_eq!(events[0].old_value, Some("6".to_string()));
    }

    #[test]
    fn test_get_events_is_chronological() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let mut first = Event::new(5, EventType::Opened, 1);
        first.created_at = 1000;
        let mut second = Event::new(5, EventType::CommentAdded, 2);
        second.created_at = 2000;

        insert_event(&conn, &second).unwrap();
        insert_event(&conn, &first).unwrap();

        let events = get_events(&conn, 5, None).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::Opened);
        assert_eq!(events[1].event_type, EventType::CommentAdded);
    }

    #[test]
    fn test_event_codes_are_stable() {
        // History rendering depends on these exact strings.
        assert_eq!(EventType::Opened.as_str(), "opened");
        assert_eq!(EventType::Closed.as_str(), "closed");
        assert_eq!(EventType::FieldChanged.as_str(), "field_changed");
        assert_eq!(EventType::CommentAdded.as_str(), "comment_added");
        assert_eq!(EventType::AttachmentAdded.as_str(), "attachment_added");
        assert_eq!(EventType::AttachmentRemoved.as_str(), "attachment_removed");
        assert_eq!(EventType::AssignmentChanged.as_str(), "assignment_changed");
        assert_eq!(
            EventType::NotificationSubscribed.as_str(),
            "notification_subscribed"
        );
        assert_eq!(
            EventType::NotificationUnsubscribed.as_str(),
            "notification_unsubscribed"
        );
        assert_eq!(EventType::ReminderAdded.as_str(), "reminder_added");
        assert_eq!(EventType::VoteAdded.as_str(), "vote_added");
        assert_eq!(EventType::UserCreated.as_str(), "user_created");
        assert_eq!(EventType::UserDeleted.as_str(), "user_deleted");
    }

    #[test]
    fn test_unknown_event_code_reads_as_field_change() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO events (task_id, event_type, user_id, created_at)
             VALUES (9, 'time_travelled', 1, 1000)",
            [],
        )
        .unwrap();

        let events = get_events(&conn, 9, None).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::FieldChanged);
    }
}
