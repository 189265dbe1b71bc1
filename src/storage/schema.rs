//! Database schema definitions and seed data.
//!
//! This module contains the complete SQLite schema for tasktrail plus
//! the reference rows (statuses, resolutions, task types) the engine
//! branches on.

use rusqlite::{Connection, Result};

/// Current schema version recorded in `schema_migrations`.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the tasktrail database.
///
/// Note: Timestamps are stored as INTEGER (Unix milliseconds). User id
/// columns are not foreign-keyed to `users` because id 0 (anonymous /
/// everyone-baseline) has no user row.
pub const SCHEMA_SQL: &str = r#"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Identity & Permissions
-- ====================

CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_name TEXT NOT NULL UNIQUE,
    user_pass TEXT NOT NULL,
    real_name TEXT NOT NULL DEFAULT '',
    email_address TEXT NOT NULL DEFAULT '',
    jabber_id TEXT NOT NULL DEFAULT '',
    notify_type INTEGER NOT NULL DEFAULT 0,
    account_enabled INTEGER NOT NULL DEFAULT 1,
    tasks_perpage INTEGER NOT NULL DEFAULT 25,
    register_date INTEGER NOT NULL,
    time_zone INTEGER NOT NULL DEFAULT 0
);

-- Capability grants. user_id 0 is the everyone-baseline;
-- project_id 0 scopes a grant to all projects.
CREATE TABLE IF NOT EXISTS user_capabilities (
    user_id INTEGER NOT NULL,
    project_id INTEGER NOT NULL DEFAULT 0,
    capability TEXT NOT NULL,
    PRIMARY KEY (user_id, project_id, capability)
);

CREATE INDEX IF NOT EXISTS idx_capabilities_user ON user_capabilities(user_id);

-- ====================
-- Reference Data
-- ====================

CREATE TABLE IF NOT EXISTS projects (
    project_id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_title TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    default_cat_owner INTEGER NOT NULL DEFAULT 0,
    auto_assign INTEGER NOT NULL DEFAULT 0
);

-- Nested-set category tree, bounds scoped per project
CREATE TABLE IF NOT EXISTS list_category (
    category_id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    category_name TEXT NOT NULL,
    category_owner INTEGER NOT NULL DEFAULT 0,
    lft INTEGER NOT NULL,
    rgt INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_category_project ON list_category(project_id, lft);

CREATE TABLE IF NOT EXISTS list_tasktype (
    tasktype_id INTEGER PRIMARY KEY,
    tasktype_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS list_status (
    status_id INTEGER PRIMARY KEY,
    status_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS list_resolution (
    resolution_id INTEGER PRIMARY KEY,
    resolution_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS list_version (
    version_id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    version_name TEXT NOT NULL,
    list_position INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS list_os (
    os_id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    os_name TEXT NOT NULL
);

-- ====================
-- Tasks
-- ====================

-- task_id is assigned as max+1 inside the creating transaction, not
-- by AUTOINCREMENT, so gaps left by deletions persist.
CREATE TABLE IF NOT EXISTS tasks (
    task_id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL,
    task_type INTEGER NOT NULL DEFAULT 1,
    item_summary TEXT NOT NULL,
    detailed_desc TEXT NOT NULL,
    item_status INTEGER NOT NULL DEFAULT 1,
    task_severity INTEGER NOT NULL DEFAULT 2,
    priority INTEGER NOT NULL DEFAULT 2,
    product_category INTEGER NOT NULL DEFAULT 0,
    product_version INTEGER NOT NULL DEFAULT 0,
    closedby_version INTEGER NOT NULL DEFAULT 0,
    operating_system INTEGER NOT NULL DEFAULT 0,
    percent_complete INTEGER NOT NULL DEFAULT 0,
    opened_by INTEGER NOT NULL DEFAULT 0,
    date_opened INTEGER NOT NULL,
    last_edited_time INTEGER NOT NULL,
    last_edited_by INTEGER NOT NULL DEFAULT 0,
    due_date INTEGER,
    is_closed INTEGER NOT NULL DEFAULT 0,
    date_closed INTEGER,
    closed_by INTEGER NOT NULL DEFAULT 0,
    resolution_reason INTEGER,
    closure_comment TEXT,
    task_token TEXT,
    anon_email TEXT,
    CHECK (percent_complete >= 0 AND percent_complete <= 100)
);

CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(item_status);
CREATE INDEX IF NOT EXISTS idx_tasks_closed ON tasks(is_closed);
CREATE INDEX IF NOT EXISTS idx_tasks_category ON tasks(product_category);
CREATE INDEX IF NOT EXISTS idx_tasks_opened ON tasks(date_opened DESC);

CREATE TABLE IF NOT EXISTS assigned (
    task_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    PRIMARY KEY (task_id, user_id),
    FOREIGN KEY (task_id) REFERENCES tasks(task_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_assigned_user ON assigned(user_id);

CREATE TABLE IF NOT EXISTS comments (
    comment_id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL DEFAULT 0,
    comment_text TEXT NOT NULL,
    date_added INTEGER NOT NULL,
    last_edited_time INTEGER NOT NULL,
    FOREIGN KEY (task_id) REFERENCES tasks(task_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_comments_task ON comments(task_id);

-- comment_id 0 means "attached to the task itself"
CREATE TABLE IF NOT EXISTS attachments (
    attachment_id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL,
    comment_id INTEGER NOT NULL DEFAULT 0,
    orig_name TEXT NOT NULL,
    file_name TEXT NOT NULL UNIQUE,
    file_type TEXT NOT NULL DEFAULT '',
    file_size INTEGER NOT NULL DEFAULT 0,
    added_by INTEGER NOT NULL DEFAULT 0,
    date_added INTEGER NOT NULL,
    FOREIGN KEY (task_id) REFERENCES tasks(task_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_attachments_task ON attachments(task_id);

-- Watch-list membership
CREATE TABLE IF NOT EXISTS notifications (
    task_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    PRIMARY KEY (task_id, user_id),
    FOREIGN KEY (task_id) REFERENCES tasks(task_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id);

-- No uniqueness on (user_id, task_id): the vote-eligibility check is
-- the only guard against double votes. Known race.
CREATE TABLE IF NOT EXISTS votes (
    vote_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    task_id INTEGER NOT NULL,
    date_time INTEGER NOT NULL,
    FOREIGN KEY (task_id) REFERENCES tasks(task_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_votes_task ON votes(task_id);

CREATE TABLE IF NOT EXISTS reminders (
    reminder_id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL,
    to_user_id INTEGER NOT NULL,
    from_user_id INTEGER NOT NULL DEFAULT 0,
    start_time INTEGER NOT NULL,
    how_often INTEGER NOT NULL,
    reminder_message TEXT NOT NULL,
    UNIQUE (task_id, to_user_id, how_often, reminder_message),
    FOREIGN KEY (task_id) REFERENCES tasks(task_id) ON DELETE CASCADE
);

-- Directional duplicate links; related_task may point at a task id
-- parsed from free text, so it is not foreign-keyed.
CREATE TABLE IF NOT EXISTS related (
    related_id INTEGER PRIMARY KEY AUTOINCREMENT,
    this_task INTEGER NOT NULL,
    related_task INTEGER NOT NULL,
    is_duplicate INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_related_this ON related(this_task, related_task);

-- ====================
-- Audit Events
-- ====================

-- Append-only. task_id 0 marks system/global events (user lifecycle).
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL DEFAULT 0,
    event_type TEXT NOT NULL,
    user_id INTEGER NOT NULL DEFAULT 0,
    old_value TEXT,
    new_value TEXT,
    field_name TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_task ON events(task_id);
CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
CREATE INDEX IF NOT EXISTS idx_events_created ON events(created_at DESC);
"#;

/// Reference rows the engine depends on. `INSERT OR IGNORE` keeps this
/// idempotent and preserves local edits to the names.
pub const SEED_SQL: &str = r"
INSERT OR IGNORE INTO list_status (status_id, status_name) VALUES
    (1, 'Unconfirmed'),
    (2, 'New'),
    (3, 'Assigned'),
    (4, 'Researching'),
    (5, 'Waiting on Customer'),
    (6, 'Requires Testing');

INSERT OR IGNORE INTO list_resolution (resolution_id, resolution_name) VALUES
    (1, 'Not a Bug'),
    (2, 'Will Not Fix'),
    (3, 'Will Not Implement'),
    (4, 'Works for Me'),
    (5, 'Deferred'),
    (6, 'Duplicate'),
    (7, 'Implemented'),
    (8, 'Fixed');

INSERT OR IGNORE INTO list_tasktype (tasktype_id, tasktype_name) VALUES
    (1, 'Bug Report'),
    (2, 'Feature Request'),
    (3, 'Task');
";

/// Apply the schema and seed rows to the database.
///
/// This uses `execute_batch` to run the entire DDL script.
/// It is idempotent because all statements use `IF NOT EXISTS` or
/// `INSERT OR IGNORE`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    // Set pragmas before schema creation
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "cache_size", "-64000")?; // 64MB cache
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(SEED_SQL)?;

    // Record schema version
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("Failed to apply schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();

        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"user_capabilities".to_string()));
        assert!(tables.contains(&"projects".to_string()));
        assert!(tables.contains(&"list_category".to_string()));
        assert!(tables.contains(&"tasks".to_string()));
        assert!(tables.contains(&"assigned".to_string()));
        assert!(tables.contains(&"comments".to_string()));
        assert!(tables.contains(&"attachments".to_string()));
        assert!(tables.contains(&"notifications".to_string()));
        assert!(tables.contains(&"votes".to_string()));
        assert!(tables.contains(&"reminders".to_string()));
        assert!(tables.contains(&"related".to_string()));
        assert!(tables.contains(&"events".to_string()));
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        apply_schema(&conn).expect("First apply failed");
        apply_schema(&conn).expect("Second apply failed");
    }

    #[test]
    fn test_seed_rows_present() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let unconfirmed: String = conn
            .query_row(
                "SELECT status_name FROM list_status WHERE status_id = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(unconfirmed, "Unconfirmed");

        let duplicate: String = conn
            .query_row(
                "SELECT resolution_name FROM list_resolution WHERE resolution_id = 6",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(duplicate, "Duplicate");
    }

    #[test]
    fn test_votes_allow_duplicate_pairs() {
        // Documents the known gap: uniqueness is enforced by the
        // eligibility check, not the schema.
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO tasks (task_id, project_id, item_summary, detailed_desc,
                                date_opened, last_edited_time)
             VALUES (1, 1, 's', 'd', 0, 0)",
            [],
        )
        .unwrap();

        for _ in 0..2 {
            conn.execute(
                "INSERT INTO votes (user_id, task_id, date_time) VALUES (7, 1, 0)",
                [],
            )
            .unwrap();
        }

        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM votes WHERE task_id = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn test_percent_complete_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO tasks (task_id, project_id, item_summary, detailed_desc,
                                percent_complete, date_opened, last_edited_time)
             VALUES (1, 1, 's', 'd', 101, 0, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
