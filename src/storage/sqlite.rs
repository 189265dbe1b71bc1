//! SQLite storage implementation.
//!
//! This module provides the main storage backend for tasktrail. It
//! follows the MutationContext pattern for transaction discipline:
//! every mutation runs in one IMMEDIATE transaction that commits the
//! state change together with its audit events, so a visible change
//! never exists without its trail.
//!
//! Row-level reads and upserts are free functions over a `Connection`
//! so they work both on the store's own connection and inside a
//! mutation's transaction.

use crate::error::Result;
use crate::model::{Attachment, Category, Comment, Project, Task, User};
use crate::storage::events::{insert_event, Event, EventType};
use crate::storage::schema::apply_schema;
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::time::Duration;

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct TaskStore {
    conn: Connection,
}

/// Context for a mutation operation.
///
/// Passed to mutation closures to collect audit events; they are
/// inserted just before the transaction commits.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// User id performing the operation (0 = anonymous).
    pub actor: i64,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &str, actor: i64) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor,
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, task_id: i64, event_type: EventType) {
        self.events.push(Event::new(task_id, event_type, self.actor));
    }

    /// Record an event with old/new values.
    pub fn record_change(
        &mut self,
        task_id: i64,
        event_type: EventType,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.events
            .push(Event::new(task_id, event_type, self.actor).with_values(old_value, new_value));
    }

    /// Record a change of one named task field.
    pub fn record_field_change(
        &mut self,
        task_id: i64,
        field: &str,
        old_value: &str,
        new_value: &str,
    ) {
        self.events.push(
            Event::new(task_id, EventType::FieldChanged, self.actor)
                .with_values(Some(old_value.to_string()), Some(new_value.to_string()))
                .with_field(field),
        );
    }
}

/// Result of an upsert keyed by a unique column set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new row was written.
    Inserted,
    /// The keyed row already existed; nothing was written.
    AlreadyPresent,
}

impl UpsertOutcome {
    /// Whether the upsert wrote a new row.
    #[must_use]
    pub const fn inserted(self) -> bool {
        matches!(self, Self::Inserted)
    }
}

impl TaskStore {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or the
    /// schema fails to apply.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or the
    /// schema fails to apply.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;

        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            // Default 5 second timeout
            conn.busy_timeout(Duration::from_secs(5))?;
        }

        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for reads).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Writes the collected audit events
    /// 4. Commits (or rolls back on error)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled
    /// back on error.
    pub fn mutate<F, R>(&mut self, op: &str, actor: i64, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, actor);

        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit()?;

        Ok(result)
    }
}

// ==================
// Task Rows
// ==================

const TASK_COLUMNS: &str = "task_id, project_id, task_type, item_summary, detailed_desc, \
     item_status, task_severity, priority, product_category, product_version, \
     closedby_version, operating_system, percent_complete, opened_by, date_opened, \
     last_edited_time, last_edited_by, due_date, is_closed, date_closed, closed_by, \
     resolution_reason, closure_comment, task_token, anon_email";

pub(crate) fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        task_id: row.get(0)?,
        project_id: row.get(1)?,
        task_type: row.get(2)?,
        item_summary: row.get(3)?,
        detailed_desc: row.get(4)?,
        item_status: row.get(5)?,
        task_severity: row.get(6)?,
        priority: row.get(7)?,
        product_category: row.get(8)?,
        product_version: row.get(9)?,
        closedby_version: row.get(10)?,
        operating_system: row.get(11)?,
        percent_complete: row.get(12)?,
        opened_by: row.get(13)?,
        date_opened: row.get(14)?,
        last_edited_time: row.get(15)?,
        last_edited_by: row.get(16)?,
        due_date: row.get(17)?,
        is_closed: row.get(18)?,
        date_closed: row.get(19)?,
        closed_by: row.get(20)?,
        resolution_reason: row.get(21)?,
        closure_comment: row.get(22)?,
        task_token: row.get(23)?,
        anon_email: row.get(24)?,
    })
}

/// Fetch a task by id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_task(conn: &Connection, task_id: i64) -> Result<Option<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = ?1");
    let task = conn
        .query_row(&sql, [task_id], |row| task_from_row(row))
        .optional()?;
    Ok(task)
}

/// Next task id: `max(existing) + 1`. Gaps left by deletions persist.
///
/// Call inside an IMMEDIATE transaction so two creators cannot read the
/// same maximum.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn next_task_id(conn: &Connection) -> Result<i64> {
    let id = conn.query_row("SELECT COALESCE(MAX(task_id), 0) + 1 FROM tasks", [], |row| {
        row.get(0)
    })?;
    Ok(id)
}

/// Insert a complete task row.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_task(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        "INSERT INTO tasks (task_id, project_id, task_type, item_summary, detailed_desc,
                            item_status, task_severity, priority, product_category,
                            product_version, closedby_version, operating_system,
                            percent_complete, opened_by, date_opened, last_edited_time,
                            last_edited_by, due_date, is_closed, date_closed, closed_by,
                            resolution_reason, closure_comment, task_token, anon_email)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                 ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)",
        rusqlite::params![
            task.task_id,
            task.project_id,
            task.task_type,
            task.item_summary,
            task.detailed_desc,
            task.item_status,
            task.task_severity,
            task.priority,
            task.product_category,
            task.product_version,
            task.closedby_version,
            task.operating_system,
            task.percent_complete,
            task.opened_by,
            task.date_opened,
            task.last_edited_time,
            task.last_edited_by,
            task.due_date,
            task.is_closed,
            task.date_closed,
            task.closed_by,
            task.resolution_reason,
            task.closure_comment,
            task.task_token,
            task.anon_email,
        ],
    )?;
    Ok(())
}

// ==================
// Assignments & Subscriptions
// ==================

/// Current assignees of a task, in user-id order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_assignees(conn: &Connection, task_id: i64) -> Result<Vec<i64>> {
    let mut stmt =
        conn.prepare("SELECT user_id FROM assigned WHERE task_id = ?1 ORDER BY user_id")?;
    let rows = stmt.query_map([task_id], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<i64>>>()?)
}

/// Idempotently add one assignee.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn add_assignee(conn: &Connection, task_id: i64, user_id: i64) -> Result<UpsertOutcome> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO assigned (task_id, user_id) VALUES (?1, ?2)",
        rusqlite::params![task_id, user_id],
    )?;
    Ok(if changed > 0 {
        UpsertOutcome::Inserted
    } else {
        UpsertOutcome::AlreadyPresent
    })
}

/// Remove every assignee of a task.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn clear_assignees(conn: &Connection, task_id: i64) -> Result<()> {
    conn.execute("DELETE FROM assigned WHERE task_id = ?1", [task_id])?;
    Ok(())
}

/// Users watching a task, in user-id order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_subscribers(conn: &Connection, task_id: i64) -> Result<Vec<i64>> {
    let mut stmt =
        conn.prepare("SELECT user_id FROM notifications WHERE task_id = ?1 ORDER BY user_id")?;
    let rows = stmt.query_map([task_id], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<i64>>>()?)
}

/// Idempotently subscribe a user to a task.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn subscribe(conn: &Connection, task_id: i64, user_id: i64) -> Result<UpsertOutcome> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO notifications (task_id, user_id) VALUES (?1, ?2)",
        rusqlite::params![task_id, user_id],
    )?;
    Ok(if changed > 0 {
        UpsertOutcome::Inserted
    } else {
        UpsertOutcome::AlreadyPresent
    })
}

/// Unsubscribe a user from a task. Returns true if a row was removed.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn unsubscribe(conn: &Connection, task_id: i64, user_id: i64) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM notifications WHERE task_id = ?1 AND user_id = ?2",
        rusqlite::params![task_id, user_id],
    )?;
    Ok(changed > 0)
}

// ==================
// Votes, Reminders, Relations
// ==================

/// Whether a user has already voted on a task.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn has_voted(conn: &Connection, user_id: i64, task_id: i64) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM votes WHERE user_id = ?1 AND task_id = ?2)",
        rusqlite::params![user_id, task_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Record a vote. Not deduplicated; see the schema note on `votes`.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_vote(conn: &Connection, user_id: i64, task_id: i64, when: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO votes (user_id, task_id, date_time) VALUES (?1, ?2, ?3)",
        rusqlite::params![user_id, task_id, when],
    )?;
    Ok(())
}

/// Upsert one reminder row, keyed by (task, recipient, interval, message).
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn upsert_reminder(
    conn: &Connection,
    task_id: i64,
    to_user_id: i64,
    from_user_id: i64,
    start_time: i64,
    how_often: i64,
    message: &str,
) -> Result<UpsertOutcome> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO reminders
             (task_id, to_user_id, from_user_id, start_time, how_often, reminder_message)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![task_id, to_user_id, from_user_id, start_time, how_often, message],
    )?;
    Ok(if changed > 0 {
        UpsertOutcome::Inserted
    } else {
        UpsertOutcome::AlreadyPresent
    })
}

/// Whether a duplicate relation already links the two tasks (directional).
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn has_duplicate_relation(conn: &Connection, this_task: i64, related_task: i64) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM related
                        WHERE this_task = ?1 AND related_task = ?2 AND is_duplicate = 1)",
        rusqlite::params![this_task, related_task],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Record a directional duplicate relation.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_duplicate_relation(
    conn: &Connection,
    this_task: i64,
    related_task: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO related (this_task, related_task, is_duplicate) VALUES (?1, ?2, 1)",
        rusqlite::params![this_task, related_task],
    )?;
    Ok(())
}

// ==================
// Comments & Attachments
// ==================

/// Insert a comment, returning its id.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_comment(
    conn: &Connection,
    task_id: i64,
    user_id: i64,
    text: &str,
    when: i64,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO comments (task_id, user_id, comment_text, date_added, last_edited_time)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        rusqlite::params![task_id, user_id, text, when],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Fetch the comments of a task, oldest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_comments(conn: &Connection, task_id: i64) -> Result<Vec<Comment>> {
    let mut stmt = conn.prepare(
        "SELECT comment_id, task_id, user_id, comment_text, date_added, last_edited_time
         FROM comments WHERE task_id = ?1 ORDER BY date_added ASC, comment_id ASC",
    )?;
    let rows = stmt.query_map([task_id], |row| {
        Ok(Comment {
            comment_id: row.get(0)?,
            task_id: row.get(1)?,
            user_id: row.get(2)?,
            comment_text: row.get(3)?,
            date_added: row.get(4)?,
            last_edited_time: row.get(5)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<Comment>>>()?)
}

/// Insert an attachment metadata row, returning its id.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_attachment(conn: &Connection, att: &Attachment) -> Result<i64> {
    conn.execute(
        "INSERT INTO attachments
             (task_id, comment_id, orig_name, file_name, file_type, file_size, added_by, date_added)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            att.task_id,
            att.comment_id,
            att.orig_name,
            att.file_name,
            att.file_type,
            att.file_size,
            att.added_by,
            att.date_added,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Fetch an attachment by id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_attachment(conn: &Connection, attachment_id: i64) -> Result<Option<Attachment>> {
    let att = conn
        .query_row(
            "SELECT attachment_id, task_id, comment_id, orig_name, file_name, file_type,
                    file_size, added_by, date_added
             FROM attachments WHERE attachment_id = ?1",
            [attachment_id],
            |row| {
                Ok(Attachment {
                    attachment_id: row.get(0)?,
                    task_id: row.get(1)?,
                    comment_id: row.get(2)?,
                    orig_name: row.get(3)?,
                    file_name: row.get(4)?,
                    file_type: row.get(5)?,
                    file_size: row.get(6)?,
                    added_by: row.get(7)?,
                    date_added: row.get(8)?,
                })
            },
        )
        .optional()?;
    Ok(att)
}

/// Whether a storage name is already taken.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn storage_name_taken(conn: &Connection, file_name: &str) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM attachments WHERE file_name = ?1)",
        [file_name],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Delete an attachment row. Returns true if a row was removed.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete_attachment(conn: &Connection, attachment_id: i64) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM attachments WHERE attachment_id = ?1",
        [attachment_id],
    )?;
    Ok(changed > 0)
}

// ==================
// Users & Projects
// ==================

/// Fetch a user by id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_user(conn: &Connection, user_id: i64) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT user_id, user_name, user_pass, real_name, email_address, jabber_id,
                    notify_type, account_enabled, tasks_perpage, register_date, time_zone
             FROM users WHERE user_id = ?1",
            [user_id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// Fetch a user by login name.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_user_by_name(conn: &Connection, user_name: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT user_id, user_name, user_pass, real_name, email_address, jabber_id,
                    notify_type, account_enabled, tasks_perpage, register_date, time_zone
             FROM users WHERE user_name = ?1",
            [user_name],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        user_id: row.get(0)?,
        user_name: row.get(1)?,
        user_pass: row.get(2)?,
        real_name: row.get(3)?,
        email_address: row.get(4)?,
        jabber_id: row.get(5)?,
        notify_type: row.get(6)?,
        account_enabled: row.get(7)?,
        tasks_perpage: row.get(8)?,
        register_date: row.get(9)?,
        time_zone: row.get(10)?,
    })
}

/// List all users, id order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, user_name, user_pass, real_name, email_address, jabber_id,
                notify_type, account_enabled, tasks_perpage, register_date, time_zone
         FROM users ORDER BY user_id",
    )?;
    let rows = stmt.query_map([], user_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<User>>>()?)
}

/// Insert a user row, returning the new id.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_user(conn: &Connection, user: &User) -> Result<i64> {
    conn.execute(
        "INSERT INTO users (user_name, user_pass, real_name, email_address, jabber_id,
                            notify_type, account_enabled, tasks_perpage, register_date, time_zone)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            user.user_name,
            user.user_pass,
            user.real_name,
            user.email_address,
            user.jabber_id,
            user.notify_type,
            user.account_enabled,
            user.tasks_perpage,
            user.register_date,
            user.time_zone,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Delete a user and their membership rows (capabilities, watches,
/// assignments). Votes and authored content stay. Returns true if the
/// user row existed.
///
/// # Errors
///
/// Returns an error if any delete fails.
pub fn delete_user_rows(conn: &Connection, user_id: i64) -> Result<bool> {
    let existed = conn.execute("DELETE FROM users WHERE user_id = ?1", [user_id])? > 0;
    conn.execute(
        "DELETE FROM user_capabilities WHERE user_id = ?1",
        [user_id],
    )?;
    conn.execute("DELETE FROM notifications WHERE user_id = ?1", [user_id])?;
    conn.execute("DELETE FROM assigned WHERE user_id = ?1", [user_id])?;
    Ok(existed)
}

/// Fetch a project by id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_project(conn: &Connection, project_id: i64) -> Result<Option<Project>> {
    let project = conn
        .query_row(
            "SELECT project_id, project_title, is_active, default_cat_owner, auto_assign
             FROM projects WHERE project_id = ?1",
            [project_id],
            project_from_row,
        )
        .optional()?;
    Ok(project)
}

fn project_from_row(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        project_id: row.get(0)?,
        project_title: row.get(1)?,
        is_active: row.get(2)?,
        default_cat_owner: row.get(3)?,
        auto_assign: row.get(4)?,
    })
}

/// List all projects, id order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_projects(conn: &Connection) -> Result<Vec<Project>> {
    let mut stmt = conn.prepare(
        "SELECT project_id, project_title, is_active, default_cat_owner, auto_assign
         FROM projects ORDER BY project_id",
    )?;
    let rows = stmt.query_map([], project_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<Project>>>()?)
}

/// Insert a project row, returning the new id.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_project(conn: &Connection, project: &Project) -> Result<i64> {
    conn.execute(
        "INSERT INTO projects (project_title, is_active, default_cat_owner, auto_assign)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            project.project_title,
            project.is_active,
            project.default_cat_owner,
            project.auto_assign,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

// ==================
// Categories
// ==================

/// Load a project's full category tree, left-bound order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn load_categories(conn: &Connection, project_id: i64) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(
        "SELECT category_id, project_id, category_name, category_owner, lft, rgt
         FROM list_category WHERE project_id = ?1 ORDER BY lft",
    )?;
    let rows = stmt.query_map([project_id], category_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<Category>>>()?)
}

/// Fetch one category by id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_category(conn: &Connection, category_id: i64) -> Result<Option<Category>> {
    let cat = conn
        .query_row(
            "SELECT category_id, project_id, category_name, category_owner, lft, rgt
             FROM list_category WHERE category_id = ?1",
            [category_id],
            category_from_row,
        )
        .optional()?;
    Ok(cat)
}

fn category_from_row(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        category_id: row.get(0)?,
        project_id: row.get(1)?,
        category_name: row.get(2)?,
        category_owner: row.get(3)?,
        lft: row.get(4)?,
        rgt: row.get(5)?,
    })
}

/// Insert a category under an optional parent, shifting sibling bounds
/// to make room. Returns the new id.
///
/// Call inside a transaction: the bound shifts and the insert must be
/// atomic.
///
/// # Errors
///
/// Returns an error if the parent is missing from the project or a
/// statement fails.
pub fn insert_category(
    conn: &Connection,
    project_id: i64,
    name: &str,
    owner: i64,
    parent: Option<i64>,
) -> Result<i64> {
    let (lft, rgt) = match parent {
        Some(parent_id) => {
            let parent_rgt: i64 = conn.query_row(
                "SELECT rgt FROM list_category WHERE category_id = ?1 AND project_id = ?2",
                rusqlite::params![parent_id, project_id],
                |row| row.get(0),
            )?;
            conn.execute(
                "UPDATE list_category SET rgt = rgt + 2 WHERE project_id = ?1 AND rgt >= ?2",
                rusqlite::params![project_id, parent_rgt],
            )?;
            conn.execute(
                "UPDATE list_category SET lft = lft + 2 WHERE project_id = ?1 AND lft > ?2",
                rusqlite::params![project_id, parent_rgt],
            )?;
            (parent_rgt, parent_rgt + 1)
        }
        None => {
            let max_rgt: i64 = conn.query_row(
                "SELECT COALESCE(MAX(rgt), 0) FROM list_category WHERE project_id = ?1",
                [project_id],
                |row| row.get(0),
            )?;
            (max_rgt + 1, max_rgt + 2)
        }
    };

    conn.execute(
        "INSERT INTO list_category (project_id, category_name, category_owner, lft, rgt)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![project_id, name, owner, lft, rgt],
    )?;
    Ok(conn.last_insert_rowid())
}
