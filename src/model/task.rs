//! Task model for tasktrail.
//!
//! A task is the primary trackable unit of work. Type, severity,
//! priority, status, category, version and OS fields reference seeded
//! list tables by numeric id; the well-known ids below are the ones the
//! engine itself branches on.

use serde::{Deserialize, Serialize};

/// Initial status of a freshly reported task.
pub const STATUS_UNCONFIRMED: i64 = 1;
/// Status of a confirmed but unassigned task.
pub const STATUS_NEW: i64 = 2;
/// Status a task is promoted to when someone takes it on.
pub const STATUS_ASSIGNED: i64 = 3;

/// Resolution reason marking a task as a duplicate of another.
pub const RESOLUTION_DUPLICATE: i64 = 6;

/// Priority applied when the reporter lacks `modify_all_tasks`.
pub const DEFAULT_PRIORITY: i64 = 2;

/// A task row.
///
/// Invariant: `is_closed` is true iff `date_closed` is set and
/// `resolution_reason` is non-null. Task ids are `max(existing)+1`;
/// gaps left by deletions persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier, unique across all projects
    pub task_id: i64,

    /// Project this task belongs to
    pub project_id: i64,

    /// Task type id (bug, feature request, ...)
    pub task_type: i64,

    /// One-line summary
    pub item_summary: String,

    /// Full description
    pub detailed_desc: String,

    /// Status id; see `STATUS_*` for the well-known ones
    pub item_status: i64,

    /// Severity 1-5
    pub task_severity: i64,

    /// Priority 1-5
    pub priority: i64,

    /// Category id (0 = uncategorized)
    pub product_category: i64,

    /// Version the issue was reported in (0 = none)
    pub product_version: i64,

    /// Version the fix is due in (0 = none)
    pub closedby_version: i64,

    /// Operating system id (0 = none)
    pub operating_system: i64,

    /// Completion percentage 0-100
    pub percent_complete: i64,

    /// User who opened the task (0 = anonymous reporter)
    pub opened_by: i64,

    /// Opening timestamp (Unix milliseconds)
    pub date_opened: i64,

    /// Last edit timestamp (Unix milliseconds)
    pub last_edited_time: i64,

    /// User who last edited the task
    pub last_edited_by: i64,

    /// Optional due date (Unix milliseconds, end of day)
    pub due_date: Option<i64>,

    /// Closed flag
    pub is_closed: bool,

    /// Closing timestamp (Unix milliseconds)
    pub date_closed: Option<i64>,

    /// User who closed the task (0 = never closed)
    pub closed_by: i64,

    /// Resolution reason id; see `RESOLUTION_DUPLICATE`
    pub resolution_reason: Option<i64>,

    /// Free-form closure comment
    pub closure_comment: Option<String>,

    /// Access token handed to an anonymous reporter
    pub task_token: Option<String>,

    /// Contact address of an anonymous reporter
    pub anon_email: Option<String>,
}

impl Task {
    /// Whether the task was opened anonymously.
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        self.opened_by == 0
    }

    /// Whether the status is one that assignment promotes away from.
    #[must_use]
    pub const fn awaits_confirmation(&self) -> bool {
        matches!(self.item_status, STATUS_UNCONFIRMED | STATUS_NEW)
    }
}

/// Payload for creating a task.
///
/// Fields beyond summary and description are optional; the creation
/// flow substitutes project defaults, and overriding priority, due
/// date, initial status or due version additionally requires the
/// `modify_all_tasks` capability.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub project_id: i64,
    pub item_summary: String,
    pub detailed_desc: String,
    pub task_type: i64,
    pub product_category: i64,
    pub item_status: i64,
    pub task_severity: i64,
    pub priority: i64,
    pub product_version: i64,
    pub closedby_version: i64,
    pub operating_system: i64,
    pub due_date: Option<i64>,
    /// Initial assignee user ids
    pub assignees: Vec<i64>,
    /// Subscribe the reporter to the new task
    pub notify_self: bool,
}

impl NewTask {
    /// Create a payload with the required fields and neutral defaults.
    #[must_use]
    pub fn new(project_id: i64, summary: &str, description: &str) -> Self {
        Self {
            project_id,
            item_summary: summary.to_string(),
            detailed_desc: description.to_string(),
            task_type: 1,
            product_category: 0,
            item_status: STATUS_UNCONFIRMED,
            task_severity: 2,
            priority: DEFAULT_PRIORITY,
            product_version: 0,
            closedby_version: 0,
            operating_system: 0,
            due_date: None,
            assignees: Vec::new(),
            notify_self: false,
        }
    }

    /// Set the requested initial status.
    #[must_use]
    pub const fn with_status(mut self, status: i64) -> Self {
        self.item_status = status;
        self
    }

    /// Set the severity.
    #[must_use]
    pub const fn with_severity(mut self, severity: i64) -> Self {
        self.task_severity = severity;
        self
    }

    /// Set the requested priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Set the category.
    #[must_use]
    pub const fn with_category(mut self, category_id: i64) -> Self {
        self.product_category = category_id;
        self
    }

    /// Set the requested due date (Unix milliseconds).
    #[must_use]
    pub const fn with_due_date(mut self, due: i64) -> Self {
        self.due_date = Some(due);
        self
    }

    /// Set the initial assignee list.
    #[must_use]
    pub fn with_assignees(mut self, assignees: Vec<i64>) -> Self {
        self.assignees = assignees;
        self
    }
}
