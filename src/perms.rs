//! Permission policy gate.
//!
//! Authorization is evaluated before every state change through pure
//! predicates over a preloaded [`CapabilitySet`]. A denied check is a
//! silent no-op for the caller, never an error: batch operations skip
//! unauthorized targets and keep going.
//!
//! Grants live in the `user_capabilities` table as
//! `(user_id, project_id, capability)` rows. Two sentinel scopes widen
//! a grant: user id 0 grants the capability to everyone (including
//! anonymous actors), and project id 0 grants it across all projects.
//! Loading a set unions the actor's own rows with the everyone rows.

use crate::error::Result;
use crate::model::Task;
use rusqlite::Connection;
use std::collections::HashSet;
use std::fmt;

/// The acting identity threaded through every operation.
///
/// User id 0 is the anonymous actor; it may carry the reporter email
/// and access token of the anonymous task it is working with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// User id (0 = anonymous).
    pub id: i64,
    /// Reporter email supplied with an anonymous request.
    pub anon_email: Option<String>,
    /// Access token for one anonymous task.
    pub task_token: Option<String>,
}

impl Actor {
    /// A registered user.
    #[must_use]
    pub const fn user(id: i64) -> Self {
        Self {
            id,
            anon_email: None,
            task_token: None,
        }
    }

    /// The anonymous actor.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self::user(0)
    }

    /// Attach the reporter email of an anonymous request.
    #[must_use]
    pub fn with_email(mut self, email: &str) -> Self {
        self.anon_email = Some(email.to_string());
        self
    }

    /// Attach an anonymous task access token.
    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.task_token = Some(token.to_string());
        self
    }

    /// Whether this is the anonymous actor.
    #[must_use]
    pub const fn is_anon(&self) -> bool {
        self.id == 0
    }
}

/// A grantable capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// See tasks in a project (beyond own/tokened ones).
    ViewTasks,
    /// Open new tasks.
    OpenTask,
    /// Close tasks.
    CloseTask,
    /// Replace a task's assignee set with oneself.
    TakeOwnership,
    /// Join a task's assignee set without displacing others.
    AddToAssignees,
    /// Vote on tasks.
    Vote,
    /// Comment on open tasks.
    AddComments,
    /// Comment on closed tasks.
    CommentClosed,
    /// Attach files.
    CreateAttachments,
    /// Remove attached files.
    DeleteAttachments,
    /// Administer one project (notifications for others, reminders).
    ManageProject,
    /// Override field defaults when opening tasks.
    ModifyAllTasks,
    /// Global administrator. Implies every other capability.
    Admin,
}

impl Capability {
    /// All capabilities, in grant-name order.
    pub const ALL: [Self; 13] = [
        Self::ViewTasks,
        Self::OpenTask,
        Self::CloseTask,
        Self::TakeOwnership,
        Self::AddToAssignees,
        Self::Vote,
        Self::AddComments,
        Self::CommentClosed,
        Self::CreateAttachments,
        Self::DeleteAttachments,
        Self::ManageProject,
        Self::ModifyAllTasks,
        Self::Admin,
    ];

    /// Stable grant name stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ViewTasks => "view_tasks",
            Self::OpenTask => "open_task",
            Self::CloseTask => "close_task",
            Self::TakeOwnership => "take_ownership",
            Self::AddToAssignees => "add_to_assignees",
            Self::Vote => "vote",
            Self::AddComments => "add_comments",
            Self::CommentClosed => "comment_closed",
            Self::CreateAttachments => "create_attachments",
            Self::DeleteAttachments => "delete_attachments",
            Self::ManageProject => "manage_project",
            Self::ModifyAllTasks => "modify_all_tasks",
            Self::Admin => "is_admin",
        }
    }

    /// Parse a stored grant name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|cap| cap.as_str() == s)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The effective capabilities of one actor within one project.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    caps: HashSet<Capability>,
}

impl CapabilitySet {
    /// An empty set (everything denied).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set from explicit capabilities.
    #[must_use]
    pub fn from_caps<I: IntoIterator<Item = Capability>>(caps: I) -> Self {
        Self {
            caps: caps.into_iter().collect(),
        }
    }

    /// Load the effective set for a user within a project.
    ///
    /// Unions the user's own grants with everyone grants (user 0), in
    /// both the project scope and the global scope (project 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn load(conn: &Connection, user_id: i64, project_id: i64) -> Result<Self> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT capability FROM user_capabilities
             WHERE (user_id = ?1 OR user_id = 0)
               AND (project_id = ?2 OR project_id = 0)",
        )?;
        let names = stmt.query_map(rusqlite::params![user_id, project_id], |row| {
            row.get::<_, String>(0)
        })?;

        let mut caps = HashSet::new();
        for name in names {
            let name = name?;
            match Capability::parse(&name) {
                Some(cap) => {
                    caps.insert(cap);
                }
                None => {
                    tracing::warn!(capability = %name, "ignoring unknown capability grant");
                }
            }
        }
        Ok(Self { caps })
    }

    /// Whether the set carries a capability. Admin carries all.
    #[must_use]
    pub fn has(&self, cap: Capability) -> bool {
        self.caps.contains(&Capability::Admin) || self.caps.contains(&cap)
    }
}

/// Pure authorization predicates for one actor against one project's
/// capability set.
///
/// None of these touch storage; callers load the [`CapabilitySet`] for
/// the task's project first and pass per-row facts (closed flag,
/// prior vote) in.
#[derive(Debug, Clone, Copy)]
pub struct PermissionGate<'a> {
    actor: &'a Actor,
    caps: &'a CapabilitySet,
}

impl<'a> PermissionGate<'a> {
    /// Pair an actor with a loaded capability set.
    #[must_use]
    pub const fn new(actor: &'a Actor, caps: &'a CapabilitySet) -> Self {
        Self { actor, caps }
    }

    /// Raw capability check.
    #[must_use]
    pub fn can(&self, cap: Capability) -> bool {
        self.caps.has(cap)
    }

    /// Whether the actor is a global administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.caps.has(Capability::Admin)
    }

    /// Whether the actor may see a task.
    ///
    /// Granted by the view capability, by having opened the task as a
    /// registered user, or by presenting the access token of an
    /// anonymous task.
    #[must_use]
    pub fn can_view_task(&self, task: &Task) -> bool {
        if self.caps.has(Capability::ViewTasks) {
            return true;
        }
        if !self.actor.is_anon() && task.opened_by == self.actor.id {
            return true;
        }
        if task.is_anonymous() {
            if let (Some(held), Some(expected)) = (&self.actor.task_token, &task.task_token) {
                return held == expected;
            }
        }
        false
    }

    /// Whether the actor may open a new task in the project.
    #[must_use]
    pub fn can_open_task(&self) -> bool {
        self.caps.has(Capability::OpenTask)
    }

    /// Whether the actor may close a task.
    #[must_use]
    pub fn can_close_task(&self, task: &Task) -> bool {
        self.caps.has(Capability::CloseTask) && self.can_view_task(task)
    }

    /// Whether the actor may replace a task's assignee set with
    /// themselves.
    #[must_use]
    pub fn can_take_ownership(&self, task: &Task) -> bool {
        !self.actor.is_anon()
            && self.caps.has(Capability::TakeOwnership)
            && self.can_view_task(task)
    }

    /// Whether the actor may join a task's assignee set.
    #[must_use]
    pub fn can_add_to_assignees(&self, task: &Task) -> bool {
        !self.actor.is_anon()
            && self.caps.has(Capability::AddToAssignees)
            && self.can_view_task(task)
    }

    /// Vote eligibility score. Votes are recorded while the score is
    /// positive; zero means ineligible.
    ///
    /// Anonymous actors, closed tasks, a missing vote grant, and a
    /// prior vote all score zero. The score is numeric so weighted
    /// voting can slot in without changing callers.
    #[must_use]
    pub fn vote_eligibility(&self, task: &Task, already_voted: bool) -> i64 {
        if self.actor.is_anon()
            || already_voted
            || task.is_closed
            || !self.caps.has(Capability::Vote)
            || !self.can_view_task(task)
        {
            return 0;
        }
        1
    }

    /// Whether the actor may comment on a task. Closed tasks need the
    /// stricter closed-comment capability.
    #[must_use]
    pub fn can_comment(&self, task: &Task) -> bool {
        if !self.can_view_task(task) {
            return false;
        }
        if task.is_closed {
            self.caps.has(Capability::CommentClosed)
        } else {
            self.caps.has(Capability::AddComments)
        }
    }

    /// Whether the actor may attach files in the project.
    #[must_use]
    pub fn can_create_attachments(&self) -> bool {
        self.caps.has(Capability::CreateAttachments)
    }

    /// Whether the actor may remove attached files.
    #[must_use]
    pub fn can_delete_attachments(&self) -> bool {
        self.caps.has(Capability::DeleteAttachments)
    }

    /// Whether the actor administers the project.
    #[must_use]
    pub fn can_manage_project(&self) -> bool {
        self.caps.has(Capability::ManageProject)
    }

    /// Whether the actor may override field defaults when opening a
    /// task.
    #[must_use]
    pub fn can_modify_all_tasks(&self) -> bool {
        self.caps.has(Capability::ModifyAllTasks)
    }
}

/// Record a capability grant. Idempotent.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn grant(conn: &Connection, user_id: i64, project_id: i64, cap: Capability) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO user_capabilities (user_id, project_id, capability)
         VALUES (?1, ?2, ?3)",
        rusqlite::params![user_id, project_id, cap.as_str()],
    )?;
    Ok(())
}

/// Remove a capability grant. Returns true if a row was removed.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn revoke(conn: &Connection, user_id: i64, project_id: i64, cap: Capability) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM user_capabilities
         WHERE user_id = ?1 AND project_id = ?2 AND capability = ?3",
        rusqlite::params![user_id, project_id, cap.as_str()],
    )?;
    Ok(changed > 0)
}
