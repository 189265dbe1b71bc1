//! Task mutation service.
//!
//! Every state change flows through [`TaskService`]: it consults the
//! permission gate, applies the change and its audit events in one
//! transaction, then hands the outcome to the notification
//! coordinator. Denied checks are silent no-ops so batch operations
//! can skip unauthorized targets; validation problems surface as
//! errors before anything is written.

use crate::attach::{AttachmentManager, FileUpload};
use crate::error::{Error, Result};
use crate::hierarchy::resolve_owner;
use crate::model::task::{
    DEFAULT_PRIORITY, RESOLUTION_DUPLICATE, STATUS_ASSIGNED, STATUS_NEW, STATUS_UNCONFIRMED,
};
use crate::model::user::{clean_real_name, clean_username};
use crate::model::{NewTask, NewUser, Task, User};
use crate::notify::{NotificationCoordinator, NotificationKind, Recipient};
use crate::perms::{Actor, Capability, CapabilitySet, PermissionGate};
use crate::storage::events::Event;
use crate::storage::sqlite::{
    add_assignee, clear_assignees, delete_attachment, delete_user_rows, get_assignees,
    get_attachment, get_project, get_task, get_user, get_user_by_name, has_duplicate_relation,
    has_voted, insert_comment, insert_duplicate_relation, insert_task, insert_user, insert_vote,
    load_categories, next_task_id, subscribe, unsubscribe, upsert_reminder,
};
use crate::storage::{EventType, TaskStore};
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Recurrence interval of the reminder scheduled for a due date.
const DUE_REMINDER_INTERVAL_MS: i64 = 2 * 24 * 60 * 60 * 1000;

const DEFAULT_REMINDER_MESSAGE: &str = "This task is approaching its due date.";

/// What happened to one target of a batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The change was applied.
    Changed,
    /// Nothing to do; the state was already as requested.
    Unchanged,
    /// The permission gate said no; skipped.
    Denied,
    /// The target does not exist.
    NotFound,
}

impl ItemOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Changed => "changed",
            Self::Unchanged => "unchanged",
            Self::Denied => "denied",
            Self::NotFound => "not found",
        }
    }
}

/// Per-item results of a batch operation, in request order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub items: Vec<(i64, ItemOutcome)>,
}

impl BatchReport {
    fn push(&mut self, id: i64, outcome: ItemOutcome) {
        self.items.push((id, outcome));
    }

    /// How many targets actually changed.
    #[must_use]
    pub fn changed_count(&self) -> usize {
        self.items
            .iter()
            .filter(|(_, o)| *o == ItemOutcome::Changed)
            .count()
    }

    #[must_use]
    pub fn any_changed(&self) -> bool {
        self.changed_count() > 0
    }

    /// Outcome recorded for one target id.
    #[must_use]
    pub fn outcome_for(&self, id: i64) -> Option<ItemOutcome> {
        self.items
            .iter()
            .find(|(item, _)| *item == id)
            .map(|(_, o)| *o)
    }
}

/// Implements the mutation operations over one store.
pub struct TaskService {
    store: TaskStore,
    notifier: NotificationCoordinator,
    attachments: AttachmentManager,
}

impl TaskService {
    #[must_use]
    pub fn new(
        store: TaskStore,
        notifier: NotificationCoordinator,
        attachments: AttachmentManager,
    ) -> Self {
        Self {
            store,
            notifier,
            attachments,
        }
    }

    /// Read access to the underlying store.
    #[must_use]
    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    // ==================
    // Create
    // ==================

    /// Open a new task.
    ///
    /// Returns the new task id, or `None` when the actor may not open
    /// tasks in the project. Without the `modify_all_tasks` capability
    /// the requested priority, due date, initial status and due
    /// version are replaced with defaults.
    ///
    /// Side effects after the task row commits (initial assignee
    /// notification, uploads, category-owner auto-assign and
    /// subscription, due-date reminder, reporter self-subscription)
    /// never roll the task back.
    ///
    /// # Errors
    ///
    /// Returns an error when summary or description is missing, the
    /// project does not exist, an anonymous request carries no
    /// contact address, or a write fails.
    pub fn create_task(
        &mut self,
        actor: &Actor,
        new_task: NewTask,
        files: Vec<FileUpload>,
    ) -> Result<Option<i64>> {
        if new_task.item_summary.trim().is_empty() {
            return Err(Error::RequiredField { field: "summary" });
        }
        if new_task.detailed_desc.trim().is_empty() {
            return Err(Error::RequiredField {
                field: "description",
            });
        }
        let project = get_project(self.store.conn(), new_task.project_id)?.ok_or(
            Error::ProjectNotFound {
                id: new_task.project_id,
            },
        )?;

        let caps = CapabilitySet::load(self.store.conn(), actor.id, project.project_id)?;
        let gate = PermissionGate::new(actor, &caps);
        if !gate.can_open_task() {
            tracing::debug!(project_id = project.project_id, "task creation denied");
            return Ok(None);
        }

        let mut fields = new_task;
        if !gate.can_modify_all_tasks() {
            fields.closedby_version = 0;
            fields.priority = DEFAULT_PRIORITY;
            fields.due_date = None;
            fields.item_status = STATUS_UNCONFIRMED;
        }

        let (token, anon_email) = if actor.is_anon() {
            let email = actor
                .anon_email
                .clone()
                .ok_or(Error::RequiredField { field: "anon-email" })?;
            (Some(Uuid::new_v4().simple().to_string()), Some(email))
        } else {
            (None, None)
        };

        let now = now_ms();
        let assignees = fields.assignees.clone();

        let task_id = self.store.mutate("create_task", actor.id, |tx, ctx| {
            let task_id = next_task_id(tx)?;
            let task = Task {
                task_id,
                project_id: fields.project_id,
                task_type: fields.task_type,
                item_summary: fields.item_summary.clone(),
                detailed_desc: fields.detailed_desc.clone(),
                item_status: fields.item_status,
                task_severity: fields.task_severity,
                priority: fields.priority,
                product_category: fields.product_category,
                product_version: fields.product_version,
                closedby_version: fields.closedby_version,
                operating_system: fields.operating_system,
                percent_complete: 0,
                opened_by: ctx.actor,
                date_opened: now,
                last_edited_time: now,
                last_edited_by: ctx.actor,
                due_date: fields.due_date,
                is_closed: false,
                date_closed: None,
                closed_by: 0,
                resolution_reason: None,
                closure_comment: None,
                task_token: token.clone(),
                anon_email: anon_email.clone(),
            };
            insert_task(tx, &task)?;

            if !assignees.is_empty() {
                for &uid in &assignees {
                    add_assignee(tx, task_id, uid)?;
                }
                ctx.record_change(
                    task_id,
                    EventType::AssignmentChanged,
                    None,
                    Some(join_ids(&assignees)),
                );
            }
            ctx.record_event(task_id, EventType::Opened);
            Ok(task_id)
        })?;

        // Initial assignees hear about it even if the list is empty,
        // which the coordinator treats as a no-op send.
        self.notifier.notify(
            self.store.conn(),
            NotificationKind::NewAssignee,
            task_id,
            actor.id,
            Some(assignees.iter().map(|&id| Recipient::User(id)).collect()),
            serde_json::json!({ "summary": fields.item_summary }),
        );

        if !files.is_empty() {
            self.attachments
                .upload(&mut self.store, &gate, actor.id, task_id, 0, files)?;
        }

        let categories = load_categories(self.store.conn(), project.project_id)?;
        let owner = resolve_owner(&categories, fields.product_category, project.default_cat_owner);
        if let Some(owner) = owner {
            if project.auto_assign && matches!(fields.item_status, STATUS_UNCONFIRMED | STATUS_NEW) {
                self.add_to_assignees(owner, &[task_id], true)?;
            }
            self.add_notification(actor, owner, &[task_id], true)?;
        }

        if fields.due_date.is_some() {
            let recipients = get_assignees(self.store.conn(), task_id)?;
            self.upsert_reminders(
                actor.id,
                task_id,
                &recipients,
                now,
                DUE_REMINDER_INTERVAL_MS,
                DEFAULT_REMINDER_MESSAGE,
            )?;
        }

        self.notifier.notify(
            self.store.conn(),
            NotificationKind::TaskOpened,
            task_id,
            actor.id,
            None,
            serde_json::json!({ "summary": fields.item_summary }),
        );

        if fields.notify_self && !actor.is_anon() && owner != Some(actor.id) {
            self.add_notification(actor, actor.id, &[task_id], true)?;
        }

        if actor.is_anon() {
            if let (Some(token), Some(email)) = (token, anon_email) {
                self.notifier.notify(
                    self.store.conn(),
                    NotificationKind::AnonTaskOpened,
                    task_id,
                    0,
                    Some(vec![Recipient::Email(email)]),
                    serde_json::json!({ "token": token }),
                );
            }
        }

        Ok(Some(task_id))
    }

    // ==================
    // Close
    // ==================

    /// Close a task.
    ///
    /// Returns false when the actor may not close it. Closing an
    /// already-closed task rewrites the closure fields. When the
    /// reason is "duplicate" and the comment references another task
    /// (`TT#n` or `task n`), a duplicate relation is recorded once per
    /// pair and the reporter's implicit vote moves to the referenced
    /// task.
    ///
    /// # Errors
    ///
    /// Returns an error if the task does not exist or a write fails.
    pub fn close_task(
        &mut self,
        actor: &Actor,
        task_id: i64,
        reason: i64,
        comment: &str,
        mark_complete: bool,
    ) -> Result<bool> {
        let task =
            get_task(self.store.conn(), task_id)?.ok_or(Error::TaskNotFound { id: task_id })?;

        let caps = CapabilitySet::load(self.store.conn(), actor.id, task.project_id)?;
        let gate = PermissionGate::new(actor, &caps);
        if !gate.can_close_task(&task) {
            tracing::debug!(task_id, "close denied");
            return Ok(false);
        }

        let now = now_ms();
        self.store.mutate("close_task", actor.id, |tx, ctx| {
            tx.execute(
                "UPDATE tasks
                    SET date_closed = ?1, closed_by = ?2, closure_comment = ?3,
                        is_closed = 1, resolution_reason = ?4,
                        last_edited_time = ?1, last_edited_by = ?2
                  WHERE task_id = ?5",
                rusqlite::params![now, ctx.actor, comment, reason, task_id],
            )?;
            ctx.record_change(
                task_id,
                EventType::Closed,
                Some(reason.to_string()),
                Some(comment.to_string()),
            );

            if mark_complete {
                tx.execute(
                    "UPDATE tasks SET percent_complete = 100 WHERE task_id = ?1",
                    [task_id],
                )?;
                ctx.record_field_change(
                    task_id,
                    "percent_complete",
                    &task.percent_complete.to_string(),
                    "100",
                );
            }

            if reason == RESOLUTION_DUPLICATE {
                if let Some(canonical) = find_task_reference(comment) {
                    let linkable = canonical != task_id
                        && get_task(tx, canonical)?.is_some()
                        && !has_duplicate_relation(tx, task_id, canonical)?;
                    if linkable {
                        insert_duplicate_relation(tx, task_id, canonical)?;
                        // The reporter's vote carries over without an
                        // eligibility check; anonymous reporters have
                        // no vote to carry.
                        if task.opened_by != 0 && !has_voted(tx, task.opened_by, canonical)? {
                            insert_vote(tx, task.opened_by, canonical, now)?;
                            ctx.events.push(Event::new(
                                canonical,
                                EventType::VoteAdded,
                                task.opened_by,
                            ));
                        }
                    }
                }
            }
            Ok(())
        })?;

        self.notifier.notify(
            self.store.conn(),
            NotificationKind::TaskClosed,
            task_id,
            actor.id,
            None,
            serde_json::json!({ "reason": reason, "comment": comment }),
        );

        Ok(true)
    }

    // ==================
    // Assignment
    // ==================

    /// Make `user_id` the sole assignee of each task.
    ///
    /// The user being assigned is the permission subject: they need
    /// `take_ownership` and view on each task. Replacing records an
    /// assignment event carrying the previous assignee list and
    /// promotes unconfirmed/new tasks to assigned. A task the user
    /// already solely owns is reported unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if a query or write fails.
    pub fn assign_to_me(&mut self, user_id: i64, tasks: &[i64]) -> Result<BatchReport> {
        let subject = Actor::user(user_id);
        let mut report = BatchReport::default();

        for &task_id in tasks {
            let Some(task) = get_task(self.store.conn(), task_id)? else {
                report.push(task_id, ItemOutcome::NotFound);
                continue;
            };

            let caps = CapabilitySet::load(self.store.conn(), user_id, task.project_id)?;
            let gate = PermissionGate::new(&subject, &caps);
            if !gate.can_take_ownership(&task) {
                report.push(task_id, ItemOutcome::Denied);
                continue;
            }

            let previous = get_assignees(self.store.conn(), task_id)?;
            if previous == [user_id] {
                report.push(task_id, ItemOutcome::Unchanged);
                continue;
            }

            self.store.mutate("assign_to_me", user_id, |tx, ctx| {
                clear_assignees(tx, task_id)?;
                add_assignee(tx, task_id, user_id)?;
                ctx.record_change(
                    task_id,
                    EventType::AssignmentChanged,
                    non_empty(join_ids(&previous)),
                    Some(user_id.to_string()),
                );
                promote_if_awaiting(tx, ctx, &task)?;
                Ok(())
            })?;

            self.notifier.notify(
                self.store.conn(),
                NotificationKind::OwnershipChanged,
                task_id,
                user_id,
                None,
                serde_json::json!({ "assignee": user_id }),
            );
            report.push(task_id, ItemOutcome::Changed);
        }

        Ok(report)
    }

    /// Add `user_id` to the assignee set of each task.
    ///
    /// Idempotent; a duplicate insert reports unchanged without a new
    /// audit event. `force` bypasses the permission gate (the creation
    /// flow auto-assigns category owners this way).
    ///
    /// # Errors
    ///
    /// Returns an error if a query or write fails.
    pub fn add_to_assignees(
        &mut self,
        user_id: i64,
        tasks: &[i64],
        force: bool,
    ) -> Result<BatchReport> {
        let subject = Actor::user(user_id);
        let mut report = BatchReport::default();

        for &task_id in tasks {
            let Some(task) = get_task(self.store.conn(), task_id)? else {
                report.push(task_id, ItemOutcome::NotFound);
                continue;
            };

            if !force {
                let caps = CapabilitySet::load(self.store.conn(), user_id, task.project_id)?;
                let gate = PermissionGate::new(&subject, &caps);
                if !gate.can_add_to_assignees(&task) {
                    report.push(task_id, ItemOutcome::Denied);
                    continue;
                }
            }

            let previous = get_assignees(self.store.conn(), task_id)?;
            let inserted = self.store.mutate("add_to_assignees", user_id, |tx, ctx| {
                let outcome = add_assignee(tx, task_id, user_id)?;
                if outcome.inserted() {
                    let mut next = previous.clone();
                    next.push(user_id);
                    ctx.record_change(
                        task_id,
                        EventType::AssignmentChanged,
                        non_empty(join_ids(&previous)),
                        Some(join_ids(&next)),
                    );
                    promote_if_awaiting(tx, ctx, &task)?;
                }
                Ok(outcome.inserted())
            })?;

            if inserted {
                self.notifier.notify(
                    self.store.conn(),
                    NotificationKind::NewAssignee,
                    task_id,
                    user_id,
                    None,
                    serde_json::json!({ "assignee": user_id }),
                );
                report.push(task_id, ItemOutcome::Changed);
            } else {
                report.push(task_id, ItemOutcome::Unchanged);
            }
        }

        Ok(report)
    }

    // ==================
    // Votes & Comments
    // ==================

    /// Record a vote by `user_id` on a task.
    ///
    /// Returns false when the eligibility score is not positive
    /// (anonymous, no grant, closed task, or an earlier vote).
    ///
    /// # Errors
    ///
    /// Returns an error if the task does not exist or a write fails.
    pub fn add_vote(&mut self, user_id: i64, task_id: i64) -> Result<bool> {
        let task =
            get_task(self.store.conn(), task_id)?.ok_or(Error::TaskNotFound { id: task_id })?;

        let subject = Actor::user(user_id);
        let caps = CapabilitySet::load(self.store.conn(), user_id, task.project_id)?;
        let gate = PermissionGate::new(&subject, &caps);
        let voted = has_voted(self.store.conn(), user_id, task_id)?;
        if gate.vote_eligibility(&task, voted) <= 0 {
            return Ok(false);
        }

        let now = now_ms();
        self.store.mutate("add_vote", user_id, |tx, ctx| {
            insert_vote(tx, user_id, task_id, now)?;
            ctx.record_event(task_id, EventType::VoteAdded);
            Ok(())
        })?;
        Ok(true)
    }

    /// Post a comment on a task.
    ///
    /// Returns the new comment id, or `None` when the actor may not
    /// comment (closed tasks need the closed-comment capability).
    /// Files accompanying the comment are attached to it; the
    /// notification payload says whether any were.
    ///
    /// # Errors
    ///
    /// Returns an error if the task does not exist, the body is
    /// empty, or a write fails.
    pub fn add_comment(
        &mut self,
        actor: &Actor,
        task_id: i64,
        text: &str,
        files: Vec<FileUpload>,
    ) -> Result<Option<i64>> {
        let task =
            get_task(self.store.conn(), task_id)?.ok_or(Error::TaskNotFound { id: task_id })?;

        let caps = CapabilitySet::load(self.store.conn(), actor.id, task.project_id)?;
        let gate = PermissionGate::new(actor, &caps);
        if !gate.can_comment(&task) {
            tracing::debug!(task_id, "comment denied");
            return Ok(None);
        }
        if text.trim().is_empty() {
            return Err(Error::EmptyComment);
        }

        let now = now_ms();
        let comment_id = self.store.mutate("add_comment", actor.id, |tx, ctx| {
            let cid = insert_comment(tx, task_id, ctx.actor, text, now)?;
            ctx.record_change(task_id, EventType::CommentAdded, None, Some(cid.to_string()));
            Ok(cid)
        })?;

        let with_files = if files.is_empty() {
            false
        } else {
            self.attachments
                .upload(&mut self.store, &gate, actor.id, task_id, comment_id, files)?
        };

        self.notifier.notify(
            self.store.conn(),
            NotificationKind::CommentAdded,
            task_id,
            actor.id,
            None,
            serde_json::json!({ "comment_id": comment_id, "with_files": with_files }),
        );

        Ok(Some(comment_id))
    }

    // ==================
    // Watching
    // ==================

    /// Subscribe `user_id` to each task's notifications.
    ///
    /// Watching yourself needs view permission on the task; putting
    /// someone else on the list needs project management. `force`
    /// bypasses both (internal flows). Inserts are idempotent and
    /// audited only when a row is actually added.
    ///
    /// # Errors
    ///
    /// Returns an error if a query or write fails.
    pub fn add_notification(
        &mut self,
        actor: &Actor,
        user_id: i64,
        tasks: &[i64],
        force: bool,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        if user_id == 0 {
            for &task_id in tasks {
                report.push(task_id, ItemOutcome::Denied);
            }
            return Ok(report);
        }

        for &task_id in tasks {
            let Some(task) = get_task(self.store.conn(), task_id)? else {
                report.push(task_id, ItemOutcome::NotFound);
                continue;
            };

            if !force && !self.may_edit_watch(actor, user_id, &task)? {
                report.push(task_id, ItemOutcome::Denied);
                continue;
            }

            let inserted = self.store.mutate("add_notification", actor.id, |tx, ctx| {
                let outcome = subscribe(tx, task_id, user_id)?;
                if outcome.inserted() {
                    ctx.record_change(
                        task_id,
                        EventType::NotificationSubscribed,
                        None,
                        Some(user_id.to_string()),
                    );
                }
                Ok(outcome.inserted())
            })?;

            report.push(
                task_id,
                if inserted {
                    ItemOutcome::Changed
                } else {
                    ItemOutcome::Unchanged
                },
            );
        }

        Ok(report)
    }

    /// Remove `user_id` from each task's notification list.
    ///
    /// Gated like [`Self::add_notification`], without a force path.
    ///
    /// # Errors
    ///
    /// Returns an error if a query or write fails.
    pub fn remove_notification(
        &mut self,
        actor: &Actor,
        user_id: i64,
        tasks: &[i64],
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        for &task_id in tasks {
            let Some(task) = get_task(self.store.conn(), task_id)? else {
                report.push(task_id, ItemOutcome::NotFound);
                continue;
            };

            if !self.may_edit_watch(actor, user_id, &task)? {
                report.push(task_id, ItemOutcome::Denied);
                continue;
            }

            let removed = self
                .store
                .mutate("remove_notification", actor.id, |tx, ctx| {
                    let removed = unsubscribe(tx, task_id, user_id)?;
                    if removed {
                        ctx.record_change(
                            task_id,
                            EventType::NotificationUnsubscribed,
                            Some(user_id.to_string()),
                            None,
                        );
                    }
                    Ok(removed)
                })?;

            report.push(
                task_id,
                if removed {
                    ItemOutcome::Changed
                } else {
                    ItemOutcome::Unchanged
                },
            );
        }

        Ok(report)
    }

    fn may_edit_watch(&self, actor: &Actor, user_id: i64, task: &Task) -> Result<bool> {
        let caps = CapabilitySet::load(self.store.conn(), actor.id, task.project_id)?;
        let gate = PermissionGate::new(actor, &caps);
        Ok(if actor.id == user_id {
            gate.can_view_task(task)
        } else {
            gate.can_manage_project()
        })
    }

    // ==================
    // Reminders
    // ==================

    /// Schedule a recurring reminder on a task.
    ///
    /// Needs project management. Without an explicit recipient the
    /// reminder fans out to every current assignee. Re-issuing an
    /// identical reminder does not duplicate it, and the audit event
    /// is written only when at least one new reminder row appeared.
    /// Returns false when denied or the recipient is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the task does not exist or a write fails.
    pub fn add_reminder(
        &mut self,
        actor: &Actor,
        task_id: i64,
        message: &str,
        how_often_ms: i64,
        start_time: Option<i64>,
        recipient: Option<i64>,
    ) -> Result<bool> {
        let task =
            get_task(self.store.conn(), task_id)?.ok_or(Error::TaskNotFound { id: task_id })?;

        let caps = CapabilitySet::load(self.store.conn(), actor.id, task.project_id)?;
        let gate = PermissionGate::new(actor, &caps);
        if !gate.can_manage_project() {
            tracing::debug!(task_id, "reminder denied");
            return Ok(false);
        }

        let recipients = match recipient {
            Some(uid) => {
                if get_user(self.store.conn(), uid)?.is_none() {
                    return Ok(false);
                }
                vec![uid]
            }
            None => get_assignees(self.store.conn(), task_id)?,
        };

        let start = start_time.unwrap_or_else(now_ms);
        self.upsert_reminders(actor.id, task_id, &recipients, start, how_often_ms, message)?;
        Ok(true)
    }

    /// Upsert one reminder per recipient; audit once if anything new
    /// was created. Used by both the gated operation and the due-date
    /// path of task creation, which schedules without a gate.
    fn upsert_reminders(
        &mut self,
        actor_id: i64,
        task_id: i64,
        recipients: &[i64],
        start_time: i64,
        how_often: i64,
        message: &str,
    ) -> Result<bool> {
        if recipients.is_empty() {
            return Ok(false);
        }
        self.store.mutate("add_reminder", actor_id, |tx, ctx| {
            let mut any_new = false;
            for &uid in recipients {
                if upsert_reminder(tx, task_id, uid, actor_id, start_time, how_often, message)?
                    .inserted()
                {
                    any_new = true;
                }
            }
            if any_new {
                ctx.record_event(task_id, EventType::ReminderAdded);
            }
            Ok(any_new)
        })
    }

    // ==================
    // Attachments
    // ==================

    /// Attach files to a task (or to one of its comments).
    ///
    /// Returns true when at least one file was stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the task does not exist or recording fails.
    pub fn attach_files(
        &mut self,
        actor: &Actor,
        task_id: i64,
        comment_id: i64,
        files: Vec<FileUpload>,
    ) -> Result<bool> {
        let task =
            get_task(self.store.conn(), task_id)?.ok_or(Error::TaskNotFound { id: task_id })?;

        let caps = CapabilitySet::load(self.store.conn(), actor.id, task.project_id)?;
        let gate = PermissionGate::new(actor, &caps);
        self.attachments
            .upload(&mut self.store, &gate, actor.id, task_id, comment_id, files)
    }

    /// Delete attachments, rows first, then stored files.
    ///
    /// Per-item gated on the owning task's project; a stored file that
    /// is already gone is tolerated.
    ///
    /// # Errors
    ///
    /// Returns an error if a query or write fails.
    pub fn delete_attachments(&mut self, actor: &Actor, ids: &[i64]) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        for &att_id in ids {
            let Some(att) = get_attachment(self.store.conn(), att_id)? else {
                report.push(att_id, ItemOutcome::NotFound);
                continue;
            };
            let Some(task) = get_task(self.store.conn(), att.task_id)? else {
                report.push(att_id, ItemOutcome::NotFound);
                continue;
            };

            let caps = CapabilitySet::load(self.store.conn(), actor.id, task.project_id)?;
            let gate = PermissionGate::new(actor, &caps);
            if !gate.can_delete_attachments() {
                report.push(att_id, ItemOutcome::Denied);
                continue;
            }

            self.store.mutate("delete_attachment", actor.id, |tx, ctx| {
                if delete_attachment(tx, att_id)? {
                    ctx.record_change(
                        att.task_id,
                        EventType::AttachmentRemoved,
                        Some(att.orig_name.clone()),
                        None,
                    );
                }
                Ok(())
            })?;
            self.attachments.remove_blob(&att.file_name);
            report.push(att_id, ItemOutcome::Changed);
        }

        Ok(report)
    }

    // ==================
    // Users
    // ==================

    /// Register a user account.
    ///
    /// The login name is trimmed, whitespace-collapsed, limited to 32
    /// characters and stripped to alphanumerics and underscores; the
    /// real name is cleaned the same way at 100. An empty password is
    /// replaced with a generated one. Registration is audited globally
    /// and announced to administrators.
    ///
    /// # Errors
    ///
    /// Returns an error when the cleaned name is empty or taken, or a
    /// write fails.
    pub fn create_user(&mut self, actor: &Actor, new_user: &NewUser) -> Result<i64> {
        let user_name = clean_username(&new_user.user_name);
        if user_name.is_empty() {
            return Err(Error::RequiredField { field: "username" });
        }
        let real_name = clean_real_name(&new_user.real_name);

        if get_user_by_name(self.store.conn(), &user_name)?.is_some() {
            return Err(Error::UsernameTaken { name: user_name });
        }

        let auto_password = new_user.password.is_empty();
        let password = if auto_password {
            generate_password()
        } else {
            new_user.password.clone()
        };

        let now = now_ms();
        let row = User {
            user_id: 0,
            user_name,
            user_pass: hash_password(&password),
            real_name,
            email_address: new_user.email_address.clone(),
            jabber_id: new_user.jabber_id.clone(),
            notify_type: new_user.notify_type,
            account_enabled: true,
            tasks_perpage: 25,
            register_date: now,
            time_zone: new_user.time_zone,
        };

        let uid = self.store.mutate("create_user", actor.id, |tx, ctx| {
            let uid = insert_user(tx, &row)?;
            let summary = serde_json::json!({
                "user_id": uid,
                "user_name": row.user_name,
                "real_name": row.real_name,
                "email_address": row.email_address,
            });
            ctx.record_change(0, EventType::UserCreated, None, Some(summary.to_string()));
            Ok(uid)
        })?;

        let admins = admin_recipients(self.store.conn())?;
        self.notifier.notify(
            self.store.conn(),
            NotificationKind::NewUser,
            0,
            actor.id,
            Some(admins),
            serde_json::json!({
                "user_name": row.user_name,
                "real_name": row.real_name,
                "email_address": row.email_address,
                "auto_password": auto_password,
            }),
        );

        Ok(uid)
    }

    /// Delete a user account and their memberships.
    ///
    /// Administrator only; denied or unknown users yield false. The
    /// user's authored tasks, comments and votes remain.
    ///
    /// # Errors
    ///
    /// Returns an error if a query or write fails.
    pub fn delete_user(&mut self, actor: &Actor, user_id: i64) -> Result<bool> {
        let caps = CapabilitySet::load(self.store.conn(), actor.id, 0)?;
        if !caps.has(Capability::Admin) {
            tracing::debug!(user_id, "user deletion denied");
            return Ok(false);
        }

        let Some(user) = get_user(self.store.conn(), user_id)? else {
            return Ok(false);
        };
        let summary = serde_json::json!({
            "user_id": user.user_id,
            "user_name": user.user_name,
            "real_name": user.real_name,
            "email_address": user.email_address,
        });

        self.store.mutate("delete_user", actor.id, |tx, ctx| {
            let existed = delete_user_rows(tx, user_id)?;
            if existed {
                ctx.record_change(0, EventType::UserDeleted, Some(summary.to_string()), None);
            }
            Ok(existed)
        })
    }
}

/// Promote an unconfirmed or new task to assigned.
fn promote_if_awaiting(
    tx: &rusqlite::Transaction,
    ctx: &mut crate::storage::MutationContext,
    task: &Task,
) -> Result<()> {
    if task.awaits_confirmation() {
        tx.execute(
            "UPDATE tasks SET item_status = ?1 WHERE task_id = ?2",
            rusqlite::params![STATUS_ASSIGNED, task.task_id],
        )?;
        ctx.record_field_change(
            task.task_id,
            "item_status",
            &task.item_status.to_string(),
            &STATUS_ASSIGNED.to_string(),
        );
    }
    Ok(())
}

/// Find the first task id following a `TT#` or `task ` marker.
fn find_task_reference(text: &str) -> Option<i64> {
    for marker in ["TT#", "task "] {
        let mut from = 0;
        while let Some(pos) = text[from..].find(marker) {
            let at = from + pos;
            let boundary_before = text[..at]
                .chars()
                .next_back()
                .is_none_or(|c| !c.is_alphanumeric());

            let digits_at = at + marker.len();
            let digits: &str = &text[digits_at..];
            let len = digits.chars().take_while(char::is_ascii_digit).count();
            let boundary_after = digits[len..].chars().next().is_none_or(|c| !c.is_alphanumeric());

            if boundary_before && len > 0 && boundary_after {
                if let Ok(id) = digits[..len].parse() {
                    return Some(id);
                }
            }
            from = at + marker.len();
        }
    }
    None
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn generate_password() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    raw[..9].to_string()
}

fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Users holding a global admin grant, as notification recipients.
fn admin_recipients(conn: &Connection) -> Result<Vec<Recipient>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT user_id FROM user_capabilities
         WHERE capability = ?1 AND user_id <> 0 ORDER BY user_id",
    )?;
    let rows = stmt.query_map([Capability::Admin.as_str()], |row| row.get(0))?;
    let ids: Vec<i64> = rows.collect::<rusqlite::Result<_>>()?;
    Ok(ids.into_iter().map(Recipient::User).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attach::DiskStore;
    use crate::model::Project;
    use crate::notify::{NotificationEvent, RecordingDelivery};
    use crate::perms::grant;
    use crate::storage::events::get_events;
    use crate::storage::sqlite::{get_comments, get_subscribers, insert_category, insert_project};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct Fixture {
        service: TaskService,
        sent: Arc<Mutex<Vec<NotificationEvent>>>,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let store = TaskStore::open_memory().unwrap();
        let (delivery, sent) = RecordingDelivery::new();
        let dir = TempDir::new().unwrap();
        let attachments = AttachmentManager::new(
            Box::new(DiskStore::new(dir.path().to_path_buf())),
            HashMap::new(),
        );
        Fixture {
            service: TaskService::new(
                store,
                NotificationCoordinator::new(Box::new(delivery)),
                attachments,
            ),
            sent,
            _dir: dir,
        }
    }

    fn seed_project(f: &Fixture, auto_assign: bool, default_owner: i64) -> i64 {
        let project = Project {
            project_id: 0,
            project_title: "Test".to_string(),
            is_active: true,
            default_cat_owner: default_owner,
            auto_assign,
        };
        insert_project(f.service.store().conn(), &project).unwrap()
    }

    fn seed_user(f: &Fixture, name: &str) -> i64 {
        let user = User {
            user_id: 0,
            user_name: name.to_string(),
            user_pass: "x".to_string(),
            real_name: name.to_string(),
            email_address: format!("{name}@example.org"),
            jabber_id: String::new(),
            notify_type: 1,
            account_enabled: true,
            tasks_perpage: 25,
            register_date: 1000,
            time_zone: 0,
        };
        insert_user(f.service.store().conn(), &user).unwrap()
    }

    fn grant_caps(f: &Fixture, uid: i64, pid: i64, caps: &[Capability]) {
        for &cap in caps {
            grant(f.service.store().conn(), uid, pid, cap).unwrap();
        }
    }

    fn kinds(sent: &Arc<Mutex<Vec<NotificationEvent>>>) -> Vec<NotificationKind> {
        sent.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    fn count_rows(f: &Fixture, sql: &str) -> i64 {
        f.service
            .store()
            .conn()
            .query_row(sql, [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_create_task_end_to_end() {
        let mut f = fixture();
        let owner = seed_user(&f, "owner");
        let pid = seed_project(&f, false, owner);
        let reporter = seed_user(&f, "rep");
        grant_caps(&f, reporter, pid, &[Capability::ViewTasks, Capability::OpenTask]);

        let actor = Actor::user(reporter);
        let new_task = NewTask::new(pid, "Crash on save", "Steps to reproduce");
        let id = f.service.create_task(&actor, new_task, Vec::new()).unwrap();
        assert_eq!(id, Some(1));

        let task = get_task(f.service.store().conn(), 1).unwrap().unwrap();
        assert_eq!(task.item_status, STATUS_UNCONFIRMED);
        assert_eq!(task.opened_by, reporter);
        assert!(!task.is_closed);

        let events = get_events(f.service.store().conn(), 1, None).unwrap();
        let opened: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == EventType::Opened)
            .collect();
        assert_eq!(opened.len(), 1);

        // The default category owner was subscribed and heard about
        // the new task.
        assert_eq!(get_subscribers(f.service.store().conn(), 1).unwrap(), vec![owner]);
        assert!(kinds(&f.sent).contains(&NotificationKind::TaskOpened));
    }

    #[test]
    fn test_create_denied_without_grant() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        let reporter = seed_user(&f, "rep");

        let actor = Actor::user(reporter);
        let id = f
            .service
            .create_task(&actor, NewTask::new(pid, "s", "d"), Vec::new())
            .unwrap();
        assert_eq!(id, None);
        assert_eq!(count_rows(&f, "SELECT COUNT(*) FROM tasks"), 0);
    }

    #[test]
    fn test_create_requires_summary_and_description() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        let reporter = seed_user(&f, "rep");
        grant_caps(&f, reporter, pid, &[Capability::OpenTask]);

        let actor = Actor::user(reporter);
        let missing_summary = f
            .service
            .create_task(&actor, NewTask::new(pid, "  ", "d"), Vec::new());
        assert!(matches!(
            missing_summary,
            Err(Error::RequiredField { field: "summary" })
        ));

        let missing_desc = f
            .service
            .create_task(&actor, NewTask::new(pid, "s", ""), Vec::new());
        assert!(matches!(
            missing_desc,
            Err(Error::RequiredField { field: "description" })
        ));
    }

    #[test]
    fn test_create_clamps_fields_without_modify_all() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        let reporter = seed_user(&f, "rep");
        let manager = seed_user(&f, "mgr");
        grant_caps(&f, reporter, pid, &[Capability::OpenTask]);
        grant_caps(
            &f,
            manager,
            pid,
            &[Capability::OpenTask, Capability::ModifyAllTasks],
        );

        let wanted = NewTask::new(pid, "s", "d")
            .with_status(STATUS_NEW)
            .with_priority(4)
            .with_due_date(99_000);

        let plain = f
            .service
            .create_task(&Actor::user(reporter), wanted.clone(), Vec::new())
            .unwrap()
            .unwrap();
        let clamped = get_task(f.service.store().conn(), plain).unwrap().unwrap();
        assert_eq!(clamped.item_status, STATUS_UNCONFIRMED);
        assert_eq!(clamped.priority, DEFAULT_PRIORITY);
        assert_eq!(clamped.due_date, None);

        let elevated = f
            .service
            .create_task(&Actor::user(manager), wanted, Vec::new())
            .unwrap()
            .unwrap();
        let honored = get_task(f.service.store().conn(), elevated).unwrap().unwrap();
        assert_eq!(honored.item_status, STATUS_NEW);
        assert_eq!(honored.priority, 4);
        assert_eq!(honored.due_date, Some(99_000));
    }

    #[test]
    fn test_create_auto_assigns_category_owner() {
        let mut f = fixture();
        let owner = seed_user(&f, "owner");
        let pid = seed_project(&f, true, 0);
        let root = insert_category(f.service.store().conn(), pid, "Backend", owner, None).unwrap();
        let child =
            insert_category(f.service.store().conn(), pid, "Storage", 0, Some(root)).unwrap();

        let reporter = seed_user(&f, "rep");
        grant_caps(&f, reporter, pid, &[Capability::OpenTask]);

        let new_task = NewTask::new(pid, "s", "d").with_category(child);
        let id = f
            .service
            .create_task(&Actor::user(reporter), new_task, Vec::new())
            .unwrap()
            .unwrap();

        assert_eq!(get_assignees(f.service.store().conn(), id).unwrap(), vec![owner]);
        assert_eq!(get_subscribers(f.service.store().conn(), id).unwrap(), vec![owner]);

        // Auto-assignment promoted the fresh task.
        let task = get_task(f.service.store().conn(), id).unwrap().unwrap();
        assert_eq!(task.item_status, STATUS_ASSIGNED);
    }

    #[test]
    fn test_create_anonymous_task() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        // Everyone may open tasks in this project.
        grant(f.service.store().conn(), 0, pid, Capability::OpenTask).unwrap();

        let actor = Actor::anonymous().with_email("reporter@example.org");
        let id = f
            .service
            .create_task(&actor, NewTask::new(pid, "s", "d"), Vec::new())
            .unwrap()
            .unwrap();

        let task = get_task(f.service.store().conn(), id).unwrap().unwrap();
        assert!(task.is_anonymous());
        assert!(task.task_token.is_some());
        assert_eq!(task.anon_email.as_deref(), Some("reporter@example.org"));

        let sent = f.sent.lock().unwrap();
        let anon = sent
            .iter()
            .find(|e| e.kind == NotificationKind::AnonTaskOpened)
            .unwrap();
        assert_eq!(
            anon.recipients,
            vec![Recipient::Email("reporter@example.org".to_string())]
        );
        assert_eq!(
            anon.payload["token"].as_str(),
            task.task_token.as_deref()
        );
    }

    #[test]
    fn test_create_anonymous_requires_email() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        grant(f.service.store().conn(), 0, pid, Capability::OpenTask).unwrap();

        let result =
            f.service
                .create_task(&Actor::anonymous(), NewTask::new(pid, "s", "d"), Vec::new());
        assert!(matches!(
            result,
            Err(Error::RequiredField { field: "anon-email" })
        ));
    }

    #[test]
    fn test_create_with_due_date_schedules_reminder() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        let dev = seed_user(&f, "dev");
        let manager = seed_user(&f, "mgr");
        grant_caps(
            &f,
            manager,
            pid,
            &[Capability::OpenTask, Capability::ModifyAllTasks],
        );

        let new_task = NewTask::new(pid, "s", "d")
            .with_due_date(1_000_000)
            .with_assignees(vec![dev]);
        let id = f
            .service
            .create_task(&Actor::user(manager), new_task, Vec::new())
            .unwrap()
            .unwrap();

        let (to_user, how_often): (i64, i64) = f
            .service
            .store()
            .conn()
            .query_row(
                "SELECT to_user_id, how_often FROM reminders WHERE task_id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(to_user, dev);
        assert_eq!(how_often, DUE_REMINDER_INTERVAL_MS);

        let events = get_events(f.service.store().conn(), id, None).unwrap();
        assert!(events
            .iter()
            .any(|e| e.event_type == EventType::ReminderAdded));

        // The initial assignee was told directly.
        let sent = f.sent.lock().unwrap();
        let assignee_note = sent
            .iter()
            .find(|e| e.kind == NotificationKind::NewAssignee)
            .unwrap();
        assert_eq!(assignee_note.recipients, vec![Recipient::User(dev)]);
    }

    #[test]
    fn test_close_task_sets_closure_fields() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        let dev = seed_user(&f, "dev");
        grant_caps(
            &f,
            dev,
            pid,
            &[Capability::ViewTasks, Capability::OpenTask, Capability::CloseTask],
        );

        let id = f
            .service
            .create_task(&Actor::user(dev), NewTask::new(pid, "s", "d"), Vec::new())
            .unwrap()
            .unwrap();

        let closed = f
            .service
            .close_task(&Actor::user(dev), id, 2, "fixed in trunk", true)
            .unwrap();
        assert!(closed);

        let task = get_task(f.service.store().conn(), id).unwrap().unwrap();
        assert!(task.is_closed);
        assert!(task.date_closed.is_some());
        assert_eq!(task.closed_by, dev);
        assert_eq!(task.resolution_reason, Some(2));
        assert_eq!(task.closure_comment.as_deref(), Some("fixed in trunk"));
        assert_eq!(task.percent_complete, 100);

        let events = get_events(f.service.store().conn(), id, None).unwrap();
        assert!(events.iter().any(|e| e.event_type == EventType::Closed));
        assert!(events.iter().any(|e| {
            e.event_type == EventType::FieldChanged
                && e.field_name.as_deref() == Some("percent_complete")
                && e.new_value.as_deref() == Some("100")
        }));
    }

    #[test]
    fn test_close_denied_is_silent() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        let dev = seed_user(&f, "dev");
        let other = seed_user(&f, "other");
        grant_caps(&f, dev, pid, &[Capability::ViewTasks, Capability::OpenTask]);
        grant_caps(&f, other, pid, &[Capability::ViewTasks]);

        let id = f
            .service
            .create_task(&Actor::user(dev), NewTask::new(pid, "s", "d"), Vec::new())
            .unwrap()
            .unwrap();

        assert!(!f
            .service
            .close_task(&Actor::user(other), id, 2, "done", true)
            .unwrap());
        let task = get_task(f.service.store().conn(), id).unwrap().unwrap();
        assert!(!task.is_closed);
    }

    #[test]
    fn test_duplicate_close_links_once_and_moves_vote() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        let rep = seed_user(&f, "rep");
        let closer = seed_user(&f, "closer");
        grant_caps(&f, rep, pid, &[Capability::ViewTasks, Capability::OpenTask]);
        grant_caps(
            &f,
            closer,
            pid,
            &[Capability::ViewTasks, Capability::OpenTask, Capability::CloseTask],
        );

        let canonical = f
            .service
            .create_task(&Actor::user(closer), NewTask::new(pid, "first", "d"), Vec::new())
            .unwrap()
            .unwrap();
        let dupe = f
            .service
            .create_task(&Actor::user(rep), NewTask::new(pid, "again", "d"), Vec::new())
            .unwrap()
            .unwrap();

        let comment = format!("duplicate of TT#{canonical}");
        assert!(f
            .service
            .close_task(&Actor::user(closer), dupe, RESOLUTION_DUPLICATE, &comment, true)
            .unwrap());

        assert_eq!(count_rows(&f, "SELECT COUNT(*) FROM related"), 1);
        assert_eq!(count_rows(&f, "SELECT COUNT(*) FROM votes"), 1);
        let voter: i64 = f
            .service
            .store()
            .conn()
            .query_row("SELECT user_id FROM votes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(voter, rep);

        // Closing the same way again neither relinks nor revotes.
        assert!(f
            .service
            .close_task(&Actor::user(closer), dupe, RESOLUTION_DUPLICATE, &comment, true)
            .unwrap());
        assert_eq!(count_rows(&f, "SELECT COUNT(*) FROM related"), 1);
        assert_eq!(count_rows(&f, "SELECT COUNT(*) FROM votes"), 1);
    }

    #[test]
    fn test_duplicate_close_without_reference() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        let closer = seed_user(&f, "closer");
        grant_caps(
            &f,
            closer,
            pid,
            &[Capability::ViewTasks, Capability::OpenTask, Capability::CloseTask],
        );

        let id = f
            .service
            .create_task(&Actor::user(closer), NewTask::new(pid, "s", "d"), Vec::new())
            .unwrap()
            .unwrap();
        assert!(f
            .service
            .close_task(&Actor::user(closer), id, RESOLUTION_DUPLICATE, "same as the other one", true)
            .unwrap());

        assert_eq!(count_rows(&f, "SELECT COUNT(*) FROM related"), 0);
        assert_eq!(count_rows(&f, "SELECT COUNT(*) FROM votes"), 0);
    }

    #[test]
    fn test_assign_to_me_replaces_set() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        let dev = seed_user(&f, "dev");
        let bob = seed_user(&f, "bob");
        let carol = seed_user(&f, "carol");
        grant_caps(&f, dev, pid, &[Capability::ViewTasks, Capability::OpenTask]);
        for uid in [bob, carol] {
            grant_caps(&f, uid, pid, &[Capability::ViewTasks, Capability::TakeOwnership]);
        }

        let id = f
            .service
            .create_task(&Actor::user(dev), NewTask::new(pid, "s", "d"), Vec::new())
            .unwrap()
            .unwrap();

        let first = f.service.assign_to_me(bob, &[id]).unwrap();
        assert_eq!(first.outcome_for(id), Some(ItemOutcome::Changed));
        let second = f.service.assign_to_me(carol, &[id]).unwrap();
        assert_eq!(second.outcome_for(id), Some(ItemOutcome::Changed));

        assert_eq!(get_assignees(f.service.store().conn(), id).unwrap(), vec![carol]);

        // The second event carries the displaced assignee.
        let events = get_events(f.service.store().conn(), id, None).unwrap();
        let changes: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == EventType::AssignmentChanged)
            .collect();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].old_value.as_deref(), Some(bob.to_string().as_str()));

        // Promoted out of unconfirmed.
        let task = get_task(f.service.store().conn(), id).unwrap().unwrap();
        assert_eq!(task.item_status, STATUS_ASSIGNED);

        // Re-taking what you already own is a no-op.
        let third = f.service.assign_to_me(carol, &[id]).unwrap();
        assert_eq!(third.outcome_for(id), Some(ItemOutcome::Unchanged));
    }

    #[test]
    fn test_add_to_assignees_is_idempotent() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        let dev = seed_user(&f, "dev");
        let bob = seed_user(&f, "bob");
        grant_caps(&f, dev, pid, &[Capability::ViewTasks, Capability::OpenTask]);
        grant_caps(&f, bob, pid, &[Capability::ViewTasks, Capability::AddToAssignees]);

        let id = f
            .service
            .create_task(&Actor::user(dev), NewTask::new(pid, "s", "d"), Vec::new())
            .unwrap()
            .unwrap();

        let first = f.service.add_to_assignees(bob, &[id], false).unwrap();
        assert_eq!(first.outcome_for(id), Some(ItemOutcome::Changed));
        let second = f.service.add_to_assignees(bob, &[id], false).unwrap();
        assert_eq!(second.outcome_for(id), Some(ItemOutcome::Unchanged));

        assert_eq!(get_assignees(f.service.store().conn(), id).unwrap(), vec![bob]);

        let events = get_events(f.service.store().conn(), id, None).unwrap();
        let changes = events
            .iter()
            .filter(|e| e.event_type == EventType::AssignmentChanged)
            .count();
        assert_eq!(changes, 1);
    }

    #[test]
    fn test_add_to_assignees_force_bypasses_gate() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        let dev = seed_user(&f, "dev");
        let bob = seed_user(&f, "bob");
        grant_caps(&f, dev, pid, &[Capability::ViewTasks, Capability::OpenTask]);

        let id = f
            .service
            .create_task(&Actor::user(dev), NewTask::new(pid, "s", "d"), Vec::new())
            .unwrap()
            .unwrap();

        let denied = f.service.add_to_assignees(bob, &[id], false).unwrap();
        assert_eq!(denied.outcome_for(id), Some(ItemOutcome::Denied));

        let forced = f.service.add_to_assignees(bob, &[id], true).unwrap();
        assert_eq!(forced.outcome_for(id), Some(ItemOutcome::Changed));
        assert_eq!(get_assignees(f.service.store().conn(), id).unwrap(), vec![bob]);
    }

    #[test]
    fn test_no_view_means_no_rows() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        let dev = seed_user(&f, "dev");
        let outsider = seed_user(&f, "outsider");
        grant_caps(&f, dev, pid, &[Capability::ViewTasks, Capability::OpenTask]);
        // The outsider holds broad grants but cannot see the task.
        grant_caps(
            &f,
            outsider,
            pid,
            &[Capability::AddToAssignees, Capability::TakeOwnership],
        );

        let id = f
            .service
            .create_task(&Actor::user(dev), NewTask::new(pid, "s", "d"), Vec::new())
            .unwrap()
            .unwrap();

        let watch = f
            .service
            .add_notification(&Actor::user(outsider), outsider, &[id], false)
            .unwrap();
        assert_eq!(watch.outcome_for(id), Some(ItemOutcome::Denied));

        let join = f.service.add_to_assignees(outsider, &[id], false).unwrap();
        assert_eq!(join.outcome_for(id), Some(ItemOutcome::Denied));

        assert_eq!(count_rows(&f, "SELECT COUNT(*) FROM notifications"), 0);
        assert_eq!(count_rows(&f, "SELECT COUNT(*) FROM assigned"), 0);
    }

    #[test]
    fn test_watch_and_unwatch() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        let dev = seed_user(&f, "dev");
        let mgr = seed_user(&f, "mgr");
        grant_caps(&f, dev, pid, &[Capability::ViewTasks, Capability::OpenTask]);
        grant_caps(&f, mgr, pid, &[Capability::ViewTasks, Capability::ManageProject]);

        let id = f
            .service
            .create_task(&Actor::user(dev), NewTask::new(pid, "s", "d"), Vec::new())
            .unwrap()
            .unwrap();

        // Self-service watch.
        let added = f
            .service
            .add_notification(&Actor::user(dev), dev, &[id], false)
            .unwrap();
        assert_eq!(added.outcome_for(id), Some(ItemOutcome::Changed));
        let again = f
            .service
            .add_notification(&Actor::user(dev), dev, &[id], false)
            .unwrap();
        assert_eq!(again.outcome_for(id), Some(ItemOutcome::Unchanged));

        // A non-manager cannot watch someone else.
        let for_other = f
            .service
            .add_notification(&Actor::user(dev), mgr, &[id], false)
            .unwrap();
        assert_eq!(for_other.outcome_for(id), Some(ItemOutcome::Denied));

        // A manager can.
        let by_mgr = f
            .service
            .add_notification(&Actor::user(mgr), dev, &[id], false)
            .unwrap();
        assert_eq!(by_mgr.outcome_for(id), Some(ItemOutcome::Unchanged));

        let removed = f
            .service
            .remove_notification(&Actor::user(dev), dev, &[id])
            .unwrap();
        assert_eq!(removed.outcome_for(id), Some(ItemOutcome::Changed));
        assert!(get_subscribers(f.service.store().conn(), id).unwrap().is_empty());

        // Unsubscribe events only fire for genuine removals.
        let events = get_events(f.service.store().conn(), id, None).unwrap();
        let unsubs = events
            .iter()
            .filter(|e| e.event_type == EventType::NotificationUnsubscribed)
            .count();
        assert_eq!(unsubs, 1);
    }

    #[test]
    fn test_vote_once_per_task() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        let dev = seed_user(&f, "dev");
        let voter = seed_user(&f, "voter");
        grant_caps(&f, dev, pid, &[Capability::ViewTasks, Capability::OpenTask]);
        grant_caps(&f, voter, pid, &[Capability::ViewTasks, Capability::Vote]);

        let id = f
            .service
            .create_task(&Actor::user(dev), NewTask::new(pid, "s", "d"), Vec::new())
            .unwrap()
            .unwrap();

        assert!(f.service.add_vote(voter, id).unwrap());
        assert!(!f.service.add_vote(voter, id).unwrap());
        assert_eq!(count_rows(&f, "SELECT COUNT(*) FROM votes"), 1);

        let events = get_events(f.service.store().conn(), id, None).unwrap();
        let votes = events
            .iter()
            .filter(|e| e.event_type == EventType::VoteAdded)
            .count();
        assert_eq!(votes, 1);
    }

    #[test]
    fn test_comment_validation_and_gates() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        let dev = seed_user(&f, "dev");
        let lurker = seed_user(&f, "lurker");
        grant_caps(
            &f,
            dev,
            pid,
            &[
                Capability::ViewTasks,
                Capability::OpenTask,
                Capability::AddComments,
                Capability::CloseTask,
            ],
        );
        grant_caps(&f, lurker, pid, &[Capability::ViewTasks]);

        let id = f
            .service
            .create_task(&Actor::user(dev), NewTask::new(pid, "s", "d"), Vec::new())
            .unwrap()
            .unwrap();

        let empty = f
            .service
            .add_comment(&Actor::user(dev), id, "   ", Vec::new());
        assert!(matches!(empty, Err(Error::EmptyComment)));

        let denied = f
            .service
            .add_comment(&Actor::user(lurker), id, "hello", Vec::new())
            .unwrap();
        assert_eq!(denied, None);

        let cid = f
            .service
            .add_comment(&Actor::user(dev), id, "first comment", Vec::new())
            .unwrap()
            .unwrap();
        let comments = get_comments(f.service.store().conn(), id).unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].comment_id, cid);

        let events = get_events(f.service.store().conn(), id, None).unwrap();
        assert!(events.iter().any(|e| {
            e.event_type == EventType::CommentAdded
                && e.new_value.as_deref() == Some(cid.to_string().as_str())
        }));

        // Closed tasks need the stricter capability.
        f.service
            .close_task(&Actor::user(dev), id, 2, "done", true)
            .unwrap();
        let after_close = f
            .service
            .add_comment(&Actor::user(dev), id, "late", Vec::new())
            .unwrap();
        assert_eq!(after_close, None);

        grant(f.service.store().conn(), dev, pid, Capability::CommentClosed).unwrap();
        let allowed = f
            .service
            .add_comment(&Actor::user(dev), id, "postmortem", Vec::new())
            .unwrap();
        assert!(allowed.is_some());
    }

    #[test]
    fn test_comment_with_files_flags_notification() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        let dev = seed_user(&f, "dev");
        let watcher = seed_user(&f, "watcher");
        grant_caps(
            &f,
            dev,
            pid,
            &[
                Capability::ViewTasks,
                Capability::OpenTask,
                Capability::AddComments,
                Capability::CreateAttachments,
            ],
        );
        grant_caps(&f, watcher, pid, &[Capability::ViewTasks]);

        let id = f
            .service
            .create_task(&Actor::user(dev), NewTask::new(pid, "s", "d"), Vec::new())
            .unwrap()
            .unwrap();
        f.service
            .add_notification(&Actor::user(watcher), watcher, &[id], false)
            .unwrap();

        let cid = f
            .service
            .add_comment(
                &Actor::user(dev),
                id,
                "see attached",
                vec![FileUpload::ok("trace.txt", "text/plain", b"boom".to_vec())],
            )
            .unwrap()
            .unwrap();

        let linked: i64 = f
            .service
            .store()
            .conn()
            .query_row(
                "SELECT comment_id FROM attachments WHERE task_id = ?1",
                [id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(linked, cid);

        let sent = f.sent.lock().unwrap();
        let note = sent
            .iter()
            .find(|e| e.kind == NotificationKind::CommentAdded)
            .unwrap();
        assert_eq!(note.payload["with_files"], true);
    }

    #[test]
    fn test_reminder_gate_and_upsert() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        let dev = seed_user(&f, "dev");
        let mgr = seed_user(&f, "mgr");
        grant_caps(&f, dev, pid, &[Capability::ViewTasks, Capability::OpenTask]);
        grant_caps(&f, mgr, pid, &[Capability::ViewTasks, Capability::ManageProject]);

        let id = f
            .service
            .create_task(&Actor::user(dev), NewTask::new(pid, "s", "d"), Vec::new())
            .unwrap()
            .unwrap();
        f.service.add_to_assignees(dev, &[id], true).unwrap();

        assert!(!f
            .service
            .add_reminder(&Actor::user(dev), id, "check", 3600, None, None)
            .unwrap());

        assert!(f
            .service
            .add_reminder(&Actor::user(mgr), id, "check", 3600, Some(1000), None)
            .unwrap());
        assert_eq!(count_rows(&f, "SELECT COUNT(*) FROM reminders"), 1);

        // Identical reminder again: no new row, no second event.
        assert!(f
            .service
            .add_reminder(&Actor::user(mgr), id, "check", 3600, Some(2000), None)
            .unwrap());
        assert_eq!(count_rows(&f, "SELECT COUNT(*) FROM reminders"), 1);

        let events = get_events(f.service.store().conn(), id, None).unwrap();
        let reminders = events
            .iter()
            .filter(|e| e.event_type == EventType::ReminderAdded)
            .count();
        assert_eq!(reminders, 1);

        // Unknown explicit recipient.
        assert!(!f
            .service
            .add_reminder(&Actor::user(mgr), id, "check", 3600, None, Some(999))
            .unwrap());
    }

    #[test]
    fn test_delete_attachments_gated_per_item() {
        let mut f = fixture();
        let pid = seed_project(&f, false, 0);
        let dev = seed_user(&f, "dev");
        grant_caps(
            &f,
            dev,
            pid,
            &[
                Capability::ViewTasks,
                Capability::OpenTask,
                Capability::CreateAttachments,
            ],
        );

        let id = f
            .service
            .create_task(&Actor::user(dev), NewTask::new(pid, "s", "d"), Vec::new())
            .unwrap()
            .unwrap();
        f.service
            .attach_files(
                &Actor::user(dev),
                id,
                0,
                vec![FileUpload::ok("core.dump", "application/octet-stream", b"x".to_vec())],
            )
            .unwrap();

        let att_id: i64 = f
            .service
            .store()
            .conn()
            .query_row("SELECT attachment_id FROM attachments", [], |row| row.get(0))
            .unwrap();

        let denied = f
            .service
            .delete_attachments(&Actor::user(dev), &[att_id])
            .unwrap();
        assert_eq!(denied.outcome_for(att_id), Some(ItemOutcome::Denied));

        grant(f.service.store().conn(), dev, pid, Capability::DeleteAttachments).unwrap();
        let removed = f
            .service
            .delete_attachments(&Actor::user(dev), &[att_id, 999])
            .unwrap();
        assert_eq!(removed.outcome_for(att_id), Some(ItemOutcome::Changed));
        assert_eq!(removed.outcome_for(999), Some(ItemOutcome::NotFound));
        assert_eq!(count_rows(&f, "SELECT COUNT(*) FROM attachments"), 0);

        let events = get_events(f.service.store().conn(), id, None).unwrap();
        assert!(events.iter().any(|e| {
            e.event_type == EventType::AttachmentRemoved
                && e.old_value.as_deref() == Some("core.dump")
        }));
    }

    #[test]
    fn test_create_user_cleans_and_rejects_duplicates() {
        let mut f = fixture();
        let admin = seed_user(&f, "root");
        grant(f.service.store().conn(), admin, 0, Capability::Admin).unwrap();

        let new_user = NewUser::new("  anna\tmay!! ")
            .with_password("secret")
            .with_real_name("Anna May")
            .with_email("anna@example.org");
        let uid = f.service.create_user(&Actor::user(admin), &new_user).unwrap();

        let stored = get_user(f.service.store().conn(), uid).unwrap().unwrap();
        assert_eq!(stored.user_name, "annamay");
        assert_eq!(stored.real_name, "Anna May");
        assert!(stored.account_enabled);
        assert_ne!(stored.user_pass, "secret");

        let dup = f.service.create_user(&Actor::user(admin), &new_user);
        assert!(matches!(dup, Err(Error::UsernameTaken { .. })));

        // Registration is audited globally and announced to admins.
        let events = get_events(f.service.store().conn(), 0, None).unwrap();
        assert!(events.iter().any(|e| e.event_type == EventType::UserCreated));
        let sent = f.sent.lock().unwrap();
        let note = sent
            .iter()
            .find(|e| e.kind == NotificationKind::NewUser)
            .unwrap();
        assert_eq!(note.recipients, vec![Recipient::User(admin)]);
        assert_eq!(note.payload["auto_password"], false);
    }

    #[test]
    fn test_create_user_autogenerates_password() {
        let mut f = fixture();
        let admin = seed_user(&f, "root");
        grant(f.service.store().conn(), admin, 0, Capability::Admin).unwrap();

        let new_user = NewUser::new("drone")
            .with_real_name("Drone")
            .with_email("drone@example.org");
        let uid = f.service.create_user(&Actor::user(admin), &new_user).unwrap();
        let stored = get_user(f.service.store().conn(), uid).unwrap().unwrap();
        assert!(!stored.user_pass.is_empty());

        let sent = f.sent.lock().unwrap();
        let note = sent
            .iter()
            .find(|e| e.kind == NotificationKind::NewUser)
            .unwrap();
        assert_eq!(note.payload["auto_password"], true);
    }

    #[test]
    fn test_delete_user_requires_admin() {
        let mut f = fixture();
        let admin = seed_user(&f, "root");
        let victim = seed_user(&f, "victim");
        grant(f.service.store().conn(), admin, 0, Capability::Admin).unwrap();

        assert!(!f.service.delete_user(&Actor::user(victim), admin).unwrap());
        assert!(f.service.delete_user(&Actor::user(admin), victim).unwrap());
        assert!(get_user(f.service.store().conn(), victim).unwrap().is_none());
        // Repeating reports nothing to delete.
        assert!(!f.service.delete_user(&Actor::user(admin), victim).unwrap());

        let events = get_events(f.service.store().conn(), 0, None).unwrap();
        assert!(events.iter().any(|e| e.event_type == EventType::UserDeleted));
    }

    #[test]
    fn test_find_task_reference_markers() {
        assert_eq!(find_task_reference("duplicate of TT#42"), Some(42));
        assert_eq!(find_task_reference("see task 7 for details"), Some(7));
        assert_eq!(find_task_reference("TT#9."), Some(9));
        assert_eq!(find_task_reference("multitask 5 speed"), None);
        assert_eq!(find_task_reference("ATT#5"), None);
        assert_eq!(find_task_reference("TT#"), None);
        assert_eq!(find_task_reference("no reference here"), None);
        assert_eq!(find_task_reference("task abc"), None);
    }
}
