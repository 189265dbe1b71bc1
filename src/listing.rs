//! Dynamic task listing.
//!
//! Assembles the filtered, sorted, paginated task query from a
//! variable request shape. Joins are added only when a requested
//! display column or an active filter needs them; predicates carry
//! bound parameters; sort keys pass a whitelist restricted to the
//! visible columns. After retrieval every row is checked against the
//! actor's view permission, and pagination applies to the visible
//! sequence only, so hidden rows never consume a page slot.

use crate::error::Result;
use crate::hierarchy::expand_subtree;
use crate::model::Task;
use crate::perms::{Actor, CapabilitySet, PermissionGate};
use crate::storage::sqlite::{load_categories, task_from_row};
use rusqlite::types::Value;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Task columns a caller may display, filter on, or sort by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Id,
    Project,
    TaskType,
    DateOpened,
    Summary,
    Severity,
    Category,
    Status,
    DueVersion,
    DueDate,
    Progress,
    LastEdit,
    Priority,
    OpenedBy,
    ReportedIn,
    AssignedTo,
    DateClosed,
    Os,
    Votes,
    Attachments,
    Comments,
}

impl Column {
    /// All columns, in display order.
    pub const ALL: [Self; 21] = [
        Self::Id,
        Self::Project,
        Self::TaskType,
        Self::DateOpened,
        Self::Summary,
        Self::Severity,
        Self::Category,
        Self::Status,
        Self::DueVersion,
        Self::DueDate,
        Self::Progress,
        Self::LastEdit,
        Self::Priority,
        Self::OpenedBy,
        Self::ReportedIn,
        Self::AssignedTo,
        Self::DateClosed,
        Self::Os,
        Self::Votes,
        Self::Attachments,
        Self::Comments,
    ];

    /// Stable request name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Project => "project",
            Self::TaskType => "tasktype",
            Self::DateOpened => "dateopened",
            Self::Summary => "summary",
            Self::Severity => "severity",
            Self::Category => "category",
            Self::Status => "status",
            Self::DueVersion => "dueversion",
            Self::DueDate => "duedate",
            Self::Progress => "progress",
            Self::LastEdit => "lastedit",
            Self::Priority => "priority",
            Self::OpenedBy => "openedby",
            Self::ReportedIn => "reportedin",
            Self::AssignedTo => "assignedto",
            Self::DateClosed => "dateclosed",
            Self::Os => "os",
            Self::Votes => "votes",
            Self::Attachments => "attachments",
            Self::Comments => "comments",
        }
    }

    /// Parse a request name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == s)
    }

    /// The ORDER BY expression for this column.
    const fn sort_expr(self) -> &'static str {
        match self {
            Self::Id => "t.task_id",
            Self::Project => "t.project_id",
            Self::TaskType => "t.task_type",
            Self::DateOpened => "t.date_opened",
            Self::Summary => "t.item_summary",
            Self::Severity => "t.task_severity",
            Self::Category => "category_name",
            Self::Status => "t.item_status",
            Self::DueVersion => "due_version_name",
            Self::DueDate => "t.due_date",
            Self::Progress => "t.percent_complete",
            Self::LastEdit => "last_edit",
            Self::Priority => "t.priority",
            Self::OpenedBy => "opened_by_name",
            Self::ReportedIn => "reported_version_name",
            Self::AssignedTo => "assignee_names",
            Self::DateClosed => "t.date_closed",
            Self::Os => "os_name",
            Self::Votes => "vote_count",
            Self::Attachments => "attachment_count",
            Self::Comments => "comment_count",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sort key with a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub column: Column,
    pub descending: bool,
}

impl SortSpec {
    #[must_use]
    pub const fn asc(column: Column) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    #[must_use]
    pub const fn desc(column: Column) -> Self {
        Self {
            column,
            descending: true,
        }
    }
}

/// A user filter, by id or by login-name substring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRef {
    Id(i64),
    Name(String),
}

/// Independent from/to bounds over one date column, in Unix ms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl DateRange {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }
}

/// How multiple search words combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchMode {
    /// Every word must match.
    #[default]
    All,
    /// Any one word suffices.
    Any,
}

/// Filter criteria. Every field is optional; an empty criteria set
/// matches all tasks.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    pub project: Option<i64>,
    pub task_types: Vec<i64>,
    pub severities: Vec<i64>,
    pub due_versions: Vec<i64>,
    pub reported_versions: Vec<i64>,
    /// Category filter; expanded to the full subtree of each id when a
    /// project is set.
    pub categories: Vec<i64>,
    /// Status tokens: `closed` matches the closed flag, a numeric token
    /// matches that status on open tasks, anything else matches "not
    /// closed". Tokens combine with OR.
    pub statuses: Vec<String>,
    pub percent_complete: Vec<i64>,
    pub assignees: Vec<i64>,
    /// Also match tasks with no assignee at all.
    pub unassigned: bool,
    pub opened_by: Option<UserRef>,
    pub closed_by: Option<UserRef>,
    pub due: DateRange,
    pub changed: DateRange,
    pub opened: DateRange,
    pub closed: DateRange,
    /// Free-text words searched across summary, description and id.
    pub search: Vec<String>,
    pub search_mode: SearchMode,
    /// Extend the search into comment bodies.
    pub search_comments: bool,
    /// Only tasks the acting user watches.
    pub watched_only: bool,
    /// Only tasks with at least one attachment.
    pub has_attachment: bool,
}

/// One listing request.
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub criteria: Criteria,
    /// Columns the caller will display. Sort keys outside this set
    /// fall back to the default order.
    pub columns: Vec<Column>,
    pub sort: Option<SortSpec>,
    pub sort2: Option<SortSpec>,
    /// Offset into the permission-filtered sequence.
    pub offset: usize,
    /// Page size; 0 means "everything".
    pub page_size: usize,
}

impl ListRequest {
    #[must_use]
    pub fn new(criteria: Criteria, columns: Vec<Column>) -> Self {
        Self {
            criteria,
            columns,
            sort: None,
            sort2: None,
            offset: 0,
            page_size: 0,
        }
    }

    fn shows(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }
}

/// Display values beyond the task row itself, present only when their
/// column was requested.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Extras {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_version_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_version_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_by_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_by_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_edit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_names: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_count: Option<i64>,
}

/// One task in a listing page.
#[derive(Debug, Clone, Serialize)]
pub struct ListedTask {
    #[serde(flatten)]
    pub task: Task,
    #[serde(flatten)]
    pub extras: Extras,
}

/// A permission-filtered listing result.
#[derive(Debug)]
pub struct ListPage {
    /// The requested page of the visible sequence.
    pub tasks: Vec<ListedTask>,
    /// Every visible matching task id, unpaginated, for bulk actions.
    pub all_ids: Vec<i64>,
}

impl ListPage {
    /// How many tasks matched after the permission filter.
    #[must_use]
    pub fn total(&self) -> usize {
        self.all_ids.len()
    }
}

// ── Query plan ────────────────────────────────────────────────

/// Optional joins, keyed by the feature that requires them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Join {
    Category,
    StatusName,
    DueVersion,
    ReportedVersion,
    Os,
    Opener,
    Closer,
    Comments,
    Votes,
    Attachments,
    Assignees,
    Watch,
}

impl Join {
    /// Join clause. Alias conventions: the task table is `t`; each
    /// join has a short fixed alias referenced by select and predicate
    /// fragments.
    const fn clause(self) -> &'static str {
        match self {
            Self::Category => "LEFT JOIN list_category c ON c.category_id = t.product_category",
            Self::StatusName => "LEFT JOIN list_status st ON st.status_id = t.item_status",
            Self::DueVersion => "LEFT JOIN list_version dv ON dv.version_id = t.closedby_version",
            Self::ReportedVersion => {
                "LEFT JOIN list_version rv ON rv.version_id = t.product_version"
            }
            Self::Os => "LEFT JOIN list_os os ON os.os_id = t.operating_system",
            Self::Opener => "LEFT JOIN users uo ON uo.user_id = t.opened_by",
            Self::Closer => "LEFT JOIN users uc ON uc.user_id = t.closed_by",
            Self::Comments => "LEFT JOIN comments com ON com.task_id = t.task_id",
            Self::Votes => "LEFT JOIN votes v ON v.task_id = t.task_id",
            Self::Attachments => "LEFT JOIN attachments att ON att.task_id = t.task_id",
            Self::Assignees => {
                "LEFT JOIN assigned ass ON ass.task_id = t.task_id \
                 LEFT JOIN users au ON au.user_id = ass.user_id"
            }
            Self::Watch => "JOIN notifications w ON w.task_id = t.task_id AND w.user_id = ?",
        }
    }
}

const BASE_COLUMNS: &str = "t.task_id, t.project_id, t.task_type, t.item_summary, \
     t.detailed_desc, t.item_status, t.task_severity, t.priority, t.product_category, \
     t.product_version, t.closedby_version, t.operating_system, t.percent_complete, \
     t.opened_by, t.date_opened, t.last_edited_time, t.last_edited_by, t.due_date, \
     t.is_closed, t.date_closed, t.closed_by, t.resolution_reason, t.closure_comment, \
     t.task_token, t.anon_email";

/// Number of base task columns; extras start after them.
const BASE_COLUMN_COUNT: usize = 25;

/// Where each requested extra landed in the select list.
#[derive(Debug, Default)]
struct Layout {
    category_name: Option<usize>,
    status_name: Option<usize>,
    due_version_name: Option<usize>,
    reported_version_name: Option<usize>,
    os_name: Option<usize>,
    opened_by_name: Option<usize>,
    closed_by_name: Option<usize>,
    last_edit: Option<usize>,
    vote_count: Option<usize>,
    comment_count: Option<usize>,
    attachment_count: Option<usize>,
    assignee_names: Option<usize>,
    assignee_count: Option<usize>,
}

/// The assembled query: join set, select list, predicate fragments
/// with their parameters, and the validated sort keys.
pub(crate) struct QueryPlan {
    selects: Vec<String>,
    joins: Vec<Join>,
    join_params: Vec<Value>,
    predicates: Vec<String>,
    params: Vec<Value>,
    order_by: Vec<String>,
    layout: Layout,
}

impl QueryPlan {
    /// Assemble the plan for a request.
    ///
    /// `category_ids` is the already-expanded category filter (the
    /// requested categories plus their subtrees); `actor_id` feeds the
    /// watch-list join.
    pub(crate) fn build(req: &ListRequest, category_ids: &[i64], actor_id: i64) -> Self {
        let mut plan = Self {
            selects: Vec::new(),
            joins: Vec::new(),
            join_params: Vec::new(),
            predicates: Vec::new(),
            params: Vec::new(),
            order_by: Vec::new(),
            layout: Layout::default(),
        };

        plan.add_column_joins(req);
        plan.add_filters(req, category_ids, actor_id);
        plan.add_order(req);
        plan
    }

    fn add_join(&mut self, join: Join) {
        if !self.joins.contains(&join) {
            self.joins.push(join);
        }
    }

    pub(crate) fn has_join(&self, join: Join) -> bool {
        self.joins.contains(&join)
    }

    fn push_select(&mut self, expr: &str) -> usize {
        self.selects.push(expr.to_string());
        BASE_COLUMN_COUNT + self.selects.len() - 1
    }

    /// Joins and select expressions for the requested display columns.
    fn add_column_joins(&mut self, req: &ListRequest) {
        if req.shows(Column::Category) {
            self.add_join(Join::Category);
            self.layout.category_name = Some(self.push_select("c.category_name AS category_name"));
        }
        if req.shows(Column::Status) {
            self.add_join(Join::StatusName);
            self.layout.status_name = Some(self.push_select("st.status_name AS status_name"));
        }
        if req.shows(Column::DueVersion) {
            self.add_join(Join::DueVersion);
            self.layout.due_version_name =
                Some(self.push_select("dv.version_name AS due_version_name"));
        }
        if req.shows(Column::ReportedIn) {
            self.add_join(Join::ReportedVersion);
            self.layout.reported_version_name =
                Some(self.push_select("rv.version_name AS reported_version_name"));
        }
        if req.shows(Column::Os) {
            self.add_join(Join::Os);
            self.layout.os_name = Some(self.push_select("os.os_name AS os_name"));
        }
        if req.shows(Column::OpenedBy) {
            self.add_join(Join::Opener);
            self.layout.opened_by_name = Some(self.push_select("uo.user_name AS opened_by_name"));
        }
        if req.shows(Column::DateClosed) {
            self.add_join(Join::Closer);
            self.layout.closed_by_name = Some(self.push_select("uc.user_name AS closed_by_name"));
        }
        if req.shows(Column::LastEdit) {
            // A later comment counts as an edit.
            self.add_join(Join::Comments);
            self.layout.last_edit = Some(self.push_select(
                "CASE WHEN COALESCE(MAX(com.date_added), 0) > t.last_edited_time \
                 THEN MAX(com.date_added) ELSE t.last_edited_time END AS last_edit",
            ));
        }
        if req.shows(Column::Comments) {
            self.add_join(Join::Comments);
            self.layout.comment_count =
                Some(self.push_select("COUNT(DISTINCT com.comment_id) AS comment_count"));
        }
        if req.shows(Column::Votes) {
            self.add_join(Join::Votes);
            self.layout.vote_count = Some(self.push_select("COUNT(DISTINCT v.vote_id) AS vote_count"));
        }
        if req.shows(Column::Attachments) {
            self.add_join(Join::Attachments);
            self.layout.attachment_count =
                Some(self.push_select("COUNT(DISTINCT att.attachment_id) AS attachment_count"));
        }
        if req.shows(Column::AssignedTo) {
            self.add_join(Join::Assignees);
            self.layout.assignee_names =
                Some(self.push_select("GROUP_CONCAT(DISTINCT au.user_name) AS assignee_names"));
            self.layout.assignee_count =
                Some(self.push_select("COUNT(DISTINCT ass.user_id) AS assignee_count"));
        }
    }

    fn in_clause(&mut self, column: &str, values: &[i64]) {
        if values.is_empty() {
            return;
        }
        let marks = vec!["?"; values.len()].join(", ");
        self.predicates.push(format!("{column} IN ({marks})"));
        self.params.extend(values.iter().map(|&v| Value::Integer(v)));
    }

    fn add_filters(&mut self, req: &ListRequest, category_ids: &[i64], actor_id: i64) {
        let c = &req.criteria;

        if c.watched_only {
            self.add_join(Join::Watch);
            self.join_params.push(Value::Integer(actor_id));
        }

        if let Some(project) = c.project {
            self.predicates.push("t.project_id = ?".to_string());
            self.params.push(Value::Integer(project));
        }
        self.in_clause("t.task_type", &c.task_types);
        self.in_clause("t.task_severity", &c.severities);
        self.in_clause("t.closedby_version", &c.due_versions);
        self.in_clause("t.product_version", &c.reported_versions);
        self.in_clause("t.product_category", category_ids);
        self.in_clause("t.percent_complete", &c.percent_complete);

        if !c.statuses.is_empty() {
            let mut parts = Vec::new();
            for token in &c.statuses {
                if token == "closed" {
                    parts.push("t.is_closed = 1".to_string());
                } else if let Ok(status_id) = token.parse::<i64>() {
                    parts.push("(t.is_closed <> 1 AND t.item_status = ?)".to_string());
                    self.params.push(Value::Integer(status_id));
                } else {
                    parts.push("t.is_closed <> 1".to_string());
                }
            }
            self.predicates.push(format!("({})", parts.join(" OR ")));
        }

        if !c.assignees.is_empty() || c.unassigned {
            self.add_join(Join::Assignees);
            let mut parts = Vec::new();
            if !c.assignees.is_empty() {
                let marks = vec!["?"; c.assignees.len()].join(", ");
                parts.push(format!("ass.user_id IN ({marks})"));
                self.params
                    .extend(c.assignees.iter().map(|&v| Value::Integer(v)));
            }
            if c.unassigned {
                parts.push("ass.user_id IS NULL".to_string());
            }
            self.predicates.push(format!("({})", parts.join(" OR ")));
        }

        if let Some(opener) = &c.opened_by {
            match opener {
                UserRef::Id(id) => {
                    self.predicates.push("t.opened_by = ?".to_string());
                    self.params.push(Value::Integer(*id));
                }
                UserRef::Name(name) => {
                    self.add_join(Join::Opener);
                    self.predicates.push("uo.user_name LIKE ?".to_string());
                    self.params.push(Value::Text(format!("%{name}%")));
                }
            }
        }
        if let Some(closer) = &c.closed_by {
            match closer {
                UserRef::Id(id) => {
                    self.predicates.push("t.closed_by = ?".to_string());
                    self.params.push(Value::Integer(*id));
                }
                UserRef::Name(name) => {
                    self.add_join(Join::Closer);
                    self.predicates.push("uc.user_name LIKE ?".to_string());
                    self.params.push(Value::Text(format!("%{name}%")));
                }
            }
        }

        // Date ranges. The due and closed columns are NULL when unset,
        // so their "to" bound guards against matching unset dates.
        self.date_bound("t.date_opened", c.opened, false);
        self.date_bound("t.last_edited_time", c.changed, false);
        self.date_bound("t.due_date", c.due, true);
        self.date_bound("t.date_closed", c.closed, true);

        if !c.search.is_empty() {
            if c.search_comments {
                self.add_join(Join::Comments);
            }
            let mut word_parts = Vec::new();
            for word in &c.search {
                let like = format!("%{word}%");
                let mut fields = vec![
                    "t.item_summary LIKE ?".to_string(),
                    "t.detailed_desc LIKE ?".to_string(),
                    "CAST(t.task_id AS TEXT) = ?".to_string(),
                ];
                self.params.push(Value::Text(like.clone()));
                self.params.push(Value::Text(like.clone()));
                self.params.push(Value::Text(word.clone()));
                if c.search_comments {
                    fields.push("com.comment_text LIKE ?".to_string());
                    self.params.push(Value::Text(like));
                }
                word_parts.push(format!("({})", fields.join(" OR ")));
            }
            let glue = match c.search_mode {
                SearchMode::All => " AND ",
                SearchMode::Any => " OR ",
            };
            self.predicates.push(format!("({})", word_parts.join(glue)));
        }

        if c.has_attachment {
            self.add_join(Join::Attachments);
            self.predicates
                .push("att.attachment_id IS NOT NULL".to_string());
        }
    }

    fn date_bound(&mut self, column: &str, range: DateRange, nullable: bool) {
        if let Some(from) = range.from {
            self.predicates.push(format!("{column} >= ?"));
            self.params.push(Value::Integer(from));
        }
        if let Some(to) = range.to {
            if nullable {
                self.predicates
                    .push(format!("({column} IS NOT NULL AND {column} <= ?)"));
            } else {
                self.predicates.push(format!("{column} <= ?"));
            }
            self.params.push(Value::Integer(to));
        }
    }

    /// Whitelist-checked sort keys. A requested key outside the
    /// visible column set falls back to the default order instead of
    /// erroring; the task id is always the final tie-break.
    fn add_order(&mut self, req: &ListRequest) {
        let accept = |spec: Option<SortSpec>| -> Option<SortSpec> {
            spec.filter(|s| req.shows(s.column))
        };

        let primary = accept(req.sort).unwrap_or(SortSpec::desc(Column::Severity));
        self.order_by.push(order_term(primary));
        if let Some(secondary) = accept(req.sort2) {
            if secondary.column != primary.column {
                self.order_by.push(order_term(secondary));
            }
        }
        self.order_by.push("t.task_id ASC".to_string());
    }

    /// Render the final SQL. Parameters are [`Self::bind_params`], in
    /// join order then predicate order.
    pub(crate) fn sql(&self) -> String {
        let mut sql = format!("SELECT {BASE_COLUMNS}");
        for expr in &self.selects {
            sql.push_str(", ");
            sql.push_str(expr);
        }
        sql.push_str(" FROM tasks t");
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join.clause());
        }
        if !self.predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.predicates.join(" AND "));
        }
        sql.push_str(" GROUP BY t.task_id ORDER BY ");
        sql.push_str(&self.order_by.join(", "));
        sql
    }

    fn bind_params(&self) -> Vec<&Value> {
        self.join_params.iter().chain(self.params.iter()).collect()
    }

    fn row_to_listed(&self, row: &rusqlite::Row) -> rusqlite::Result<ListedTask> {
        let task = task_from_row(row)?;
        let l = &self.layout;
        let extras = Extras {
            category_name: opt_text(row, l.category_name)?,
            status_name: opt_text(row, l.status_name)?,
            due_version_name: opt_text(row, l.due_version_name)?,
            reported_version_name: opt_text(row, l.reported_version_name)?,
            os_name: opt_text(row, l.os_name)?,
            opened_by_name: opt_text(row, l.opened_by_name)?,
            closed_by_name: opt_text(row, l.closed_by_name)?,
            last_edit: opt_int(row, l.last_edit)?,
            vote_count: opt_int(row, l.vote_count)?,
            comment_count: opt_int(row, l.comment_count)?,
            attachment_count: opt_int(row, l.attachment_count)?,
            assignee_names: opt_text(row, l.assignee_names)?,
            assignee_count: opt_int(row, l.assignee_count)?,
        };
        Ok(ListedTask { task, extras })
    }
}

fn order_term(spec: SortSpec) -> String {
    let dir = if spec.descending { "DESC" } else { "ASC" };
    format!("{} {dir}", spec.column.sort_expr())
}

fn opt_text(row: &rusqlite::Row, idx: Option<usize>) -> rusqlite::Result<Option<String>> {
    match idx {
        Some(i) => row.get(i),
        None => Ok(None),
    }
}

fn opt_int(row: &rusqlite::Row, idx: Option<usize>) -> rusqlite::Result<Option<i64>> {
    match idx {
        Some(i) => row.get(i),
        None => Ok(None),
    }
}

// ── Execution ─────────────────────────────────────────────────

/// Run a listing request for an actor.
///
/// Retrieval happens first; the per-row view-permission check runs in
/// code because it may depend on anonymous-reporter tokens the query
/// cannot see. `offset` and `page_size` slice the visible sequence, so
/// a hidden row never occupies a page slot. The full visible id list
/// rides along for bulk callers.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list(conn: &Connection, actor: &Actor, req: &ListRequest) -> Result<ListPage> {
    let category_ids = expand_category_filter(conn, &req.criteria)?;
    let plan = QueryPlan::build(req, &category_ids, actor.id);

    let sql = plan.sql();
    tracing::debug!(sql = %sql, "listing query");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(plan.bind_params()),
        |row| plan.row_to_listed(row),
    )?;

    // Capability sets are per project; cache them across rows.
    let mut caps_by_project: HashMap<i64, CapabilitySet> = HashMap::new();
    let mut visible: Vec<ListedTask> = Vec::new();
    for row in rows {
        let listed = row?;
        let project_id = listed.task.project_id;
        if !caps_by_project.contains_key(&project_id) {
            let loaded = CapabilitySet::load(conn, actor.id, project_id)?;
            caps_by_project.insert(project_id, loaded);
        }
        let caps = &caps_by_project[&project_id];
        if PermissionGate::new(actor, caps).can_view_task(&listed.task) {
            visible.push(listed);
        }
    }

    let all_ids: Vec<i64> = visible.iter().map(|l| l.task.task_id).collect();

    let start = req.offset.min(visible.len());
    let end = if req.page_size == 0 {
        visible.len()
    } else {
        (start + req.page_size).min(visible.len())
    };
    let tasks = visible.drain(..).skip(start).take(end - start).collect();

    Ok(ListPage { tasks, all_ids })
}

/// Expand the category filter to each category plus its subtree.
///
/// Needs a project to load the tree; without one the ids pass through
/// unexpanded.
fn expand_category_filter(conn: &Connection, criteria: &Criteria) -> Result<Vec<i64>> {
    if criteria.categories.is_empty() {
        return Ok(Vec::new());
    }
    let Some(project_id) = criteria.project else {
        return Ok(criteria.categories.clone());
    };

    let categories = load_categories(conn, project_id)?;
    let mut ids = Vec::new();
    for &cat_id in &criteria.categories {
        ids.push(cat_id);
        ids.extend(expand_subtree(&categories, cat_id));
    }
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}
