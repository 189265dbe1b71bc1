//! Task listing command.

use crate::cli::ListArgs;
use crate::error::Result;
use crate::listing::{
    self, Column, Criteria, DateRange, ListRequest, ListedTask, SearchMode, UserRef,
};
use crate::perms::Actor;
use crate::validate::{normalize_column, normalize_sort, normalize_status_token};
use colored::Colorize;
use std::path::PathBuf;

/// Columns shown when `--columns` is not given.
const DEFAULT_COLUMNS: [Column; 5] = [
    Column::Id,
    Column::Summary,
    Column::Status,
    Column::Severity,
    Column::Progress,
];

/// Execute the list command.
pub fn execute(args: &ListArgs, db: Option<&PathBuf>, actor: &Actor, json: bool) -> Result<()> {
    let (store, _) = super::open_store(db)?;
    let request = build_request(args)?;
    let page = listing::list(store.conn(), actor, &request)?;

    if args.ids_only {
        if json {
            println!("{}", serde_json::to_string(&page.all_ids)?);
        } else {
            for id in &page.all_ids {
                println!("{id}");
            }
        }
        return Ok(());
    }

    if json {
        println!(
            "{}",
            serde_json::json!({
                "tasks": page.tasks,
                "all_ids": page.all_ids,
                "total": page.total(),
            })
        );
        return Ok(());
    }

    if crate::is_silent() {
        for task in &page.tasks {
            println!("{}", task.task.task_id);
        }
        return Ok(());
    }

    render_table(&request.columns, &page.tasks);
    println!(
        "{} task(s) shown, {} matching",
        page.tasks.len(),
        page.total()
    );
    Ok(())
}

/// Translate flag values into a listing request.
fn build_request(args: &ListArgs) -> Result<ListRequest> {
    let mut statuses = Vec::with_capacity(args.status.len());
    for token in &args.status {
        statuses.push(normalize_status_token(token)?);
    }

    let criteria = Criteria {
        project: args.project,
        task_types: args.task_type.clone(),
        severities: args.severity.clone(),
        due_versions: args.due_version.clone(),
        reported_versions: args.reported_in.clone(),
        categories: args.category.clone(),
        statuses,
        percent_complete: args.percent.clone(),
        assignees: args.assignee.clone(),
        unassigned: args.unassigned,
        opened_by: args.opened_by.as_deref().map(parse_user_ref),
        closed_by: args.closed_by.as_deref().map(parse_user_ref),
        due: date_range(args.due_from.as_deref(), args.due_to.as_deref())?,
        changed: date_range(args.changed_from.as_deref(), args.changed_to.as_deref())?,
        opened: date_range(args.opened_from.as_deref(), args.opened_to.as_deref())?,
        closed: date_range(args.closed_from.as_deref(), args.closed_to.as_deref())?,
        search: args.search.clone(),
        search_mode: if args.match_any {
            SearchMode::Any
        } else {
            SearchMode::All
        },
        search_comments: args.search_comments,
        watched_only: args.watched,
        has_attachment: args.has_attachment,
    };

    let columns = if args.columns.is_empty() {
        DEFAULT_COLUMNS.to_vec()
    } else {
        let mut columns = Vec::with_capacity(args.columns.len());
        for name in &args.columns {
            let column = normalize_column(name)?;
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        columns
    };

    let mut request = ListRequest::new(criteria, columns);
    request.offset = args.offset;
    request.page_size = args.page_size;
    if let Some(sort) = &args.sort {
        request.sort = Some(normalize_sort(sort)?);
    }
    if let Some(sort2) = &args.sort2 {
        request.sort2 = Some(normalize_sort(sort2)?);
    }
    Ok(request)
}

fn parse_user_ref(value: &str) -> UserRef {
    value
        .parse::<i64>()
        .map_or_else(|_| UserRef::Name(value.to_string()), UserRef::Id)
}

fn date_range(from: Option<&str>, to: Option<&str>) -> Result<DateRange> {
    // "to" bounds are inclusive of the named day.
    Ok(DateRange {
        from: from.map(super::parse_date).transpose()?,
        to: to.map(super::parse_date_end_of_day).transpose()?,
    })
}

fn render_table(columns: &[Column], tasks: &[ListedTask]) {
    let headers: Vec<&str> = columns.iter().map(|c| c.as_str()).collect();
    let rows: Vec<Vec<String>> = tasks
        .iter()
        .map(|task| columns.iter().map(|c| cell(*c, task)).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, value) in row.iter().enumerate() {
            widths[i] = widths[i].max(value.len());
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, &w)| format!("{h:<w$}"))
        .collect();
    println!("{}", header_line.join("  ").bold());

    for row in rows {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(v, &w)| format!("{v:<w$}"))
            .collect();
        println!("{}", line.join("  "));
    }
}

fn cell(column: Column, listed: &ListedTask) -> String {
    let task = &listed.task;
    let extras = &listed.extras;
    let dash = || "-".to_string();

    match column {
        Column::Id => task.task_id.to_string(),
        Column::Project => task.project_id.to_string(),
        Column::TaskType => task.task_type.to_string(),
        Column::DateOpened => super::format_ms(task.date_opened),
        Column::Summary => task.item_summary.clone(),
        Column::Severity => task.task_severity.to_string(),
        Column::Category => extras.category_name.clone().unwrap_or_else(dash),
        Column::Status => {
            if task.is_closed {
                "Closed".to_string()
            } else {
                extras
                    .status_name
                    .clone()
                    .unwrap_or_else(|| task.item_status.to_string())
            }
        }
        Column::DueVersion => extras.due_version_name.clone().unwrap_or_else(dash),
        Column::DueDate => task.due_date.map_or_else(dash, super::format_ms),
        Column::Progress => format!("{}%", task.percent_complete),
        Column::LastEdit => extras
            .last_edit
            .map_or_else(|| super::format_ms(task.last_edited_time), super::format_ms),
        Column::Priority => task.priority.to_string(),
        Column::OpenedBy => extras
            .opened_by_name
            .clone()
            .unwrap_or_else(|| task.opened_by.to_string()),
        Column::ReportedIn => extras.reported_version_name.clone().unwrap_or_else(dash),
        Column::AssignedTo => extras.assignee_names.clone().unwrap_or_else(dash),
        Column::DateClosed => task.date_closed.map_or_else(dash, super::format_ms),
        Column::Os => extras.os_name.clone().unwrap_or_else(dash),
        Column::Votes => extras.vote_count.unwrap_or(0).to_string(),
        Column::Attachments => extras.attachment_count.unwrap_or(0).to_string(),
        Column::Comments => extras.comment_count.unwrap_or(0).to_string(),
    }
}
