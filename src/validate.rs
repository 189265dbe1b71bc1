//! Input normalization for the CLI vocabulary.
//!
//! Capabilities, listing columns, status tokens, and sort directions
//! all arrive as free text. Three-tier resolution: exact match →
//! synonym lookup → error with the closest suggestion.

use crate::error::{Error, Result};
use crate::listing::Column;
use crate::perms::Capability;
use std::collections::HashMap;
use std::sync::LazyLock;

// ── Synonym maps ─────────────────────────────────────────────

static CAPABILITY_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("view", "view_tasks"),
        ("open", "open_task"),
        ("report", "open_task"),
        ("close", "close_task"),
        ("take", "take_ownership"),
        ("assign", "add_to_assignees"),
        ("comment", "add_comments"),
        ("attach", "create_attachments"),
        ("upload", "create_attachments"),
        ("detach", "delete_attachments"),
        ("manage", "manage_project"),
        ("edit", "modify_all_tasks"),
        ("admin", "is_admin"),
    ]
    .into_iter()
    .collect()
});

static COLUMN_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("task", "id"),
        ("taskid", "id"),
        ("type", "tasktype"),
        ("title", "summary"),
        ("opened", "dateopened"),
        ("sev", "severity"),
        ("cat", "category"),
        ("due", "duedate"),
        ("percent", "progress"),
        ("changed", "lastedit"),
        ("edited", "lastedit"),
        ("prio", "priority"),
        ("reporter", "openedby"),
        ("version", "reportedin"),
        ("assignee", "assignedto"),
        ("owner", "assignedto"),
        ("closed", "dateclosed"),
        ("files", "attachments"),
    ]
    .into_iter()
    .collect()
});

/// Status-name tokens map to the listing engine's vocabulary: `closed`,
/// `open`, or a numeric status id.
static STATUS_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("done", "closed"),
        ("resolved", "closed"),
        ("complete", "closed"),
        ("any", "open"),
        ("unconfirmed", "1"),
        ("new", "2"),
        ("assigned", "3"),
        ("researching", "4"),
        ("waiting", "5"),
        ("testing", "6"),
    ]
    .into_iter()
    .collect()
});

// ── Normalizers ──────────────────────────────────────────────

/// Resolve a capability name.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] with the closest suggestion when
/// the name is unknown.
pub fn normalize_capability(input: &str) -> Result<Capability> {
    let lower = input.to_lowercase().replace('-', "_");

    if let Some(cap) = Capability::parse(&lower) {
        return Ok(cap);
    }

    if let Some(&canonical) = CAPABILITY_SYNONYMS.get(lower.as_str()) {
        // Synonym targets are always valid names.
        if let Some(cap) = Capability::parse(canonical) {
            return Ok(cap);
        }
    }

    let names: Vec<&str> = Capability::ALL.iter().map(|c| c.as_str()).collect();
    Err(unknown(
        "capability",
        input,
        find_closest(&lower, &names, &CAPABILITY_SYNONYMS),
    ))
}

/// Resolve a listing column name.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] with the closest suggestion when
/// the name is unknown.
pub fn normalize_column(input: &str) -> Result<Column> {
    let lower = input.to_lowercase().replace(['-', '_'], "");

    if let Some(column) = Column::parse(&lower) {
        return Ok(column);
    }

    if let Some(&canonical) = COLUMN_SYNONYMS.get(lower.as_str()) {
        if let Some(column) = Column::parse(canonical) {
            return Ok(column);
        }
    }

    let names: Vec<&str> = Column::ALL.iter().map(|c| c.as_str()).collect();
    Err(unknown(
        "column",
        input,
        find_closest(&lower, &names, &COLUMN_SYNONYMS),
    ))
}

/// Resolve a status filter token: `closed`, `open`, a numeric status
/// id, or a well-known status name.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] with the closest suggestion when
/// the token is unknown.
pub fn normalize_status_token(input: &str) -> Result<String> {
    let lower = input.to_lowercase();

    if lower == "closed" || lower == "open" || lower.parse::<i64>().is_ok() {
        return Ok(lower);
    }

    if let Some(&canonical) = STATUS_SYNONYMS.get(lower.as_str()) {
        return Ok(canonical.to_string());
    }

    Err(unknown(
        "status",
        input,
        find_closest(&lower, &["open", "closed"], &STATUS_SYNONYMS),
    ))
}

/// Parse a sort key of the form `column` or `column:desc`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] on an unknown column or
/// direction.
pub fn normalize_sort(input: &str) -> Result<crate::listing::SortSpec> {
    let (column_part, dir_part) = match input.split_once(':') {
        Some((col, dir)) => (col, Some(dir)),
        None => (input, None),
    };
    let column = normalize_column(column_part)?;
    let descending = match dir_part.map(str::to_lowercase).as_deref() {
        None | Some("asc" | "ascending" | "up") => false,
        Some("desc" | "descending" | "down") => true,
        Some(other) => {
            return Err(Error::InvalidArgument(format!(
                "unknown sort direction `{other}`; use `asc` or `desc`"
            )))
        }
    };
    Ok(crate::listing::SortSpec { column, descending })
}

fn unknown(what: &str, input: &str, suggestion: Option<String>) -> Error {
    match suggestion {
        Some(s) => Error::InvalidArgument(format!("unknown {what} `{input}` (did you mean `{s}`?)")),
        None => Error::InvalidArgument(format!("unknown {what} `{input}`")),
    }
}

/// Find the closest value across the valid names and synonyms.
fn find_closest(
    input: &str,
    valid: &[&str],
    synonyms: &HashMap<&str, &str>,
) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;

    for &v in valid.iter().chain(synonyms.keys()) {
        let dist = levenshtein_distance(input, v);
        if dist <= 3 && best.is_none_or(|(_, d)| dist < d) {
            // For synonyms, show what they map to.
            let shown = synonyms.get(v).copied().unwrap_or(v);
            best = Some((shown, dist));
        }
    }

    best.map(|(v, _)| v.to_string())
}

// ── Levenshtein distance ─────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let a_len = a.len();
    let b_len = b.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    // Single-row optimization (O(min(m,n)) space).
    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for i in 1..=a_len {
        curr[0] = i;
        for j in 1..=b_len {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}
