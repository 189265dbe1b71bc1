//! Audit history viewer.

use crate::error::Result;
use crate::storage::events::get_events;
use colored::Colorize;
use std::path::PathBuf;

/// Render a task's audit events oldest first. Task 0 shows global
/// events (user registry changes).
pub fn execute(task_id: i64, limit: Option<u32>, db: Option<&PathBuf>, json: bool) -> Result<()> {
    let (store, _) = super::open_store(db)?;
    let events = get_events(store.conn(), task_id, limit)?;

    if json {
        let items: Vec<serde_json::Value> = events
            .iter()
            .map(|e| {
                serde_json::json!({
                    "id": e.id,
                    "task_id": e.task_id,
                    "event_type": e.event_type.as_str(),
                    "user_id": e.user_id,
                    "old_value": e.old_value,
                    "new_value": e.new_value,
                    "field_name": e.field_name,
                    "created_at": e.created_at,
                })
            })
            .collect();
        println!("{}", serde_json::json!({"events": items}));
        return Ok(());
    }

    if events.is_empty() {
        println!("No history.");
        return Ok(());
    }

    for event in events {
        let mut detail = String::new();
        if let Some(field) = &event.field_name {
            detail.push_str(&format!(" {field}"));
        }
        match (&event.old_value, &event.new_value) {
            (Some(old), Some(new)) => detail.push_str(&format!(" {old} -> {new}")),
            (None, Some(new)) => detail.push_str(&format!(" {new}")),
            (Some(old), None) => detail.push_str(&format!(" was {old}")),
            (None, None) => {}
        }
        println!(
            "{}  {}  user {}{}",
            super::format_ms(event.created_at),
            event.event_type.as_str().bold(),
            event.user_id,
            detail
        );
    }
    Ok(())
}
