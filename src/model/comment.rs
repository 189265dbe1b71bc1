//! Comment model for tasktrail.

use serde::{Deserialize, Serialize};

/// A comment on a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: i64,
    pub task_id: i64,
    /// Comment author (0 = anonymous)
    pub user_id: i64,
    pub comment_text: String,
    /// Creation timestamp (Unix milliseconds)
    pub date_added: i64,
    /// Last edit timestamp (Unix milliseconds)
    pub last_edited_time: i64,
}
