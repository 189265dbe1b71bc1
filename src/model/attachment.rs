//! Attachment model for tasktrail.

use serde::{Deserialize, Serialize};

/// Metadata for a stored attachment.
///
/// The payload itself lives in the blob store under `file_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub attachment_id: i64,
    pub task_id: i64,
    /// Comment the file was submitted with (0 = attached to the task)
    pub comment_id: i64,
    /// Filename as uploaded
    pub orig_name: String,
    /// Collision-free storage name
    pub file_name: String,
    /// MIME type after any extension override
    pub file_type: String,
    pub file_size: i64,
    /// Uploader (0 = anonymous)
    pub added_by: i64,
    /// Upload timestamp (Unix milliseconds)
    pub date_added: i64,
}
