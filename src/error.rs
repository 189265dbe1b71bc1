//! Error types for the tasktrail CLI.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Retryability flags for scripted callers
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers
//!
//! Permission denials are deliberately NOT errors: every mutation treats
//! a failed capability check as a silent no-op result so batch callers
//! can skip unauthorized targets without aborting.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tasktrail operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string; shells on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,

    // Not Found (exit 3)
    TaskNotFound,
    UserNotFound,
    ProjectNotFound,
    CategoryNotFound,
    AttachmentNotFound,

    // Validation (exit 4)
    RequiredField,
    EmptyComment,
    UsernameTaken,
    InvalidArgument,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::TaskNotFound => "TASK_NOT_FOUND",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::ProjectNotFound => "PROJECT_NOT_FOUND",
            Self::CategoryNotFound => "CATEGORY_NOT_FOUND",
            Self::AttachmentNotFound => "ATTACHMENT_NOT_FOUND",
            Self::RequiredField => "REQUIRED_FIELD",
            Self::EmptyComment => "EMPTY_COMMENT",
            Self::UsernameTaken => "USERNAME_TAKEN",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::DatabaseError => 2,
            Self::TaskNotFound
            | Self::UserNotFound
            | Self::ProjectNotFound
            | Self::CategoryNotFound
            | Self::AttachmentNotFound => 3,
            Self::RequiredField
            | Self::EmptyComment
            | Self::UsernameTaken
            | Self::InvalidArgument => 4,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether a caller should retry with corrected input.
    ///
    /// True for validation errors and transient database failures.
    /// False for not-found, I/O, or internal errors.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RequiredField
                | Self::EmptyComment
                | Self::UsernameTaken
                | Self::InvalidArgument
                | Self::DatabaseError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in tasktrail CLI operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `tt init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Task not found: {id}")]
    TaskNotFound { id: i64 },

    #[error("User not found: {id}")]
    UserNotFound { id: String },

    #[error("Project not found: {id}")]
    ProjectNotFound { id: i64 },

    #[error("Category not found: {id}")]
    CategoryNotFound { id: i64 },

    #[error("Attachment not found: {id}")]
    AttachmentNotFound { id: i64 },

    #[error("Required field missing: {field}")]
    RequiredField { field: &'static str },

    #[error("Comment text must not be empty")]
    EmptyComment,

    #[error("Username already taken: {name}")]
    UsernameTaken { name: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::TaskNotFound { .. } => ErrorCode::TaskNotFound,
            Self::UserNotFound { .. } => ErrorCode::UserNotFound,
            Self::ProjectNotFound { .. } => ErrorCode::ProjectNotFound,
            Self::CategoryNotFound { .. } => ErrorCode::CategoryNotFound,
            Self::AttachmentNotFound { .. } => ErrorCode::AttachmentNotFound,
            Self::RequiredField { .. } => ErrorCode::RequiredField,
            Self::EmptyComment => ErrorCode::EmptyComment,
            Self::UsernameTaken { .. } => ErrorCode::UsernameTaken,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint for humans and scripts.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => Some("Run `tt init` to create the database".to_string()),

            Self::AlreadyInitialized { path } => Some(format!(
                "Database already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::TaskNotFound { id } => Some(format!(
                "No task with ID {id}. Use `tt list --status all` to see existing tasks."
            )),

            Self::UserNotFound { id } => Some(format!(
                "No user '{id}'. Use `tt user list` to see registered users."
            )),

            Self::ProjectNotFound { id } => Some(format!(
                "No project with ID {id}. Use `tt project list` to see projects."
            )),

            Self::CategoryNotFound { id } => Some(format!(
                "No category with ID {id}. Use `tt category list --project <id>`."
            )),

            Self::UsernameTaken { .. } => {
                Some("Pick a different username; names are unique after trimming.".to_string())
            }

            Self::RequiredField { field } => {
                Some(format!("Provide a non-empty value for `{field}`."))
            }

            Self::EmptyComment => Some("Pass the comment body as the second argument.".to_string()),

            Self::InvalidArgument(msg) => {
                // Validation-style messages get vocabulary hints
                if msg.contains("capability") {
                    Some(
                        "Valid capabilities: view_tasks, open_task, close_task, take_ownership, \
                         add_to_assignees, vote, add_comments, comment_closed, \
                         create_attachments, delete_attachments, manage_project, \
                         modify_all_tasks, is_admin"
                            .to_string(),
                    )
                } else if msg.contains("column") {
                    Some(
                        "Valid columns: id, project, tasktype, dateopened, summary, severity, \
                         category, status, dueversion, duedate, progress, lastedit, priority, \
                         openedby, reportedin, assignedto, dateclosed, os, votes, attachments, \
                         comments"
                            .to_string(),
                    )
                } else if msg.contains("sort") {
                    Some("Valid sort directions: asc, desc".to_string())
                } else {
                    None
                }
            }

            Self::AttachmentNotFound { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Config(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
