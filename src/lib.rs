//! tasktrail - local-first task tracking
//!
//! This crate provides the core functionality for the `tt` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (Task, User, Project, Category)
//! - [`storage`] - SQLite database layer and the audit event log
//! - [`perms`] - Capability grants and the permission gate
//! - [`tasks`] - Task mutation service (open/close/assign/comment/...)
//! - [`listing`] - Dynamic listing query engine
//! - [`hierarchy`] - Nested-set category traversal
//! - [`notify`] - Notification fan-out to the JSONL outbox
//! - [`attach`] - Attachment blob storage
//! - [`config`] - Path and environment resolution
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod attach;
pub mod cli;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod listing;
pub mod model;
pub mod notify;
pub mod perms;
pub mod storage;
pub mod tasks;
pub mod validate;

pub use error::{Error, Result};

/// Global silent mode flag for `--silent` output.
///
/// When set, create/mutate commands print only the ID
/// instead of full output. Avoids threading a `silent` bool
/// through every handler signature.
pub static SILENT: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Check if silent mode is active.
#[inline]
pub fn is_silent() -> bool {
    SILENT.load(std::sync::atomic::Ordering::Relaxed)
}
