//! Data models for tasktrail.
//!
//! This module contains all domain models:
//! - Task (and the NewTask creation payload)
//! - User (and the NewUser registration payload)
//! - Project
//! - Category (nested-set node)
//! - Comment
//! - Attachment

pub mod attachment;
pub mod category;
pub mod comment;
pub mod project;
pub mod task;
pub mod user;

pub use attachment::Attachment;
pub use category::Category;
pub use comment::Comment;
pub use project::Project;
pub use task::{NewTask, Task};
pub use user::{NewUser, User};
