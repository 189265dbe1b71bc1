//! Project model for tasktrail.

use serde::{Deserialize, Serialize};

/// A project row.
///
/// Visibility and anonymous reporting are capability grants on user 0,
/// not project flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub project_id: i64,

    pub project_title: String,

    pub is_active: bool,

    /// Fallback category owner when no category in the ancestor chain
    /// declares one (0 = none)
    pub default_cat_owner: i64,

    /// Auto-assign the resolved category owner to new unconfirmed tasks
    pub auto_assign: bool,
}

impl Project {
    /// Create a project with default settings.
    #[must_use]
    pub fn new(title: &str) -> Self {
        Self {
            project_id: 0,
            project_title: title.to_string(),
            is_active: true,
            default_cat_owner: 0,
            auto_assign: false,
        }
    }

    /// Set the fallback category owner.
    #[must_use]
    pub const fn with_default_owner(mut self, user_id: i64) -> Self {
        self.default_cat_owner = user_id;
        self
    }

    /// Enable owner auto-assignment for new tasks.
    #[must_use]
    pub const fn with_auto_assign(mut self, auto_assign: bool) -> Self {
        self.auto_assign = auto_assign;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_project() {
        let p = Project::new("Firmware").with_default_owner(7).with_auto_assign(true);
        assert_eq!(p.project_title, "Firmware");
        assert!(p.is_active);
        assert_eq!(p.default_cat_owner, 7);
        assert!(p.auto_assign);
    }
}
