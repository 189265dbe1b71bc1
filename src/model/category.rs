//! Category model: a nested-set node.
//!
//! Each category carries left/right bounds scoped to its project.
//! Ancestor and descendant relationships are bound containment, so
//! subtree queries need no recursion. Traversal lives in the
//! `hierarchy` module.

use serde::{Deserialize, Serialize};

/// A category row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub category_id: i64,
    pub project_id: i64,
    pub category_name: String,
    /// Declared owner (0 = none declared)
    pub category_owner: i64,
    /// Nested-set left bound
    pub lft: i64,
    /// Nested-set right bound
    pub rgt: i64,
}

impl Category {
    /// Whether `self` strictly contains `other` (is an ancestor of it).
    ///
    /// Only meaningful within one project.
    #[must_use]
    pub const fn contains(&self, other: &Self) -> bool {
        self.project_id == other.project_id && self.lft < other.lft && self.rgt > other.rgt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(id: i64, lft: i64, rgt: i64) -> Category {
        Category {
            category_id: id,
            project_id: 1,
            category_name: format!("cat{id}"),
            category_owner: 0,
            lft,
            rgt,
        }
    }

    #[test]
    fn test_containment() {
        let root = cat(1, 1, 6);
        let child = cat(2, 2, 5);
        let grandchild = cat(3, 3, 4);

        assert!(root.contains(&child));
        assert!(root.contains(&grandchild));
        assert!(child.contains(&grandchild));
        assert!(!child.contains(&root));
        assert!(!root.contains(&root));
    }

    #[test]
    fn test_containment_is_project_scoped() {
        let a = cat(1, 1, 6);
        let mut b = cat(2, 2, 5);
        b.project_id = 2;
        assert!(!a.contains(&b));
    }
}
