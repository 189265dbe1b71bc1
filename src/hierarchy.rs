//! Category hierarchy traversal.
//!
//! Categories form a nested-set tree per project: ancestry is bound
//! containment, so subtree and ancestor queries are scans rather than
//! recursion. The functions here are pure; callers load a project's
//! categories once (see [`crate::storage::sqlite::load_categories`])
//! and pass the slice in.

use crate::model::Category;

/// Resolve the effective owner of a category.
///
/// Returns the category's own declared owner if set, otherwise the
/// nearest ancestor's declared owner, otherwise the project default.
/// `None` means nobody owns the category.
///
/// An unknown or zero category id falls straight through to the
/// project default, which is how uncategorized tasks pick up an owner.
#[must_use]
pub fn resolve_owner(
    categories: &[Category],
    category_id: i64,
    project_default: i64,
) -> Option<i64> {
    let fallback = (project_default != 0).then_some(project_default);

    let Some(target) = categories.iter().find(|c| c.category_id == category_id) else {
        return fallback;
    };

    if target.category_owner != 0 {
        return Some(target.category_owner);
    }

    let mut ancestors: Vec<&Category> = categories.iter().filter(|c| c.contains(target)).collect();
    // Nearest ancestor has the largest left bound.
    ancestors.sort_by_key(|c| std::cmp::Reverse(c.lft));

    ancestors
        .iter()
        .find(|c| c.category_owner != 0)
        .map(|c| c.category_owner)
        .or(fallback)
}

/// Ids of all categories strictly inside the given one.
///
/// The category itself is not included; filter callers that want
/// "this category or anything below it" add it themselves.
#[must_use]
pub fn expand_subtree(categories: &[Category], category_id: i64) -> Vec<i64> {
    let Some(target) = categories.iter().find(|c| c.category_id == category_id) else {
        return Vec::new();
    };

    categories
        .iter()
        .filter(|c| target.contains(c))
        .map(|c| c.category_id)
        .collect()
}
