//! Group membership filtering.

use std::collections::HashSet;

/// Keep the requested groups the directory reports for the user.
///
/// Comparison is case-insensitive; both sides are normalized to uppercase.
/// The result follows the order of `requested` and keeps its duplicates. An
/// empty result is returned as-is; deciding whether that is a failure is up
/// to the caller.
pub fn filter_groups(requested: &[String], available: &HashSet<String>) -> Vec<String> {
    let available: HashSet<String> = available.iter().map(|g| g.to_uppercase()).collect();

    requested
        .iter()
        .map(|g| g.to_uppercase())
        .filter(|g| available.contains(g))
        .collect()
}
