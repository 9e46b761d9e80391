//! Paginated feeds: record collection, load state machine and page loaders

mod controller;
mod machine;
mod state;

pub use controller::{FeedController, LoadOutcome};
pub use machine::{FeedStateMachine, FollowingLoader, KindLoader, PageLoader};
pub use state::LoadState;

use std::collections::HashSet;

use crate::models::Identity;

/// Append every record of `incoming` whose identity is not already in
/// `records` (or earlier in `incoming`). Returns how many were appended.
pub fn merge_unique<R: Identity>(records: &mut Vec<R>, incoming: Vec<R>) -> usize {
    let mut seen: HashSet<String> = records.iter().map(|r| r.identity().to_string()).collect();
    let before = records.len();

    for record in incoming {
        if seen.insert(record.identity().to_string()) {
            records.push(record);
        }
    }

    records.len() - before
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(range: std::ops::Range<u32>) -> Vec<String> {
        range.map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_merge_unique_skips_overlap() {
        let mut records = ids(0..5);
        let appended = merge_unique(&mut records, ids(3..8));

        assert_eq!(appended, 3);
        assert_eq!(records, ids(0..8));
    }

    #[test]
    fn test_merge_unique_dedupes_within_page() {
        let mut records = Vec::new();
        let appended = merge_unique(
            &mut records,
            vec!["a".to_string(), "b".to_string(), "a".to_string()],
        );

        assert_eq!(appended, 2);
        assert_eq!(records, vec!["a", "b"]);
    }
}
