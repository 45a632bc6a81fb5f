//! Cache-key derivation and best-coverage selection.
//!
//! Exact-match keys serve the unseen and previous-day categories, whose
//! message sets are well-defined per request. The seen category instead
//! surfaces whichever prior summary covers the most of what the user has
//! seen, since seen sets grow across many generation events and caching
//! every subset would explode.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use super::types::SummaryCategory;
use crate::chatty::database::summary_cache::SummaryCacheEntry;

/// Sorted, deduplicated copy of the IDs - the canonical form keys and
/// stored entries use.
pub(crate) fn canonical_ids(message_ids: &[i64]) -> Vec<i64> {
    let mut ids = message_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Derives the deterministic cache key for (category, user, message set).
/// The ID set is canonicalized first, so the same set always yields the
/// same key regardless of retrieval order.
pub(crate) fn derive_cache_key(
    category: SummaryCategory,
    user_id: i64,
    message_ids: &[i64],
) -> String {
    let ids = canonical_ids(message_ids);
    let joined = ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");

    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}", category.as_str(), user_id, joined));
    hex::encode(hasher.finalize())
}

/// Picks the cached entry with the largest overlap with `candidate_ids`,
/// breaking ties by most recent generation. Returns `None` when nothing
/// overlaps at all.
pub(crate) fn best_coverage<'a>(
    entries: &'a [SummaryCacheEntry],
    candidate_ids: &HashSet<i64>,
) -> Option<&'a SummaryCacheEntry> {
    entries
        .iter()
        .map(|entry| {
            let overlap = entry
                .message_ids
                .iter()
                .filter(|id| candidate_ids.contains(id))
                .count();
            (entry, overlap)
        })
        .filter(|(_, overlap)| *overlap > 0)
        .max_by(|(a, overlap_a), (b, overlap_b)| {
            overlap_a
                .cmp(overlap_b)
                .then(a.generated_at.cmp(&b.generated_at))
                .then(a.id.cmp(&b.id))
        })
        .map(|(entry, _)| entry)
}
