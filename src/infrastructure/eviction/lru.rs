//! LRU (Least Recently Used) eviction adapter.

use crate::application::ports::{EvictionCandidate, EvictionPolicy};

/// LRU eviction policy with an entry count limit.
///
/// Evicts the candidate with the lowest recency tick once the limit is
/// reached. Ties on the tick cannot happen for entries stamped by the cache,
/// but fall back to insertion time for hand-built candidates.
#[derive(Debug, Clone)]
pub struct LruEviction {
    /// Maximum number of entries before eviction
    max_entries: usize,
}

impl LruEviction {
    /// Create a new LRU eviction policy with the given entry limit.
    pub fn new(max_entries: usize) -> Self {
        Self { max_entries }
    }

    /// The entry limit.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

impl<K> EvictionPolicy<K> for LruEviction
where
    K: Clone,
{
    fn select_victim(&self, candidates: &[EvictionCandidate<K>]) -> Option<K> {
        candidates
            .iter()
            .min_by_key(|candidate| (candidate.last_used, candidate.inserted_at))
            .map(|candidate| candidate.key.clone())
    }

    fn should_evict(&self, current_entries: usize) -> bool {
        current_entries >= self.max_entries
    }
}
