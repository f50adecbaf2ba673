//! Cache key computation for aggregated responses.
//!
//! A cache key identifies one cacheable unit of work: a category plus a
//! normalized query. Two requests that differ only in letter case or
//! whitespace map to the same key and share a cached response.

use ahash::AHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Normalize a category name for lookup and keying.
///
/// Categories are trimmed and ASCII-lowercased, so `" Crypto "` and
/// `"crypto"` address the same provider set.
pub fn normalize_category(category: &str) -> String {
    category.trim().to_ascii_lowercase()
}

/// Normalize a query for keying.
///
/// Leading and trailing whitespace is dropped, internal whitespace runs are
/// collapsed to a single space, and ASCII letters are lowercased.
pub fn normalize_query(query: &str) -> String {
    let mut normalized = String::with_capacity(query.len());
    for word in query.split_whitespace() {
        if !normalized.is_empty() {
            normalized.push(' ');
        }
        normalized.push_str(word);
    }
    normalized.make_ascii_lowercase();
    normalized
}

/// Deterministic key derived from (category, normalized query).
///
/// Hashing only feeds the precomputed 64-bit fingerprint to the hasher;
/// equality still compares the normalized strings, so a fingerprint
/// collision can never serve another query's response.
#[derive(Debug, Clone)]
pub struct CacheKey {
    fingerprint: u64,
    category: Arc<str>,
    query: Arc<str>,
}

impl CacheKey {
    /// Compute the key for a category and raw query.
    pub fn new(category: &str, query: &str) -> Self {
        let category = normalize_category(category);
        let query = normalize_query(query);

        let mut hasher = AHasher::default();
        category.hash(&mut hasher);
        query.hash(&mut hasher);

        Self {
            fingerprint: hasher.finish(),
            category: Arc::from(category),
            query: Arc::from(query),
        }
    }

    /// The 64-bit fingerprint of this key.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// The normalized category.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// The normalized query.
    pub fn query(&self) -> &str {
        &self.query
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
            && self.category == other.category
            && self.query == other.query
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.fingerprint);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.fingerprint)
    }
}
