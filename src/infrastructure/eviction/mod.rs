//! Eviction policy adapters for the response cache.

mod lru;

pub use lru::LruEviction;
