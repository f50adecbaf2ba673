//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::response::{FailureReason, ProviderReply, ProviderResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Candidate entry for eviction consideration.
///
/// Carries only the bookkeeping an eviction policy needs, so candidates can
/// be collected without cloning cached values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate<K> {
    /// The key of the entry
    pub key: K,
    /// Recency tick of the last insert or read; higher is more recent
    pub last_used: u64,
    /// When the entry was stored
    pub inserted_at: Instant,
}

/// Port for eviction policy decisions.
///
/// The cache delegates victim selection to a pluggable policy.
/// Infrastructure provides the concrete implementation (`LruEviction`).
pub trait EvictionPolicy<K>: Send + Sync + Debug
where
    K: Clone,
{
    /// Select a victim from the given candidates, or `None` to evict nothing.
    fn select_victim(&self, candidates: &[EvictionCandidate<K>]) -> Option<K>;

    /// Check if inserting one more entry requires an eviction first.
    fn should_evict(&self, current_entries: usize) -> bool;
}

/// Port for obtaining current time.
///
/// This abstraction allows the application layer to work with time
/// without depending on system clock implementation details.
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// Port for concurrent key-value storage backing caller windows and cache
/// entries.
///
/// Per-key closures run while the implementation holds that key's lock, so a
/// read-modify-write inside `with_entry_mut` is atomic for one key.
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Run `accessor` on the value for `key`, creating it with `factory` first
    /// if absent.
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R;

    /// Run `accessor` on the value for `key` if present. Never creates.
    fn with_existing_mut<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&mut V) -> R;

    fn insert(&self, key: K, value: V);

    fn remove(&self, key: &K) -> Option<V>;

    /// Remove `key` only if `predicate` holds for its current value.
    fn remove_if<F>(&self, key: &K, predicate: F) -> Option<V>
    where
        F: FnOnce(&V) -> bool;

    fn contains_key(&self, key: &K) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self);

    /// Visit every entry. Used to collect eviction candidates.
    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V);

    /// Keep only the entries for which `f` returns true.
    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool;
}

// Lets the limiter and cache hold a shared store behind an `Arc`.
impl<K, V, T> Storage<K, V> for Arc<T>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
    T: Storage<K, V>,
{
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R,
    {
        (**self).with_entry_mut(key, factory, accessor)
    }

    fn with_existing_mut<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&mut V) -> R,
    {
        (**self).with_existing_mut(key, accessor)
    }

    fn insert(&self, key: K, value: V) {
        (**self).insert(key, value)
    }

    fn remove(&self, key: &K) -> Option<V> {
        (**self).remove(key)
    }

    fn remove_if<F>(&self, key: &K, predicate: F) -> Option<V>
    where
        F: FnOnce(&V) -> bool,
    {
        (**self).remove_if(key, predicate)
    }

    fn contains_key(&self, key: &K) -> bool {
        (**self).contains_key(key)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn clear(&self) {
        (**self).clear()
    }

    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V),
    {
        (**self).for_each(f)
    }

    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        (**self).retain(f)
    }
}

/// Error reported by a provider's own fetch logic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    message: String,
    retryable: bool,
}

impl ProviderError {
    /// A failure that is unlikely to succeed on retry.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    /// A transient failure (rate limited upstream, connection reset).
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// Error description.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the upstream signalled a transient condition.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// Port for one upstream provider (an AI model, a market-data API, ...).
///
/// Implementations only write [`fetch`](ProviderClient::fetch). The gateway
/// always goes through [`call`](ProviderClient::call), which turns every way a
/// provider can go wrong into a [`ProviderResult`] instead of an error.
pub trait ProviderClient: Send + Sync + Debug {
    /// Stable identifier, unique within a category.
    fn id(&self) -> &str;

    /// Per-provider timeout overriding the gateway default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Perform the upstream request.
    fn fetch<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<ProviderReply, ProviderError>>;

    /// Run [`fetch`](ProviderClient::fetch) bounded by `timeout`.
    ///
    /// Elapsed time maps to [`FailureReason::Timeout`]. Errors, panics, and
    /// non-finite confidences map to [`FailureReason::ProviderError`]. A
    /// finite confidence outside `0.0..=1.0` is clamped into range. The timed
    /// out fetch future is dropped.
    fn call<'a>(&'a self, query: &'a str, timeout: Duration) -> BoxFuture<'a, ProviderResult> {
        Box::pin(async move {
            let started = tokio::time::Instant::now();
            // Building the future runs provider code too
            let fetch = futures::future::lazy(|_| self.fetch(query)).flatten();
            let guarded = AssertUnwindSafe(fetch).catch_unwind();
            let settled = tokio::time::timeout(timeout, guarded).await;
            let latency = started.elapsed();

            match settled {
                Err(_) => ProviderResult::failure(self.id(), FailureReason::Timeout, latency),
                Ok(Err(_)) => ProviderResult::failure(
                    self.id(),
                    FailureReason::provider_error("provider panicked"),
                    latency,
                ),
                Ok(Ok(Err(error))) => ProviderResult::failure(
                    self.id(),
                    FailureReason::provider_error(error.to_string()),
                    latency,
                ),
                Ok(Ok(Ok(reply))) if !reply.confidence.is_finite() => ProviderResult::failure(
                    self.id(),
                    FailureReason::provider_error(format!(
                        "non-finite confidence {}",
                        reply.confidence
                    )),
                    latency,
                ),
                Ok(Ok(Ok(mut reply))) => {
                    reply.confidence = reply.confidence.clamp(0.0, 1.0);
                    ProviderResult::success(self.id(), reply, latency)
                }
            }
        })
    }
}
