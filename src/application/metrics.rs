//! Observability metrics for the gateway.
//!
//! Counters for admission, caching, provider calls, and response status.
//! One [`Metrics`] instance is shared by every component of an aggregator.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::domain::response::{AggregateStatus, FailureReason};

/// Metrics tracking gateway statistics.
///
/// All metrics use atomic operations for thread-safe updates and reads.
/// Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    requests_admitted: AtomicU64,
    requests_rejected: AtomicU64,
    identities_evicted: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_evictions: AtomicU64,
    cache_expirations: AtomicU64,
    provider_successes: AtomicU64,
    provider_errors: AtomicU64,
    provider_timeouts: AtomicU64,
    provider_short_circuits: AtomicU64,
    responses_complete: AtomicU64,
    responses_partial: AtomicU64,
    responses_failed: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_admitted(&self) {
        self.inner.requests_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.inner.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_identities_evicted(&self, count: usize) {
        self.inner
            .identities_evicted
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_eviction(&self) {
        self.inner.cache_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_expirations(&self, count: usize) {
        self.inner
            .cache_expirations
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record the outcome of one provider invocation.
    pub(crate) fn record_provider_outcome(&self, failure: Option<&FailureReason>) {
        let counter = match failure {
            None => &self.inner.provider_successes,
            Some(FailureReason::Timeout) => &self.inner.provider_timeouts,
            Some(FailureReason::ProviderError { .. }) => &self.inner.provider_errors,
            Some(FailureReason::CircuitOpen) => &self.inner.provider_short_circuits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_response(&self, status: AggregateStatus) {
        let counter = match status {
            AggregateStatus::Complete => &self.inner.responses_complete,
            AggregateStatus::Partial => &self.inner.responses_partial,
            AggregateStatus::Failed => &self.inner.responses_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Total admitted requests.
    pub fn requests_admitted(&self) -> u64 {
        self.inner.requests_admitted.load(Ordering::Relaxed)
    }

    /// Total rejected requests.
    pub fn requests_rejected(&self) -> u64 {
        self.inner.requests_rejected.load(Ordering::Relaxed)
    }

    /// Total cache hits.
    pub fn cache_hits(&self) -> u64 {
        self.inner.cache_hits.load(Ordering::Relaxed)
    }

    /// Total cache misses.
    pub fn cache_misses(&self) -> u64 {
        self.inner.cache_misses.load(Ordering::Relaxed)
    }

    /// Total cache entries evicted for capacity.
    pub fn cache_evictions(&self) -> u64 {
        self.inner.cache_evictions.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let inner = &self.inner;

        MetricsSnapshot {
            requests_admitted: load(&inner.requests_admitted),
            requests_rejected: load(&inner.requests_rejected),
            identities_evicted: load(&inner.identities_evicted),
            cache_hits: load(&inner.cache_hits),
            cache_misses: load(&inner.cache_misses),
            cache_evictions: load(&inner.cache_evictions),
            cache_expirations: load(&inner.cache_expirations),
            provider_successes: load(&inner.provider_successes),
            provider_errors: load(&inner.provider_errors),
            provider_timeouts: load(&inner.provider_timeouts),
            provider_short_circuits: load(&inner.provider_short_circuits),
            responses_complete: load(&inner.responses_complete),
            responses_partial: load(&inner.responses_partial),
            responses_failed: load(&inner.responses_failed),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.requests_admitted,
            &inner.requests_rejected,
            &inner.identities_evicted,
            &inner.cache_hits,
            &inner.cache_misses,
            &inner.cache_evictions,
            &inner.cache_expirations,
            &inner.provider_successes,
            &inner.provider_errors,
            &inner.provider_timeouts,
            &inner.provider_short_circuits,
            &inner.responses_complete,
            &inner.responses_partial,
            &inner.responses_failed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub requests_admitted: u64,
    pub requests_rejected: u64,
    pub identities_evicted: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,
    pub cache_expirations: u64,
    pub provider_successes: u64,
    pub provider_errors: u64,
    pub provider_timeouts: u64,
    /// Calls skipped because the provider's circuit was open
    pub provider_short_circuits: u64,
    pub responses_complete: u64,
    pub responses_partial: u64,
    pub responses_failed: u64,
}

impl MetricsSnapshot {
    /// Ratio of rejected to total admission checks (0.0 to 1.0).
    pub fn rejection_rate(&self) -> f64 {
        ratio(
            self.requests_rejected,
            self.requests_admitted.saturating_add(self.requests_rejected),
        )
    }

    /// Ratio of cache hits to total lookups (0.0 to 1.0).
    pub fn cache_hit_rate(&self) -> f64 {
        ratio(
            self.cache_hits,
            self.cache_hits.saturating_add(self.cache_misses),
        )
    }

    /// Total provider invocations, including short-circuited ones.
    pub fn provider_calls(&self) -> u64 {
        self.provider_successes
            .saturating_add(self.provider_errors)
            .saturating_add(self.provider_timeouts)
            .saturating_add(self.provider_short_circuits)
    }

    /// Ratio of failed to total provider invocations (0.0 to 1.0).
    pub fn provider_failure_rate(&self) -> f64 {
        let calls = self.provider_calls();
        ratio(calls.saturating_sub(self.provider_successes), calls)
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}
