//! Request orchestration: limiter, cache, fan-out, merge.
//!
//! Every logical request walks the same phases:
//!
//! ```text
//! Received -> RateCheck -> CacheLookup -> CacheHit  -> Respond
//!                  |                   \-> CacheMiss -> FanningOut -> Merging -> Respond
//!                  \-> Rejected
//! ```
//!
//! Only a rate-limit rejection and an unknown category surface as errors.
//! Provider timeouts and failures degrade the response to `Partial` or
//! `Failed` instead.

use crate::application::cache::{CacheEntry, ResponseCache};
use crate::application::fanout::{fan_out, ProviderRoute};
use crate::application::limiter::SlidingWindowLimiter;
use crate::application::maintenance::{
    Maintenance, MaintenanceConfig, MaintenanceError, MaintenanceHandle, SweepReport,
};
use crate::application::metrics::{Metrics, MetricsSnapshot};
use crate::application::ports::Storage;
use crate::domain::{
    cache_key::{normalize_category, CacheKey},
    identity::ClientIdentity,
    response::AggregateResponse,
    window::{Admission, RateWindow},
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

/// Cache entries hold shared, immutable responses.
pub type ResponseEntry = CacheEntry<Arc<AggregateResponse>>;

/// Errors surfaced to the caller of [`Aggregator::handle`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The caller spent its budget for the current window.
    #[error("rate limit exceeded for `{identity}`, retry after {retry_after:?}")]
    RateLimitExceeded {
        /// Who was rejected.
        identity: ClientIdentity,
        /// Time until the caller's oldest request leaves the window.
        retry_after: Duration,
    },
    /// No providers are configured for the requested category.
    #[error("unknown category `{category}`")]
    InvalidCategory {
        /// The category as the caller sent it.
        category: String,
    },
}

impl GatewayError {
    /// Suggested wait before retrying, for rate-limit rejections.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            GatewayError::InvalidCategory { .. } => None,
        }
    }
}

/// Lifecycle phase of one request, emitted at `trace` level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Received,
    RateCheck,
    Rejected,
    CacheLookup,
    CacheHit,
    CacheMiss,
    FanningOut,
    Merging,
    Respond,
}

/// Providers configured for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryStatus {
    pub name: String,
    pub providers: Vec<String>,
}

/// Point-in-time view of the gateway for health and status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayStatus {
    pub tracked_identities: usize,
    pub cache_entries: usize,
    pub cache_capacity: usize,
    pub categories: Vec<CategoryStatus>,
    pub metrics: MetricsSnapshot,
}

struct Inner<S, C>
where
    S: Storage<ClientIdentity, RateWindow> + Clone,
    C: Storage<CacheKey, ResponseEntry>,
{
    limiter: SlidingWindowLimiter<S>,
    cache: ResponseCache<CacheKey, Arc<AggregateResponse>, C>,
    routes: BTreeMap<String, Vec<ProviderRoute>>,
    provider_timeout: Duration,
    metrics: Metrics,
}

/// The gateway core.
///
/// Cheap to clone; clones share the limiter, cache, providers, and metrics,
/// so one instance can be handed to every request handler. Build one with
/// [`AggregatorBuilder`](crate::AggregatorBuilder).
pub struct Aggregator<S, C>
where
    S: Storage<ClientIdentity, RateWindow> + Clone,
    C: Storage<CacheKey, ResponseEntry>,
{
    inner: Arc<Inner<S, C>>,
}

impl<S, C> Clone for Aggregator<S, C>
where
    S: Storage<ClientIdentity, RateWindow> + Clone,
    C: Storage<CacheKey, ResponseEntry>,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, C> std::fmt::Debug for Aggregator<S, C>
where
    S: Storage<ClientIdentity, RateWindow> + Clone,
    C: Storage<CacheKey, ResponseEntry>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("categories", &self.categories())
            .field("provider_timeout", &self.inner.provider_timeout)
            .field("cache", &self.inner.cache)
            .finish_non_exhaustive()
    }
}

impl<S, C> Aggregator<S, C>
where
    S: Storage<ClientIdentity, RateWindow> + Clone,
    C: Storage<CacheKey, ResponseEntry>,
{
    /// Assemble an aggregator from its parts.
    ///
    /// Category names in `routes` must already be normalized.
    pub fn new(
        limiter: SlidingWindowLimiter<S>,
        cache: ResponseCache<CacheKey, Arc<AggregateResponse>, C>,
        routes: BTreeMap<String, Vec<ProviderRoute>>,
        provider_timeout: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                limiter,
                cache,
                routes,
                provider_timeout,
                metrics,
            }),
        }
    }

    /// Serve one logical request.
    ///
    /// # Errors
    /// - `RateLimitExceeded` when `identity` has no budget left. Nothing else
    ///   happens.
    /// - `InvalidCategory` when `category` has no providers. The request
    ///   still consumed a slot of the caller's window.
    #[instrument(skip_all, fields(identity = %identity, category = %category))]
    pub async fn handle(
        &self,
        identity: &ClientIdentity,
        category: &str,
        query: &str,
    ) -> Result<AggregateResponse, GatewayError> {
        let inner = &self.inner;
        trace!(phase = ?Phase::Received);

        trace!(phase = ?Phase::RateCheck);
        if let Admission::Rejected { retry_after } = inner.limiter.check(identity) {
            trace!(phase = ?Phase::Rejected);
            warn!(
                retry_after_ms = retry_after.as_millis() as u64,
                "rate limit exceeded"
            );
            return Err(GatewayError::RateLimitExceeded {
                identity: identity.clone(),
                retry_after,
            });
        }
        debug!("request admitted");

        let normalized = normalize_category(category);
        let Some(routes) = inner.routes.get(&normalized) else {
            warn!("unknown category");
            return Err(GatewayError::InvalidCategory {
                category: category.to_string(),
            });
        };

        trace!(phase = ?Phase::CacheLookup);
        let key = CacheKey::new(&normalized, query);
        if let Some(cached) = inner.cache.get(&key) {
            trace!(phase = ?Phase::CacheHit);
            debug!(%key, "cache hit");
            trace!(phase = ?Phase::Respond);
            return Ok(cached.served_from_cache(query));
        }
        trace!(phase = ?Phase::CacheMiss);
        debug!(%key, "cache miss");

        trace!(phase = ?Phase::FanningOut, providers = routes.len());
        let results = fan_out(routes, query, inner.provider_timeout, &inner.metrics).await;

        trace!(phase = ?Phase::Merging);
        let response = AggregateResponse::merge(key.category(), query, results, SystemTime::now());
        inner.metrics.record_response(response.status());

        if response.is_cacheable() {
            inner.cache.put(key, Arc::new(response.clone()), None);
        } else {
            warn!(providers = routes.len(), "no provider succeeded, response not cached");
        }

        trace!(phase = ?Phase::Respond, status = ?response.status());
        Ok(response)
    }

    /// Reclaim idle caller windows and expired cache entries.
    pub fn sweep(&self) -> SweepReport {
        let now = self.inner.limiter.registry().clock().now();
        SweepReport {
            identities_evicted: self.inner.limiter.evict_idle(now),
            cache_entries_purged: self.inner.cache.purge_expired(),
        }
    }

    /// Start periodic [`sweep`](Self::sweep)s on the current Tokio runtime.
    ///
    /// # Errors
    /// Fails if `interval` is zero or no runtime is running.
    pub fn spawn_maintenance(
        &self,
        interval: Duration,
    ) -> Result<MaintenanceHandle, MaintenanceError>
    where
        S: 'static,
        C: 'static,
    {
        let config = MaintenanceConfig::new(interval)?;
        Maintenance::new(self.clone(), config).start()
    }

    /// Configured categories, sorted.
    pub fn categories(&self) -> Vec<&str> {
        self.inner.routes.keys().map(String::as_str).collect()
    }

    /// Provider ids configured for `category`, in invocation order.
    pub fn providers(&self, category: &str) -> Option<Vec<&str>> {
        self.inner
            .routes
            .get(&normalize_category(category))
            .map(|routes| routes.iter().map(ProviderRoute::id).collect())
    }

    /// Shared metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    /// The limiter.
    pub fn limiter(&self) -> &SlidingWindowLimiter<S> {
        &self.inner.limiter
    }

    /// The response cache.
    pub fn cache(&self) -> &ResponseCache<CacheKey, Arc<AggregateResponse>, C> {
        &self.inner.cache
    }

    /// Default per-provider timeout.
    pub fn provider_timeout(&self) -> Duration {
        self.inner.provider_timeout
    }

    /// Snapshot for status endpoints.
    pub fn status(&self) -> GatewayStatus {
        let inner = &self.inner;
        GatewayStatus {
            tracked_identities: inner.limiter.tracked_identities(),
            cache_entries: inner.cache.len(),
            cache_capacity: inner.cache.capacity(),
            categories: inner
                .routes
                .iter()
                .map(|(name, routes)| CategoryStatus {
                    name: name.clone(),
                    providers: routes.iter().map(|r| r.id().to_string()).collect(),
                })
                .collect(),
            metrics: inner.metrics.snapshot(),
        }
    }
}
