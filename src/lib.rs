//! # consensus-gateway
//!
//! Rate-limited, cached fan-out to multiple upstream providers, merged into
//! one consensus response.
//!
//! A single logical request `(client identity, category, query)` passes
//! through three stages:
//!
//! 1. **Admission**: a per-caller sliding window allows at most
//!    `max_requests` requests in any trailing `window`.
//! 2. **Cache**: responses are cached by `(category, normalized query)` in a
//!    bounded LRU cache with a TTL.
//! 3. **Fan-out**: on a miss, every provider configured for the category is
//!    called concurrently, each under its own timeout. Results are merged in
//!    configuration order into a `Complete`, `Partial`, or `Failed` response
//!    whose consensus score is the mean confidence of the providers that
//!    answered.
//!
//! Only a rate-limit rejection and an unknown category are errors. A provider
//! that times out, errors, or panics degrades the response instead.
//!
//! ## Quick Start
//!
//! ```rust
//! use consensus_gateway::{AggregateStatus, AggregatorBuilder, ClientIdentity, StaticProvider};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let gateway = AggregatorBuilder::new()
//!     .with_max_requests(60)
//!     .with_window(Duration::from_secs(60))
//!     .with_provider_timeout(Duration::from_secs(3))
//!     .with_provider("analysis", StaticProvider::new("openai", 0.95))
//!     .with_provider("analysis", StaticProvider::new("anthropic", 0.90))
//!     .build()
//!     .expect("valid configuration");
//!
//! let caller = ClientIdentity::from("api-key-123");
//! let response = gateway.handle(&caller, "analysis", "BTC outlook").await.unwrap();
//!
//! assert_eq!(response.status(), AggregateStatus::Complete);
//! assert_eq!(response.results().len(), 2);
//! # }
//! ```
//!
//! ## Plugging in real upstreams
//!
//! Implement [`ProviderClient`] for a type, or wrap an async closure in
//! [`FnProvider`]. Only `fetch` has to be written; timeouts, panics, and
//! invalid confidences are handled by the gateway.
//!
//! ```rust
//! use consensus_gateway::{AggregatorBuilder, FnProvider, ProviderError, ProviderReply};
//! use serde_json::json;
//!
//! let price_feed = FnProvider::new("coingecko", |query: String| async move {
//!     if query.is_empty() {
//!         return Err(ProviderError::new("empty query"));
//!     }
//!     Ok(ProviderReply::new(json!({ "symbol": query, "usd": 64_000 }), 0.9))
//! });
//!
//! let gateway = AggregatorBuilder::new()
//!     .with_provider("crypto", price_feed)
//!     .build()
//!     .unwrap();
//! ```
//!
//! ## Configuration
//!
//! Limits, cache sizing, timeouts, maintenance, and logging can be loaded
//! from TOML with [`GatewaySettings`] and applied with
//! [`AggregatorBuilder::from_settings`]. See [`infrastructure::config`] for
//! the file format.
//!
//! ## Background maintenance
//!
//! Caller windows and cache entries are pruned lazily on access.
//! [`Aggregator::spawn_maintenance`] runs a periodic sweep that reclaims
//! state for callers and keys that are never seen again; stop it with
//! [`MaintenanceHandle::shutdown`].
//!
//! ## Observability
//!
//! Every component records into a shared [`Metrics`] instance, and
//! [`Aggregator::status`] returns a serializable [`GatewayStatus`] for health
//! endpoints. Request phases are emitted as `tracing` events under a span
//! carrying the caller identity and category.

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    cache_key::CacheKey,
    identity::ClientIdentity,
    response::{
        AggregateResponse, AggregateStatus, FailureReason, ProviderOutcome, ProviderReply,
        ProviderResult,
    },
    window::{Admission, RateWindow, WindowLimits},
};

pub use application::{
    aggregator::{Aggregator, CategoryStatus, GatewayError, GatewayStatus},
    cache::{CacheEntry, ResponseCache},
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState},
    fanout::ProviderRoute,
    limiter::SlidingWindowLimiter,
    maintenance::{MaintenanceError, MaintenanceHandle, ShutdownError, SweepReport},
    metrics::{Metrics, MetricsSnapshot},
    ports::{Clock, EvictionCandidate, EvictionPolicy, ProviderClient, ProviderError, Storage},
    registry::WindowRegistry,
};

pub use infrastructure::{
    builder::{AggregatorBuilder, BuildError, DefaultAggregator},
    clock::{SystemClock, TokioClock},
    config::{ConfigError, GatewaySettings, LoggingSettings},
    eviction::LruEviction,
    providers::{FnProvider, StaticProvider},
    storage::ShardedStorage,
};
