//! Builder wiring the gateway's components together.

use crate::application::aggregator::{Aggregator, ResponseEntry};
use crate::application::cache::ResponseCache;
use crate::application::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::application::fanout::ProviderRoute;
use crate::application::limiter::SlidingWindowLimiter;
use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, ProviderClient};
use crate::application::registry::WindowRegistry;
use crate::domain::{
    cache_key::{normalize_category, CacheKey},
    identity::ClientIdentity,
    window::{RateWindow, WindowLimits},
};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::config::GatewaySettings;
use crate::infrastructure::eviction::LruEviction;
use crate::infrastructure::storage::ShardedStorage;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Storage backing the limiter's caller windows.
pub type WindowStore = Arc<ShardedStorage<ClientIdentity, RateWindow>>;

/// Storage backing the response cache.
pub type ResponseStore = Arc<ShardedStorage<CacheKey, ResponseEntry>>;

/// Aggregator over the in-process sharded stores.
pub type DefaultAggregator = Aggregator<WindowStore, ResponseStore>;

/// Error returned when building an aggregator fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// Window length must be greater than zero
    #[error("window must be greater than 0")]
    ZeroWindow,
    /// Maximum requests per window must be greater than zero
    #[error("max_requests must be greater than 0")]
    ZeroMaxRequests,
    /// Cache capacity must be greater than zero
    #[error("cache capacity must be greater than 0")]
    ZeroCacheCapacity,
    /// Default provider timeout must be greater than zero
    #[error("provider timeout must be greater than 0")]
    ZeroProviderTimeout,
    /// Circuit breakers need at least one failure to open
    #[error("circuit breaker failure_threshold must be greater than 0")]
    ZeroFailureThreshold,
    /// Category names must contain something besides whitespace
    #[error("category name must not be blank")]
    BlankCategory,
    /// A category was declared without providers
    #[error("category `{category}` has no providers")]
    EmptyCategory {
        /// The offending category
        category: String,
    },
    /// Two providers in one category share an id
    #[error("provider `{provider}` is configured twice for category `{category}`")]
    DuplicateProvider {
        /// The category
        category: String,
        /// The repeated provider id
        provider: String,
    },
}

/// Builder for constructing an [`Aggregator`].
///
/// Defaults:
/// - Limiter: 60 requests per 60 second window, idle callers reclaimed after 5 minutes
/// - Cache: 1,000 entries, 5 minute TTL
/// - Provider timeout: 3 seconds
/// - Circuit breakers: disabled
///
/// ```
/// use consensus_gateway::{AggregatorBuilder, StaticProvider};
/// use std::time::Duration;
///
/// let gateway = AggregatorBuilder::new()
///     .with_max_requests(120)
///     .with_provider_timeout(Duration::from_secs(2))
///     .with_provider("crypto", StaticProvider::new("coingecko", 0.9))
///     .with_provider("crypto", StaticProvider::new("binance", 0.8))
///     .build()
///     .unwrap();
///
/// assert_eq!(gateway.categories(), vec!["crypto"]);
/// ```
#[derive(Debug)]
pub struct AggregatorBuilder {
    window: Duration,
    max_requests: usize,
    idle_timeout: Duration,
    cache_capacity: usize,
    default_ttl: Duration,
    provider_timeout: Duration,
    clock: Option<Arc<dyn Clock>>,
    circuit_breaker: Option<CircuitBreakerConfig>,
    // Keyed by normalized name; keeps the first spelling for error messages
    categories: BTreeMap<String, (String, Vec<Arc<dyn ProviderClient>>)>,
}

impl Default for AggregatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregatorBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 60,
            idle_timeout: Duration::from_secs(300),
            cache_capacity: 1000,
            default_ttl: Duration::from_secs(300),
            provider_timeout: Duration::from_secs(3),
            clock: None,
            circuit_breaker: None,
            categories: BTreeMap::new(),
        }
    }

    /// Create a builder from loaded settings.
    ///
    /// Providers are not part of the settings file and still have to be
    /// added with [`with_provider`](Self::with_provider).
    pub fn from_settings(settings: &GatewaySettings) -> Self {
        let mut builder = Self::new()
            .with_window(settings.limiter.window())
            .with_max_requests(settings.limiter.max_requests)
            .with_idle_timeout(settings.limiter.idle_timeout())
            .with_cache_capacity(settings.cache.capacity)
            .with_default_ttl(settings.cache.default_ttl())
            .with_provider_timeout(settings.providers.timeout());

        if let Some(breaker) = &settings.providers.circuit_breaker {
            builder = builder.with_circuit_breaker(breaker.to_config());
        }
        builder
    }

    /// Set the sliding window length.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Set the maximum admitted requests per caller per window.
    pub fn with_max_requests(mut self, max_requests: usize) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Set how long a caller must be quiet before its window is reclaimed.
    ///
    /// Values shorter than the window are raised to the window length.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Set the maximum number of cached responses.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set how long cached responses stay valid.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the timeout for providers without their own override.
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// Set a custom clock (useful for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Guard every provider with a circuit breaker.
    ///
    /// A provider serving several categories gets one breaker shared by all
    /// of them.
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    /// Append a provider to `category`.
    ///
    /// Providers are invoked concurrently, and their results are reported in
    /// the order they were added.
    pub fn with_provider<P>(self, category: impl Into<String>, provider: P) -> Self
    where
        P: ProviderClient + 'static,
    {
        self.with_providers(category, [Arc::new(provider) as Arc<dyn ProviderClient>])
    }

    /// Append several providers to `category`.
    ///
    /// Passing no providers still declares the category, which `build`
    /// rejects.
    pub fn with_providers<I>(mut self, category: impl Into<String>, providers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn ProviderClient>>,
    {
        let category = category.into();
        let entry = self
            .categories
            .entry(normalize_category(&category))
            .or_insert_with(|| (category, Vec::new()));
        entry.1.extend(providers);
        self
    }

    fn validate(&self) -> Result<(), BuildError> {
        if self.window.is_zero() {
            return Err(BuildError::ZeroWindow);
        }
        if self.max_requests == 0 {
            return Err(BuildError::ZeroMaxRequests);
        }
        if self.cache_capacity == 0 {
            return Err(BuildError::ZeroCacheCapacity);
        }
        if self.provider_timeout.is_zero() {
            return Err(BuildError::ZeroProviderTimeout);
        }
        if matches!(self.circuit_breaker, Some(config) if config.failure_threshold == 0) {
            return Err(BuildError::ZeroFailureThreshold);
        }

        for (normalized, (category, providers)) in &self.categories {
            if normalized.is_empty() {
                return Err(BuildError::BlankCategory);
            }
            if providers.is_empty() {
                return Err(BuildError::EmptyCategory {
                    category: category.clone(),
                });
            }
            let mut seen = HashSet::new();
            for provider in providers {
                if !seen.insert(provider.id()) {
                    return Err(BuildError::DuplicateProvider {
                        category: category.clone(),
                        provider: provider.id().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Build the aggregator.
    ///
    /// # Errors
    /// Returns `BuildError` if the configuration is invalid.
    pub fn build(self) -> Result<DefaultAggregator, BuildError> {
        self.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let metrics = Metrics::new();

        let registry = WindowRegistry::new(
            Arc::new(ShardedStorage::new()),
            Arc::clone(&clock),
            WindowLimits::new(self.max_requests, self.window),
            self.idle_timeout,
        );
        let limiter = SlidingWindowLimiter::new(registry, metrics.clone());

        let cache = ResponseCache::new(
            Arc::new(ShardedStorage::with_capacity(self.cache_capacity)),
            Arc::clone(&clock),
            Arc::new(LruEviction::new(self.cache_capacity)),
            self.cache_capacity,
            self.default_ttl,
            metrics.clone(),
        )
        .map_err(|_| BuildError::ZeroCacheCapacity)?;

        let mut breakers: HashMap<String, Arc<CircuitBreaker>> = HashMap::new();
        let routes = self
            .categories
            .into_iter()
            .map(|(normalized, (_, providers))| {
                let routes = providers
                    .into_iter()
                    .map(|client| {
                        let route = ProviderRoute::new(Arc::clone(&client));
                        match self.circuit_breaker {
                            Some(config) => {
                                let breaker = breakers
                                    .entry(client.id().to_string())
                                    .or_insert_with(|| {
                                        Arc::new(CircuitBreaker::new(
                                            client.id(),
                                            config,
                                            Arc::clone(&clock),
                                        ))
                                    });
                                route.with_breaker(Arc::clone(breaker))
                            }
                            None => route,
                        }
                    })
                    .collect();
                (normalized, routes)
            })
            .collect();

        Ok(Aggregator::new(
            limiter,
            cache,
            routes,
            self.provider_timeout,
            metrics,
        ))
    }
}

impl DefaultAggregator {
    /// Create a builder for configuring an aggregator.
    pub fn builder() -> AggregatorBuilder {
        AggregatorBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::providers::StaticProvider;

    fn provider(id: &str) -> StaticProvider {
        StaticProvider::new(id, 0.5)
    }

    #[test]
    fn test_defaults_build() {
        let gateway = AggregatorBuilder::new()
            .with_provider("crypto", provider("a"))
            .build()
            .unwrap();

        assert_eq!(gateway.provider_timeout(), Duration::from_secs(3));
        assert_eq!(gateway.cache().capacity(), 1000);
        assert_eq!(gateway.cache().default_ttl(), Duration::from_secs(300));
        assert_eq!(
            gateway.limiter().registry().limits(),
            WindowLimits::new(60, Duration::from_secs(60))
        );
    }

    #[test]
    fn test_zero_values_rejected() {
        let cases = [
            (AggregatorBuilder::new().with_window(Duration::ZERO), BuildError::ZeroWindow),
            (AggregatorBuilder::new().with_max_requests(0), BuildError::ZeroMaxRequests),
            (AggregatorBuilder::new().with_cache_capacity(0), BuildError::ZeroCacheCapacity),
            (
                AggregatorBuilder::new().with_provider_timeout(Duration::ZERO),
                BuildError::ZeroProviderTimeout,
            ),
            (
                AggregatorBuilder::new().with_circuit_breaker(CircuitBreakerConfig {
                    failure_threshold: 0,
                    recovery_timeout: Duration::from_secs(1),
                }),
                BuildError::ZeroFailureThreshold,
            ),
        ];

        for (builder, expected) in cases {
            assert_eq!(builder.build().unwrap_err(), expected);
        }
    }

    #[test]
    fn test_blank_category_rejected() {
        let result = AggregatorBuilder::new()
            .with_provider("   ", provider("a"))
            .build();
        assert_eq!(result.unwrap_err(), BuildError::BlankCategory);
    }

    #[test]
    fn test_empty_category_rejected() {
        let result = AggregatorBuilder::new()
            .with_providers("Sports", Vec::new())
            .build();
        assert_eq!(
            result.unwrap_err(),
            BuildError::EmptyCategory {
                category: "Sports".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_provider_rejected() {
        let result = AggregatorBuilder::new()
            .with_provider("crypto", provider("a"))
            .with_provider("CRYPTO", provider("a"))
            .build();
        assert_eq!(
            result.unwrap_err(),
            BuildError::DuplicateProvider {
                category: "crypto".to_string(),
                provider: "a".to_string(),
            }
        );
    }

    #[test]
    fn test_same_provider_in_two_categories_allowed() {
        let shared: Arc<dyn ProviderClient> = Arc::new(provider("openai"));
        let gateway = AggregatorBuilder::new()
            .with_providers("analysis", [Arc::clone(&shared)])
            .with_providers("sports", [shared])
            .build()
            .unwrap();
        assert_eq!(gateway.categories(), vec!["analysis", "sports"]);
    }

    #[test]
    fn test_categories_are_normalized_and_ordered() {
        let gateway = AggregatorBuilder::new()
            .with_provider(" Crypto ", provider("b"))
            .with_provider("crypto", provider("a"))
            .build()
            .unwrap();

        assert_eq!(gateway.categories(), vec!["crypto"]);
        assert_eq!(gateway.providers("crypto"), Some(vec!["b", "a"]));
    }

    #[tokio::test]
    async fn test_breakers_shared_per_provider_id() {
        use crate::domain::response::FailureReason;

        let flaky = StaticProvider::new("openai", 0.5).failing("overloaded");
        let shared: Arc<dyn ProviderClient> = Arc::new(flaky.clone());
        let gateway = AggregatorBuilder::new()
            .with_circuit_breaker(CircuitBreakerConfig {
                failure_threshold: 2,
                recovery_timeout: Duration::from_secs(60),
            })
            .with_providers("analysis", [Arc::clone(&shared)])
            .with_providers("sports", [shared])
            .build()
            .unwrap();
        let caller = ClientIdentity::from("c");

        gateway.handle(&caller, "analysis", "q").await.unwrap();
        gateway.handle(&caller, "sports", "q").await.unwrap();
        let third = gateway.handle(&caller, "analysis", "q").await.unwrap();

        assert_eq!(
            third.results()[0].failure_reason(),
            Some(&FailureReason::CircuitOpen)
        );
        assert_eq!(flaky.calls(), 2);
    }

    #[test]
    fn test_build_error_messages() {
        assert_eq!(
            BuildError::EmptyCategory {
                category: "x".to_string()
            }
            .to_string(),
            "category `x` has no providers"
        );
        assert_eq!(
            BuildError::ZeroMaxRequests.to_string(),
            "max_requests must be greater than 0"
        );
    }
}
