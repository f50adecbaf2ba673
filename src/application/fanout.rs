//! Concurrent invocation of a category's providers.

use crate::application::circuit_breaker::CircuitBreaker;
use crate::application::metrics::Metrics;
use crate::application::ports::ProviderClient;
use crate::domain::response::{FailureReason, ProviderResult};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A provider as configured for one category.
#[derive(Debug, Clone)]
pub struct ProviderRoute {
    client: Arc<dyn ProviderClient>,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl ProviderRoute {
    /// Route to `client` without a circuit breaker.
    pub fn new(client: Arc<dyn ProviderClient>) -> Self {
        Self {
            client,
            breaker: None,
        }
    }

    /// Guard calls with `breaker`.
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// The provider's id.
    pub fn id(&self) -> &str {
        self.client.id()
    }

    /// The provider.
    pub fn client(&self) -> &Arc<dyn ProviderClient> {
        &self.client
    }

    /// The circuit breaker guarding this provider, if any.
    pub fn breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    /// Timeout for this provider: its own override or `default_timeout`.
    pub fn effective_timeout(&self, default_timeout: Duration) -> Duration {
        self.client.timeout().unwrap_or(default_timeout)
    }

    async fn invoke(
        &self,
        query: &str,
        default_timeout: Duration,
        metrics: &Metrics,
    ) -> ProviderResult {
        if let Some(breaker) = &self.breaker {
            if !breaker.allow_request() {
                let result =
                    ProviderResult::failure(self.id(), FailureReason::CircuitOpen, Duration::ZERO);
                metrics.record_provider_outcome(result.failure_reason());
                debug!(provider = self.id(), "circuit open, skipping provider");
                return result;
            }
        }

        let result = self
            .client
            .call(query, self.effective_timeout(default_timeout))
            .await;

        if let Some(breaker) = &self.breaker {
            if result.is_success() {
                breaker.record_success();
            } else {
                breaker.record_failure();
            }
        }
        metrics.record_provider_outcome(result.failure_reason());

        match result.failure_reason() {
            None => debug!(
                provider = self.id(),
                latency_ms = result.latency().as_millis() as u64,
                "provider answered"
            ),
            Some(reason) => warn!(
                provider = self.id(),
                reason = reason.code(),
                error = ?reason,
                latency_ms = result.latency().as_millis() as u64,
                "provider failed"
            ),
        }

        result
    }
}

/// Invoke every route concurrently and wait for all of them to settle.
///
/// Results come back in `routes` order regardless of completion order. Each
/// call is bounded by its own timeout, so the whole fan-out takes no longer
/// than the slowest timeout.
pub async fn fan_out(
    routes: &[ProviderRoute],
    query: &str,
    default_timeout: Duration,
    metrics: &Metrics,
) -> Vec<ProviderResult> {
    join_all(
        routes
            .iter()
            .map(|route| route.invoke(query, default_timeout, metrics)),
    )
    .await
}
