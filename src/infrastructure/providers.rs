//! Provider adapters.
//!
//! [`StaticProvider`] answers deterministically and is used by tests and the
//! demo. [`FnProvider`] lets the boundary plug in a real upstream client as a
//! closure without defining a new type.

use crate::application::ports::{ProviderClient, ProviderError};
use crate::domain::response::ProviderReply;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Deterministic provider with a fixed answer.
///
/// Clones share the call counter, so a test can keep one clone and inspect
/// how often the aggregator invoked the other.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    id: String,
    confidence: f64,
    payload: Option<Value>,
    latency: Duration,
    failure: Option<ProviderError>,
    timeout: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl StaticProvider {
    /// A provider that immediately answers with `confidence`.
    ///
    /// The default payload echoes the provider id and the query.
    pub fn new(id: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: id.into(),
            confidence,
            payload: None,
            latency: Duration::ZERO,
            failure: None,
            timeout: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answer with a fixed payload instead of the echo.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sleep for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every call with `message` after the configured latency.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(ProviderError::new(message));
        self
    }

    /// Override the gateway's default timeout for this provider.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// How many times `fetch` has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProviderClient for StaticProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn fetch<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<ProviderReply, ProviderError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            if let Some(error) = &self.failure {
                return Err(error.clone());
            }

            let payload = self
                .payload
                .clone()
                .unwrap_or_else(|| json!({ "provider": self.id, "query": query }));
            Ok(ProviderReply::new(payload, self.confidence))
        })
    }
}

/// Provider backed by an async closure.
///
/// ```
/// use consensus_gateway::{FnProvider, ProviderReply};
/// use serde_json::json;
///
/// let provider = FnProvider::new("echo", |query: String| async move {
///     Ok(ProviderReply::new(json!({ "echo": query }), 0.9))
/// });
/// ```
pub struct FnProvider<F> {
    id: String,
    timeout: Option<Duration>,
    fetch: F,
}

impl<F, Fut> FnProvider<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ProviderReply, ProviderError>> + Send + 'static,
{
    /// Wrap `fetch` as a provider named `id`.
    pub fn new(id: impl Into<String>, fetch: F) -> Self {
        Self {
            id: id.into(),
            timeout: None,
            fetch,
        }
    }

    /// Override the gateway's default timeout for this provider.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<F> fmt::Debug for FnProvider<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProvider")
            .field("id", &self.id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<F, Fut> ProviderClient for FnProvider<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ProviderReply, ProviderError>> + Send + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn fetch<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<ProviderReply, ProviderError>> {
        Box::pin((self.fetch)(query.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::response::FailureReason;

    #[tokio::test]
    async fn test_static_provider_echoes_query() {
        let provider = StaticProvider::new("openai", 0.95);
        let reply = provider.fetch("btc").await.unwrap();

        assert_eq!(reply.confidence, 0.95);
        assert_eq!(reply.payload, json!({ "provider": "openai", "query": "btc" }));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_static_provider_fixed_payload() {
        let provider = StaticProvider::new("coingecko", 0.8).with_payload(json!({ "price": 1 }));
        let reply = provider.fetch("btc").await.unwrap();
        assert_eq!(reply.payload, json!({ "price": 1 }));
    }

    #[tokio::test]
    async fn test_static_provider_failing() {
        let provider = StaticProvider::new("kraken", 0.8).failing("503 from upstream");
        let result = provider.call("btc", Duration::from_secs(1)).await;

        assert_eq!(
            result.failure_reason(),
            Some(&FailureReason::provider_error("503 from upstream"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_static_provider_latency_and_timeout_override() {
        let provider = StaticProvider::new("slow", 0.8)
            .with_latency(Duration::from_secs(5))
            .with_timeout(Duration::from_secs(1));

        assert_eq!(provider.timeout(), Some(Duration::from_secs(1)));
        let result = provider.call("q", Duration::from_secs(1)).await;
        assert_eq!(result.failure_reason(), Some(&FailureReason::Timeout));
    }

    #[test]
    fn test_clones_share_call_counter() {
        let provider = StaticProvider::new("a", 1.0);
        let clone = provider.clone();
        drop(clone.fetch("q"));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_fn_provider() {
        let provider = FnProvider::new("len", |query: String| async move {
            Ok(ProviderReply::new(json!(query.len()), 0.5))
        })
        .with_timeout(Duration::from_millis(10));

        assert_eq!(provider.id(), "len");
        assert_eq!(provider.timeout(), Some(Duration::from_millis(10)));

        let result = provider.call("four", Duration::from_secs(1)).await;
        assert_eq!(result.payload(), Some(&json!(4)));
        assert!(format!("{provider:?}").contains("len"));
    }
}
