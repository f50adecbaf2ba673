//! Provider results and the merged consensus response.

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::time::{Duration, SystemTime};

/// Why a provider produced no usable result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// The provider did not answer within its timeout.
    Timeout,
    /// The provider answered with an error or misbehaved.
    ProviderError {
        /// Human-readable description.
        message: String,
    },
    /// The provider's circuit breaker was open; it was not called.
    CircuitOpen,
}

impl FailureReason {
    /// Build a [`FailureReason::ProviderError`] from any message.
    pub fn provider_error(message: impl Into<String>) -> Self {
        FailureReason::ProviderError {
            message: message.into(),
        }
    }

    /// Stable short code for logs and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::ProviderError { .. } => "provider_error",
            FailureReason::CircuitOpen => "circuit_open",
        }
    }
}

/// A provider's successful answer before it is timed and attributed.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    /// Opaque payload returned by the upstream.
    pub payload: Value,
    /// Self-reported confidence, expected in `0.0..=1.0`.
    pub confidence: f64,
}

impl ProviderReply {
    /// Create a reply.
    pub fn new(payload: Value, confidence: f64) -> Self {
        Self {
            payload,
            confidence,
        }
    }
}

/// What a single provider call produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProviderOutcome {
    /// The provider answered.
    Success {
        /// Opaque payload.
        payload: Value,
        /// Confidence contributing to the consensus score.
        confidence: f64,
    },
    /// The provider produced nothing usable.
    Failure {
        /// Why.
        #[serde(flatten)]
        reason: FailureReason,
    },
}

/// One provider's contribution to an aggregate response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderResult {
    provider: String,
    success: bool,
    #[serde(flatten)]
    outcome: ProviderOutcome,
    #[serde(rename = "latency_ms", serialize_with = "serialize_millis")]
    latency: Duration,
}

impl ProviderResult {
    /// A successful result.
    pub fn success(
        provider: impl Into<String>,
        reply: ProviderReply,
        latency: Duration,
    ) -> Self {
        Self::new(
            provider,
            ProviderOutcome::Success {
                payload: reply.payload,
                confidence: reply.confidence,
            },
            latency,
        )
    }

    /// A failed result.
    pub fn failure(provider: impl Into<String>, reason: FailureReason, latency: Duration) -> Self {
        Self::new(provider, ProviderOutcome::Failure { reason }, latency)
    }

    fn new(provider: impl Into<String>, outcome: ProviderOutcome, latency: Duration) -> Self {
        let success = matches!(outcome, ProviderOutcome::Success { .. });
        Self {
            provider: provider.into(),
            success,
            outcome,
            latency,
        }
    }

    /// Id of the provider that produced this result.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// The outcome.
    pub fn outcome(&self) -> &ProviderOutcome {
        &self.outcome
    }

    /// Whether the provider succeeded.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Confidence of a successful result.
    pub fn confidence(&self) -> Option<f64> {
        match &self.outcome {
            ProviderOutcome::Success { confidence, .. } => Some(*confidence),
            ProviderOutcome::Failure { .. } => None,
        }
    }

    /// Payload of a successful result.
    pub fn payload(&self) -> Option<&Value> {
        match &self.outcome {
            ProviderOutcome::Success { payload, .. } => Some(payload),
            ProviderOutcome::Failure { .. } => None,
        }
    }

    /// Failure reason of a failed result.
    pub fn failure_reason(&self) -> Option<&FailureReason> {
        match &self.outcome {
            ProviderOutcome::Success { .. } => None,
            ProviderOutcome::Failure { reason } => Some(reason),
        }
    }

    /// Wall time spent on this provider.
    pub fn latency(&self) -> Duration {
        self.latency
    }
}

fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    serializer.serialize_u64(millis)
}

/// Overall health of an aggregate response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateStatus {
    /// Every provider succeeded.
    Complete,
    /// Some but not all providers succeeded.
    Partial,
    /// No provider succeeded.
    Failed,
}

impl AggregateStatus {
    /// Status for `succeeded` successes out of `total` results.
    pub fn from_counts(succeeded: usize, total: usize) -> Self {
        if succeeded == 0 {
            AggregateStatus::Failed
        } else if succeeded >= total {
            AggregateStatus::Complete
        } else {
            AggregateStatus::Partial
        }
    }
}

/// The merged answer for one logical request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResponse {
    category: String,
    query: String,
    results: Vec<ProviderResult>,
    consensus_score: Option<f64>,
    status: AggregateStatus,
    timestamp: SystemTime,
    cache_hit: bool,
}

impl AggregateResponse {
    /// Merge provider results into a consensus response.
    ///
    /// `results` keep the order they are given in. The consensus score is the
    /// mean confidence of the successful results, or `None` when nothing
    /// succeeded.
    pub fn merge(
        category: impl Into<String>,
        query: impl Into<String>,
        results: Vec<ProviderResult>,
        timestamp: SystemTime,
    ) -> Self {
        let (succeeded, confidence_sum) = results
            .iter()
            .filter_map(ProviderResult::confidence)
            .fold((0usize, 0.0f64), |(n, sum), c| (n + 1, sum + c));

        let consensus_score = (succeeded > 0).then(|| confidence_sum / succeeded as f64);

        Self {
            category: category.into(),
            query: query.into(),
            status: AggregateStatus::from_counts(succeeded, results.len()),
            results,
            consensus_score,
            timestamp,
            cache_hit: false,
        }
    }

    /// Copy of this response as served from the cache to `query`'s caller.
    pub(crate) fn served_from_cache(&self, query: &str) -> Self {
        Self {
            query: query.to_string(),
            cache_hit: true,
            ..self.clone()
        }
    }

    /// Only responses with at least one success are worth caching.
    pub fn is_cacheable(&self) -> bool {
        self.status != AggregateStatus::Failed
    }

    /// Normalized category the request was routed to.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Query as the caller sent it.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Per-provider results in configuration order.
    pub fn results(&self) -> &[ProviderResult] {
        &self.results
    }

    /// Mean confidence of successful providers.
    pub fn consensus_score(&self) -> Option<f64> {
        self.consensus_score
    }

    /// Overall status.
    pub fn status(&self) -> AggregateStatus {
        self.status
    }

    /// When the response was merged.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Whether this response was served from the cache.
    pub fn cache_hit(&self) -> bool {
        self.cache_hit
    }

    /// Number of successful provider results.
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }
}
