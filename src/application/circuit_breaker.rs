//! Circuit breaker for upstream providers.
//!
//! A provider that keeps failing is skipped for a while instead of costing
//! every request a full timeout. Once `recovery_timeout` has passed, exactly
//! one request probes the provider; its outcome closes or reopens the
//! circuit. A probe that never reports back (its request was dropped) is
//! replaced by a new one after another `recovery_timeout`.

use crate::application::ports::Clock;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally
    Closed = 0,
    /// Calls are skipped
    Open = 1,
    /// One probe call is in flight
    HalfOpen = 2,
}

impl CircuitState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// When a provider's circuit opens and how long it stays open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures (errors or timeouts) that open the circuit
    pub failure_threshold: u32,
    /// How long an open circuit skips the provider before probing it
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Lock-free breaker for one provider, driven by an injected clock.
///
/// Shared by every category the provider serves.
#[derive(Debug)]
pub struct CircuitBreaker {
    provider: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    // Nanos since `epoch` when the circuit last opened or granted a probe
    opened_at: AtomicU64,
    epoch: Instant,
}

impl CircuitBreaker {
    /// A closed breaker guarding `provider`.
    pub fn new(
        provider: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let epoch = clock.now();
        Self {
            provider: provider.into(),
            config,
            clock,
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU32::new(0),
            opened_at: AtomicU64::new(0),
            epoch,
        }
    }

    fn now_nanos(&self) -> u64 {
        self.clock
            .now()
            .saturating_duration_since(self.epoch)
            .as_nanos()
            .try_into()
            .unwrap_or(u64::MAX)
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the provider may be called now.
    ///
    /// Always true while closed. Otherwise true for exactly one caller per
    /// elapsed `recovery_timeout`, which becomes the half-open probe.
    pub fn allow_request(&self) -> bool {
        if self.state() == CircuitState::Closed {
            return true;
        }

        let now = self.now_nanos();
        let opened_at = self.opened_at.load(Ordering::Acquire);
        let recovery = u64::try_from(self.config.recovery_timeout.as_nanos()).unwrap_or(u64::MAX);
        if now.saturating_sub(opened_at) < recovery {
            return false;
        }

        // Restarting the timer claims the probe
        let claimed = self
            .opened_at
            .compare_exchange(opened_at, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if claimed {
            self.state
                .store(CircuitState::HalfOpen as u8, Ordering::Release);
            info!(provider = %self.provider, "circuit half-open, probing provider");
        }
        claimed
    }

    /// Record a successful call. Closes the circuit.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        let previous = self
            .state
            .swap(CircuitState::Closed as u8, Ordering::AcqRel);
        if CircuitState::from_u8(previous) != CircuitState::Closed {
            info!(provider = %self.provider, "circuit closed, provider recovered");
        }
    }

    /// Record a failed call.
    ///
    /// Opens the circuit when the streak reaches the threshold or when the
    /// half-open probe fails. Late failures from calls started before the
    /// circuit opened do not extend it.
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;

        let opens = match self.state() {
            CircuitState::Closed => failures >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        if opens {
            self.opened_at.store(self.now_nanos(), Ordering::Release);
            self.state.store(CircuitState::Open as u8, Ordering::Release);
            warn!(
                provider = %self.provider,
                consecutive_failures = failures,
                recovery_ms = self.config.recovery_timeout.as_millis() as u64,
                "circuit opened"
            );
        }
    }

    /// The provider this breaker guards.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Force the circuit closed.
    pub fn reset(&self) {
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
    }
}
