//! Sliding-window rate limiter.
//!
//! Decides whether a caller may issue another request. Each caller gets a
//! trailing window of `window` length holding at most `max_requests`
//! admissions; older admissions fall out of the window as time passes.

use crate::application::metrics::Metrics;
use crate::application::ports::Storage;
use crate::application::registry::WindowRegistry;
use crate::domain::{
    identity::ClientIdentity,
    window::{Admission, RateWindow},
};
use std::time::Instant;

/// Per-caller admission control.
#[derive(Clone)]
pub struct SlidingWindowLimiter<S>
where
    S: Storage<ClientIdentity, RateWindow> + Clone,
{
    registry: WindowRegistry<S>,
    metrics: Metrics,
}

impl<S> SlidingWindowLimiter<S>
where
    S: Storage<ClientIdentity, RateWindow> + Clone,
{
    /// Create a new limiter.
    ///
    /// # Arguments
    /// * `registry` - The window registry (which contains the clock and limits)
    /// * `metrics` - Metrics tracker
    pub fn new(registry: WindowRegistry<S>, metrics: Metrics) -> Self {
        Self { registry, metrics }
    }

    /// Admission check at the registry clock's current instant.
    pub fn check(&self, identity: &ClientIdentity) -> Admission {
        let now = self.registry.clock().now();
        self.admit(identity, now)
    }

    /// Decide whether `identity` may make a request at `now`.
    ///
    /// Pruning, counting, and recording happen under the caller's entry lock,
    /// so concurrent checks for one caller never admit more than
    /// `max_requests` inside a window. Checks for different callers do not
    /// contend unless they share a shard.
    pub fn admit(&self, identity: &ClientIdentity, now: Instant) -> Admission {
        let limits = self.registry.limits();
        let admission = self
            .registry
            .with_window_at(identity, now, |window, now| window.register(now, limits));

        match admission {
            Admission::Admitted => self.metrics.record_admitted(),
            Admission::Rejected { .. } => self.metrics.record_rejected(),
        }

        admission
    }

    /// Reclaim windows of idle callers. Returns how many were reclaimed.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let evicted = self.registry.evict_idle(now);
        if evicted > 0 {
            self.metrics.record_identities_evicted(evicted);
        }
        evicted
    }

    /// Number of callers currently tracked.
    pub fn tracked_identities(&self) -> usize {
        self.registry.len()
    }

    /// Get a reference to the registry.
    pub fn registry(&self) -> &WindowRegistry<S> {
        &self.registry
    }

    /// Get a reference to the metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::Clock;
    use crate::domain::window::WindowLimits;
    use crate::infrastructure::mocks::MockClock;
    use crate::infrastructure::storage::ShardedStorage;
    use std::sync::Arc;
    use std::time::Duration;

    type TestLimiter = SlidingWindowLimiter<Arc<ShardedStorage<ClientIdentity, RateWindow>>>;

    fn limiter(clock: &MockClock, max_requests: usize, window: Duration) -> TestLimiter {
        let registry = WindowRegistry::new(
            Arc::new(ShardedStorage::new()),
            Arc::new(clock.clone()),
            WindowLimits::new(max_requests, window),
            Duration::from_secs(300),
        );
        SlidingWindowLimiter::new(registry, Metrics::new())
    }

    #[test]
    fn test_rejects_after_budget_spent() {
        let clock = MockClock::starting_now();
        let limiter = limiter(&clock, 3, Duration::from_secs(60));
        let id = ClientIdentity::from("a");

        for _ in 0..3 {
            assert!(limiter.check(&id).is_admitted());
            clock.advance(Duration::from_secs(1));
        }

        assert_eq!(
            limiter.check(&id),
            Admission::Rejected {
                retry_after: Duration::from_secs(57)
            }
        );
        assert_eq!(limiter.metrics().requests_admitted(), 3);
        assert_eq!(limiter.metrics().requests_rejected(), 1);
    }

    #[test]
    fn test_window_slides() {
        let clock = MockClock::starting_now();
        let limiter = limiter(&clock, 2, Duration::from_secs(10));
        let id = ClientIdentity::from("a");

        assert!(limiter.check(&id).is_admitted());
        clock.advance(Duration::from_secs(5));
        assert!(limiter.check(&id).is_admitted());
        assert!(limiter.check(&id).is_rejected());

        clock.advance(Duration::from_secs(5));
        assert!(limiter.check(&id).is_admitted());
        assert!(limiter.check(&id).is_rejected());
    }

    #[test]
    fn test_identities_are_independent() {
        let clock = MockClock::starting_now();
        let limiter = limiter(&clock, 1, Duration::from_secs(60));

        assert!(limiter.check(&ClientIdentity::from("a")).is_admitted());
        assert!(limiter.check(&ClientIdentity::from("a")).is_rejected());
        assert!(limiter.check(&ClientIdentity::from("b")).is_admitted());
        assert_eq!(limiter.tracked_identities(), 2);
    }

    #[test]
    fn test_explicit_now_ignores_clock() {
        let clock = MockClock::starting_now();
        let limiter = limiter(&clock, 1, Duration::from_secs(60));
        let id = ClientIdentity::from("a");
        let start = clock.now();

        assert!(limiter.admit(&id, start).is_admitted());
        assert!(limiter.admit(&id, start + Duration::from_secs(30)).is_rejected());
        assert!(limiter.admit(&id, start + Duration::from_secs(60)).is_admitted());
    }

    #[test]
    fn test_evict_idle_records_metric() {
        let clock = MockClock::starting_now();
        let limiter = limiter(&clock, 5, Duration::from_secs(60));

        limiter.check(&ClientIdentity::from("a"));
        limiter.check(&ClientIdentity::from("b"));

        clock.advance(Duration::from_secs(300));
        assert_eq!(limiter.evict_idle(clock.now()), 2);
        assert_eq!(limiter.tracked_identities(), 0);
        assert_eq!(limiter.metrics().snapshot().identities_evicted, 2);
    }

    #[test]
    fn test_concurrent_checks_never_exceed_budget() {
        use std::thread;

        let clock = MockClock::starting_now();
        let limiter = Arc::new(limiter(&clock, 50, Duration::from_secs(60)));
        let id = ClientIdentity::from("shared");
        let mut handles = vec![];

        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            let id = id.clone();
            handles.push(thread::spawn(move || {
                (0..25).filter(|_| limiter.check(&id).is_admitted()).count()
            }));
        }

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
        assert_eq!(limiter.metrics().requests_rejected(), 150);
    }
}
