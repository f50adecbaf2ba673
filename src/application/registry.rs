//! Central registry for per-caller window state.
//!
//! The registry owns one [`RateWindow`] per [`ClientIdentity`] and hands out
//! atomic access to it. Windows are created on first sight and reclaimed once
//! their caller has gone idle.

use crate::application::ports::{Clock, Storage};
use crate::domain::{
    identity::ClientIdentity,
    window::{RateWindow, WindowLimits},
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Registry managing all caller windows.
///
/// Generic over the storage implementation. In production, use
/// `Arc<ShardedStorage>`.
#[derive(Clone)]
pub struct WindowRegistry<S>
where
    S: Storage<ClientIdentity, RateWindow> + Clone,
{
    storage: S,
    clock: Arc<dyn Clock>,
    limits: WindowLimits,
    idle_timeout: Duration,
}

impl<S> WindowRegistry<S>
where
    S: Storage<ClientIdentity, RateWindow> + Clone,
{
    /// Create a new registry.
    ///
    /// Windows are reclaimed once their newest admission is older than both
    /// the window length and `idle_timeout`.
    pub fn new(
        storage: S,
        clock: Arc<dyn Clock>,
        limits: WindowLimits,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            clock,
            limits,
            idle_timeout,
        }
    }

    /// Run `f` on the caller's window while holding its entry lock.
    pub fn with_window<F, R>(&self, identity: &ClientIdentity, f: F) -> R
    where
        F: FnOnce(&mut RateWindow, Instant) -> R,
    {
        let now = self.clock.now();
        self.with_window_at(identity, now, f)
    }

    /// Like [`with_window`](Self::with_window) with an explicit `now`.
    pub fn with_window_at<F, R>(&self, identity: &ClientIdentity, now: Instant, f: F) -> R
    where
        F: FnOnce(&mut RateWindow, Instant) -> R,
    {
        self.storage
            .with_entry_mut(identity.clone(), RateWindow::new, |window| f(window, now))
    }

    /// Drop the windows of callers idle at `now`. Returns how many were dropped.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let idle_after = self.idle_after();
        let mut evicted = 0;
        self.storage.retain(|_, window| {
            let idle = window.is_idle(now, idle_after);
            if idle {
                evicted += 1;
            }
            !idle
        });
        evicted
    }

    /// How long a caller must be quiet before its window is dropped.
    pub fn idle_after(&self) -> Duration {
        self.idle_timeout.max(self.limits.window)
    }

    /// The limits applied to every window.
    pub fn limits(&self) -> WindowLimits {
        self.limits
    }

    /// The registry's clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Whether a window exists for `identity`.
    pub fn contains(&self, identity: &ClientIdentity) -> bool {
        self.storage.contains_key(identity)
    }

    /// Get the number of tracked callers.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Clear all tracked state.
    pub fn clear(&self) {
        self.storage.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::MockClock;
    use crate::infrastructure::storage::ShardedStorage;

    type TestRegistry = WindowRegistry<Arc<ShardedStorage<ClientIdentity, RateWindow>>>;

    fn registry(clock: &MockClock, idle_timeout: Duration) -> TestRegistry {
        WindowRegistry::new(
            Arc::new(ShardedStorage::new()),
            Arc::new(clock.clone()),
            WindowLimits::new(5, Duration::from_secs(60)),
            idle_timeout,
        )
    }

    #[test]
    fn test_registry_creation() {
        let clock = MockClock::starting_now();
        let registry = registry(&clock, Duration::from_secs(300));

        assert_eq!(registry.len(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_with_window_creates_once() {
        let clock = MockClock::starting_now();
        let registry = registry(&clock, Duration::from_secs(300));
        let alice = ClientIdentity::from("alice");
        let limits = registry.limits();

        registry.with_window(&alice, |window, now| window.register(now, limits));
        registry.with_window(&alice, |window, now| window.register(now, limits));

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&alice));
        assert_eq!(registry.with_window(&alice, |window, _| window.len()), 2);
    }

    #[test]
    fn test_idle_after_never_shorter_than_window() {
        let clock = MockClock::starting_now();
        assert_eq!(
            registry(&clock, Duration::from_secs(1)).idle_after(),
            Duration::from_secs(60)
        );
        assert_eq!(
            registry(&clock, Duration::from_secs(300)).idle_after(),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_evict_idle() {
        let clock = MockClock::starting_now();
        let registry = registry(&clock, Duration::from_secs(120));
        let limits = registry.limits();

        let quiet = ClientIdentity::from("quiet");
        let busy = ClientIdentity::from("busy");
        registry.with_window(&quiet, |window, now| window.register(now, limits));

        clock.advance(Duration::from_secs(100));
        registry.with_window(&busy, |window, now| window.register(now, limits));

        assert_eq!(registry.evict_idle(clock.now()), 0);

        clock.advance(Duration::from_secs(20));
        assert_eq!(registry.evict_idle(clock.now()), 1);
        assert!(!registry.contains(&quiet));
        assert!(registry.contains(&busy));
    }

    #[test]
    fn test_clear() {
        let clock = MockClock::starting_now();
        let registry = registry(&clock, Duration::from_secs(300));
        let limits = registry.limits();

        for i in 0..10 {
            let id = ClientIdentity::new(format!("client-{i}"));
            registry.with_window(&id, |window, now| window.register(now, limits));
        }
        assert_eq!(registry.len(), 10);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let clock = MockClock::starting_now();
        let registry = Arc::new(registry(&clock, Duration::from_secs(300)));
        let mut handles = vec![];

        for i in 0..10 {
            let registry = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                let limits = registry.limits();
                for j in 0..100 {
                    let id = ClientIdentity::new(format!("client_{i}_{j}"));
                    registry.with_window(&id, |window, now| window.register(now, limits));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 1000);
    }
}
