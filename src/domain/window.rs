//! Sliding-window admission state for a single caller.
//!
//! A [`RateWindow`] records the instants of admitted requests in
//! chronological order. Entries leave the window once they are `window` old;
//! a request is admitted while fewer than `max_requests` entries remain.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Limits applied to every caller window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimits {
    /// Maximum admitted requests inside one window.
    pub max_requests: usize,
    /// Length of the trailing window.
    pub window: Duration,
}

impl WindowLimits {
    /// Create limits allowing `max_requests` per `window`.
    pub const fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request was admitted and recorded.
    Admitted,
    /// The caller is over its budget.
    Rejected {
        /// Time until the oldest recorded request leaves the window.
        retry_after: Duration,
    },
}

impl Admission {
    /// Whether the request was admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }

    /// Whether the request was rejected.
    pub fn is_rejected(&self) -> bool {
        !self.is_admitted()
    }
}

/// Admitted-request timestamps for one caller.
#[derive(Debug, Clone, Default)]
pub struct RateWindow {
    timestamps: VecDeque<Instant>,
}

impl RateWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop timestamps that have left the window at `now`.
    ///
    /// A timestamp exactly `window` old is outside the window.
    pub fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Prune, then admit and record `now` if the caller has budget left.
    ///
    /// A rejection leaves the window untouched.
    pub fn register(&mut self, now: Instant, limits: WindowLimits) -> Admission {
        self.prune(now, limits.window);

        if self.timestamps.len() < limits.max_requests {
            self.timestamps.push_back(now);
            return Admission::Admitted;
        }

        let retry_after = self
            .timestamps
            .front()
            .map(|&oldest| {
                limits
                    .window
                    .saturating_sub(now.saturating_duration_since(oldest))
            })
            .unwrap_or_default();

        Admission::Rejected { retry_after }
    }

    /// Number of timestamps currently held.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the window holds no timestamps.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Instant of the most recent admission.
    pub fn last_admitted(&self) -> Option<Instant> {
        self.timestamps.back().copied()
    }

    /// Whether this window can be discarded at `now`.
    ///
    /// The newest admission must be at least `idle_after` old. Callers pass
    /// a value no shorter than the window so discarding never forgets a
    /// request that still counts.
    pub fn is_idle(&self, now: Instant, idle_after: Duration) -> bool {
        match self.last_admitted() {
            Some(last) => now.saturating_duration_since(last) >= idle_after,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: WindowLimits = WindowLimits::new(3, Duration::from_secs(60));

    #[test]
    fn test_admits_up_to_max() {
        let start = Instant::now();
        let mut window = RateWindow::new();

        for _ in 0..3 {
            assert!(window.register(start, LIMITS).is_admitted());
        }
        assert!(window.register(start, LIMITS).is_rejected());
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_rejection_does_not_mutate() {
        let start = Instant::now();
        let mut window = RateWindow::new();
        for _ in 0..3 {
            window.register(start, LIMITS);
        }

        for i in 1..10 {
            let now = start + Duration::from_secs(i);
            assert!(window.register(now, LIMITS).is_rejected());
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.last_admitted(), Some(start));
    }

    #[test]
    fn test_retry_after_counts_down_from_oldest() {
        let start = Instant::now();
        let mut window = RateWindow::new();
        window.register(start, LIMITS);
        window.register(start + Duration::from_secs(10), LIMITS);
        window.register(start + Duration::from_secs(20), LIMITS);

        let decision = window.register(start + Duration::from_secs(45), LIMITS);
        assert_eq!(
            decision,
            Admission::Rejected {
                retry_after: Duration::from_secs(15)
            }
        );
    }

    #[test]
    fn test_entry_exactly_window_old_is_pruned() {
        let start = Instant::now();
        let mut window = RateWindow::new();
        for _ in 0..3 {
            window.register(start, LIMITS);
        }

        let boundary = start + LIMITS.window;
        assert!(window.register(boundary, LIMITS).is_admitted());
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_partial_prune_keeps_recent() {
        let start = Instant::now();
        let mut window = RateWindow::new();
        window.register(start, LIMITS);
        window.register(start + Duration::from_secs(30), LIMITS);

        window.prune(start + Duration::from_secs(61), LIMITS.window);
        assert_eq!(window.len(), 1);
        assert_eq!(window.last_admitted(), Some(start + Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_budget_always_rejects() {
        let limits = WindowLimits::new(0, Duration::from_secs(1));
        let mut window = RateWindow::new();
        assert_eq!(
            window.register(Instant::now(), limits),
            Admission::Rejected {
                retry_after: Duration::ZERO
            }
        );
    }

    #[test]
    fn test_idle_detection() {
        let start = Instant::now();
        let mut window = RateWindow::new();
        assert!(window.is_idle(start, Duration::from_secs(60)));

        window.register(start, LIMITS);
        assert!(!window.is_idle(start + Duration::from_secs(59), Duration::from_secs(60)));
        assert!(window.is_idle(start + Duration::from_secs(60), Duration::from_secs(60)));
    }
}
