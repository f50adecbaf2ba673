//! Clock adapters.
//!
//! [`SystemClock`] reads the OS monotonic clock. [`TokioClock`] reads Tokio's
//! clock instead, so a runtime with paused time (`start_paused`,
//! `tokio::time::advance`) moves caller windows and cache TTLs together with
//! provider timeouts.

use crate::application::ports::Clock;
use std::time::Instant;

/// Monotonic OS clock. The default for built aggregators.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that follows the Tokio runtime's notion of time.
///
/// Outside a paused runtime this is the same as [`SystemClock`]. Reading it
/// from a paused runtime's test requires Tokio's `test-util` feature to have
/// any effect.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl TokioClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock::new();
        let t1 = clock.now();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.now() > t1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock::new();
        let before = clock.now();

        tokio::time::advance(Duration::from_secs(90)).await;

        assert!(clock.now().duration_since(before) >= Duration::from_secs(90));
    }
}
