use consensus_gateway::infrastructure::mocks::MockClock;
use consensus_gateway::{
    Admission, ClientIdentity, Clock, Metrics, RateWindow, ShardedStorage, SlidingWindowLimiter,
    WindowLimits, WindowRegistry,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Limiter = SlidingWindowLimiter<Arc<ShardedStorage<ClientIdentity, RateWindow>>>;

fn limiter(max_requests: usize, window: Duration, clock: &MockClock) -> Limiter {
    let registry = WindowRegistry::new(
        Arc::new(ShardedStorage::new()),
        Arc::new(clock.clone()),
        WindowLimits::new(max_requests, window),
        window,
    );
    SlidingWindowLimiter::new(registry, Metrics::new())
}

#[test]
fn test_three_per_ten_seconds() {
    let start = Instant::now();
    let clock = MockClock::new(start);
    let limiter = limiter(3, Duration::from_secs(10), &clock);
    let id = ClientIdentity::from("api-key");
    let at = |secs: f64| start + Duration::from_secs_f64(secs);

    assert!(limiter.admit(&id, at(0.0)).is_admitted());
    assert!(limiter.admit(&id, at(1.0)).is_admitted());
    assert!(limiter.admit(&id, at(2.0)).is_admitted());

    match limiter.admit(&id, at(3.0)) {
        Admission::Rejected { retry_after } => assert_eq!(retry_after, Duration::from_secs(7)),
        Admission::Admitted => panic!("fourth request inside the window was admitted"),
    }

    // The t=0 request has left the window
    assert!(limiter.admit(&id, at(10.001)).is_admitted());
    assert!(limiter.admit(&id, at(10.5)).is_rejected());
}

#[test]
fn test_request_exactly_one_window_old_is_pruned() {
    let start = Instant::now();
    let clock = MockClock::new(start);
    let limiter = limiter(1, Duration::from_secs(10), &clock);
    let id = ClientIdentity::from("edge");

    assert!(limiter.admit(&id, start).is_admitted());
    assert!(limiter
        .admit(&id, start + Duration::from_secs(10))
        .is_admitted());
}

#[test]
fn test_rejections_do_not_extend_the_window() {
    let clock = MockClock::starting_now();
    let limiter = limiter(2, Duration::from_secs(10), &clock);
    let id = ClientIdentity::from("hammer");

    assert!(limiter.check(&id).is_admitted());
    assert!(limiter.check(&id).is_admitted());
    for _ in 0..20 {
        clock.advance(Duration::from_millis(100));
        assert!(limiter.check(&id).is_rejected());
    }

    clock.advance(Duration::from_secs(8));
    assert!(limiter.check(&id).is_admitted());

    let snapshot = limiter.metrics().snapshot();
    assert_eq!(snapshot.requests_admitted, 3);
    assert_eq!(snapshot.requests_rejected, 20);
}

#[test]
fn test_concurrent_callers_share_one_budget() {
    let clock = MockClock::starting_now();
    let limiter = Arc::new(limiter(25, Duration::from_secs(60), &clock));
    let id = ClientIdentity::from("shared-key");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            let id = id.clone();
            thread::spawn(move || {
                (0..20)
                    .filter(|_| limiter.check(&id).is_admitted())
                    .count()
            })
        })
        .collect();

    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(admitted, 25);
    assert_eq!(limiter.metrics().snapshot().requests_rejected, 160 - 25);
}

#[test]
fn test_idle_callers_are_reclaimed() {
    let clock = MockClock::starting_now();
    let limiter = limiter(5, Duration::from_secs(10), &clock);

    for name in ["a", "b", "c"] {
        limiter.check(&ClientIdentity::from(name));
    }
    clock.advance(Duration::from_secs(5));
    limiter.check(&ClientIdentity::from("a"));
    assert_eq!(limiter.tracked_identities(), 3);

    clock.advance(Duration::from_secs(6));
    let evicted = limiter.evict_idle(clock.now());
    assert_eq!(evicted, 2);
    assert_eq!(limiter.tracked_identities(), 1);
    assert_eq!(limiter.metrics().snapshot().identities_evicted, 2);
}
