//! Integration tests for the background sweep.

use consensus_gateway::infrastructure::mocks::MockClock;
use consensus_gateway::{AggregatorBuilder, ClientIdentity, MaintenanceError, StaticProvider};
use std::sync::Arc;
use std::time::Duration;

fn gateway(clock: &MockClock) -> consensus_gateway::DefaultAggregator {
    AggregatorBuilder::new()
        .with_clock(Arc::new(clock.clone()))
        .with_window(Duration::from_secs(60))
        .with_idle_timeout(Duration::from_secs(60))
        .with_default_ttl(Duration::from_secs(30))
        .with_provider("crypto", StaticProvider::new("coingecko", 0.9))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_sweep_reclaims_idle_callers_and_expired_entries() {
    let clock = MockClock::starting_now();
    let gateway = gateway(&clock);

    for (who, query) in [("a", "BTC"), ("b", "ETH"), ("c", "SOL")] {
        gateway
            .handle(&ClientIdentity::from(who), "crypto", query)
            .await
            .unwrap();
    }
    assert_eq!(gateway.sweep().reclaimed(), 0);

    clock.advance(Duration::from_secs(30));
    let report = gateway.sweep();
    assert_eq!(report.cache_entries_purged, 3);
    assert_eq!(report.identities_evicted, 0);

    clock.advance(Duration::from_secs(30));
    let report = gateway.sweep();
    assert_eq!(report.identities_evicted, 3);
    assert_eq!(gateway.status().tracked_identities, 0);
    assert_eq!(gateway.metrics().snapshot().identities_evicted, 3);
}

#[tokio::test(start_paused = true)]
async fn test_background_task_sweeps_on_interval() {
    let clock = MockClock::starting_now();
    let gateway = gateway(&clock);
    gateway
        .handle(&ClientIdentity::from("a"), "crypto", "BTC")
        .await
        .unwrap();

    let handle = gateway.spawn_maintenance(Duration::from_secs(10)).unwrap();
    clock.advance(Duration::from_secs(120));

    tokio::time::sleep(Duration::from_secs(11)).await;
    tokio::task::yield_now().await;

    let status = gateway.status();
    assert_eq!(status.tracked_identities, 0);
    assert_eq!(status.cache_entries, 0);

    assert!(!handle.is_finished());
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_is_prompt() {
    let clock = MockClock::starting_now();
    let gateway = gateway(&clock);
    let handle = gateway.spawn_maintenance(Duration::from_secs(3600)).unwrap();

    tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
        .await
        .expect("shutdown should not wait for the next tick")
        .unwrap();
}

#[tokio::test]
async fn test_zero_interval_rejected() {
    let gateway = gateway(&MockClock::starting_now());
    assert_eq!(
        gateway.spawn_maintenance(Duration::ZERO).unwrap_err(),
        MaintenanceError::ZeroInterval
    );
}

#[test]
fn test_requires_runtime() {
    let gateway = gateway(&MockClock::starting_now());
    assert_eq!(
        gateway.spawn_maintenance(Duration::from_secs(1)).unwrap_err(),
        MaintenanceError::NoRuntime
    );
}
