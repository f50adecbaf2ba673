//! Periodic reclamation of idle caller windows and expired cache entries.
//!
//! Both the limiter and the cache prune lazily on access, so state for
//! callers and keys that are never seen again would otherwise linger. A
//! background task sweeps them on a fixed interval.

use crate::application::aggregator::{Aggregator, ResponseEntry};
use crate::application::ports::Storage;
use crate::domain::{cache_key::CacheKey, identity::ClientIdentity, window::RateWindow};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Error returned when maintenance cannot be started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaintenanceError {
    /// Sweep interval must be greater than zero
    #[error("maintenance interval must be greater than 0")]
    ZeroInterval,
    /// The task must be spawned from inside a Tokio runtime
    #[error("maintenance requires a running Tokio runtime")]
    NoRuntime,
}

/// Error returned when the maintenance task did not stop cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShutdownError {
    /// The task panicked during a sweep
    #[error("maintenance task panicked")]
    Panicked,
    /// The task was cancelled before it could stop (runtime shutting down)
    #[error("maintenance task was cancelled")]
    Cancelled,
}

/// What one sweep reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SweepReport {
    /// Caller windows dropped
    pub identities_evicted: usize,
    /// Expired cache entries dropped
    pub cache_entries_purged: usize,
}

impl SweepReport {
    /// Total items reclaimed.
    pub fn reclaimed(&self) -> usize {
        self.identities_evicted + self.cache_entries_purged
    }
}

/// Configuration for the maintenance task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceConfig {
    interval: Duration,
}

impl MaintenanceConfig {
    /// Sweep every `interval`.
    ///
    /// # Errors
    /// Returns `MaintenanceError::ZeroInterval` if `interval` is zero.
    pub fn new(interval: Duration) -> Result<Self, MaintenanceError> {
        if interval.is_zero() {
            return Err(MaintenanceError::ZeroInterval);
        }
        Ok(Self { interval })
    }

    /// Time between sweeps.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Periodically sweeps an aggregator's limiter and cache.
pub struct Maintenance<S, C>
where
    S: Storage<ClientIdentity, RateWindow> + Clone,
    C: Storage<CacheKey, ResponseEntry>,
{
    aggregator: Aggregator<S, C>,
    config: MaintenanceConfig,
}

impl<S, C> Maintenance<S, C>
where
    S: Storage<ClientIdentity, RateWindow> + Clone + 'static,
    C: Storage<CacheKey, ResponseEntry> + 'static,
{
    /// Create a maintenance task for `aggregator`.
    pub fn new(aggregator: Aggregator<S, C>, config: MaintenanceConfig) -> Self {
        Self { aggregator, config }
    }

    /// Run one sweep now.
    pub fn sweep(&self) -> SweepReport {
        let report = self.aggregator.sweep();
        if report.reclaimed() > 0 {
            info!(
                identities_evicted = report.identities_evicted,
                cache_entries_purged = report.cache_entries_purged,
                "maintenance sweep reclaimed state"
            );
        } else {
            debug!("maintenance sweep found nothing to reclaim");
        }
        report
    }

    /// Spawn the sweep loop on the current Tokio runtime.
    ///
    /// The first sweep runs one interval after start. Dropping the returned
    /// handle also stops the loop.
    ///
    /// # Errors
    /// Returns `MaintenanceError::NoRuntime` outside a Tokio runtime.
    pub fn start(self) -> Result<MaintenanceHandle, MaintenanceError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| MaintenanceError::NoRuntime)?;
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = runtime.spawn(async move {
            let mut ticker = interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                }
            }
            debug!("maintenance task stopped");
        });

        Ok(MaintenanceHandle {
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

/// Handle to a running maintenance task.
#[derive(Debug)]
pub struct MaintenanceHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Signal the task to stop and wait for it.
    ///
    /// # Errors
    /// Returns `ShutdownError` if the task panicked or was cancelled.
    pub async fn shutdown(mut self) -> Result<(), ShutdownError> {
        if let Some(tx) = self.shutdown.take() {
            // The task may already be gone; joining reports why
            let _ = tx.send(());
        }

        match (&mut self.task).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_panic() => Err(ShutdownError::Panicked),
            Err(_) => Err(ShutdownError::Cancelled),
        }
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
