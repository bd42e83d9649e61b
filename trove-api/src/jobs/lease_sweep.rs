//! Lease Cache Sweep Background Task
//!
//! Expired entries are evicted lazily when a data request checks them, but
//! subjects that are never touched again would linger forever. This task
//! periodically drops every expired entry from the local lease cache.
//!
//! It only prunes memory. The lease table is never written here; expired
//! rows there are dead by timestamp and get replaced by the next takeover.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::constants::DEFAULT_LEASE_SWEEP_INTERVAL_SECS;
use crate::lease::LeaseManager;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the lease sweep task.
#[derive(Debug, Clone)]
pub struct LeaseSweepConfig {
    /// How often to sweep (default: 60 seconds)
    pub interval: Duration,
}

impl Default for LeaseSweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_LEASE_SWEEP_INTERVAL_SECS),
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for sweep activity since startup.
#[derive(Debug, Default)]
pub struct LeaseSweepMetrics {
    /// Completed sweep cycles
    pub sweeps: AtomicU64,

    /// Cache entries evicted across all cycles
    pub evicted: AtomicU64,
}

impl LeaseSweepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> LeaseSweepSnapshot {
        LeaseSweepSnapshot {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sweep metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseSweepSnapshot {
    pub sweeps: u64,
    pub evicted: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Sweep the lease cache every `config.interval` until shutdown is
/// signalled (or the sender is dropped).
///
/// Returns the metrics collected over the task's lifetime.
pub async fn lease_sweep_task(
    leases: LeaseManager,
    config: LeaseSweepConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<LeaseSweepMetrics> {
    let metrics = Arc::new(LeaseSweepMetrics::new());

    let mut sweep_interval = interval(config.interval);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        "Lease sweep task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Lease sweep task shutting down");
                    break;
                }
            }

            _ = sweep_interval.tick() => {
                let evicted = leases.sweep();
                metrics.sweeps.fetch_add(1, Ordering::Relaxed);
                metrics.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = leases.cache().len(), "Swept expired leases");
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweeps = snapshot.sweeps,
        evicted = snapshot.evicted,
        "Lease sweep task completed"
    );

    metrics
}
