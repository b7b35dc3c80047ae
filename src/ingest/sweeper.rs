//! Periodic reclamation of stale series.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::counter::CounterEngine;

/// Spawn a task sweeping `engine` every `interval`.
///
/// Increments already evict stale buckets of the series they touch; the sweep
/// reclaims series that stopped receiving events. The task runs until it is
/// aborted.
pub fn spawn_sweeper(engine: Arc<CounterEngine>, interval: Duration) -> JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "Starting counter sweeper");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let stats = engine.sweep();
            debug!(
                buckets_evicted = stats.buckets_evicted,
                series_removed = stats.series_removed,
                "Sweep finished"
            );
        }
    })
}
