//! Interval trigger for automatic collection.

use crate::collector::GarbageCollector;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Triggers a collection every `interval` until cancelled.
pub struct GcScheduler;

impl GcScheduler {
    /// Spawn the scheduling loop.
    ///
    /// Each tick starts a run on its own task, so a trigger that fires while
    /// a run is still active is ignored by the collector.
    pub fn spawn(
        gc: Arc<GarbageCollector>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "automatic garbage collection enabled");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                let gc = Arc::clone(&gc);
                tokio::spawn(async move {
                    if gc.run().await.is_none() {
                        tracing::debug!("scheduled garbage collection skipped, previous run still active");
                    }
                });
            }
            tracing::info!("automatic garbage collection stopped");
        })
    }
}
