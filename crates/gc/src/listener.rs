//! Observers of collection runs.

use crate::info::GarbageCollectorInfo;
use strata_core::BinaryData;
use uuid::Uuid;

/// Receives the phases of every collection run.
///
/// Callbacks run inline on the collector's task and must not block. All
/// methods default to no-ops.
pub trait GarbageCollectorListener: Send + Sync {
    /// A run is beginning.
    fn start(&self, _run_id: Uuid) {}

    /// The full deletion list, before any deletion happens.
    fn to_delete(&self, _binaries: &[BinaryData]) {}

    /// The run ended, successfully or not.
    fn finished(&self, _info: &GarbageCollectorInfo) {}

    /// The collector is shutting down.
    fn destroy(&self) {}
}

/// Writes each phase to the tracing log.
#[derive(Debug, Default)]
pub struct LoggingListener;

impl GarbageCollectorListener for LoggingListener {
    fn start(&self, run_id: Uuid) {
        tracing::info!(run_id = %run_id, "garbage collection started");
    }

    fn to_delete(&self, binaries: &[BinaryData]) {
        let bytes: u64 = binaries.iter().map(|b| b.length).sum();
        tracing::info!(count = binaries.len(), bytes, "garbage collection candidates selected");
        for binary in binaries {
            tracing::debug!(checksum = %binary.checksum, length = binary.length, "scheduled for deletion");
        }
    }

    fn finished(&self, info: &GarbageCollectorInfo) {
        match &info.error {
            Some(error) => tracing::error!(
                run_id = %info.run_id,
                error = %error,
                duration_ms = info.duration_ms,
                "garbage collection aborted"
            ),
            None => tracing::info!(
                run_id = %info.run_id,
                candidates = info.candidates,
                deleted = info.deleted,
                failed = info.failed,
                skipped = info.skipped,
                bytes_reclaimed = info.bytes_reclaimed,
                dry_run = info.dry_run,
                interrupted = info.interrupted,
                duration_ms = info.duration_ms,
                "garbage collection finished"
            ),
        }
    }

    fn destroy(&self) {
        tracing::debug!("garbage collection listener destroyed");
    }
}
