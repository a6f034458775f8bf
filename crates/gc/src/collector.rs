//! The collection run itself.

use crate::control::GcControl;
use crate::error::GcResult;
use crate::info::GarbageCollectorInfo;
use crate::listener::GarbageCollectorListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use strata_core::BinaryData;
use strata_core::config::GcConfig;
use strata_metadata::ArtifactRepo;
use strata_storage::{BinaryStore, StorageError};
use time::OffsetDateTime;

/// Deletes binaries that no artifact references.
///
/// The binary index is the candidate set and the artifact table is the
/// referenced set. A binary is only removed from the index once every
/// provider holding a copy has deleted it, so a failed deletion is retried
/// by the next run.
pub struct GarbageCollector {
    store: Arc<BinaryStore>,
    artifacts: Arc<dyn ArtifactRepo>,
    config: GcConfig,
    listeners: RwLock<Vec<Arc<dyn GarbageCollectorListener>>>,
    control: GcControl,
    running: AtomicBool,
    destroyed: AtomicBool,
    last_info: Mutex<Option<GarbageCollectorInfo>>,
}

/// Clears the running flag when a run ends, including by panic.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl GarbageCollector {
    pub fn new(store: Arc<BinaryStore>, artifacts: Arc<dyn ArtifactRepo>, config: GcConfig) -> Self {
        Self {
            store,
            artifacts,
            config,
            listeners: RwLock::new(Vec::new()),
            control: GcControl::new(),
            running: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            last_info: Mutex::new(None),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn GarbageCollectorListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    pub fn control(&self) -> &GcControl {
        &self.control
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Report of the most recent finished run.
    pub fn last_info(&self) -> Option<GarbageCollectorInfo> {
        self.last_info
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn listeners(&self) -> Vec<Arc<dyn GarbageCollectorListener>> {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Run one collection.
    ///
    /// Returns `None` without doing anything when another run is active or
    /// the collector has been destroyed.
    pub async fn run(&self) -> Option<GarbageCollectorInfo> {
        if self.is_destroyed() {
            tracing::debug!("garbage collector destroyed, ignoring trigger");
            return None;
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("garbage collection already running, ignoring trigger");
            return None;
        }
        let _running = RunningGuard(&self.running);
        if self.is_destroyed() {
            return None;
        }
        // A stop aimed at the previous run does not carry over.
        self.control.clear_stop();

        let listeners = self.listeners();
        let mut info = GarbageCollectorInfo::begin(self.config.dry_run);
        for listener in &listeners {
            listener.start(info.run_id);
        }

        if let Err(e) = self.collect(&mut info, &listeners).await {
            tracing::error!(run_id = %info.run_id, error = %e, "garbage collection run aborted");
            info.error = Some(e.to_string());
        }
        info.finish();

        for listener in &listeners {
            listener.finished(&info);
        }
        *self.last_info.lock().unwrap_or_else(|e| e.into_inner()) = Some(info.clone());
        Some(info)
    }

    async fn collect(
        &self,
        info: &mut GarbageCollectorInfo,
        listeners: &[Arc<dyn GarbageCollectorListener>],
    ) -> GcResult<()> {
        let referenced = self.artifacts.referenced_checksums().await?;
        let candidates = self.store.binary_repo().list_binaries().await?;
        info.candidates = candidates.len() as u64;

        let cutoff = OffsetDateTime::now_utc() - self.config.grace_period();
        let mut to_delete = Vec::new();
        for binary in candidates {
            if referenced.contains(&binary.checksum) {
                continue;
            }
            if binary.is_within_grace(cutoff) {
                tracing::debug!(checksum = %binary.checksum, "unreferenced binary inside grace window");
                info.skipped += 1;
                continue;
            }
            to_delete.push(binary);
        }
        info.to_delete = to_delete.len() as u64;
        tracing::debug!(
            run_id = %info.run_id,
            candidates = info.candidates,
            referenced = referenced.len(),
            to_delete = info.to_delete,
            "computed deletion set"
        );

        for listener in listeners {
            listener.to_delete(&to_delete);
        }
        if self.config.dry_run {
            return Ok(());
        }

        let batch_size = self.config.batch_size.max(1) as usize;
        for (index, batch) in to_delete.chunks(batch_size).enumerate() {
            if index > 0
                && let Some(delay) = self.config.batch_delay()
            {
                tokio::time::sleep(delay).await;
            }
            for binary in batch {
                if !self.control.checkpoint().await {
                    tracing::info!(run_id = %info.run_id, deleted = info.deleted, "garbage collection stopped");
                    info.interrupted = true;
                    return Ok(());
                }
                self.delete_one(binary, cutoff, info).await?;
            }
        }
        Ok(())
    }

    /// Delete one binary everywhere, then drop it from the index.
    ///
    /// Runs under the checksum's delete claim, so no add can land a copy
    /// between the final checks and the removal. Only a closed store aborts
    /// the run; every other failure is counted and left for the next run.
    async fn delete_one(
        &self,
        binary: &BinaryData,
        cutoff: OffsetDateTime,
        info: &mut GarbageCollectorInfo,
    ) -> GcResult<()> {
        let checksum = &binary.checksum;
        let Some(_deleting) = self.store.begin_delete(checksum) else {
            tracing::debug!(checksum = %checksum, "binary is being written, skipping");
            info.skipped += 1;
            return Ok(());
        };

        // The listing may be stale: a re-add since then refreshes the row.
        match self.store.binary_repo().get_binary(checksum).await {
            Ok(Some(current)) if !current.is_within_grace(cutoff) => {}
            Ok(Some(_)) => {
                tracing::debug!(checksum = %checksum, "binary used since listing, skipping");
                info.skipped += 1;
                return Ok(());
            }
            Ok(None) => {
                tracing::debug!(checksum = %checksum, "binary no longer indexed, skipping");
                info.skipped += 1;
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(run_id = %info.run_id, checksum = %checksum, error = %e, "failed to re-read binary");
                info.failed += 1;
                return Ok(());
            }
        }

        match self.artifacts.is_referenced(checksum).await {
            Ok(false) => {}
            Ok(true) => {
                tracing::debug!(checksum = %checksum, "binary referenced again, skipping");
                info.skipped += 1;
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(run_id = %info.run_id, checksum = %checksum, error = %e, "failed to recheck references");
                info.failed += 1;
                return Ok(());
            }
        }

        let outcome = match self.store.delete_everywhere(checksum).await {
            Ok(outcome) => outcome,
            Err(e @ StorageError::Closed) => return Err(e.into()),
            Err(e) => {
                tracing::warn!(run_id = %info.run_id, checksum = %checksum, error = %e, "failed to delete binary");
                info.failed += 1;
                return Ok(());
            }
        };
        if !outcome.fully_deleted() {
            for (provider, error) in &outcome.failed {
                tracing::warn!(
                    run_id = %info.run_id,
                    checksum = %checksum,
                    provider = %provider,
                    error = %error,
                    "provider failed to delete binary, keeping index row for next run"
                );
            }
            info.failed += 1;
            return Ok(());
        }

        match self.store.binary_repo().delete_binary(checksum).await {
            Ok(_) => {
                info.deleted += 1;
                info.bytes_reclaimed += binary.length;
                tracing::debug!(
                    checksum = %checksum,
                    length = binary.length,
                    providers = ?outcome.deleted,
                    "deleted binary"
                );
            }
            Err(e) => {
                tracing::warn!(run_id = %info.run_id, checksum = %checksum, error = %e, "failed to remove binary from index");
                info.failed += 1;
            }
        }
        Ok(())
    }

    /// Stop any active run, refuse later ones and release every listener.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.control.stop();
        for listener in self.listeners() {
            listener.destroy();
        }
    }
}
