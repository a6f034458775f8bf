//! Cooperative pause and stop signalling for collection runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct ControlState {
    paused: AtomicBool,
    stopped: AtomicBool,
    changed: Notify,
}

/// Shared handle that pauses, resumes or stops collection runs.
///
/// The collector checks it between binaries, so a signal takes effect after
/// the binary being processed is fully handled. Pausing is sticky across
/// runs; a stop only applies to the run that is active (or the next one to
/// reach a checkpoint) and is cleared when a new run starts.
#[derive(Clone, Debug, Default)]
pub struct GcControl {
    state: Arc<ControlState>,
}

impl GcControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.state.paused.store(true, Ordering::SeqCst);
        tracing::info!("garbage collection paused");
    }

    pub fn resume(&self) {
        self.state.paused.store(false, Ordering::SeqCst);
        self.state.changed.notify_waiters();
        tracing::info!("garbage collection resumed");
    }

    /// Ask the active run to end at its next checkpoint.
    pub fn stop(&self) {
        self.state.stopped.store(true, Ordering::SeqCst);
        self.state.changed.notify_waiters();
        tracing::info!("garbage collection stop requested");
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }

    pub(crate) fn clear_stop(&self) {
        self.state.stopped.store(false, Ordering::SeqCst);
    }

    /// Wait while paused. Returns false when the run should stop.
    pub(crate) async fn checkpoint(&self) -> bool {
        loop {
            if self.is_stop_requested() {
                return false;
            }
            if !self.is_paused() {
                return true;
            }

            let changed = self.state.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();
            // Re-check after registering so a signal between the load and
            // the registration is not lost.
            if self.is_stop_requested() || !self.is_paused() {
                continue;
            }
            changed.await;
        }
    }
}
