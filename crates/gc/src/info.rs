//! Per-run garbage collection report.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Outcome of one collection run.
///
/// Created when the run starts, filled in as it progresses and handed to
/// listeners once it finishes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarbageCollectorInfo {
    pub run_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
    pub duration_ms: u64,
    /// Binaries in the index when the run started.
    pub candidates: u64,
    /// Unreferenced binaries outside the grace window.
    pub to_delete: u64,
    pub deleted: u64,
    /// Binaries that at least one provider failed to delete.
    pub failed: u64,
    /// Binaries dropped from deletion: inside the grace window, in flight,
    /// or referenced again by the time their turn came.
    pub skipped: u64,
    pub bytes_reclaimed: u64,
    pub dry_run: bool,
    /// The run was stopped before processing every binary.
    pub interrupted: bool,
    /// Set when the run aborted.
    pub error: Option<String>,
}

impl GarbageCollectorInfo {
    pub(crate) fn begin(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: OffsetDateTime::now_utc(),
            finished_at: None,
            duration_ms: 0,
            candidates: 0,
            to_delete: 0,
            deleted: 0,
            failed: 0,
            skipped: 0,
            bytes_reclaimed: 0,
            dry_run,
            interrupted: false,
            error: None,
        }
    }

    pub(crate) fn finish(&mut self) {
        let now = OffsetDateTime::now_utc();
        self.duration_ms = (now - self.started_at).whole_milliseconds().max(0) as u64;
        self.finished_at = Some(now);
    }

    /// Whether the run completed without aborting or being stopped.
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && !self.interrupted
    }
}
