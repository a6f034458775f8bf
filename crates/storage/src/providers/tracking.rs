//! Records binary usage in the metadata layer.

use crate::error::{StorageError, StorageResult};
use crate::registry::{ProviderContext, ProviderKind};
use crate::traits::{BinaryProvider, ByteStream};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use strata_core::{BinaryData, Sha1Checksum};
use strata_metadata::BinaryRepo;
use time::OffsetDateTime;
use tracing::instrument;

const DEFAULT_TOUCH_INTERVAL_SECS: u64 = 60;
/// New debounce entries between sweeps of expired ones.
const SWEEP_EVERY: usize = 1024;

/// Pass-through that stamps `last_used_at` on successful reads and writes.
///
/// Touches are debounced per checksum. Failing to record usage never fails
/// the operation.
pub struct TrackingProvider {
    id: String,
    repo: Arc<dyn BinaryRepo>,
    touch_interval: Duration,
    last_touch: DashMap<Sha1Checksum, Instant>,
    inserts_since_sweep: AtomicUsize,
    next: Arc<dyn BinaryProvider>,
}

impl TrackingProvider {
    pub fn new(
        id: impl Into<String>,
        repo: Arc<dyn BinaryRepo>,
        touch_interval: Duration,
        next: Arc<dyn BinaryProvider>,
    ) -> Self {
        Self {
            id: id.into(),
            repo,
            touch_interval,
            last_touch: DashMap::new(),
            inserts_since_sweep: AtomicUsize::new(0),
            next,
        }
    }

    pub(crate) fn from_context(ctx: ProviderContext) -> StorageResult<Self> {
        let interval = ctx
            .spec
            .parse_param("touch_interval_secs", DEFAULT_TOUCH_INTERVAL_SECS)?;
        let next = ctx.next()?;
        let repo = ctx.binary_repo.ok_or_else(|| {
            StorageError::Config(format!(
                "tracking provider '{}' needs a metadata store",
                ctx.spec.id
            ))
        })?;
        Ok(Self::new(
            ctx.spec.id,
            repo,
            Duration::from_secs(interval),
            next,
        ))
    }

    fn due(&self, checksum: &Sha1Checksum) -> bool {
        let now = Instant::now();
        let mut due = true;
        let mut inserted = true;
        self.last_touch
            .entry(*checksum)
            .and_modify(|last| {
                inserted = false;
                if now.duration_since(*last) < self.touch_interval {
                    due = false;
                } else {
                    *last = now;
                }
            })
            .or_insert(now);
        // The entry guard is gone here; sweeping under it would deadlock.
        if inserted
            && self.inserts_since_sweep.fetch_add(1, Ordering::Relaxed) + 1 >= SWEEP_EVERY
        {
            self.inserts_since_sweep.store(0, Ordering::Relaxed);
            self.evict_expired();
        }
        due
    }

    /// Drop debounce entries whose interval has passed. A missing entry
    /// and an expired one both make the next touch due.
    fn evict_expired(&self) {
        let before = self.last_touch.len();
        self.last_touch.retain(|_, last| last.elapsed() < self.touch_interval);
        tracing::trace!(
            provider = %self.id,
            evicted = before.saturating_sub(self.last_touch.len()),
            "swept touch debounce table"
        );
    }

    async fn record_use(&self, checksum: &Sha1Checksum) {
        if !self.due(checksum) {
            return;
        }
        if let Err(e) = self
            .repo
            .touch_binary(checksum, OffsetDateTime::now_utc())
            .await
        {
            tracing::warn!(provider = %self.id, checksum = %checksum, error = %e, "failed to record binary usage");
        }
    }
}

#[async_trait]
impl BinaryProvider for TrackingProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Tracking
    }

    fn next(&self) -> Option<&Arc<dyn BinaryProvider>> {
        Some(&self.next)
    }

    async fn exists(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        self.next.exists(checksum).await
    }

    #[instrument(skip(self), fields(provider = "tracking"))]
    async fn get(&self, checksum: &Sha1Checksum) -> StorageResult<Option<ByteStream>> {
        let stream = self.next.get(checksum).await?;
        if stream.is_some() {
            self.record_use(checksum).await;
        }
        Ok(stream)
    }

    #[instrument(skip(self, stream), fields(provider = "tracking"))]
    async fn add(
        &self,
        checksum: &Sha1Checksum,
        stream: ByteStream,
        length: Option<u64>,
    ) -> StorageResult<BinaryData> {
        let data = self.next.add(checksum, stream, length).await?;
        self.record_use(checksum).await;
        Ok(data)
    }

    async fn delete(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        self.last_touch.remove(checksum);
        Ok(false)
    }
}
