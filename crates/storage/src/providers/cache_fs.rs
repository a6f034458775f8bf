//! Read/write-through disk cache in front of a slower provider.

use crate::error::{StorageError, StorageResult};
use crate::in_flight::{InFlightGuard, InFlightSet};
use crate::local::{LocalStore, Stored};
use crate::registry::{ProviderContext, ProviderKind};
use crate::spool::Spool;
use crate::traits::{BinaryProvider, ByteStream, PruneReport};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use strata_core::{BinaryData, Sha1Checksum};
use tokio::sync::mpsc;
use tracing::instrument;

/// Chunks buffered between a reader and the cache writer before population
/// is abandoned.
const FILL_CHANNEL_CAPACITY: usize = 64;

const PRUNE_AGE: Duration = Duration::from_secs(3600);

enum Fill {
    Chunk(Bytes),
    Done,
}

#[derive(Clone, Copy, Debug)]
struct CacheEntry {
    size: u64,
    last_access: u64,
}

/// Cache contents shared with background writers.
struct CacheState {
    id: String,
    store: LocalStore,
    max_size: Option<u64>,
    entries: DashMap<Sha1Checksum, CacheEntry>,
    total: AtomicU64,
    clock: AtomicU64,
}

impl CacheState {
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn touch(&self, checksum: &Sha1Checksum) {
        let tick = self.tick();
        if let Some(mut entry) = self.entries.get_mut(checksum) {
            entry.last_access = tick;
        }
    }

    async fn record(&self, checksum: Sha1Checksum, size: u64) {
        let entry = CacheEntry {
            size,
            last_access: self.tick(),
        };
        if self.entries.insert(checksum, entry).is_none() {
            self.total.fetch_add(size, Ordering::Relaxed);
        }
        self.evict().await;
    }

    fn forget(&self, checksum: &Sha1Checksum) {
        if let Some((_, entry)) = self.entries.remove(checksum) {
            self.total.fetch_sub(entry.size, Ordering::Relaxed);
        }
    }

    /// Drop least recently used blobs until the cache fits.
    async fn evict(&self) {
        let Some(max_size) = self.max_size else {
            return;
        };
        while self.total.load(Ordering::Relaxed) > max_size {
            let victim = self
                .entries
                .iter()
                .min_by_key(|e| e.value().last_access)
                .map(|e| *e.key());
            let Some(victim) = victim else {
                break;
            };
            self.forget(&victim);
            match self.store.remove(&victim).await {
                Ok(_) => tracing::debug!(provider = %self.id, checksum = %victim, "evicted from cache"),
                Err(e) => {
                    tracing::warn!(provider = %self.id, checksum = %victim, error = %e, "cache eviction failed")
                }
            }
        }
    }

    /// Background half of a tee: write what the reader forwarded, then verify.
    ///
    /// The claim is held until the copy is written or abandoned.
    async fn fill(
        self: Arc<Self>,
        checksum: Sha1Checksum,
        mut rx: mpsc::Receiver<Fill>,
        _claim: InFlightGuard,
    ) {
        let stream: ByteStream = Box::pin(async_stream::try_stream! {
            let mut complete = false;
            while let Some(msg) = rx.recv().await {
                match msg {
                    Fill::Chunk(chunk) => yield chunk,
                    Fill::Done => {
                        complete = true;
                        break;
                    }
                }
            }
            if !complete {
                Err(StorageError::Io(std::io::Error::other("cache population abandoned")))?;
            }
        });

        match self.store.write(&checksum, stream, None).await {
            Ok(Stored::Created(size)) => {
                tracing::debug!(provider = %self.id, checksum = %checksum, size, "populated cache");
                self.record(checksum, size).await;
            }
            Ok(Stored::Existing(_)) => {}
            Err(e) => {
                tracing::debug!(provider = %self.id, checksum = %checksum, error = %e, "cache population skipped");
            }
        }
    }
}

/// Disk cache in front of `next`.
///
/// Misses are served from `next` while a background task copies the stream
/// into the cache; readers never wait for it. Adds write through to `next`
/// first, then to the cache. With `max_size` set, least recently used blobs
/// are evicted.
pub struct CacheFsProvider {
    state: Arc<CacheState>,
    spool_dir: PathBuf,
    next: Arc<dyn BinaryProvider>,
    in_flight: InFlightSet,
}

impl CacheFsProvider {
    pub async fn new(
        id: impl Into<String>,
        dir: impl Into<PathBuf>,
        max_size: Option<u64>,
        spool_dir: impl Into<PathBuf>,
        next: Arc<dyn BinaryProvider>,
    ) -> StorageResult<Self> {
        let store = LocalStore::create(dir.into(), 1, 2).await?;
        let state = Arc::new(CacheState {
            id: id.into(),
            store,
            max_size,
            entries: DashMap::new(),
            total: AtomicU64::new(0),
            clock: AtomicU64::new(0),
        });

        // Rebuild the index from disk, oldest first so LRU order survives restarts.
        let mut existing = state.store.list().await?;
        existing.sort_by_key(|(_, _, modified)| *modified);
        for (checksum, size, _) in existing {
            let entry = CacheEntry {
                size,
                last_access: state.tick(),
            };
            state.entries.insert(checksum, entry);
            state.total.fetch_add(size, Ordering::Relaxed);
        }
        state.evict().await;

        tracing::info!(
            provider = %state.id,
            entries = state.entries.len(),
            bytes = state.total.load(Ordering::Relaxed),
            "cache index loaded"
        );

        Ok(Self {
            state,
            spool_dir: spool_dir.into(),
            next,
            in_flight: InFlightSet::new(),
        })
    }

    /// Register background fills in `in_flight`.
    pub fn with_in_flight(mut self, in_flight: InFlightSet) -> Self {
        self.in_flight = in_flight;
        self
    }

    pub(crate) async fn from_context(ctx: ProviderContext) -> StorageResult<Self> {
        let dir = ctx.dir_param("dir")?;
        let max_size = match ctx.spec.param("max_size") {
            Some(_) => Some(ctx.spec.parse_param("max_size", 0u64)?),
            None => None,
        };
        let spool_dir = ctx.spool_dir();
        let next = ctx.next()?;
        let in_flight = ctx.in_flight.clone();
        Ok(Self::new(ctx.spec.id, dir, max_size, spool_dir, next)
            .await?
            .with_in_flight(in_flight))
    }

    /// Whether the blob is cached (ignoring `next`).
    pub async fn holds(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        self.state.store.contains(checksum).await
    }

    /// Bytes currently cached.
    pub fn cached_bytes(&self) -> u64 {
        self.state.total.load(Ordering::Relaxed)
    }

    fn tee_into_cache(
        &self,
        checksum: Sha1Checksum,
        inner: ByteStream,
        claim: InFlightGuard,
    ) -> ByteStream {
        let (tx, rx) = mpsc::channel(FILL_CHANNEL_CAPACITY);
        tokio::spawn(Arc::clone(&self.state).fill(checksum, rx, claim));

        let stream = async_stream::try_stream! {
            let mut inner = inner;
            let mut tx = Some(tx);
            while let Some(chunk) = inner.next().await {
                let chunk = chunk?;
                if let Some(sender) = tx.as_ref() {
                    // A slow cache must never hold up the reader.
                    if sender.try_send(Fill::Chunk(chunk.clone())).is_err() {
                        tx = None;
                    }
                }
                yield chunk;
            }
            if let Some(sender) = tx.take() {
                let _ = sender.send(Fill::Done).await;
            }
        };
        Box::pin(stream)
    }
}

#[async_trait]
impl BinaryProvider for CacheFsProvider {
    fn id(&self) -> &str {
        &self.state.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::CacheFs
    }

    fn next(&self) -> Option<&Arc<dyn BinaryProvider>> {
        Some(&self.next)
    }

    #[instrument(skip(self), fields(provider = "cache-fs"))]
    async fn exists(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        if self.state.store.contains(checksum).await? {
            return Ok(true);
        }
        self.next.exists(checksum).await
    }

    #[instrument(skip(self), fields(provider = "cache-fs"))]
    async fn get(&self, checksum: &Sha1Checksum) -> StorageResult<Option<ByteStream>> {
        if let Some(stream) = self.state.store.open_stream(checksum).await? {
            self.state.touch(checksum);
            return Ok(Some(stream));
        }
        // Claim before reading so a collection cannot remove the blob
        // underneath the fill.
        let claim = self.in_flight.try_acquire(*checksum);
        match (self.next.get(checksum).await?, claim) {
            (Some(stream), Some(claim)) => Ok(Some(self.tee_into_cache(*checksum, stream, claim))),
            (Some(stream), None) => {
                tracing::debug!(provider = %self.state.id, checksum = %checksum, "blob is being deleted, not caching");
                Ok(Some(stream))
            }
            (None, _) => Ok(None),
        }
    }

    #[instrument(skip(self, stream), fields(provider = "cache-fs"))]
    async fn add(
        &self,
        checksum: &Sha1Checksum,
        stream: ByteStream,
        length: Option<u64>,
    ) -> StorageResult<BinaryData> {
        let spool = Spool::capture(&self.spool_dir, checksum, stream, length).await?;
        let data = self
            .next
            .add(checksum, spool.stream().await?, Some(spool.length()))
            .await?;

        let cached = async {
            let stored = self
                .state
                .store
                .write(checksum, spool.stream().await?, Some(spool.length()))
                .await?;
            Ok::<_, StorageError>(stored)
        }
        .await;
        match cached {
            Ok(Stored::Created(size)) => self.state.record(*checksum, size).await,
            Ok(Stored::Existing(_)) => self.state.touch(checksum),
            Err(e) => {
                tracing::warn!(provider = %self.state.id, checksum = %checksum, error = %e, "cache write failed");
            }
        }
        Ok(data)
    }

    #[instrument(skip(self), fields(provider = "cache-fs"))]
    async fn delete(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        let removed = self.state.store.remove(checksum).await?;
        self.state.forget(checksum);
        Ok(removed)
    }

    async fn prune(&self) -> StorageResult<PruneReport> {
        self.state.store.prune(PRUNE_AGE).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.state.store.health_check().await
    }
}
