//! Local-first writes mirrored to the next provider in the background.

use crate::error::StorageResult;
use crate::in_flight::InFlightSet;
use crate::local::LocalStore;
use crate::registry::{ProviderContext, ProviderKind};
use crate::traits::{BinaryProvider, ByteStream, PruneReport};
use async_trait::async_trait;
use dashmap::DashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strata_core::{BinaryData, Sha1Checksum};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_RETRY_INTERVAL_MS: u64 = 1000;
const PRUNE_AGE: Duration = Duration::from_secs(3600);

/// Name of the local tier below the provider directory.
const ADD_DIR: &str = "_add";

struct Mirror {
    id: String,
    store: LocalStore,
    next: Arc<dyn BinaryProvider>,
    queue: mpsc::UnboundedSender<Sha1Checksum>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Sha1Checksum>>,
    pending: DashSet<Sha1Checksum>,
    retry_interval: Duration,
    in_flight: InFlightSet,
}

impl Mirror {
    fn enqueue(&self, checksum: Sha1Checksum) {
        if self.pending.insert(checksum) && self.queue.send(checksum).is_err() {
            self.pending.remove(&checksum);
        }
    }

    /// Push one local blob to `next`, then drop the local copy.
    ///
    /// Runs under an add claim, so a collection either finishes removing
    /// the local copy first or skips the checksum until the mirror is done.
    async fn mirror(&self, checksum: &Sha1Checksum) -> StorageResult<()> {
        let _claim = self.in_flight.acquire(*checksum).await;
        let Some(length) = self.store.size_of(checksum).await? else {
            // Deleted locally before it was mirrored.
            self.pending.remove(checksum);
            return Ok(());
        };
        let Some(stream) = self.store.open_stream(checksum).await? else {
            self.pending.remove(checksum);
            return Ok(());
        };
        self.next.add(checksum, stream, Some(length)).await?;
        self.store.remove(checksum).await?;
        self.pending.remove(checksum);
        tracing::debug!(provider = %self.id, checksum = %checksum, length, "mirrored to next provider");
        Ok(())
    }

    async fn run_worker(self: Arc<Self>, worker: usize, shutdown: CancellationToken) {
        loop {
            let checksum = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = async { self.receiver.lock().await.recv().await } => match received {
                    Some(checksum) => checksum,
                    None => break,
                },
            };

            match self.mirror(&checksum).await {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        provider = %self.id,
                        worker,
                        checksum = %checksum,
                        error = %e,
                        "mirroring failed, will retry"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.retry_interval) => {}
                    }
                    if self.queue.send(checksum).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    // Retrying cannot help; the local copy stays for inspection
                    // and is picked up again on restart.
                    tracing::error!(
                        provider = %self.id,
                        worker,
                        checksum = %checksum,
                        error = %e,
                        "mirroring failed permanently, dropping from queue"
                    );
                    self.pending.remove(&checksum);
                }
            }
        }
        tracing::debug!(provider = %self.id, worker, "mirror worker stopped");
    }
}

/// Writes land in a local tier and return at once; worker tasks copy them
/// to `next` and remove the local copy once the copy succeeded.
///
/// Reads check the local tier first since `next` may not have the blob yet.
pub struct EventualProvider {
    mirror: Arc<Mirror>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl EventualProvider {
    pub async fn new(
        id: impl Into<String>,
        dir: impl Into<PathBuf>,
        workers: usize,
        retry_interval: Duration,
        next: Arc<dyn BinaryProvider>,
    ) -> StorageResult<Self> {
        Self::with_in_flight(id, dir, workers, retry_interval, next, InFlightSet::new()).await
    }

    /// Like [`EventualProvider::new`], registering mirrors in `in_flight`.
    pub async fn with_in_flight(
        id: impl Into<String>,
        dir: impl Into<PathBuf>,
        workers: usize,
        retry_interval: Duration,
        next: Arc<dyn BinaryProvider>,
        in_flight: InFlightSet,
    ) -> StorageResult<Self> {
        let id = id.into();
        let store = LocalStore::create(dir.into().join(ADD_DIR), 1, 2).await?;
        let (queue, receiver) = mpsc::unbounded_channel();
        let mirror = Arc::new(Mirror {
            id: id.clone(),
            store,
            next,
            queue,
            receiver: tokio::sync::Mutex::new(receiver),
            pending: DashSet::new(),
            retry_interval,
            in_flight,
        });

        // Anything still on disk was never confirmed by `next`.
        let leftover = mirror.store.list().await?;
        if !leftover.is_empty() {
            tracing::info!(provider = %id, count = leftover.len(), "re-queuing unmirrored binaries");
        }
        for (checksum, _, _) in leftover {
            mirror.enqueue(checksum);
        }

        let shutdown = CancellationToken::new();
        let handles = (0..workers.max(1))
            .map(|worker| tokio::spawn(Arc::clone(&mirror).run_worker(worker, shutdown.clone())))
            .collect();

        Ok(Self {
            mirror,
            workers: Mutex::new(handles),
            shutdown,
        })
    }

    pub(crate) async fn from_context(ctx: ProviderContext) -> StorageResult<Self> {
        let dir = ctx.dir_param("dir")?;
        let workers = ctx.spec.parse_param("workers", DEFAULT_WORKERS)?;
        let retry_ms = ctx
            .spec
            .parse_param("retry_interval_ms", DEFAULT_RETRY_INTERVAL_MS)?;
        let next = ctx.next()?;
        Self::with_in_flight(
            ctx.spec.id,
            dir,
            workers,
            Duration::from_millis(retry_ms),
            next,
            ctx.in_flight.clone(),
        )
        .await
    }

    /// Binaries written locally but not yet confirmed by `next`.
    pub fn pending(&self) -> usize {
        self.mirror.pending.len()
    }

    /// Whether the blob is in the local tier.
    pub async fn holds(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        self.mirror.store.contains(checksum).await
    }
}

#[async_trait]
impl BinaryProvider for EventualProvider {
    fn id(&self) -> &str {
        &self.mirror.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Eventual
    }

    fn next(&self) -> Option<&Arc<dyn BinaryProvider>> {
        Some(&self.mirror.next)
    }

    #[instrument(skip(self), fields(provider = "eventual"))]
    async fn exists(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        if self.mirror.store.contains(checksum).await? {
            return Ok(true);
        }
        self.mirror.next.exists(checksum).await
    }

    #[instrument(skip(self), fields(provider = "eventual"))]
    async fn get(&self, checksum: &Sha1Checksum) -> StorageResult<Option<ByteStream>> {
        if let Some(stream) = self.mirror.store.open_stream(checksum).await? {
            return Ok(Some(stream));
        }
        self.mirror.next.get(checksum).await
    }

    #[instrument(skip(self, stream), fields(provider = "eventual"))]
    async fn add(
        &self,
        checksum: &Sha1Checksum,
        stream: ByteStream,
        length: Option<u64>,
    ) -> StorageResult<BinaryData> {
        let stored = self.mirror.store.write(checksum, stream, length).await?;
        self.mirror.enqueue(*checksum);
        tracing::debug!(provider = %self.mirror.id, checksum = %checksum, ?stored, "queued for mirroring");
        Ok(BinaryData::new(*checksum, stored.length()))
    }

    #[instrument(skip(self), fields(provider = "eventual"))]
    async fn delete(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        let removed = self.mirror.store.remove(checksum).await?;
        self.mirror.pending.remove(checksum);
        Ok(removed)
    }

    async fn prune(&self) -> StorageResult<PruneReport> {
        self.mirror.store.prune(PRUNE_AGE).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.mirror.store.health_check().await
    }

    async fn close(&self) -> StorageResult<()> {
        self.shutdown.cancel();
        let handles = {
            let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *workers)
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(provider = %self.mirror.id, error = %e, "mirror worker panicked");
            }
        }
        if !self.mirror.pending.is_empty() {
            tracing::info!(
                provider = %self.mirror.id,
                pending = self.mirror.pending.len(),
                "closing with unmirrored binaries; they will be re-queued on restart"
            );
        }
        Ok(())
    }
}

impl Drop for EventualProvider {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
