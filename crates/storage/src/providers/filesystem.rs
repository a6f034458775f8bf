//! Local filesystem provider.

use crate::error::StorageResult;
use crate::local::LocalStore;
use crate::registry::{ProviderContext, ProviderKind};
use crate::traits::{BinaryProvider, ByteStream, PruneReport};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use strata_core::{BinaryData, Sha1Checksum};
use tracing::instrument;

const DEFAULT_SHARD_LEVELS: usize = 1;
const DEFAULT_SHARD_WIDTH: usize = 2;
const DEFAULT_PRUNE_AGE_SECS: u64 = 3600;

/// Stores blobs on local disk under sharded directories.
///
/// Reads that miss locally fall through to `next`.
pub struct FileSystemProvider {
    id: String,
    store: LocalStore,
    prune_age: Duration,
    next: Arc<dyn BinaryProvider>,
}

impl FileSystemProvider {
    /// Create a provider with the default layout (`ab/abcdef...`).
    pub async fn new(
        id: impl Into<String>,
        dir: impl Into<PathBuf>,
        next: Arc<dyn BinaryProvider>,
    ) -> StorageResult<Self> {
        Self::with_layout(
            id,
            dir,
            DEFAULT_SHARD_LEVELS,
            DEFAULT_SHARD_WIDTH,
            Duration::from_secs(DEFAULT_PRUNE_AGE_SECS),
            next,
        )
        .await
    }

    pub async fn with_layout(
        id: impl Into<String>,
        dir: impl Into<PathBuf>,
        shard_levels: usize,
        shard_width: usize,
        prune_age: Duration,
        next: Arc<dyn BinaryProvider>,
    ) -> StorageResult<Self> {
        let store = LocalStore::create(dir.into(), shard_levels, shard_width).await?;
        Ok(Self {
            id: id.into(),
            store,
            prune_age,
            next,
        })
    }

    pub(crate) async fn from_context(ctx: ProviderContext) -> StorageResult<Self> {
        let dir = ctx.dir_param("dir")?;
        let levels = ctx.spec.parse_param("shard_levels", DEFAULT_SHARD_LEVELS)?;
        let width = ctx.spec.parse_param("shard_width", DEFAULT_SHARD_WIDTH)?;
        let prune_age = ctx.spec.parse_param("prune_age_secs", DEFAULT_PRUNE_AGE_SECS)?;
        let next = ctx.next()?;
        Self::with_layout(
            ctx.spec.id,
            dir,
            levels,
            width,
            Duration::from_secs(prune_age),
            next,
        )
        .await
    }

    /// Storage root.
    pub fn root(&self) -> &Path {
        self.store.root()
    }

    /// Whether the blob is stored here (ignoring `next`).
    pub async fn holds(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        self.store.contains(checksum).await
    }

    /// Every checksum stored here.
    pub async fn list(&self) -> StorageResult<Vec<Sha1Checksum>> {
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .map(|(checksum, _, _)| checksum)
            .collect())
    }
}

#[async_trait]
impl BinaryProvider for FileSystemProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::FileSystem
    }

    fn next(&self) -> Option<&Arc<dyn BinaryProvider>> {
        Some(&self.next)
    }

    #[instrument(skip(self), fields(provider = "file-system"))]
    async fn exists(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        if self.store.contains(checksum).await? {
            return Ok(true);
        }
        self.next.exists(checksum).await
    }

    #[instrument(skip(self), fields(provider = "file-system"))]
    async fn get(&self, checksum: &Sha1Checksum) -> StorageResult<Option<ByteStream>> {
        if let Some(stream) = self.store.open_stream(checksum).await? {
            return Ok(Some(stream));
        }
        self.next.get(checksum).await
    }

    #[instrument(skip(self, stream), fields(provider = "file-system"))]
    async fn add(
        &self,
        checksum: &Sha1Checksum,
        stream: ByteStream,
        length: Option<u64>,
    ) -> StorageResult<BinaryData> {
        let stored = self.store.write(checksum, stream, length).await?;
        tracing::debug!(provider = %self.id, checksum = %checksum, ?stored, "stored binary");
        Ok(BinaryData::new(*checksum, stored.length()))
    }

    #[instrument(skip(self), fields(provider = "file-system"))]
    async fn delete(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        self.store.remove(checksum).await
    }

    async fn prune(&self) -> StorageResult<PruneReport> {
        let report = self.store.prune(self.prune_age).await?;
        tracing::info!(
            provider = %self.id,
            temp_files_removed = report.temp_files_removed,
            dirs_removed = report.dirs_removed,
            "pruned filestore"
        );
        Ok(report)
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.store.health_check().await
    }
}
