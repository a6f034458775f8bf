//! Providers over a filestore owned by someone else.

use crate::error::{StorageError, StorageResult};
use crate::local::LocalStore;
use crate::registry::{ProviderContext, ProviderKind};
use crate::traits::{BinaryProvider, ByteStream};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use strata_core::{BinaryData, Sha1Checksum};
use tracing::instrument;

/// Read-only view of a pre-existing sharded filestore.
///
/// Writes go to `next`; the external directory is never written. Deletes
/// only happen when the store is marked `deletable`.
pub struct ExternalFileProvider {
    id: String,
    store: LocalStore,
    deletable: bool,
    next: Arc<dyn BinaryProvider>,
}

impl ExternalFileProvider {
    pub fn new(
        id: impl Into<String>,
        dir: impl AsRef<Path>,
        deletable: bool,
        next: Arc<dyn BinaryProvider>,
    ) -> StorageResult<Self> {
        Ok(Self {
            id: id.into(),
            store: LocalStore::open(dir, 1, 2)?,
            deletable,
            next,
        })
    }

    pub(crate) fn from_context(ctx: ProviderContext) -> StorageResult<Self> {
        let dir = ctx.dir_param("dir")?;
        let deletable = ctx.spec.bool_param("deletable", false)?;
        let next = ctx.next()?;
        Self::new(ctx.spec.id, dir, deletable, next)
    }

    /// Whether the external store holds the blob (ignoring `next`).
    pub async fn holds(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        self.store.contains(checksum).await
    }
}

#[async_trait]
impl BinaryProvider for ExternalFileProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::ExternalFile
    }

    fn next(&self) -> Option<&Arc<dyn BinaryProvider>> {
        Some(&self.next)
    }

    #[instrument(skip(self), fields(provider = "external-file"))]
    async fn exists(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        if self.store.contains(checksum).await? {
            return Ok(true);
        }
        self.next.exists(checksum).await
    }

    #[instrument(skip(self), fields(provider = "external-file"))]
    async fn get(&self, checksum: &Sha1Checksum) -> StorageResult<Option<ByteStream>> {
        if let Some(stream) = self.store.open_stream(checksum).await? {
            return Ok(Some(stream));
        }
        self.next.get(checksum).await
    }

    async fn add(
        &self,
        checksum: &Sha1Checksum,
        stream: ByteStream,
        length: Option<u64>,
    ) -> StorageResult<BinaryData> {
        self.next.add(checksum, stream, length).await
    }

    #[instrument(skip(self), fields(provider = "external-file"))]
    async fn delete(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        if !self.deletable {
            return Ok(false);
        }
        self.store.remove(checksum).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.store.health_check().await
    }
}

/// What the wrapper does with blobs it had to read from the external store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WrapperMode {
    /// Serve from the external store, leave the primary chain alone.
    #[default]
    PassThrough,
    /// Copy into the primary chain, then serve.
    Copy,
    /// Copy into the primary chain and delete from the external store.
    Move,
}

impl WrapperMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WrapperMode::PassThrough => "pass-through",
            WrapperMode::Copy => "copy",
            WrapperMode::Move => "move",
        }
    }
}

impl fmt::Display for WrapperMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WrapperMode {
    type Err = StorageError;

    fn from_str(s: &str) -> StorageResult<Self> {
        match s {
            "pass-through" => Ok(WrapperMode::PassThrough),
            "copy" => Ok(WrapperMode::Copy),
            "move" => Ok(WrapperMode::Move),
            other => Err(StorageError::Config(format!(
                "unknown external wrapper mode '{other}'"
            ))),
        }
    }
}

/// Migrates blobs lazily from an external store into the primary chain.
///
/// The single sub-provider is the external store; `next` is the primary
/// chain. Reads try the primary chain first.
pub struct ExternalWrapperProvider {
    id: String,
    mode: WrapperMode,
    subs: [Arc<dyn BinaryProvider>; 1],
    next: Arc<dyn BinaryProvider>,
}

impl ExternalWrapperProvider {
    pub fn new(
        id: impl Into<String>,
        mode: WrapperMode,
        external: Arc<dyn BinaryProvider>,
        next: Arc<dyn BinaryProvider>,
    ) -> Self {
        Self {
            id: id.into(),
            mode,
            subs: [external],
            next,
        }
    }

    pub(crate) fn from_context(ctx: ProviderContext) -> StorageResult<Self> {
        let mode = match ctx.spec.param("mode") {
            Some(raw) => raw.parse()?,
            None => WrapperMode::default(),
        };
        if mode == WrapperMode::Move
            && let Some(sub) = ctx.spec.subs.first()
            && sub.kind == ProviderKind::ExternalFile.as_str()
            && !sub.bool_param("deletable", false)?
        {
            return Err(StorageError::Config(format!(
                "external-wrapper provider '{}' moves blobs out of '{}', which is not deletable; \
                 set deletable=true on it or use mode=copy",
                ctx.spec.id, sub.id
            )));
        }
        let next = ctx.next()?;
        let [external]: [Arc<dyn BinaryProvider>; 1] =
            ctx.subs.try_into().map_err(|subs: Vec<_>| {
                StorageError::Config(format!(
                    "external-wrapper provider '{}' needs exactly 1 sub-provider, got {}",
                    ctx.spec.id,
                    subs.len()
                ))
            })?;
        Ok(Self::new(ctx.spec.id, mode, external, next))
    }

    pub fn mode(&self) -> WrapperMode {
        self.mode
    }

    fn external(&self) -> &Arc<dyn BinaryProvider> {
        &self.subs[0]
    }

    /// Copy an externally held blob into the primary chain and serve it
    /// from there.
    async fn migrate(
        &self,
        checksum: &Sha1Checksum,
        stream: ByteStream,
    ) -> StorageResult<Option<ByteStream>> {
        let data = self.next.add(checksum, stream, None).await?;
        tracing::info!(
            provider = %self.id,
            checksum = %checksum,
            length = data.length,
            mode = %self.mode,
            "migrated binary from external store"
        );

        if self.mode == WrapperMode::Move {
            match self.external().delete(checksum).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(provider = %self.id, checksum = %checksum, "external store kept the migrated binary, move acts as copy");
                }
                Err(e) => {
                    tracing::warn!(provider = %self.id, checksum = %checksum, error = %e, "failed to remove migrated binary from external store");
                }
            }
        }
        self.next.get(checksum).await
    }
}

#[async_trait]
impl BinaryProvider for ExternalWrapperProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::ExternalWrapper
    }

    fn next(&self) -> Option<&Arc<dyn BinaryProvider>> {
        Some(&self.next)
    }

    fn sub_providers(&self) -> &[Arc<dyn BinaryProvider>] {
        &self.subs
    }

    #[instrument(skip(self), fields(provider = "external-wrapper"))]
    async fn exists(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        if self.next.exists(checksum).await? {
            return Ok(true);
        }
        self.external().exists(checksum).await
    }

    #[instrument(skip(self), fields(provider = "external-wrapper"))]
    async fn get(&self, checksum: &Sha1Checksum) -> StorageResult<Option<ByteStream>> {
        if let Some(stream) = self.next.get(checksum).await? {
            return Ok(Some(stream));
        }
        let Some(stream) = self.external().get(checksum).await? else {
            return Ok(None);
        };
        match self.mode {
            WrapperMode::PassThrough => Ok(Some(stream)),
            WrapperMode::Copy | WrapperMode::Move => self.migrate(checksum, stream).await,
        }
    }

    async fn add(
        &self,
        checksum: &Sha1Checksum,
        stream: ByteStream,
        length: Option<u64>,
    ) -> StorageResult<BinaryData> {
        self.next.add(checksum, stream, length).await
    }

    async fn delete(&self, _checksum: &Sha1Checksum) -> StorageResult<bool> {
        // Routing only; the primary chain and the external store are
        // separate nodes with their own deletes.
        Ok(false)
    }
}
