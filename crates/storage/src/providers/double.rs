//! Redundant writes to two independent providers.

use crate::error::{StorageError, StorageResult};
use crate::registry::{ProviderContext, ProviderKind};
use crate::spool::Spool;
use crate::traits::{BinaryProvider, ByteStream};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use strata_core::{BinaryData, Sha1Checksum};
use tracing::instrument;

/// Writes every blob to a primary and a secondary sub-provider.
///
/// `add` succeeds when the primary succeeds. A secondary failure is logged
/// unless `require_secondary` is set, in which case it fails the add.
/// Reads prefer the primary, then the secondary, then `next`.
pub struct DoubleProvider {
    id: String,
    subs: [Arc<dyn BinaryProvider>; 2],
    require_secondary: bool,
    spool_dir: PathBuf,
    next: Arc<dyn BinaryProvider>,
}

impl DoubleProvider {
    pub fn new(
        id: impl Into<String>,
        primary: Arc<dyn BinaryProvider>,
        secondary: Arc<dyn BinaryProvider>,
        require_secondary: bool,
        spool_dir: impl Into<PathBuf>,
        next: Arc<dyn BinaryProvider>,
    ) -> Self {
        Self {
            id: id.into(),
            subs: [primary, secondary],
            require_secondary,
            spool_dir: spool_dir.into(),
            next,
        }
    }

    pub(crate) fn from_context(ctx: ProviderContext) -> StorageResult<Self> {
        let require_secondary = ctx.spec.bool_param("require_secondary", false)?;
        let spool_dir = ctx.spool_dir();
        let next = ctx.next()?;
        let [primary, secondary]: [Arc<dyn BinaryProvider>; 2] =
            ctx.subs.try_into().map_err(|subs: Vec<_>| {
                StorageError::Config(format!(
                    "double provider '{}' needs exactly 2 sub-providers, got {}",
                    ctx.spec.id,
                    subs.len()
                ))
            })?;
        Ok(Self::new(
            ctx.spec.id,
            primary,
            secondary,
            require_secondary,
            spool_dir,
            next,
        ))
    }

    fn primary(&self) -> &Arc<dyn BinaryProvider> {
        &self.subs[0]
    }

    fn secondary(&self) -> &Arc<dyn BinaryProvider> {
        &self.subs[1]
    }
}

#[async_trait]
impl BinaryProvider for DoubleProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Double
    }

    fn next(&self) -> Option<&Arc<dyn BinaryProvider>> {
        Some(&self.next)
    }

    fn sub_providers(&self) -> &[Arc<dyn BinaryProvider>] {
        &self.subs
    }

    #[instrument(skip(self), fields(provider = "double"))]
    async fn exists(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        let primary_error = match self.primary().exists(checksum).await {
            Ok(true) => return Ok(true),
            Ok(false) => None,
            Err(e) => {
                tracing::warn!(provider = %self.id, checksum = %checksum, error = %e, "primary exists check failed, trying secondary");
                Some(e)
            }
        };
        match self.secondary().exists(checksum).await {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(provider = %self.id, checksum = %checksum, error = %e, "secondary exists check failed");
            }
        }
        if self.next.exists(checksum).await? {
            return Ok(true);
        }
        // Only the failed primary could still hold it.
        match primary_error {
            Some(e) => Err(e),
            None => Ok(false),
        }
    }

    #[instrument(skip(self), fields(provider = "double"))]
    async fn get(&self, checksum: &Sha1Checksum) -> StorageResult<Option<ByteStream>> {
        match self.primary().get(checksum).await {
            Ok(Some(stream)) => return Ok(Some(stream)),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(provider = %self.id, checksum = %checksum, error = %e, "primary read failed, trying secondary");
            }
        }
        if let Some(stream) = self.secondary().get(checksum).await? {
            return Ok(Some(stream));
        }
        self.next.get(checksum).await
    }

    #[instrument(skip(self, stream), fields(provider = "double"))]
    async fn add(
        &self,
        checksum: &Sha1Checksum,
        stream: ByteStream,
        length: Option<u64>,
    ) -> StorageResult<BinaryData> {
        let spool = Spool::capture(&self.spool_dir, checksum, stream, length).await?;
        let primary_stream = spool.stream().await?;
        let secondary_stream = spool.stream().await?;

        let (primary, secondary) = tokio::join!(
            self.primary().add(checksum, primary_stream, Some(spool.length())),
            self.secondary().add(checksum, secondary_stream, Some(spool.length())),
        );

        let data = primary?;
        if let Err(e) = secondary {
            if self.require_secondary {
                return Err(e);
            }
            tracing::warn!(
                provider = %self.id,
                secondary = %self.secondary().id(),
                checksum = %checksum,
                error = %e,
                "secondary write failed; binary stored on primary only"
            );
        }
        Ok(data)
    }

    #[instrument(skip(self), fields(provider = "double"))]
    async fn delete(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        let (primary, secondary) = tokio::join!(
            self.primary().delete(checksum),
            self.secondary().delete(checksum),
        );
        Ok(primary? | secondary?)
    }
}
