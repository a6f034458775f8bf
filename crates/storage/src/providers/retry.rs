//! Bounded retry around the next provider.

use crate::error::StorageResult;
use crate::registry::{ProviderContext, ProviderKind};
use crate::spool::Spool;
use crate::traits::{BinaryProvider, ByteStream};
use async_trait::async_trait;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use strata_core::{BinaryData, Sha1Checksum};
use tracing::instrument;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_INTERVAL_MS: u64 = 250;

/// Retries transient failures of the wrapped provider.
///
/// An operation is attempted at most `max_retries + 1` times. Errors that are
/// not transient (checksum mismatch, configuration) are returned at once.
pub struct RetryProvider {
    id: String,
    max_retries: u32,
    interval: Duration,
    spool_dir: PathBuf,
    next: Arc<dyn BinaryProvider>,
}

impl RetryProvider {
    pub fn new(
        id: impl Into<String>,
        max_retries: u32,
        interval: Duration,
        spool_dir: impl Into<PathBuf>,
        next: Arc<dyn BinaryProvider>,
    ) -> Self {
        Self {
            id: id.into(),
            max_retries,
            interval,
            spool_dir: spool_dir.into(),
            next,
        }
    }

    pub(crate) fn from_context(ctx: ProviderContext) -> StorageResult<Self> {
        let max_retries = ctx.spec.parse_param("max_retries", DEFAULT_MAX_RETRIES)?;
        let interval_ms = ctx.spec.parse_param("interval_ms", DEFAULT_INTERVAL_MS)?;
        let spool_dir = ctx.spool_dir();
        let next = ctx.next()?;
        Ok(Self::new(
            ctx.spec.id,
            max_retries,
            Duration::from_millis(interval_ms),
            spool_dir,
            next,
        ))
    }

    async fn with_retries<T, F, Fut>(&self, op: &'static str, mut f: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(provider = %self.id, op, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt <= self.max_retries => {
                    tracing::warn!(
                        provider = %self.id,
                        op,
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "transient failure, retrying"
                    );
                    if !self.interval.is_zero() {
                        tokio::time::sleep(self.interval).await;
                    }
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::error!(
                            provider = %self.id,
                            op,
                            attempts = attempt,
                            error = %e,
                            "retries exhausted"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl BinaryProvider for RetryProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Retry
    }

    fn next(&self) -> Option<&Arc<dyn BinaryProvider>> {
        Some(&self.next)
    }

    #[instrument(skip(self), fields(provider = "retry"))]
    async fn exists(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        self.with_retries("exists", || self.next.exists(checksum))
            .await
    }

    #[instrument(skip(self), fields(provider = "retry"))]
    async fn get(&self, checksum: &Sha1Checksum) -> StorageResult<Option<ByteStream>> {
        self.with_retries("get", || self.next.get(checksum)).await
    }

    #[instrument(skip(self, stream), fields(provider = "retry"))]
    async fn add(
        &self,
        checksum: &Sha1Checksum,
        stream: ByteStream,
        length: Option<u64>,
    ) -> StorageResult<BinaryData> {
        // The incoming stream can be consumed once; spool so attempts can replay it.
        let spool = Spool::capture(&self.spool_dir, checksum, stream, length).await?;
        self.with_retries("add", || {
            let spool = Arc::clone(&spool);
            let next = Arc::clone(&self.next);
            async move {
                let replay = spool.stream().await?;
                next.add(spool.checksum(), replay, Some(spool.length())).await
            }
        })
        .await
    }

    #[instrument(skip(self), fields(provider = "retry"))]
    async fn delete(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        self.with_retries("delete", || self.next.delete(checksum))
            .await
    }
}
