//! Binary provider contract.

use crate::error::StorageResult;
use crate::registry::ProviderKind;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use strata_core::{BinaryData, Sha1Checksum};

/// A boxed stream of bytes for streaming reads and writes.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// One link of a provider chain.
///
/// Every provider except the Empty terminator has a `next` provider. Reads a
/// provider cannot satisfy are delegated down the chain; `delete` only ever
/// touches storage the provider owns (or wraps), never `next`.
#[async_trait]
pub trait BinaryProvider: Send + Sync + 'static {
    /// Unique id within the chain.
    fn id(&self) -> &str;

    /// Provider type.
    fn kind(&self) -> ProviderKind;

    /// Next provider in the primary chain. `None` only for the terminator.
    fn next(&self) -> Option<&Arc<dyn BinaryProvider>>;

    /// Independent sub-providers, in order.
    fn sub_providers(&self) -> &[Arc<dyn BinaryProvider>] {
        &[]
    }

    /// Whether this provider or anything downstream holds the blob.
    async fn exists(&self, checksum: &Sha1Checksum) -> StorageResult<bool>;

    /// Open the blob for streaming, or `None` when the chain does not hold it.
    async fn get(&self, checksum: &Sha1Checksum) -> StorageResult<Option<ByteStream>>;

    /// Persist a blob. The content is verified against `checksum` (and
    /// `length` when declared); adding content already held is a no-op.
    async fn add(
        &self,
        checksum: &Sha1Checksum,
        stream: ByteStream,
        length: Option<u64>,
    ) -> StorageResult<BinaryData>;

    /// Remove the blob from this provider. Returns false if it was not held.
    async fn delete(&self, checksum: &Sha1Checksum) -> StorageResult<bool>;

    /// Clean up leftovers such as abandoned temp files.
    async fn prune(&self) -> StorageResult<PruneReport> {
        Ok(PruneReport::default())
    }

    /// Verify the provider is usable.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Release background resources.
    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Outcome of a prune pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Abandoned temp files removed.
    pub temp_files_removed: u64,
    /// Empty shard directories removed.
    pub dirs_removed: u64,
    /// Bytes freed by removing temp files.
    pub bytes_freed: u64,
}

impl PruneReport {
    /// Fold another report into this one.
    pub fn merge(&mut self, other: &PruneReport) {
        self.temp_files_removed += other.temp_files_removed;
        self.dirs_removed += other.dirs_removed;
        self.bytes_freed += other.bytes_freed;
    }
}
