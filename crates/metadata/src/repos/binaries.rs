//! Binary index repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use strata_core::{BinaryData, Sha1Checksum};
use time::OffsetDateTime;

/// Repository for the binary index (the garbage collector's candidate set).
#[async_trait]
pub trait BinaryRepo: Send + Sync {
    /// Record a binary. Idempotent: when the checksum is already indexed the
    /// original row is kept, its `last_used_at` refreshed, and returned.
    async fn insert_binary(&self, binary: &BinaryData) -> MetadataResult<BinaryData>;

    /// Get a binary by checksum.
    async fn get_binary(&self, checksum: &Sha1Checksum) -> MetadataResult<Option<BinaryData>>;

    /// Enumerate every indexed binary.
    async fn list_binaries(&self) -> MetadataResult<Vec<BinaryData>>;

    /// Remove a binary row. Returns false if it was not indexed.
    async fn delete_binary(&self, checksum: &Sha1Checksum) -> MetadataResult<bool>;

    /// Advance `last_used_at` (never moves it backwards).
    async fn touch_binary(
        &self,
        checksum: &Sha1Checksum,
        used_at: OffsetDateTime,
    ) -> MetadataResult<()>;
}
