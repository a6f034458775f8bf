//! Artifact reference repository.

use crate::error::MetadataResult;
use crate::models::Artifact;
use async_trait::async_trait;
use std::collections::HashSet;
use strata_core::Sha1Checksum;

/// Repository for artifact records (the garbage collector's referenced set).
#[async_trait]
pub trait ArtifactRepo: Send + Sync {
    /// Create or repoint an artifact path.
    async fn put_artifact(&self, path: &str, checksum: &Sha1Checksum) -> MetadataResult<Artifact>;

    /// Get an artifact by path.
    async fn get_artifact(&self, path: &str) -> MetadataResult<Option<Artifact>>;

    /// Delete an artifact. Returns false if the path was unknown.
    async fn delete_artifact(&self, path: &str) -> MetadataResult<bool>;

    /// Every checksum referenced by at least one artifact.
    async fn referenced_checksums(&self) -> MetadataResult<HashSet<Sha1Checksum>>;

    /// Whether any artifact references the checksum.
    async fn is_referenced(&self, checksum: &Sha1Checksum) -> MetadataResult<bool>;
}
