//! Process-local metadata store.

use crate::error::MetadataResult;
use crate::models::Artifact;
use crate::repos::{ArtifactRepo, BinaryRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use strata_core::{BinaryData, Sha1Checksum};
use time::OffsetDateTime;

/// In-memory metadata store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    binaries: DashMap<Sha1Checksum, BinaryData>,
    artifacts: DashMap<String, Artifact>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn migrate(&self) -> MetadataResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        Ok(())
    }
}

#[async_trait]
impl BinaryRepo for MemoryStore {
    async fn insert_binary(&self, binary: &BinaryData) -> MetadataResult<BinaryData> {
        let stored = self
            .binaries
            .entry(binary.checksum)
            .and_modify(|existing| existing.last_used_at = binary.last_used_at)
            .or_insert_with(|| binary.clone());
        Ok(stored.clone())
    }

    async fn get_binary(&self, checksum: &Sha1Checksum) -> MetadataResult<Option<BinaryData>> {
        Ok(self.binaries.get(checksum).map(|b| b.clone()))
    }

    async fn list_binaries(&self) -> MetadataResult<Vec<BinaryData>> {
        let mut all: Vec<BinaryData> = self.binaries.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|b| b.checksum);
        Ok(all)
    }

    async fn delete_binary(&self, checksum: &Sha1Checksum) -> MetadataResult<bool> {
        Ok(self.binaries.remove(checksum).is_some())
    }

    async fn touch_binary(
        &self,
        checksum: &Sha1Checksum,
        used_at: OffsetDateTime,
    ) -> MetadataResult<()> {
        if let Some(mut binary) = self.binaries.get_mut(checksum)
            && binary.last_used_at < used_at
        {
            binary.last_used_at = used_at;
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactRepo for MemoryStore {
    async fn put_artifact(&self, path: &str, checksum: &Sha1Checksum) -> MetadataResult<Artifact> {
        let now = OffsetDateTime::now_utc();
        let stored = self
            .artifacts
            .entry(path.to_string())
            .and_modify(|a| {
                a.checksum = *checksum;
                a.updated_at = now;
            })
            .or_insert_with(|| Artifact {
                path: path.to_string(),
                checksum: *checksum,
                created_at: now,
                updated_at: now,
            });
        Ok(stored.clone())
    }

    async fn get_artifact(&self, path: &str) -> MetadataResult<Option<Artifact>> {
        Ok(self.artifacts.get(path).map(|a| a.clone()))
    }

    async fn delete_artifact(&self, path: &str) -> MetadataResult<bool> {
        Ok(self.artifacts.remove(path).is_some())
    }

    async fn referenced_checksums(&self) -> MetadataResult<HashSet<Sha1Checksum>> {
        Ok(self.artifacts.iter().map(|a| a.checksum).collect())
    }

    async fn is_referenced(&self, checksum: &Sha1Checksum) -> MetadataResult<bool> {
        Ok(self.artifacts.iter().any(|a| a.checksum == *checksum))
    }
}
