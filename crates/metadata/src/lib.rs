//! Metadata store abstraction and implementations for strata.
//!
//! The binary store talks to its metadata layer through two narrow contracts:
//! - the binary index ([`BinaryRepo`]): every blob the store believes it holds
//! - artifact references ([`ArtifactRepo`]): which checksums live artifacts point at
//!
//! The garbage collector diffs the two to find unreferenced binaries.

pub mod error;
pub mod memory;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use memory::MemoryStore;
pub use models::Artifact;
pub use repos::{ArtifactRepo, BinaryRepo};
pub use store::{MetadataStore, SqliteStore};

use std::sync::Arc;
use strata_core::config::MetadataConfig;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
        MetadataConfig::Memory => {
            tracing::warn!("using in-memory metadata store; references are lost on restart");
            Ok(Arc::new(MemoryStore::new()) as Arc<dyn MetadataStore>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_sqlite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("metadata.db");
        let config = MetadataConfig::Sqlite {
            path: db_path.clone(),
        };

        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_from_config_memory() {
        let store = from_config(&MetadataConfig::Memory).await.unwrap();
        store.health_check().await.unwrap();
        assert!(store.list_binaries().await.unwrap().is_empty());
    }
}
