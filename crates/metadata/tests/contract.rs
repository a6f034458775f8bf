//! Behaviour shared by every metadata store implementation.

use std::sync::Arc;
use strata_core::{BinaryData, Sha1Checksum};
use strata_metadata::{MemoryStore, MetadataStore, SqliteStore};

async fn stores() -> (tempfile::TempDir, Vec<Arc<dyn MetadataStore>>) {
    let dir = tempfile::tempdir().unwrap();
    let sqlite = SqliteStore::new(dir.path().join("metadata.db")).await.unwrap();
    let stores: Vec<Arc<dyn MetadataStore>> = vec![Arc::new(sqlite), Arc::new(MemoryStore::new())];
    (dir, stores)
}

#[tokio::test]
async fn test_binary_index_lifecycle() {
    let (_dir, stores) = stores().await;
    for store in stores {
        let c1 = Sha1Checksum::compute(b"one");
        let c2 = Sha1Checksum::compute(b"two");

        store.insert_binary(&BinaryData::new(c1, 3)).await.unwrap();
        store.insert_binary(&BinaryData::new(c2, 3)).await.unwrap();
        store.insert_binary(&BinaryData::new(c1, 3)).await.unwrap();

        let listed: Vec<_> = store
            .list_binaries()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.checksum)
            .collect();
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&c1) && listed.contains(&c2));

        assert!(store.delete_binary(&c1).await.unwrap());
        assert!(!store.delete_binary(&c1).await.unwrap());
        assert!(store.get_binary(&c1).await.unwrap().is_none());
        assert_eq!(store.get_binary(&c2).await.unwrap().unwrap().length, 3);
    }
}

#[tokio::test]
async fn test_artifact_references() {
    let (_dir, stores) = stores().await;
    for store in stores {
        let c1 = Sha1Checksum::compute(b"lib-1.0.jar");
        let c2 = Sha1Checksum::compute(b"lib-1.1.jar");

        store.put_artifact("org/lib/1.0/lib.jar", &c1).await.unwrap();
        store.put_artifact("mirror/lib.jar", &c1).await.unwrap();
        store.put_artifact("org/lib/1.1/lib.jar", &c2).await.unwrap();

        let referenced = store.referenced_checksums().await.unwrap();
        assert_eq!(referenced.len(), 2);

        // Repointing keeps creation time and moves the reference.
        let before = store.get_artifact("mirror/lib.jar").await.unwrap().unwrap();
        let after = store.put_artifact("mirror/lib.jar", &c2).await.unwrap();
        assert_eq!(after.checksum, c2);
        assert_eq!(after.created_at, before.created_at);

        assert!(store.is_referenced(&c1).await.unwrap());
        assert!(store.delete_artifact("org/lib/1.0/lib.jar").await.unwrap());
        assert!(!store.is_referenced(&c1).await.unwrap());
        assert!(!store.delete_artifact("org/lib/1.0/lib.jar").await.unwrap());
        assert!(store.get_artifact("org/lib/1.0/lib.jar").await.unwrap().is_none());
    }
}
