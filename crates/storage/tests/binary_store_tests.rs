// BinaryStore facade: indexing, in-flight tracking, reload and prune.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_core::config::StoreConfig;
use strata_core::{ProviderSpec, Sha1Checksum};
use strata_metadata::{BinaryRepo, MemoryStore};
use strata_storage::{
    BinaryStore, ByteStream, LifecycleState, ProviderRegistry, StorageError, bytes_stream, collect,
};
use time::OffsetDateTime;

fn config(dir: &std::path::Path, template: &str) -> StoreConfig {
    StoreConfig {
        base_dir: dir.to_path_buf(),
        template: template.to_string(),
        ..Default::default()
    }
}

async fn open(config: &StoreConfig) -> (BinaryStore, Arc<MemoryStore>) {
    let repo = Arc::new(MemoryStore::new());
    let store = BinaryStore::open(config, ProviderRegistry::builtin(), repo.clone())
        .await
        .unwrap();
    (store, repo)
}

#[tokio::test]
async fn test_add_is_in_flight_until_complete() {
    let temp = tempfile::tempdir().unwrap();
    let (store, _repo) = open(&config(temp.path(), "file-system")).await;
    let store = Arc::new(store);

    let checksum = Sha1Checksum::compute(b"slow upload");
    let (release, wait) = tokio::sync::oneshot::channel::<()>();
    let stream: ByteStream = Box::pin(futures::stream::once(async move {
        let _ = wait.await;
        Ok(Bytes::from_static(b"slow upload"))
    }));

    let uploader = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.add(&checksum, stream, None).await })
    };

    for _ in 0..100 {
        if store.is_in_flight(&checksum) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert!(store.is_in_flight(&checksum));

    release.send(()).unwrap();
    uploader.await.unwrap().unwrap();
    assert!(!store.is_in_flight(&checksum));
    assert!(store.exists(&checksum).await.unwrap());
}

#[tokio::test]
async fn test_reload_switches_chain() {
    let temp = tempfile::tempdir().unwrap();
    let (store, _repo) = open(&config(temp.path(), "file-system")).await;
    let checksum = Sha1Checksum::compute(b"before reload");
    store
        .add(&checksum, bytes_stream("before reload"), None)
        .await
        .unwrap();
    let old_chain = store.chain();

    let mut next_config = config(temp.path(), "file-system");
    next_config.chain = Some(
        ProviderSpec::new("fresh", "file-system").with_param("dir", "fresh-filestore"),
    );
    let new_chain = store
        .build_chain(&next_config, ProviderRegistry::builtin())
        .await
        .unwrap();
    store.reload(new_chain).await.unwrap();

    assert_eq!(store.chain().root().id(), "fresh");
    assert_eq!(old_chain.state(), LifecycleState::Closed);
    assert_eq!(store.chain().state(), LifecycleState::Active);
    assert!(!store.exists(&checksum).await.unwrap());
}

#[tokio::test]
async fn test_reload_rejects_foreign_chain() {
    let temp = tempfile::tempdir().unwrap();
    let (store, _repo) = open(&config(temp.path(), "file-system")).await;
    let (other, _other_repo) = open(&config(temp.path(), "file-system")).await;

    let foreign = other
        .build_chain(&config(temp.path(), "file-system"), ProviderRegistry::builtin())
        .await
        .unwrap();
    let err = store.reload(foreign).await.unwrap_err();
    assert!(matches!(err, StorageError::Config(_)));
    assert_eq!(store.chain().state(), LifecycleState::Active);
}

#[tokio::test]
async fn test_pinned_add_blocks_deletion_until_released() {
    let temp = tempfile::tempdir().unwrap();
    let (store, _repo) = open(&config(temp.path(), "file-system")).await;
    let checksum = Sha1Checksum::compute(b"pinned");

    let (row, guard) = store
        .add_pinned(&checksum, bytes_stream("pinned"), None)
        .await
        .unwrap();
    assert_eq!(row.length, 6);
    assert!(store.is_in_flight(&checksum));
    assert!(store.begin_delete(&checksum).is_none());

    drop(guard);
    assert!(!store.is_in_flight(&checksum));
    let deleting = store.begin_delete(&checksum).unwrap();
    assert!(store.in_flight().is_deleting(&checksum));
    drop(deleting);
    assert!(store.in_flight().is_empty());
}

#[tokio::test]
async fn test_add_waits_while_deleting() {
    let temp = tempfile::tempdir().unwrap();
    let (store, repo) = open(&config(temp.path(), "file-system")).await;
    let store = Arc::new(store);
    let checksum = Sha1Checksum::compute(b"comes back");
    store
        .add(&checksum, bytes_stream("comes back"), None)
        .await
        .unwrap();

    let deleting = store.begin_delete(&checksum).unwrap();
    let uploader = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.add(&checksum, bytes_stream("comes back"), None).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(!uploader.is_finished());

    // Deletion completes while the add is parked.
    assert!(store.delete_everywhere(&checksum).await.unwrap().fully_deleted());
    repo.delete_binary(&checksum).await.unwrap();
    drop(deleting);

    uploader.await.unwrap().unwrap();
    assert!(store.exists(&checksum).await.unwrap());
    assert!(repo.get_binary(&checksum).await.unwrap().is_some());
}

#[tokio::test]
async fn test_tracking_template_records_usage() {
    let temp = tempfile::tempdir().unwrap();
    let mut config = config(temp.path(), "tracking");
    config.overrides.insert(
        "tracking".to_string(),
        BTreeMap::from([("touch_interval_secs".to_string(), "0".to_string())]),
    );
    let (store, repo) = open(&config).await;

    let checksum = Sha1Checksum::compute(b"popular");
    let mut row = store
        .add(&checksum, bytes_stream("popular"), None)
        .await
        .unwrap();
    row.last_used_at = OffsetDateTime::UNIX_EPOCH;
    repo.insert_binary(&row).await.unwrap();

    let body = collect(store.get(&checksum).await.unwrap().unwrap())
        .await
        .unwrap();
    assert_eq!(&body[..], b"popular");
    let touched = repo.get_binary(&checksum).await.unwrap().unwrap();
    assert!(touched.last_used_at > OffsetDateTime::UNIX_EPOCH);
}

#[tokio::test]
async fn test_prune_aggregates_across_chain() {
    let temp = tempfile::tempdir().unwrap();
    let (store, _repo) = open(&config(temp.path(), "double")).await;
    for dir in ["filestore1", "filestore2"] {
        std::fs::write(temp.path().join(dir).join("_pre").join("stale.tmp"), b"xx").unwrap();
    }

    // Stale temps younger than the prune age stay.
    let report = store.prune().await.unwrap();
    assert_eq!(report.temp_files_removed, 0);

    let mut config = config(temp.path(), "double");
    for id in ["shard-fs-1", "shard-fs-2"] {
        config.overrides.insert(
            id.to_string(),
            BTreeMap::from([("prune_age_secs".to_string(), "0".to_string())]),
        );
    }
    let chain = store
        .build_chain(&config, ProviderRegistry::builtin())
        .await
        .unwrap();
    store.reload(chain).await.unwrap();
    let report = store.prune().await.unwrap();
    assert_eq!(report.temp_files_removed, 2);
    assert_eq!(report.bytes_freed, 4);
}

#[tokio::test]
async fn test_eventual_template_requires_bucket() {
    let temp = tempfile::tempdir().unwrap();
    let err = BinaryStore::open(
        &config(temp.path(), "eventual-s3"),
        ProviderRegistry::builtin(),
        Arc::new(MemoryStore::new()),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, StorageError::Config(msg) if msg.contains("bucket")));
}
