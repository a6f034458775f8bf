// Behaviour of composed provider chains: fallthrough, retries, redundancy
// and integrity.

mod common;

use common::{FailingProvider, FlakyProvider, builder, filestore, seeded_bytes};
use std::sync::Arc;
use std::time::Duration;
use strata_core::{ProviderSpec, Sha1Checksum};
use strata_storage::providers::{DoubleProvider, RetryProvider};
use strata_storage::{
    BinaryProvider, ProviderKind, ProviderRegistry, StorageError, bytes_stream, collect,
};

async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn test_cache_fallthrough_populates_cache() {
    let temp = tempfile::tempdir().unwrap();
    let spec = ProviderSpec::new("cache", "cache-fs")
        .with_param("dir", "cache")
        .with_next(ProviderSpec::new("fs", "file-system").with_param("dir", "filestore"));
    let chain = builder(temp.path()).build(&spec).await.unwrap();
    chain.activate().await.unwrap();

    let data = seeded_bytes(7, 200 * 1024);
    let checksum = Sha1Checksum::compute(&data);
    let fs = chain.node("fs").unwrap();
    fs.add(&checksum, bytes_stream(data.clone()), None).await.unwrap();

    let body = collect(chain.root().get(&checksum).await.unwrap().unwrap())
        .await
        .unwrap();
    assert_eq!(body, data);

    let cached = temp.path().join("cache").join(checksum.shard_path(1, 2));
    wait_for(|| {
        let cached = cached.clone();
        async move { cached.is_file() }
    })
    .await;

    for node in chain.nodes().iter().filter(|n| n.kind() != ProviderKind::Empty) {
        assert!(node.exists(&checksum).await.unwrap(), "{} lost the blob", node.id());
    }
}

#[tokio::test]
async fn test_retry_succeeds_within_bound() {
    let temp = tempfile::tempdir().unwrap();
    let flaky = FlakyProvider::new(filestore(temp.path(), "fs").await, 3);
    let retry = RetryProvider::new("retry", 3, Duration::ZERO, temp.path().join("spool"), flaky.clone());

    let checksum = Sha1Checksum::compute(b"persistent");
    let data = retry
        .add(&checksum, bytes_stream("persistent"), None)
        .await
        .unwrap();
    assert_eq!(data.length, 10);
    assert_eq!(flaky.attempts(), 4);
}

#[tokio::test]
async fn test_retry_gives_up_after_bound() {
    let temp = tempfile::tempdir().unwrap();
    let flaky = FlakyProvider::new(filestore(temp.path(), "fs").await, 3);
    let retry = RetryProvider::new("retry", 2, Duration::ZERO, temp.path().join("spool"), flaky.clone());

    let checksum = Sha1Checksum::compute(b"persistent");
    let err = retry.exists(&checksum).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(flaky.attempts(), 3);
}

#[tokio::test]
async fn test_double_tolerates_failing_secondary() {
    let temp = tempfile::tempdir().unwrap();
    let primary = filestore(temp.path(), "fs-a").await;
    let secondary = FailingProvider::new("fs-b");
    let double = DoubleProvider::new(
        "double",
        primary.clone(),
        secondary.clone(),
        false,
        temp.path().join("spool"),
        Arc::new(strata_storage::providers::EmptyProvider::new("end")),
    );

    let checksum = Sha1Checksum::compute(b"redundant");
    let data = double
        .add(&checksum, bytes_stream("redundant"), None)
        .await
        .unwrap();
    assert_eq!(data.length, 9);
    assert!(primary.holds(&checksum).await.unwrap());

    let body = collect(double.get(&checksum).await.unwrap().unwrap())
        .await
        .unwrap();
    assert_eq!(&body[..], b"redundant");
    assert!(secondary.calls.load(std::sync::atomic::Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_double_can_require_secondary() {
    let temp = tempfile::tempdir().unwrap();
    let double = DoubleProvider::new(
        "double",
        filestore(temp.path(), "fs-a").await,
        FailingProvider::new("fs-b"),
        true,
        temp.path().join("spool"),
        Arc::new(strata_storage::providers::EmptyProvider::new("end")),
    );

    let checksum = Sha1Checksum::compute(b"strict");
    let err = double
        .add(&checksum, bytes_stream("strict"), None)
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_double_reads_secondary_when_primary_misses() {
    let temp = tempfile::tempdir().unwrap();
    let primary = filestore(temp.path(), "fs-a").await;
    let secondary = filestore(temp.path(), "fs-b").await;
    let checksum = Sha1Checksum::compute(b"only b");
    secondary.add(&checksum, bytes_stream("only b"), None).await.unwrap();

    let double = DoubleProvider::new(
        "double",
        primary,
        secondary,
        false,
        temp.path().join("spool"),
        Arc::new(strata_storage::providers::EmptyProvider::new("end")),
    );
    assert!(double.exists(&checksum).await.unwrap());
    let body = collect(double.get(&checksum).await.unwrap().unwrap())
        .await
        .unwrap();
    assert_eq!(&body[..], b"only b");
}

#[tokio::test]
async fn test_double_exists_survives_failing_primary() {
    let temp = tempfile::tempdir().unwrap();
    let primary = FailingProvider::new("fs-a");
    let secondary = filestore(temp.path(), "fs-b").await;
    let checksum = Sha1Checksum::compute(b"kept on b");
    secondary.add(&checksum, bytes_stream("kept on b"), None).await.unwrap();

    let double = DoubleProvider::new(
        "double",
        primary.clone(),
        secondary,
        false,
        temp.path().join("spool"),
        Arc::new(strata_storage::providers::EmptyProvider::new("end")),
    );
    assert!(double.exists(&checksum).await.unwrap());

    // With no copy anywhere else, the primary's failure is reported.
    let absent = Sha1Checksum::compute(b"nowhere");
    let err = double.exists(&absent).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(primary.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
}

fn templates_without_remote() -> Vec<ProviderSpec> {
    ["file-system", "cache-fs", "double"]
        .into_iter()
        .map(|name| strata_storage::template(name).unwrap())
        .collect()
}

#[tokio::test]
async fn test_add_is_idempotent_for_every_local_template() {
    for spec in templates_without_remote() {
        let temp = tempfile::tempdir().unwrap();
        let chain = builder(temp.path()).build(&spec).await.unwrap();
        let data = seeded_bytes(11, 4096);
        let checksum = Sha1Checksum::compute(&data);

        let first = chain
            .root()
            .add(&checksum, bytes_stream(data.clone()), Some(4096))
            .await
            .unwrap();
        let second = chain
            .root()
            .add(&checksum, bytes_stream(data.clone()), Some(4096))
            .await
            .unwrap();
        assert_eq!(first.checksum, second.checksum);
        assert_eq!(first.length, second.length, "template {}", spec.id);
    }
}

#[tokio::test]
async fn test_mismatch_is_rejected_by_every_local_template() {
    for spec in templates_without_remote() {
        let temp = tempfile::tempdir().unwrap();
        let chain = builder(temp.path()).build(&spec).await.unwrap();
        let checksum = Sha1Checksum::compute(b"declared content");

        let err = chain
            .root()
            .add(&checksum, bytes_stream("smuggled content"), None)
            .await
            .unwrap_err();
        assert!(
            matches!(err, StorageError::ChecksumMismatch { .. }),
            "template {} returned {err}",
            spec.id
        );
        assert!(chain.root().get(&checksum).await.unwrap().is_none());
        assert!(!chain.root().exists(&checksum).await.unwrap());
    }
}

#[tokio::test]
async fn test_delete_everywhere_reports_partial_failure() {
    let temp = tempfile::tempdir().unwrap();
    let mut registry = ProviderRegistry::builtin();
    registry.register(ProviderKind::S3, |ctx| {
        Box::pin(async move {
            let provider: Arc<dyn BinaryProvider> = FailingProvider::new(&ctx.spec.id);
            Ok(provider)
        })
    });
    let spec = ProviderSpec::new("double", "double")
        .with_sub(ProviderSpec::new("local", "file-system").with_param("dir", "local"))
        .with_sub(ProviderSpec::new("remote", "s3").with_param("bucket", "unused"));
    let chain = strata_storage::ChainBuilder::new(registry)
        .with_base_dir(temp.path())
        .with_spool_dir(temp.path().join("spool"))
        .build(&spec)
        .await
        .unwrap();

    let checksum = Sha1Checksum::compute(b"half gone");
    chain
        .root()
        .add(&checksum, bytes_stream("half gone"), None)
        .await
        .unwrap();

    let outcome = chain.delete_everywhere(&checksum).await;
    assert_eq!(outcome.deleted, vec!["local".to_string()]);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].0, "remote");
    assert!(!outcome.fully_deleted());
}

#[tokio::test]
async fn test_eventual_chain_mirrors_to_next() {
    let temp = tempfile::tempdir().unwrap();
    let spec = ProviderSpec::new("eventual", "eventual")
        .with_param("dir", "eventual")
        .with_param("retry_interval_ms", "10")
        .with_next(ProviderSpec::new("fs", "file-system").with_param("dir", "filestore"));
    let chain = builder(temp.path()).build(&spec).await.unwrap();
    chain.activate().await.unwrap();

    let checksum = Sha1Checksum::compute(b"later");
    chain
        .root()
        .add(&checksum, bytes_stream("later"), None)
        .await
        .unwrap();
    assert!(chain.root().exists(&checksum).await.unwrap());

    let fs = Arc::clone(chain.node("fs").unwrap());
    wait_for(|| {
        let fs = Arc::clone(&fs);
        async move { fs.exists(&checksum).await.unwrap() }
    })
    .await;
    chain.close().await;
}

#[tokio::test]
async fn test_external_wrapper_chain_migrates_on_read() {
    let temp = tempfile::tempdir().unwrap();
    let legacy = filestore(temp.path(), "legacy").await;
    let checksum = Sha1Checksum::compute(b"from the old days");
    legacy
        .add(&checksum, bytes_stream("from the old days"), None)
        .await
        .unwrap();

    let spec = ProviderSpec::new("wrapper", "external-wrapper")
        .with_param("mode", "copy")
        .with_sub(
            ProviderSpec::new("legacy", "external-file")
                .with_param("dir", legacy.root().to_string_lossy()),
        )
        .with_next(ProviderSpec::new("fs", "file-system").with_param("dir", "filestore"));
    let chain = builder(temp.path()).build(&spec).await.unwrap();

    let body = collect(chain.root().get(&checksum).await.unwrap().unwrap())
        .await
        .unwrap();
    assert_eq!(&body[..], b"from the old days");
    assert!(chain.node("fs").unwrap().exists(&checksum).await.unwrap());
    // Copy mode keeps the external blob; external-file is not deletable.
    assert!(legacy.holds(&checksum).await.unwrap());
    let outcome = chain.delete_everywhere(&checksum).await;
    assert_eq!(outcome.deleted, vec!["fs".to_string()]);
    assert!(legacy.holds(&checksum).await.unwrap());
}
