mod common;

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use common::seeded_bytes;
use std::sync::Arc;
use strata_core::Sha1Checksum;
use strata_storage::providers::{EmptyProvider, S3Provider, S3Settings};
use strata_storage::{BinaryProvider, StorageError, bytes_stream, collect};
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::{ContainerAsync, GenericImage, ImageExt, runners::AsyncRunner};

const MINIO_IMAGE: &str = "minio/minio";
const MINIO_TAG: &str = "RELEASE.2024-02-12T21-36-45Z";
const BUCKET: &str = "strata-test";

fn should_skip_s3_tests() -> bool {
    std::env::var("SKIP_S3_TESTS").is_ok()
}

struct MinioContext {
    _container: ContainerAsync<GenericImage>,
    endpoint: String,
    access_key: String,
    secret_key: String,
}

impl MinioContext {
    async fn new() -> Result<Self, String> {
        let access_key = "minio-access-key".to_string();
        let secret_key = "minio-secret-key".to_string();

        let container: ContainerAsync<GenericImage> = GenericImage::new(MINIO_IMAGE, MINIO_TAG)
            .with_exposed_port(9000.tcp())
            .with_wait_for(WaitFor::message_on_stdout("API:"))
            .with_env_var("MINIO_ROOT_USER", access_key.clone())
            .with_env_var("MINIO_ROOT_PASSWORD", secret_key.clone())
            .with_cmd(vec!["server", "/data"])
            .start()
            .await
            .map_err(|e| format!("failed to start MinIO container: {e}"))?;

        let host = container
            .get_host()
            .await
            .map_err(|e| format!("failed to get host: {e}"))?;
        let port = container
            .get_host_port_ipv4(9000.tcp())
            .await
            .map_err(|e| format!("failed to get port: {e}"))?;

        Ok(Self {
            _container: container,
            endpoint: format!("http://{host}:{port}"),
            access_key,
            secret_key,
        })
    }

    async fn create_bucket(&self) -> Result<(), String> {
        let credentials = Credentials::new(
            self.access_key.clone(),
            self.secret_key.clone(),
            None,
            None,
            "test",
        );
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new("us-east-1"))
            .credentials_provider(credentials)
            .endpoint_url(self.endpoint.clone())
            .force_path_style(true)
            .build();

        Client::from_conf(config)
            .create_bucket()
            .bucket(BUCKET)
            .send()
            .await
            .map_err(|e| format!("failed to create bucket: {e}"))?;
        Ok(())
    }
}

struct S3TestHarness {
    _context: MinioContext,
    _spool: tempfile::TempDir,
    provider: S3Provider,
}

impl S3TestHarness {
    async fn new(prefix: Option<String>) -> Result<Self, String> {
        let context = MinioContext::new().await?;
        context.create_bucket().await?;
        let spool = tempfile::tempdir().map_err(|e| e.to_string())?;

        let settings = S3Settings {
            bucket: BUCKET.to_string(),
            endpoint: Some(context.endpoint.clone()),
            region: Some("us-east-1".to_string()),
            prefix,
            access_key_id: Some(context.access_key.clone()),
            secret_access_key: Some(context.secret_key.clone()),
            force_path_style: true,
        };
        let provider = S3Provider::new(
            "s3",
            settings,
            spool.path(),
            Arc::new(EmptyProvider::new("end")),
        )
        .await
        .map_err(|e| format!("failed to create S3 provider: {e}"))?;

        Ok(Self {
            _context: context,
            _spool: spool,
            provider,
        })
    }
}

#[tokio::test]
async fn test_s3_add_get_delete() {
    if should_skip_s3_tests() {
        return;
    }

    let harness = match S3TestHarness::new(Some("blobs/".to_string())).await {
        Ok(harness) => harness,
        Err(err) => {
            eprintln!("Skipping S3 test: {err}");
            return;
        }
    };
    let s3 = &harness.provider;
    s3.health_check().await.unwrap();

    let data = seeded_bytes(3, 300 * 1024);
    let checksum = Sha1Checksum::compute(&data);
    assert!(!s3.exists(&checksum).await.unwrap());
    assert!(s3.get(&checksum).await.unwrap().is_none());

    let stored = s3
        .add(&checksum, bytes_stream(data.clone()), Some(data.len() as u64))
        .await
        .unwrap();
    assert_eq!(stored.length, data.len() as u64);
    // Second add finds the object and uploads nothing.
    s3.add(&checksum, bytes_stream(data.clone()), None)
        .await
        .unwrap();

    assert!(s3.exists(&checksum).await.unwrap());
    let body = collect(s3.get(&checksum).await.unwrap().unwrap())
        .await
        .unwrap();
    assert_eq!(body, data);

    assert!(s3.delete(&checksum).await.unwrap());
    assert!(!s3.delete(&checksum).await.unwrap());
    assert!(!s3.exists(&checksum).await.unwrap());
}

#[tokio::test]
async fn test_s3_rejects_mismatch_before_upload() {
    if should_skip_s3_tests() {
        return;
    }

    let harness = match S3TestHarness::new(None).await {
        Ok(harness) => harness,
        Err(err) => {
            eprintln!("Skipping S3 test: {err}");
            return;
        }
    };
    let s3 = &harness.provider;

    let checksum = Sha1Checksum::compute(b"what was promised");
    let err = s3
        .add(&checksum, bytes_stream("what was sent"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ChecksumMismatch { .. }));
    assert!(!s3.exists(&checksum).await.unwrap());
}
