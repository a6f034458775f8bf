//! S3-compatible remote tier using the AWS SDK.

use crate::error::{StorageError, StorageResult};
use crate::registry::{ProviderContext, ProviderKind};
use crate::spool::Spool;
use crate::traits::{BinaryProvider, ByteStream};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use bytes::Bytes;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use strata_core::{BinaryData, Sha1Checksum};
use tokio_util::io::ReaderStream;
use tracing::instrument;

const DEFAULT_REGION: &str = "us-east-1";
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const HEALTH_CHECK_KEY: &str = ".strata-health-check";

fn is_not_found<E>(err: &SdkError<E>) -> bool {
    matches!(err, SdkError::ServiceError(service_err) if service_err.raw().status().as_u16() == 404)
}

fn remote_error<E>(err: SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageError::Remote(Box::new(err))
}

/// Prefix bare `host:port` endpoints (e.g. `minio:9000`) with `http://`.
fn normalize_endpoint(endpoint: &str) -> String {
    let lower = endpoint.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

/// Object key of a blob: `<prefix>/<shard>/<checksum>`.
fn object_key(prefix: Option<&str>, checksum: &Sha1Checksum) -> String {
    let hex = checksum.to_hex();
    match prefix {
        Some(prefix) => format!("{prefix}/{}/{hex}", &hex[..2]),
        None => format!("{}/{hex}", &hex[..2]),
    }
}

/// Connection settings for [`S3Provider`].
#[derive(Clone, Default)]
pub struct S3Settings {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub prefix: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Path-style URLs (`endpoint/bucket/key`), needed by MinIO and most
    /// S3-compatible services.
    pub force_path_style: bool,
}

impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("prefix", &self.prefix)
            .field("force_path_style", &self.force_path_style)
            .finish_non_exhaustive()
    }
}

/// Stores blobs as objects in an S3 bucket.
///
/// Reads that miss fall through to `next`. Uploads are spooled and verified
/// locally before anything is sent.
pub struct S3Provider {
    id: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    spool_dir: PathBuf,
    next: Arc<dyn BinaryProvider>,
}

impl std::fmt::Debug for S3Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Provider")
            .field("id", &self.id)
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl S3Provider {
    pub async fn new(
        id: impl Into<String>,
        settings: S3Settings,
        spool_dir: impl Into<PathBuf>,
        next: Arc<dyn BinaryProvider>,
    ) -> StorageResult<Self> {
        if settings.bucket.is_empty() {
            return Err(StorageError::Config("s3 bucket must not be empty".to_string()));
        }
        if settings.access_key_id.is_some() ^ settings.secret_access_key.is_some() {
            return Err(StorageError::Config(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ));
        }

        let region = aws_config::Region::new(
            settings
                .region
                .clone()
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        );
        let mut builder = match (settings.access_key_id, settings.secret_access_key) {
            (Some(key_id), Some(secret)) => {
                let credentials =
                    aws_sdk_s3::config::Credentials::new(key_id, secret, None, None, "strata-config");
                aws_sdk_s3::config::Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(region)
                    .credentials_provider(credentials)
            }
            _ => {
                // Ambient credentials: environment, profile, instance metadata.
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
        };

        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(normalize_endpoint(endpoint));
        }
        if settings.force_path_style {
            builder = builder.force_path_style(true);
        }

        // Avoid double-slash keys like "prefix//ab/...".
        let prefix = settings
            .prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());

        Ok(Self {
            id: id.into(),
            client: Client::from_conf(builder.build()),
            bucket: settings.bucket,
            prefix,
            spool_dir: spool_dir.into(),
            next,
        })
    }

    pub(crate) async fn from_context(ctx: ProviderContext) -> StorageResult<Self> {
        let param = |key: &str| ctx.spec.param(key).map(str::to_string);
        let settings = S3Settings {
            bucket: ctx.spec.required_param("bucket")?.to_string(),
            endpoint: param("endpoint"),
            region: param("region"),
            prefix: param("prefix"),
            access_key_id: param("access_key_id"),
            secret_access_key: param("secret_access_key"),
            force_path_style: ctx.spec.bool_param("force_path_style", false)?,
        };
        let spool_dir = ctx.spool_dir();
        let next = ctx.next()?;
        Self::new(ctx.spec.id, settings, spool_dir, next).await
    }

    fn key(&self, checksum: &Sha1Checksum) -> String {
        object_key(self.prefix.as_deref(), checksum)
    }

    async fn head(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(err) => Err(remote_error(err)),
        }
    }
}

#[async_trait]
impl BinaryProvider for S3Provider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::S3
    }

    fn next(&self) -> Option<&Arc<dyn BinaryProvider>> {
        Some(&self.next)
    }

    #[instrument(skip(self), fields(provider = "s3"))]
    async fn exists(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        if self.head(&self.key(checksum)).await? {
            return Ok(true);
        }
        self.next.exists(checksum).await
    }

    #[instrument(skip(self), fields(provider = "s3"))]
    async fn get(&self, checksum: &Sha1Checksum) -> StorageResult<Option<ByteStream>> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key(checksum))
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) if is_not_found(&err) => return self.next.get(checksum).await,
            Err(err) => return Err(remote_error(err)),
        };

        let stream = ReaderStream::new(output.body.into_async_read())
            .map(|chunk| chunk.map_err(StorageError::Io));
        Ok(Some(Box::pin(stream)))
    }

    #[instrument(skip(self, stream), fields(provider = "s3"))]
    async fn add(
        &self,
        checksum: &Sha1Checksum,
        stream: ByteStream,
        length: Option<u64>,
    ) -> StorageResult<BinaryData> {
        let spool = Spool::capture(&self.spool_dir, checksum, stream, length).await?;
        let key = self.key(checksum);
        if self.head(&key).await? {
            tracing::debug!(provider = %self.id, checksum = %checksum, "object already present");
            return Ok(spool.binary_data());
        }

        let body = aws_sdk_s3::primitives::ByteStream::from_path(spool.path())
            .await
            .map_err(|e| StorageError::Remote(Box::new(e)))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_length(spool.length() as i64)
            .body(body)
            .send()
            .await
            .map_err(remote_error)?;

        tracing::debug!(provider = %self.id, checksum = %checksum, key = %key, length = spool.length(), "uploaded object");
        Ok(spool.binary_data())
    }

    #[instrument(skip(self), fields(provider = "s3"))]
    async fn delete(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        let key = self.key(checksum);
        // DeleteObject succeeds for missing keys; HEAD first to report presence.
        if !self.head(&key).await? {
            return Ok(false);
        }
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(err) => Err(remote_error(err)),
        }
    }

    async fn health_check(&self) -> StorageResult<()> {
        let marker_key = match &self.prefix {
            Some(prefix) => format!("{prefix}/{HEALTH_CHECK_KEY}"),
            None => HEALTH_CHECK_KEY.to_string(),
        };

        let check = async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&marker_key)
                .body(Bytes::from_static(b"health-check").into())
                .send()
                .await
                .map_err(remote_error)?;
            match self
                .client
                .delete_object()
                .bucket(&self.bucket)
                .key(&marker_key)
                .send()
                .await
            {
                Ok(_) => Ok(()),
                Err(err) if is_not_found(&err) => Ok(()),
                Err(err) => Err(remote_error(err)),
            }
        };

        tokio::time::timeout(HEALTH_CHECK_TIMEOUT, check)
            .await
            .map_err(|_| {
                StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("s3 health check timed out after {HEALTH_CHECK_TIMEOUT:?}"),
                ))
            })?
    }
}
