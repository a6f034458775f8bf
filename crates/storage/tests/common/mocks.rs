use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use strata_core::{BinaryData, Sha1Checksum};
use strata_storage::error::{StorageError, StorageResult};
use strata_storage::traits::{BinaryProvider, ByteStream};
use strata_storage::ProviderKind;

fn offline(id: &str) -> StorageError {
    StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        format!("{id} is offline"),
    ))
}

/// Provider whose every operation fails with a transient I/O error.
///
/// Reports itself as an S3 provider so the chain treats it as holding its
/// own copy of blobs.
#[allow(dead_code)]
pub struct FailingProvider {
    id: String,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl FailingProvider {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    fn fail<T>(&self) -> StorageResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(offline(&self.id))
    }
}

#[async_trait]
impl BinaryProvider for FailingProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::S3
    }

    fn next(&self) -> Option<&Arc<dyn BinaryProvider>> {
        None
    }

    async fn exists(&self, _checksum: &Sha1Checksum) -> StorageResult<bool> {
        self.fail()
    }

    async fn get(&self, _checksum: &Sha1Checksum) -> StorageResult<Option<ByteStream>> {
        self.fail()
    }

    async fn add(
        &self,
        _checksum: &Sha1Checksum,
        _stream: ByteStream,
        _length: Option<u64>,
    ) -> StorageResult<BinaryData> {
        self.fail()
    }

    async fn delete(&self, _checksum: &Sha1Checksum) -> StorageResult<bool> {
        self.fail()
    }
}

/// Fails the first `failures` calls with a transient error, then delegates
/// to `inner`. Counts every call.
#[allow(dead_code)]
pub struct FlakyProvider {
    inner: Arc<dyn BinaryProvider>,
    failures: usize,
    attempts: AtomicUsize,
}

#[allow(dead_code)]
impl FlakyProvider {
    pub fn new(inner: Arc<dyn BinaryProvider>, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failures,
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn attempt(&self) -> StorageResult<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(offline("flaky"));
        }
        Ok(())
    }
}

#[async_trait]
impl BinaryProvider for FlakyProvider {
    fn id(&self) -> &str {
        "flaky"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Retry
    }

    fn next(&self) -> Option<&Arc<dyn BinaryProvider>> {
        Some(&self.inner)
    }

    async fn exists(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        self.attempt()?;
        self.inner.exists(checksum).await
    }

    async fn get(&self, checksum: &Sha1Checksum) -> StorageResult<Option<ByteStream>> {
        self.attempt()?;
        self.inner.get(checksum).await
    }

    async fn add(
        &self,
        checksum: &Sha1Checksum,
        stream: ByteStream,
        length: Option<u64>,
    ) -> StorageResult<BinaryData> {
        self.attempt()?;
        self.inner.add(checksum, stream, length).await
    }

    async fn delete(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        self.attempt()?;
        self.inner.delete(checksum).await
    }
}
