//! Chain terminator.

use crate::error::{StorageError, StorageResult};
use crate::registry::ProviderKind;
use crate::traits::{BinaryProvider, ByteStream};
use async_trait::async_trait;
use std::sync::Arc;
use strata_core::{BinaryData, Sha1Checksum};

/// Holds nothing: reads miss, deletes report false, adds fail.
pub struct EmptyProvider {
    id: String,
}

impl EmptyProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl BinaryProvider for EmptyProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Empty
    }

    fn next(&self) -> Option<&Arc<dyn BinaryProvider>> {
        None
    }

    async fn exists(&self, _checksum: &Sha1Checksum) -> StorageResult<bool> {
        Ok(false)
    }

    async fn get(&self, _checksum: &Sha1Checksum) -> StorageResult<Option<ByteStream>> {
        Ok(None)
    }

    async fn add(
        &self,
        checksum: &Sha1Checksum,
        _stream: ByteStream,
        _length: Option<u64>,
    ) -> StorageResult<BinaryData> {
        Err(StorageError::NoStorage(format!(
            "chain ended at '{}' before any provider stored {checksum}",
            self.id
        )))
    }

    async fn delete(&self, _checksum: &Sha1Checksum) -> StorageResult<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::bytes_stream;

    #[tokio::test]
    async fn test_everything_misses() {
        let empty = EmptyProvider::new("end");
        let checksum = Sha1Checksum::compute(b"x");
        assert!(!empty.exists(&checksum).await.unwrap());
        assert!(empty.get(&checksum).await.unwrap().is_none());
        assert!(!empty.delete(&checksum).await.unwrap());
        assert!(empty.next().is_none());
        let err = empty.add(&checksum, bytes_stream("x"), None).await.unwrap_err();
        assert!(matches!(err, StorageError::NoStorage(_)));
    }
}
