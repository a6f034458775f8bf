//! Storage error types.

use strata_metadata::MetadataError;
use thiserror::Error;

/// Storage operation errors.
///
/// A missing binary is never an error: lookups return `Option` or `bool`.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("length mismatch: declared {declared} bytes, received {actual}")]
    LengthMismatch { declared: u64, actual: u64 },

    #[error("invalid checksum: {0}")]
    InvalidChecksum(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote storage error: {0}")]
    Remote(Box<dyn std::error::Error + Send + Sync>),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// The chain has no provider able to persist the binary.
    #[error("no storage: {0}")]
    NoStorage(String),

    #[error("binary store is closed")]
    Closed,
}

impl StorageError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Io(_) | StorageError::Remote(_))
    }
}

impl From<strata_core::Error> for StorageError {
    fn from(err: strata_core::Error) -> Self {
        match err {
            strata_core::Error::InvalidChecksum(msg) => StorageError::InvalidChecksum(msg),
            strata_core::Error::ChecksumMismatch { expected, actual } => {
                StorageError::ChecksumMismatch { expected, actual }
            }
            strata_core::Error::Config(msg) => StorageError::Config(msg),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
