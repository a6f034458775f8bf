//! Garbage collector error types.

use strata_metadata::MetadataError;
use strata_storage::StorageError;
use thiserror::Error;

/// Errors that abort a collection run.
#[derive(Debug, Error)]
pub enum GcError {
    /// Enumerating the referenced or candidate set failed.
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// The binary store refused the run (for example, it is closed).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for garbage collector operations.
pub type GcResult<T> = std::result::Result<T, GcError>;
