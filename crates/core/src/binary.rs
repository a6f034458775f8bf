//! Stored binary records.

use crate::checksum::Sha1Checksum;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One stored blob, keyed by its checksum.
///
/// Immutable once created: recreating identical content is a no-op, so the
/// record keeps the timestamps of the first write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryData {
    /// SHA-1 of the content.
    pub checksum: Sha1Checksum,
    /// Content length in bytes.
    pub length: u64,
    /// When the binary was first stored.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the binary was last read or re-added.
    #[serde(with = "time::serde::rfc3339")]
    pub last_used_at: OffsetDateTime,
}

impl BinaryData {
    /// Create a record stamped with the current time.
    pub fn new(checksum: Sha1Checksum, length: u64) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            checksum,
            length,
            created_at: now,
            last_used_at: now,
        }
    }

    /// Whether the binary was created or used after `cutoff`.
    ///
    /// Such binaries are excluded from garbage collection even when
    /// unreferenced, since their metadata may not be committed yet.
    pub fn is_within_grace(&self, cutoff: OffsetDateTime) -> bool {
        self.created_at > cutoff || self.last_used_at > cutoff
    }
}
