//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use sqlx::FromRow;
use strata_core::{BinaryData, Sha1Checksum};
use time::OffsetDateTime;

// =============================================================================
// Binaries
// =============================================================================

/// Binary index record. One row per checksum the store believes it holds.
#[derive(Debug, Clone, FromRow)]
pub struct BinaryRow {
    pub checksum: String,
    pub length: i64,
    pub created_at: OffsetDateTime,
    pub last_used_at: OffsetDateTime,
}

impl TryFrom<BinaryRow> for BinaryData {
    type Error = MetadataError;

    fn try_from(row: BinaryRow) -> MetadataResult<Self> {
        let checksum = parse_checksum(&row.checksum)?;
        let length = u64::try_from(row.length).map_err(|_| {
            MetadataError::Corrupt(format!(
                "binary {} has negative length {}",
                row.checksum, row.length
            ))
        })?;
        Ok(BinaryData {
            checksum,
            length,
            created_at: row.created_at,
            last_used_at: row.last_used_at,
        })
    }
}

// =============================================================================
// Artifacts
// =============================================================================

/// Artifact reference record: a logical path pointing at one checksum.
#[derive(Debug, Clone, FromRow)]
pub struct ArtifactRow {
    pub path: String,
    pub checksum: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A live artifact and the binary it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: String,
    pub checksum: Sha1Checksum,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<ArtifactRow> for Artifact {
    type Error = MetadataError;

    fn try_from(row: ArtifactRow) -> MetadataResult<Self> {
        Ok(Artifact {
            checksum: parse_checksum(&row.checksum)?,
            path: row.path,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) fn parse_checksum(raw: &str) -> MetadataResult<Sha1Checksum> {
    Sha1Checksum::from_hex(raw)
        .map_err(|e| MetadataError::Corrupt(format!("stored checksum '{raw}': {e}")))
}
