//! Verified temp-file copies of incoming streams.
//!
//! Providers that write one incoming stream to more than one sink (or may
//! need to replay it) capture it into a spool first.

use crate::error::StorageResult;
use crate::stream::{file_stream, temp_file_name, write_verified};
use crate::traits::ByteStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_core::{BinaryData, Sha1Checksum};
use tokio::fs;

/// A verified blob held in a temp file. The file is removed on drop.
#[derive(Debug)]
pub struct Spool {
    path: PathBuf,
    checksum: Sha1Checksum,
    length: u64,
}

impl Spool {
    /// Drain `stream` into a new temp file under `dir`, verifying checksum
    /// and declared length. Nothing is left on disk when verification fails.
    pub async fn capture(
        dir: &Path,
        checksum: &Sha1Checksum,
        stream: ByteStream,
        declared: Option<u64>,
    ) -> StorageResult<Arc<Spool>> {
        fs::create_dir_all(dir).await?;
        let path = dir.join(format!("spool-{}{}", checksum.to_hex(), temp_file_name()));
        let mut file = fs::File::create(&path).await?;

        match write_verified(stream, &mut file, checksum, declared).await {
            Ok(length) => Ok(Arc::new(Spool {
                path,
                checksum: *checksum,
                length,
            })),
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&path).await;
                Err(e)
            }
        }
    }

    /// Verified checksum.
    pub fn checksum(&self) -> &Sha1Checksum {
        &self.checksum
    }

    /// Verified length in bytes.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Path of the spooled file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A fresh record for this content.
    pub fn binary_data(&self) -> BinaryData {
        BinaryData::new(self.checksum, self.length)
    }

    /// Re-read the spooled content. The spool stays alive while the stream does.
    pub async fn stream(self: &Arc<Self>) -> StorageResult<ByteStream> {
        let file = fs::File::open(&self.path).await?;
        Ok(file_stream(file, Arc::clone(self)))
    }
}

impl Drop for Spool {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove spool file");
        }
    }
}
