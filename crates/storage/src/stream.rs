//! Byte stream helpers shared by the providers.

use crate::error::{StorageError, StorageResult};
use crate::traits::ByteStream;
use bytes::Bytes;
use futures::StreamExt;
use std::path::Path;
use strata_core::Sha1Checksum;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

/// Default chunk size for streaming reads (64 KiB).
pub(crate) const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// A stream yielding `data` as a single chunk.
pub fn bytes_stream(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// Drain a stream into memory.
pub async fn collect(mut stream: ByteStream) -> StorageResult<Bytes> {
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(Bytes::from(buf))
}

/// Unique temp file name (`.tmp.<uuid>`).
pub(crate) fn temp_file_name() -> String {
    format!(".tmp.{}", Uuid::new_v4())
}

/// Stream an open file in chunks.
///
/// `keep_alive` is held until the stream is dropped, for callers whose file
/// must outlive the handle that produced it.
pub(crate) fn file_stream<K>(file: fs::File, keep_alive: K) -> ByteStream
where
    K: Send + Sync + 'static,
{
    let stream = async_stream::try_stream! {
        let _keep_alive = keep_alive;
        let mut file = file;
        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            yield Bytes::copy_from_slice(&buf[..n]);
        }
    };
    Box::pin(stream)
}

/// Open a file for streaming, mapping a missing file to `None`.
pub(crate) async fn open_file_stream(path: &Path) -> StorageResult<Option<ByteStream>> {
    match fs::File::open(path).await {
        Ok(file) => Ok(Some(file_stream(file, ()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::Io(e)),
    }
}

/// Copy a stream into `file`, hashing as it goes, then fsync.
///
/// Fails with `ChecksumMismatch` or `LengthMismatch` when the content does
/// not match; the caller owns cleanup of the file.
pub(crate) async fn write_verified(
    mut stream: ByteStream,
    file: &mut fs::File,
    expected: &Sha1Checksum,
    declared: Option<u64>,
) -> StorageResult<u64> {
    let mut hasher = Sha1Checksum::hasher();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        written += chunk.len() as u64;
        if let Some(declared) = declared
            && written > declared
        {
            return Err(StorageError::LengthMismatch {
                declared,
                actual: written,
            });
        }
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;

    if let Some(declared) = declared
        && written != declared
    {
        return Err(StorageError::LengthMismatch {
            declared,
            actual: written,
        });
    }

    let actual = hasher.finalize();
    if actual != *expected {
        return Err(StorageError::ChecksumMismatch {
            expected: expected.to_hex(),
            actual: actual.to_hex(),
        });
    }
    Ok(written)
}
