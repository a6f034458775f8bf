//! Sharded on-disk blob directory shared by the filesystem-like providers.

use crate::error::{StorageError, StorageResult};
use crate::stream::{open_file_stream, temp_file_name, write_verified};
use crate::traits::{ByteStream, PruneReport};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use strata_core::Sha1Checksum;
use tokio::fs;

/// Name of the temp directory inside a store root.
pub(crate) const PRE_DIR: &str = "_pre";

/// Outcome of writing a blob into a [`LocalStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Stored {
    /// The blob was written.
    Created(u64),
    /// An identical blob was already in place.
    Existing(u64),
}

impl Stored {
    pub(crate) fn length(self) -> u64 {
        match self {
            Stored::Created(len) | Stored::Existing(len) => len,
        }
    }
}

/// Content-addressed files under `root/<shard>/<checksum>`.
///
/// Writes land in `root/_pre` and are renamed into place once verified, so
/// readers never see partial files.
#[derive(Clone, Debug)]
pub(crate) struct LocalStore {
    root: PathBuf,
    pre_dir: PathBuf,
    shard_levels: usize,
    shard_width: usize,
}

impl LocalStore {
    /// Open a store, creating the root and temp directories.
    pub(crate) async fn create(
        root: impl AsRef<Path>,
        shard_levels: usize,
        shard_width: usize,
    ) -> StorageResult<Self> {
        let store = Self::open(root, shard_levels, shard_width)?;
        fs::create_dir_all(&store.pre_dir).await?;
        Ok(store)
    }

    /// Open a store without touching the filesystem (read-only use).
    pub(crate) fn open(
        root: impl AsRef<Path>,
        shard_levels: usize,
        shard_width: usize,
    ) -> StorageResult<Self> {
        let prefix_len = shard_levels.checked_mul(shard_width);
        if shard_width == 0 || prefix_len.is_none_or(|len| len > strata_core::CHECKSUM_HEX_LEN) {
            return Err(StorageError::Config(format!(
                "invalid shard layout: {shard_levels} levels of width {shard_width}"
            )));
        }
        let root = root.as_ref().to_path_buf();
        Ok(Self {
            pre_dir: root.join(PRE_DIR),
            root,
            shard_levels,
            shard_width,
        })
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    /// Final path of a blob.
    pub(crate) fn path_for(&self, checksum: &Sha1Checksum) -> PathBuf {
        self.root
            .join(checksum.shard_path(self.shard_levels, self.shard_width))
    }

    /// Size of the stored blob, if present.
    pub(crate) async fn size_of(&self, checksum: &Sha1Checksum) -> StorageResult<Option<u64>> {
        match fs::metadata(self.path_for(checksum)).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    pub(crate) async fn contains(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        Ok(self.size_of(checksum).await?.is_some())
    }

    pub(crate) async fn open_stream(
        &self,
        checksum: &Sha1Checksum,
    ) -> StorageResult<Option<ByteStream>> {
        open_file_stream(&self.path_for(checksum)).await
    }

    /// Write and verify a blob, then move it into place.
    ///
    /// Concurrent writers of the same checksum are safe: each writes its own
    /// temp file and the content is identical by construction.
    pub(crate) async fn write(
        &self,
        checksum: &Sha1Checksum,
        stream: ByteStream,
        declared: Option<u64>,
    ) -> StorageResult<Stored> {
        fs::create_dir_all(&self.pre_dir).await?;
        let temp_path = self
            .pre_dir
            .join(format!("{}{}", checksum.to_hex(), temp_file_name()));

        let result = async {
            let mut file = fs::File::create(&temp_path).await?;
            let length = write_verified(stream, &mut file, checksum, declared).await?;
            drop(file);

            let final_path = self.path_for(checksum);
            if fs::try_exists(&final_path).await? {
                fs::remove_file(&temp_path).await?;
                return Ok(Stored::Existing(length));
            }
            if let Some(parent) = final_path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::rename(&temp_path, &final_path).await?;
            Ok::<_, StorageError>(Stored::Created(length))
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&temp_path).await;
        }
        result
    }

    /// Remove a blob. Returns false if it was not present.
    pub(crate) async fn remove(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        match fs::remove_file(self.path_for(checksum)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Every stored blob with its size and modification time.
    ///
    /// Files whose name is not a checksum are ignored, as is the temp dir.
    pub(crate) async fn list(&self) -> StorageResult<Vec<(Sha1Checksum, u64, SystemTime)>> {
        let mut results = Vec::new();
        if !fs::try_exists(&self.root).await? {
            return Ok(results);
        }

        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                // file_type() does not follow symlinks
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    if path != self.pre_dir {
                        stack.push(path);
                    }
                } else if file_type.is_file()
                    && let Some(name) = path.file_name().and_then(|n| n.to_str())
                    && let Ok(checksum) = Sha1Checksum::from_hex(name)
                {
                    let meta = entry.metadata().await?;
                    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                    results.push((checksum, meta.len(), modified));
                }
            }
        }
        Ok(results)
    }

    /// Remove temp files older than `max_age` and empty shard directories.
    pub(crate) async fn prune(&self, max_age: Duration) -> StorageResult<PruneReport> {
        let mut report = PruneReport::default();
        let now = SystemTime::now();

        if fs::try_exists(&self.pre_dir).await? {
            let mut entries = fs::read_dir(&self.pre_dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let meta = entry.metadata().await?;
                if !meta.is_file() {
                    continue;
                }
                let age = meta
                    .modified()
                    .ok()
                    .and_then(|m| now.duration_since(m).ok())
                    .unwrap_or_default();
                if age >= max_age {
                    match fs::remove_file(entry.path()).await {
                        Ok(()) => {
                            report.temp_files_removed += 1;
                            report.bytes_freed += meta.len();
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(StorageError::Io(e)),
                    }
                }
            }
        }

        report.dirs_removed = self.remove_empty_shards().await?;
        Ok(report)
    }

    /// Remove empty shard directories, deepest first.
    async fn remove_empty_shards(&self) -> StorageResult<u64> {
        let mut dirs = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::Io(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() && path != self.pre_dir {
                    dirs.push(path.clone());
                    stack.push(path);
                }
            }
        }

        // Children were pushed after their parents.
        let mut removed = 0;
        for dir in dirs.iter().rev() {
            if fs::remove_dir(dir).await.is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Verify the root is a usable directory.
    pub(crate) async fn health_check(&self) -> StorageResult<()> {
        let meta = fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(StorageError::Config(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }
}
