use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use strata_core::config::{GcConfig, StoreConfig};
use strata_core::{BinaryData, ProviderSpec, Sha1Checksum};
use strata_gc::{GarbageCollectorInfo, GarbageCollectorListener};
use strata_metadata::{BinaryRepo, MemoryStore};
use strata_storage::error::{StorageError, StorageResult};
use strata_storage::traits::{BinaryProvider, ByteStream};
use strata_storage::{BinaryStore, ProviderKind, ProviderRegistry, bytes_stream};
use tempfile::TempDir;
use time::OffsetDateTime;
use uuid::Uuid;

/// A store over a temporary directory with an in-memory index.
#[allow(dead_code)]
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<BinaryStore>,
    pub metadata: Arc<MemoryStore>,
}

#[allow(dead_code)]
impl Harness {
    pub async fn new(template: &str) -> Self {
        Self::open(template, None, ProviderRegistry::builtin()).await
    }

    pub async fn with_chain(chain: ProviderSpec, registry: ProviderRegistry) -> Self {
        Self::open("file-system", Some(chain), registry).await
    }

    async fn open(template: &str, chain: Option<ProviderSpec>, registry: ProviderRegistry) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            base_dir: dir.path().to_path_buf(),
            template: template.to_string(),
            chain,
            ..Default::default()
        };
        let metadata = Arc::new(MemoryStore::new());
        let store = BinaryStore::open(&config, registry, metadata.clone())
            .await
            .unwrap();
        Self {
            dir,
            store: Arc::new(store),
            metadata,
        }
    }

    /// Store `content` and return its checksum.
    pub async fn add(&self, content: &'static str) -> Sha1Checksum {
        let checksum = Sha1Checksum::compute(content.as_bytes());
        self.store
            .add(&checksum, bytes_stream(content), None)
            .await
            .unwrap();
        checksum
    }

    /// Rewrite the index row so the binary looks long unused.
    pub async fn age(&self, checksum: &Sha1Checksum) {
        let mut row = self.metadata.get_binary(checksum).await.unwrap().unwrap();
        row.created_at = OffsetDateTime::UNIX_EPOCH;
        row.last_used_at = OffsetDateTime::UNIX_EPOCH;
        self.metadata.delete_binary(checksum).await.unwrap();
        self.metadata.insert_binary(&row).await.unwrap();
    }

    pub async fn indexed(&self, checksum: &Sha1Checksum) -> bool {
        self.metadata.get_binary(checksum).await.unwrap().is_some()
    }
}

/// GC settings with the given grace period and no throttling.
#[allow(dead_code)]
pub fn gc_config(grace_period_secs: u64) -> GcConfig {
    GcConfig {
        grace_period_secs,
        ..Default::default()
    }
}

/// Remembers every callback it receives.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingListener {
    pub starts: AtomicUsize,
    pub to_delete: Mutex<Vec<Sha1Checksum>>,
    pub finished: Mutex<Vec<GarbageCollectorInfo>>,
    pub listed: AtomicBool,
    pub destroyed: AtomicBool,
}

#[allow(dead_code)]
impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn selected(&self) -> Vec<Sha1Checksum> {
        let mut selected = self.to_delete.lock().unwrap().clone();
        selected.sort();
        selected
    }

    pub fn listed(&self) -> bool {
        self.listed.load(Ordering::SeqCst)
    }
}

impl GarbageCollectorListener for RecordingListener {
    fn start(&self, _run_id: Uuid) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.to_delete.lock().unwrap().clear();
    }

    fn to_delete(&self, binaries: &[BinaryData]) {
        self.to_delete
            .lock()
            .unwrap()
            .extend(binaries.iter().map(|b| b.checksum));
        self.listed.store(true, Ordering::SeqCst);
    }

    fn finished(&self, info: &GarbageCollectorInfo) {
        self.finished.lock().unwrap().push(info.clone());
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Remote provider that is always offline.
#[allow(dead_code)]
pub struct OfflineProvider {
    id: String,
}

#[allow(dead_code)]
impl OfflineProvider {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self { id: id.to_string() })
    }

    fn fail<T>(&self) -> StorageResult<T> {
        Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            format!("{} is offline", self.id),
        )))
    }
}

#[async_trait]
impl BinaryProvider for OfflineProvider {
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
