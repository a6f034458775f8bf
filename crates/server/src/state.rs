//! Application state shared across handlers.

use crate::metrics::MetricsListener;
use std::sync::Arc;
use strata_core::config::AppConfig;
use strata_gc::{GarbageCollector, LoggingListener};
use strata_metadata::{ArtifactRepo, BinaryRepo, MetadataStore};
use strata_storage::{BinaryStore, ProviderRegistry, StorageResult};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Binary store over the configured provider chain.
    pub store: Arc<BinaryStore>,
    /// Binary index and artifact references.
    pub metadata: Arc<dyn MetadataStore>,
    /// Garbage collector, shared with the scheduler.
    pub gc: Arc<GarbageCollector>,
}

impl AppState {
    /// Wire the collector to the store and metadata.
    pub fn new(config: AppConfig, store: Arc<BinaryStore>, metadata: Arc<dyn MetadataStore>) -> Self {
        let artifacts: Arc<dyn ArtifactRepo> = metadata.clone();
        let gc = Arc::new(GarbageCollector::new(
            Arc::clone(&store),
            artifacts,
            config.gc.clone(),
        ));
        gc.add_listener(Arc::new(LoggingListener));
        gc.add_listener(Arc::new(MetricsListener));

        Self {
            config: Arc::new(config),
            store,
            metadata,
            gc,
        }
    }

    /// Open the configured chain over `metadata` and build the state.
    pub async fn open(config: AppConfig, metadata: Arc<dyn MetadataStore>) -> StorageResult<Self> {
        let binaries: Arc<dyn BinaryRepo> = metadata.clone();
        let store = BinaryStore::open(&config.store, ProviderRegistry::builtin(), binaries).await?;
        Ok(Self::new(config, Arc::new(store), metadata))
    }

    /// Stop GC and close the chain.
    pub async fn shutdown(&self) {
        self.gc.destroy();
        self.store.close().await;
    }
}
