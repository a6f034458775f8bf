//! Binary store facade.

use crate::chain::{ChainBuilder, DeleteOutcome, ProviderChain};
use crate::error::{StorageError, StorageResult};
use crate::in_flight::{DeleteGuard, InFlightGuard, InFlightSet};
use crate::registry::ProviderRegistry;
use crate::templates::resolve_spec;
use crate::traits::{ByteStream, PruneReport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use strata_core::config::StoreConfig;
use strata_core::{BinaryData, Sha1Checksum};
use strata_metadata::BinaryRepo;
use tracing::instrument;

/// Entry point for reading and writing binaries.
///
/// Every operation goes through the current chain's root. The chain can be
/// swapped at runtime with [`BinaryStore::reload`]; callers that already
/// hold the previous chain finish on it.
pub struct BinaryStore {
    chain: RwLock<Arc<ProviderChain>>,
    binaries: Arc<dyn BinaryRepo>,
    in_flight: InFlightSet,
    closed: AtomicBool,
}

impl BinaryStore {
    /// Wrap an already built chain. The store shares the chain's claims.
    pub fn new(chain: ProviderChain, binaries: Arc<dyn BinaryRepo>) -> Self {
        let in_flight = chain.in_flight().clone();
        Self {
            chain: RwLock::new(Arc::new(chain)),
            binaries,
            in_flight,
            closed: AtomicBool::new(false),
        }
    }

    /// Resolve, build and activate the chain described by `config`.
    pub async fn open(
        config: &StoreConfig,
        registry: ProviderRegistry,
        binaries: Arc<dyn BinaryRepo>,
    ) -> StorageResult<Self> {
        let chain = Self::builder(config, registry, Arc::clone(&binaries), InFlightSet::new())
            .build(&resolve_spec(config)?)
            .await?;
        chain.activate().await?;
        Ok(Self::new(chain, binaries))
    }

    /// Build (but do not activate) a replacement chain for [`BinaryStore::reload`].
    pub async fn build_chain(
        &self,
        config: &StoreConfig,
        registry: ProviderRegistry,
    ) -> StorageResult<ProviderChain> {
        let spec = resolve_spec(config)?;
        Self::builder(config, registry, Arc::clone(&self.binaries), self.in_flight.clone())
            .build(&spec)
            .await
    }

    fn builder(
        config: &StoreConfig,
        registry: ProviderRegistry,
        binaries: Arc<dyn BinaryRepo>,
        in_flight: InFlightSet,
    ) -> ChainBuilder {
        ChainBuilder::new(registry)
            .with_base_dir(&config.base_dir)
            .with_spool_dir(config.spool_dir())
            .with_binary_repo(binaries)
            .with_in_flight(in_flight)
    }

    /// The chain currently serving requests.
    pub fn chain(&self) -> Arc<ProviderChain> {
        let current = self.chain.read().unwrap_or_else(|e| e.into_inner());
        current.clone()
    }

    fn active_chain(&self) -> StorageResult<Arc<ProviderChain>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(self.chain())
    }

    /// The binary index this store records into.
    pub fn binary_repo(&self) -> &Arc<dyn BinaryRepo> {
        &self.binaries
    }

    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    /// Whether an add of this checksum is in progress.
    pub fn is_in_flight(&self, checksum: &Sha1Checksum) -> bool {
        self.in_flight.contains(checksum)
    }

    /// Claim `checksum` for deletion.
    ///
    /// `None` while anything is writing or pinning it. Adds of the checksum
    /// wait until the returned guard drops.
    pub fn begin_delete(&self, checksum: &Sha1Checksum) -> Option<DeleteGuard> {
        self.in_flight.try_begin_delete(*checksum)
    }

    #[instrument(skip(self))]
    pub async fn exists(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        self.active_chain()?.root().exists(checksum).await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, checksum: &Sha1Checksum) -> StorageResult<Option<ByteStream>> {
        self.active_chain()?.root().get(checksum).await
    }

    /// Store a binary and record it in the binary index.
    ///
    /// Adding content that is already stored returns the existing index row.
    pub async fn add(
        &self,
        checksum: &Sha1Checksum,
        stream: ByteStream,
        length: Option<u64>,
    ) -> StorageResult<BinaryData> {
        let (stored, _guard) = self.add_pinned(checksum, stream, length).await?;
        Ok(stored)
    }

    /// Like [`BinaryStore::add`], but the binary stays claimed until the
    /// returned guard drops.
    ///
    /// Hold the guard until whatever references the binary is committed;
    /// the garbage collector leaves claimed checksums alone.
    #[instrument(skip(self, stream))]
    pub async fn add_pinned(
        &self,
        checksum: &Sha1Checksum,
        stream: ByteStream,
        length: Option<u64>,
    ) -> StorageResult<(BinaryData, InFlightGuard)> {
        let chain = self.active_chain()?;
        let guard = self.in_flight.acquire(*checksum).await;
        let data = chain.root().add(checksum, stream, length).await?;
        let stored = self.binaries.insert_binary(&data).await?;
        tracing::debug!(checksum = %checksum, length = stored.length, "binary added");
        Ok((stored, guard))
    }

    /// Delete through the root provider only.
    #[instrument(skip(self))]
    pub async fn delete(&self, checksum: &Sha1Checksum) -> StorageResult<bool> {
        self.active_chain()?.root().delete(checksum).await
    }

    /// Delete from every provider in the chain that keeps a copy.
    #[instrument(skip(self))]
    pub async fn delete_everywhere(&self, checksum: &Sha1Checksum) -> StorageResult<DeleteOutcome> {
        Ok(self.active_chain()?.delete_everywhere(checksum).await)
    }

    /// Activate `chain`, route new requests to it, then close the old one.
    ///
    /// On activation failure the current chain keeps serving.
    pub async fn reload(&self, chain: ProviderChain) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        if !chain.in_flight().shares(&self.in_flight) {
            return Err(StorageError::Config(
                "replacement chain was not built by this store".to_string(),
            ));
        }
        chain.activate().await?;
        let old = {
            let mut current = self.chain.write().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *current, Arc::new(chain))
        };
        tracing::info!(old_root = %old.root().id(), new_root = %self.chain().root().id(), "provider chain reloaded");
        old.close().await;
        Ok(())
    }

    /// Prune every provider.
    pub async fn prune(&self) -> StorageResult<PruneReport> {
        let report = self.active_chain()?.prune().await?;
        tracing::info!(
            temp_files_removed = report.temp_files_removed,
            dirs_removed = report.dirs_removed,
            bytes_freed = report.bytes_freed,
            "prune complete"
        );
        Ok(report)
    }

    pub async fn health_check(&self) -> StorageResult<()> {
        self.active_chain()?.health_check().await
    }

    /// Close the chain. Later operations fail with [`StorageError::Closed`].
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.chain().close().await;
    }
}
