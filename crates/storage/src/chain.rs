//! Provider chain construction and ownership.

use crate::error::{StorageError, StorageResult};
use crate::in_flight::InFlightSet;
use crate::providers::EmptyProvider;
use crate::registry::{ProviderContext, ProviderKind, ProviderRegistry};
use crate::traits::{BinaryProvider, PruneReport};
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use strata_core::{ProviderSpec, Sha1Checksum};
use strata_metadata::BinaryRepo;

/// Id of the shared terminator appended to every chain.
pub const TERMINATOR_ID: &str = "end-of-chain";

/// Chain lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Built and wired, not yet health-checked.
    Initialized,
    /// Serving requests.
    Active,
    /// Closed; background work has stopped.
    Closed,
}

/// Diagnostic view of one node.
#[derive(Clone, Debug, Serialize)]
pub struct ProviderDescription {
    pub id: String,
    pub kind: ProviderKind,
    pub next: Option<String>,
    pub subs: Vec<String>,
    pub parent: Option<String>,
}

/// Per-provider result of deleting one checksum across the chain.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DeleteOutcome {
    /// Providers that held and removed the blob.
    pub deleted: Vec<String>,
    /// Providers whose delete failed, with the error.
    pub failed: Vec<(String, String)>,
}

impl DeleteOutcome {
    /// No provider failed.
    pub fn fully_deleted(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A fully wired provider graph.
///
/// Owns every node in build order (leaves first, root last). Providers hold
/// `Arc`s to their `next` and subs; the id maps are diagnostics only.
pub struct ProviderChain {
    root: Arc<dyn BinaryProvider>,
    nodes: Vec<Arc<dyn BinaryProvider>>,
    by_id: HashMap<String, usize>,
    parents: HashMap<String, String>,
    in_flight: InFlightSet,
    state: Mutex<LifecycleState>,
}

impl std::fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderChain")
            .field("root", &self.root.id())
            .field("nodes", &self.nodes.len())
            .field("state", &self.state())
            .finish()
    }
}

impl ProviderChain {
    pub fn root(&self) -> &Arc<dyn BinaryProvider> {
        &self.root
    }

    pub fn node(&self, id: &str) -> Option<&Arc<dyn BinaryProvider>> {
        self.by_id.get(id).map(|&index| &self.nodes[index])
    }

    /// Every node, leaves first.
    pub fn nodes(&self) -> &[Arc<dyn BinaryProvider>] {
        &self.nodes
    }

    /// Claims shared by the providers of this chain.
    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    /// Id of the node whose `next` or sub-provider is `id`.
    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.parents.get(id).map(String::as_str)
    }

    pub fn describe(&self) -> Vec<ProviderDescription> {
        self.nodes
            .iter()
            .rev()
            .map(|node| ProviderDescription {
                id: node.id().to_string(),
                kind: node.kind(),
                next: node.next().map(|next| next.id().to_string()),
                subs: node
                    .sub_providers()
                    .iter()
                    .map(|sub| sub.id().to_string())
                    .collect(),
                parent: self.parent_of(node.id()).map(str::to_string),
            })
            .collect()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: LifecycleState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Health-check every node, leaves first, and mark the chain active.
    pub async fn activate(&self) -> StorageResult<()> {
        if self.state() == LifecycleState::Closed {
            return Err(StorageError::Closed);
        }
        for node in &self.nodes {
            if let Err(e) = node.health_check().await {
                tracing::error!(provider = %node.id(), kind = %node.kind(), error = %e, "provider failed health check");
                return Err(e);
            }
        }
        self.set_state(LifecycleState::Active);
        tracing::info!(root = %self.root.id(), providers = self.nodes.len(), "provider chain active");
        Ok(())
    }

    /// Health-check every node.
    pub async fn health_check(&self) -> StorageResult<()> {
        for node in &self.nodes {
            node.health_check().await?;
        }
        Ok(())
    }

    /// Close every node, root first. Failures are logged.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state == LifecycleState::Closed {
                return;
            }
            *state = LifecycleState::Closed;
        }
        for node in self.nodes.iter().rev() {
            if let Err(e) = node.close().await {
                tracing::warn!(provider = %node.id(), error = %e, "failed to close provider");
            }
        }
        tracing::info!(root = %self.root.id(), "provider chain closed");
    }

    /// Delete a blob from every node that keeps its own copy.
    pub async fn delete_everywhere(&self, checksum: &Sha1Checksum) -> DeleteOutcome {
        let mut outcome = DeleteOutcome::default();
        for node in self.nodes.iter().filter(|n| n.kind().owns_storage()) {
            match node.delete(checksum).await {
                Ok(true) => outcome.deleted.push(node.id().to_string()),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(provider = %node.id(), checksum = %checksum, error = %e, "delete failed");
                    outcome.failed.push((node.id().to_string(), e.to_string()));
                }
            }
        }
        outcome
    }

    /// Prune every node and aggregate the reports.
    pub async fn prune(&self) -> StorageResult<PruneReport> {
        let mut total = PruneReport::default();
        for node in &self.nodes {
            total.merge(&node.prune().await?);
        }
        Ok(total)
    }
}

/// Builds a [`ProviderChain`] from a [`ProviderSpec`] tree.
#[derive(Clone)]
pub struct ChainBuilder {
    registry: ProviderRegistry,
    spool_dir: PathBuf,
    base_dir: PathBuf,
    binary_repo: Option<Arc<dyn BinaryRepo>>,
    in_flight: InFlightSet,
}

struct BuildState {
    terminator: Arc<dyn BinaryProvider>,
    nodes: Vec<Arc<dyn BinaryProvider>>,
    parents: HashMap<String, String>,
}

impl ChainBuilder {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            spool_dir: std::env::temp_dir().join("strata-spool"),
            base_dir: PathBuf::from("."),
            binary_repo: None,
            in_flight: InFlightSet::new(),
        }
    }

    /// Where providers spool incoming streams.
    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = dir.into();
        self
    }

    /// Base for relative directory parameters.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Metadata handle for providers that record usage.
    pub fn with_binary_repo(mut self, repo: Arc<dyn BinaryRepo>) -> Self {
        self.binary_repo = Some(repo);
        self
    }

    /// Claims the built providers register background writes in.
    pub fn with_in_flight(mut self, in_flight: InFlightSet) -> Self {
        self.in_flight = in_flight;
        self
    }

    /// Validate the whole tree, then construct it leaves first.
    ///
    /// Nothing is constructed when validation fails.
    pub async fn build(&self, spec: &ProviderSpec) -> StorageResult<ProviderChain> {
        self.validate(spec)?;

        let terminator: Arc<dyn BinaryProvider> = Arc::new(EmptyProvider::new(TERMINATOR_ID));
        let mut state = BuildState {
            terminator: Arc::clone(&terminator),
            nodes: vec![terminator],
            parents: HashMap::new(),
        };
        let root = self.build_node(spec, &mut state).await?;

        let by_id = state
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.id().to_string(), index))
            .collect();

        tracing::info!(
            root = %root.id(),
            providers = state.nodes.len(),
            "built provider chain"
        );
        Ok(ProviderChain {
            root,
            nodes: state.nodes,
            by_id,
            parents: state.parents,
            in_flight: self.in_flight.clone(),
            state: Mutex::new(LifecycleState::Initialized),
        })
    }

    fn validate(&self, spec: &ProviderSpec) -> StorageResult<()> {
        spec.validate()?;
        for node in spec.walk() {
            if node.id == TERMINATOR_ID {
                return Err(StorageError::Config(format!(
                    "provider id '{TERMINATOR_ID}' is reserved"
                )));
            }
            let kind: ProviderKind = node.kind.parse()?;
            if !self.registry.contains(kind) {
                return Err(StorageError::Config(format!(
                    "no factory registered for provider type '{kind}'"
                )));
            }
            if node.subs.len() != kind.expected_subs() {
                return Err(StorageError::Config(format!(
                    "provider '{}' of type '{kind}' takes {} sub-providers, got {}",
                    node.id,
                    kind.expected_subs(),
                    node.subs.len()
                )));
            }
            if kind == ProviderKind::Empty && node.next.is_some() {
                return Err(StorageError::Config(format!(
                    "empty provider '{}' cannot have a next provider",
                    node.id
                )));
            }
        }
        Ok(())
    }

    fn build_node<'a>(
        &'a self,
        spec: &'a ProviderSpec,
        state: &'a mut BuildState,
    ) -> BoxFuture<'a, StorageResult<Arc<dyn BinaryProvider>>> {
        Box::pin(async move {
            let kind: ProviderKind = spec.kind.parse()?;

            let next = match &spec.next {
                Some(next_spec) => {
                    let next = self.build_node(next_spec, state).await?;
                    state.parents.insert(next_spec.id.clone(), spec.id.clone());
                    Some(next)
                }
                None if kind == ProviderKind::Empty => None,
                None => Some(Arc::clone(&state.terminator)),
            };

            let mut subs = Vec::with_capacity(spec.subs.len());
            for sub_spec in &spec.subs {
                subs.push(self.build_node(sub_spec, state).await?);
                state.parents.insert(sub_spec.id.clone(), spec.id.clone());
            }

            let ctx = ProviderContext {
                spec: ProviderSpec {
                    next: None,
                    subs: Vec::new(),
                    ..spec.clone()
                },
                next,
                subs,
                spool_dir: self.spool_dir.clone(),
                base_dir: self.base_dir.clone(),
                binary_repo: self.binary_repo.clone(),
                in_flight: self.in_flight.clone(),
            };
            let provider = self.registry.create(kind, ctx).await.map_err(|e| {
                tracing::error!(provider = %spec.id, kind = %kind, error = %e, "failed to build provider");
                e
            })?;
            tracing::debug!(provider = %spec.id, kind = %kind, "built provider");
            state.nodes.push(Arc::clone(&provider));
            Ok(provider)
        })
    }
}
