//! Provider kinds and the factory table used by the chain builder.

use crate::error::{StorageError, StorageResult};
use crate::in_flight::InFlightSet;
use crate::providers::{
    CacheFsProvider, DoubleProvider, EmptyProvider, EventualProvider, ExternalFileProvider,
    ExternalWrapperProvider, FileSystemProvider, RetryProvider, S3Provider, TrackingProvider,
};
use crate::traits::BinaryProvider;
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use strata_core::ProviderSpec;
use strata_metadata::BinaryRepo;

/// Every provider type the builder knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    FileSystem,
    CacheFs,
    Retry,
    Double,
    Eventual,
    ExternalFile,
    ExternalWrapper,
    Empty,
    Tracking,
    S3,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 10] = [
        ProviderKind::FileSystem,
        ProviderKind::CacheFs,
        ProviderKind::Retry,
        ProviderKind::Double,
        ProviderKind::Eventual,
        ProviderKind::ExternalFile,
        ProviderKind::ExternalWrapper,
        ProviderKind::Empty,
        ProviderKind::Tracking,
        ProviderKind::S3,
    ];

    /// Configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::FileSystem => "file-system",
            ProviderKind::CacheFs => "cache-fs",
            ProviderKind::Retry => "retry",
            ProviderKind::Double => "double",
            ProviderKind::Eventual => "eventual",
            ProviderKind::ExternalFile => "external-file",
            ProviderKind::ExternalWrapper => "external-wrapper",
            ProviderKind::Empty => "empty",
            ProviderKind::Tracking => "tracking",
            ProviderKind::S3 => "s3",
        }
    }

    /// Number of sub-providers this kind requires.
    pub fn expected_subs(&self) -> usize {
        match self {
            ProviderKind::Double => 2,
            ProviderKind::ExternalWrapper => 1,
            _ => 0,
        }
    }

    /// Whether the provider keeps its own copy of blobs (as opposed to
    /// routing to other providers).
    pub fn owns_storage(&self) -> bool {
        matches!(
            self,
            ProviderKind::FileSystem
                | ProviderKind::CacheFs
                | ProviderKind::Eventual
                | ProviderKind::ExternalFile
                | ProviderKind::S3
        )
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = StorageError;

    fn from_str(s: &str) -> StorageResult<Self> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| StorageError::Config(format!("unknown provider type '{s}'")))
    }
}

/// Everything a factory needs to construct one provider.
///
/// `next` and `subs` are already built: the chain is assembled leaves first.
pub struct ProviderContext {
    pub spec: ProviderSpec,
    pub next: Option<Arc<dyn BinaryProvider>>,
    pub subs: Vec<Arc<dyn BinaryProvider>>,
    pub spool_dir: PathBuf,
    pub base_dir: PathBuf,
    pub binary_repo: Option<Arc<dyn BinaryRepo>>,
    pub in_flight: InFlightSet,
}

impl ProviderContext {
    /// The wired next provider.
    pub fn next(&self) -> StorageResult<Arc<dyn BinaryProvider>> {
        self.next.clone().ok_or_else(|| {
            StorageError::Config(format!("provider '{}' has no next provider", self.spec.id))
        })
    }

    /// A required directory parameter, resolved against the base directory.
    pub fn dir_param(&self, key: &str) -> StorageResult<PathBuf> {
        let raw = self.spec.required_param(key)?;
        Ok(resolve_path(&self.base_dir, raw))
    }

    /// Spool directory private to this provider.
    pub fn spool_dir(&self) -> PathBuf {
        self.spool_dir.join(&self.spec.id)
    }
}

fn resolve_path(base: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn boxed<P: BinaryProvider>(provider: P) -> Arc<dyn BinaryProvider> {
    Arc::new(provider)
}

/// Constructs a provider from its context.
pub type ProviderFactory =
    fn(ProviderContext) -> BoxFuture<'static, StorageResult<Arc<dyn BinaryProvider>>>;

/// Maps provider kinds to factories.
#[derive(Clone)]
pub struct ProviderRegistry {
    factories: HashMap<ProviderKind, ProviderFactory>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with every built-in provider.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(ProviderKind::FileSystem, |ctx| {
            Box::pin(async move { FileSystemProvider::from_context(ctx).await.map(boxed) })
        });
        registry.register(ProviderKind::CacheFs, |ctx| {
            Box::pin(async move { CacheFsProvider::from_context(ctx).await.map(boxed) })
        });
        registry.register(ProviderKind::Retry, |ctx| {
            Box::pin(async move { RetryProvider::from_context(ctx).map(boxed) })
        });
        registry.register(ProviderKind::Double, |ctx| {
            Box::pin(async move { DoubleProvider::from_context(ctx).map(boxed) })
        });
        registry.register(ProviderKind::Eventual, |ctx| {
            Box::pin(async move { EventualProvider::from_context(ctx).await.map(boxed) })
        });
        registry.register(ProviderKind::ExternalFile, |ctx| {
            Box::pin(async move { ExternalFileProvider::from_context(ctx).map(boxed) })
        });
        registry.register(ProviderKind::ExternalWrapper, |ctx| {
            Box::pin(async move { ExternalWrapperProvider::from_context(ctx).map(boxed) })
        });
        registry.register(ProviderKind::Empty, |ctx| {
            Box::pin(async move { Ok::<_, StorageError>(boxed(EmptyProvider::new(ctx.spec.id))) })
        });
        registry.register(ProviderKind::Tracking, |ctx| {
            Box::pin(async move { TrackingProvider::from_context(ctx).map(boxed) })
        });
        registry.register(ProviderKind::S3, |ctx| {
            Box::pin(async move { S3Provider::from_context(ctx).await.map(boxed) })
        });
        registry
    }

    /// Register (or replace) the factory for a kind.
    pub fn register(&mut self, kind: ProviderKind, factory: ProviderFactory) {
        self.factories.insert(kind, factory);
    }

    pub fn contains(&self, kind: ProviderKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Construct a provider.
    pub async fn create(
        &self,
        kind: ProviderKind,
        ctx: ProviderContext,
    ) -> StorageResult<Arc<dyn BinaryProvider>> {
        let factory = self.factories.get(&kind).ok_or_else(|| {
            StorageError::Config(format!("no factory registered for provider type '{kind}'"))
        })?;
        factory(ctx).await
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_is_config_error() {
        let err = "ftp".parse::<ProviderKind>().unwrap_err();
        assert!(matches!(err, StorageError::Config(msg) if msg.contains("'ftp'")));
    }

    #[test]
    fn test_builtin_registers_every_kind() {
        let registry = ProviderRegistry::builtin();
        for kind in ProviderKind::ALL {
            assert!(registry.contains(kind), "missing factory for {kind}");
        }
    }

    #[test]
    fn test_kind_serializes_as_config_name() {
        assert_eq!(
            serde_json::to_string(&ProviderKind::ExternalWrapper).unwrap(),
            "\"external-wrapper\""
        );
        assert_eq!(serde_json::to_string(&ProviderKind::S3).unwrap(), "\"s3\"");
    }

    #[test]
    fn test_relative_dirs_resolve_against_base() {
        assert_eq!(
            resolve_path(Path::new("/srv/data"), "filestore"),
            PathBuf::from("/srv/data/filestore")
        );
        assert_eq!(
            resolve_path(Path::new("/srv/data"), "/mnt/blobs"),
            PathBuf::from("/mnt/blobs")
        );
    }
}
