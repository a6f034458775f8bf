//! Configuration types shared across crates.

use crate::provider_spec::ProviderSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Binary store configuration.
///
/// The provider chain is either given explicitly (`chain`) or taken from a
/// built-in template (`template`). Per-provider parameter overrides are then
/// merged on top, keyed by provider id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base directory; relative provider directories resolve against it.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Directory for spooled uploads (default: `<base_dir>/tmp`).
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// Name of the built-in chain template used when `chain` is absent.
    #[serde(default = "default_template")]
    pub template: String,
    /// Explicit provider chain, replacing the template.
    #[serde(default)]
    pub chain: Option<ProviderSpec>,
    /// Parameter overrides keyed by provider id.
    #[serde(default)]
    pub overrides: BTreeMap<String, BTreeMap<String, String>>,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_template() -> String {
    "file-system".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            temp_dir: None,
            template: default_template(),
            chain: None,
            overrides: BTreeMap::new(),
        }
    }
}

impl StoreConfig {
    /// Effective spool directory.
    pub fn spool_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("tmp"))
    }

    /// Validate store configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.chain.is_none() && self.template.trim().is_empty() {
            return Err("store requires either 'chain' or a non-empty 'template'".to_string());
        }
        if let Some(chain) = &self.chain {
            chain.validate().map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// Process-local store (testing only; nothing survives a restart).
    Memory,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
        }
    }
}

/// Garbage collection configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GcConfig {
    /// Grace period in seconds before an unreferenced binary may be deleted.
    #[serde(default = "default_gc_grace_period_secs")]
    pub grace_period_secs: u64,
    /// Enable automatic GC scheduling (disabled by default).
    #[serde(default)]
    pub auto_schedule_enabled: bool,
    /// Interval in seconds between automatic GC runs (default: 1 hour).
    #[serde(default = "default_gc_auto_schedule_interval_secs")]
    pub auto_schedule_interval_secs: u64,
    /// Report what would be deleted without deleting (default: false).
    #[serde(default)]
    pub dry_run: bool,
    /// Number of deletions between throttling pauses.
    #[serde(default = "default_gc_batch_size")]
    pub batch_size: u32,
    /// Delay in milliseconds after each batch (default: None = no delay).
    #[serde(default)]
    pub batch_delay_ms: Option<u64>,
}

fn default_gc_grace_period_secs() -> u64 {
    3600 // 1 hour
}

fn default_gc_auto_schedule_interval_secs() -> u64 {
    3600 // 1 hour
}

fn default_gc_batch_size() -> u32 {
    1000
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_gc_grace_period_secs(),
            auto_schedule_enabled: false,
            auto_schedule_interval_secs: default_gc_auto_schedule_interval_secs(),
            dry_run: false,
            batch_size: default_gc_batch_size(),
            batch_delay_ms: None,
        }
    }
}

impl GcConfig {
    /// Get the grace period as a Duration.
    pub fn grace_period(&self) -> Duration {
        Duration::seconds(self.grace_period_secs as i64)
    }

    /// Get the auto schedule interval as a std::time::Duration.
    pub fn auto_schedule_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.auto_schedule_interval_secs)
    }

    /// Get the batch delay, if any.
    pub fn batch_delay(&self) -> Option<std::time::Duration> {
        self.batch_delay_ms.map(std::time::Duration::from_millis)
    }

    /// Validate GC configuration for dangerous settings.
    pub fn validate(&self) -> Result<(), String> {
        // Duration::seconds takes i64
        if self.grace_period_secs > i64::MAX as u64 {
            return Err(format!(
                "gc.grace_period_secs {} exceeds maximum value {}",
                self.grace_period_secs,
                i64::MAX
            ));
        }

        if self.auto_schedule_enabled && self.auto_schedule_interval_secs == 0 {
            return Err("gc.auto_schedule_interval_secs cannot be 0 when scheduling is enabled"
                .to_string());
        }

        if self.batch_size == 0 {
            return Err("gc.batch_size cannot be 0".to_string());
        }

        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Binary store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Garbage collection configuration.
    #[serde(default)]
    pub gc: GcConfig,
}

impl AppConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.store.validate()?;
        self.gc.validate()?;
        Ok(())
    }
}
