//! Built-in chain templates and override merging.

use crate::error::{StorageError, StorageResult};
use strata_core::ProviderSpec;
use strata_core::config::StoreConfig;

/// Names accepted by [`template`].
pub const TEMPLATE_NAMES: [&str; 5] = ["file-system", "cache-fs", "double", "eventual-s3", "tracking"];

fn file_system(id: &str, dir: &str) -> ProviderSpec {
    ProviderSpec::new(id, "file-system").with_param("dir", dir)
}

/// A built-in chain by name.
pub fn template(name: &str) -> StorageResult<ProviderSpec> {
    let spec = match name {
        "file-system" => file_system("file-system", "filestore"),
        "cache-fs" => ProviderSpec::new("cache-fs", "cache-fs")
            .with_param("dir", "cache")
            .with_next(file_system("file-system", "filestore")),
        "double" => ProviderSpec::new("double", "double")
            .with_sub(file_system("shard-fs-1", "filestore1"))
            .with_sub(file_system("shard-fs-2", "filestore2")),
        // The bucket has no sensible default and must come from overrides.
        "eventual-s3" => ProviderSpec::new("eventual", "eventual")
            .with_param("dir", "eventual")
            .with_next(
                ProviderSpec::new("retry", "retry").with_next(ProviderSpec::new("s3", "s3")),
            ),
        "tracking" => ProviderSpec::new("tracking", "tracking")
            .with_next(file_system("file-system", "filestore")),
        other => {
            return Err(StorageError::Config(format!(
                "unknown chain template '{other}' (expected one of: {})",
                TEMPLATE_NAMES.join(", ")
            )));
        }
    };
    Ok(spec)
}

/// The effective chain: the explicit `chain` or the named template, with
/// per-id parameter overrides applied.
pub fn resolve_spec(config: &StoreConfig) -> StorageResult<ProviderSpec> {
    let mut spec = match &config.chain {
        Some(chain) => chain.clone(),
        None => template(&config.template)?,
    };

    for (id, params) in &config.overrides {
        let node = spec.find_mut(id).ok_or_else(|| {
            StorageError::Config(format!("override targets unknown provider id '{id}'"))
        })?;
        node.params
            .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    spec.validate()?;
    Ok(spec)
}
