//! Binary provider chain and store facade for strata.
//!
//! This crate provides:
//! - The [`BinaryProvider`] contract and every provider strategy
//!   (filesystem, cache, retry, double, eventual, external, tracking, S3)
//! - A compile-time provider registry and a chain builder that turns a
//!   [`strata_core::ProviderSpec`] tree into a wired [`ProviderChain`]
//! - The [`BinaryStore`] facade used by the rest of the system

pub mod chain;
pub mod error;
pub mod in_flight;
mod local;
pub mod providers;
pub mod registry;
pub mod spool;
pub mod store;
pub mod stream;
pub mod templates;
pub mod traits;

pub use chain::{
    ChainBuilder, DeleteOutcome, LifecycleState, ProviderChain, ProviderDescription,
    TERMINATOR_ID,
};
pub use error::{StorageError, StorageResult};
pub use in_flight::{DeleteGuard, InFlightGuard, InFlightSet};
pub use registry::{ProviderContext, ProviderFactory, ProviderKind, ProviderRegistry};
pub use spool::Spool;
pub use store::BinaryStore;
pub use stream::{bytes_stream, collect};
pub use templates::{TEMPLATE_NAMES, resolve_spec, template};
pub use traits::{BinaryProvider, ByteStream, PruneReport};
