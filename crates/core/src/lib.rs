//! Core domain types and shared logic for the strata binary store.
//!
//! This crate defines the data model used across all other crates:
//! - SHA-1 content addresses and sharded paths
//! - Stored binary records
//! - Declarative provider chain descriptions
//! - Application configuration

pub mod binary;
pub mod checksum;
pub mod config;
pub mod error;
pub mod provider_spec;

pub use binary::BinaryData;
pub use checksum::{CHECKSUM_HEX_LEN, CHECKSUM_LEN, Sha1Checksum, Sha1Hasher};
pub use error::{Error, Result};
pub use provider_spec::ProviderSpec;
