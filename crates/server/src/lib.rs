//! HTTP daemon for the strata binary store.
//!
//! This crate provides:
//! - Artifact upload and download over the binary store
//! - Direct binary access by checksum
//! - Admin endpoints (GC control, prune, chain inspection)
//! - Prometheus metrics

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
