//! HTTP request handlers.

pub mod admin;
pub mod artifacts;
pub mod binaries;
pub mod common;

pub use admin::*;
pub use artifacts::*;
pub use binaries::*;
