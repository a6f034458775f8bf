//! Repository traits for metadata operations.

pub mod artifacts;
pub mod binaries;

pub use artifacts::ArtifactRepo;
pub use binaries::BinaryRepo;
