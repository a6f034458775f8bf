pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{builder, filestore, seeded_bytes};
#[allow(unused_imports)]
pub use mocks::{FailingProvider, FlakyProvider};
