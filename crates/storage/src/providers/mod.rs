//! Provider strategies.

pub mod cache_fs;
pub mod double;
pub mod empty;
pub mod eventual;
pub mod external;
pub mod filesystem;
pub mod retry;
pub mod s3;
pub mod tracking;

pub use cache_fs::CacheFsProvider;
pub use double::DoubleProvider;
pub use empty::EmptyProvider;
pub use eventual::EventualProvider;
pub use external::{ExternalFileProvider, ExternalWrapperProvider, WrapperMode};
pub use filesystem::FileSystemProvider;
pub use retry::RetryProvider;
pub use s3::{S3Provider, S3Settings};
pub use tracking::TrackingProvider;
