//! Garbage collection for the strata binary store.
//!
//! A run diffs the binary index (candidates) against the artifact references
//! (referenced set), drops anything inside the grace window, and deletes the
//! rest from every provider in the chain. Progress is reported to registered
//! [`GarbageCollectorListener`]s.

pub mod collector;
pub mod control;
pub mod error;
pub mod info;
pub mod listener;
pub mod scheduler;

pub use collector::GarbageCollector;
pub use control::GcControl;
pub use error::{GcError, GcResult};
pub use info::GarbageCollectorInfo;
pub use listener::{GarbageCollectorListener, LoggingListener};
pub use scheduler::GcScheduler;
