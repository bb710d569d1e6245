//! Exactly-once release of foreign-runtime resources held by shared Rust
//! proxies.
//!
//! Proxies for objects of a foreign (non-Rust, not thread-safe) library are
//! shared freely; dropping the last one only enqueues the release. The
//! owning path calls [`ManualCleaner::cleanup_unreachable`] to perform the
//! releases, each exactly once.

pub mod config;
pub mod error;
pub mod global;
pub mod handle;
pub mod lifetime;
pub mod proxy;
pub mod test_utils;

pub use config::CleanerConfig;
pub use error::{LifetimeError, LifetimeResult, ReleaseError};
pub use handle::{ForeignHandle, HandleAddress};
pub use lifetime::{
    CleanupReference, FixedIndexRegistry, LifetimeExtender, MaintenanceWorker, ManualCleaner,
    Registration,
};
pub use proxy::{ForeignProxy, ProxyState};
