//! Lifetime bridge between shared Rust proxies and foreign resources
//!
//! This module tracks resources owned by a foreign allocator so that each
//! one is released exactly once, from a single draining path, and never
//! while a view into it is still reachable.
//!
//! ## Features
//!
//! - **Fixed-Index Registry**: slot storage whose indices never move; freed
//!   slots are reused
//! - **Deferred Cleanup**: dropping a proxy only enqueues its release
//! - **Manual Cleaner**: non-blocking drain that runs each release once
//! - **Cleanup Prevention**: opt a resource out when ownership moves away
//! - **Lifetime Extension**: views keep their containers reachable
//! - **Maintenance Worker**: optional dedicated drain thread

// Submodules
pub mod cleaner;
pub mod extender;
pub mod maintenance;
pub mod reference;
pub mod registry;

#[cfg(test)]
mod tests;

// Re-export public APIs
pub use cleaner::{CleanerStats, ManualCleaner};
pub use extender::{Fenced, ForeignView, LifetimeExtender, ReachabilityFences};
pub use maintenance::MaintenanceWorker;
pub use reference::{CleanupAction, CleanupReference, Registration};
pub use registry::{FixedIndexRegistry, RegistryStats};
