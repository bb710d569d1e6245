//! Error types for the lifetime bridge.

use thiserror::Error;

use crate::handle::HandleAddress;

/// A foreign `release` call reported failure.
///
/// # Examples
///
/// ```
/// use tether::error::ReleaseError;
/// use tether::handle::HandleAddress;
///
/// let err = ReleaseError::new(HandleAddress::new(0x40), "allocator rejected pointer");
/// assert_eq!(err.to_string(), "release of 0x40 failed: allocator rejected pointer");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("release of {address} failed: {message}")]
pub struct ReleaseError {
    pub address: HandleAddress,
    pub message: String,
}

impl ReleaseError {
    pub fn new(address: HandleAddress, message: impl Into<String>) -> Self {
        Self {
            address,
            message: message.into(),
        }
    }
}

/// Errors raised by the registry, the cleaner and the proxies.
///
/// Bookkeeping variants (`StaleIndex`, `DoubleRemove`, `OutOfBounds`)
/// are programming errors in the binding layer and must
/// not be ignored: each of them is one step away from a use-after-free in
/// the foreign runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifetimeError {
    /// `get` on a slot that currently holds no entry
    #[error("registry slot {index} is empty (stale index)")]
    StaleIndex { index: usize },
    /// `remove` on a slot that currently holds no entry
    #[error("registry slot {index} was already removed")]
    DoubleRemove { index: usize },
    /// Index was never handed out by the registry
    #[error("registry slot {index} is out of bounds ({slot_count} slots)")]
    OutOfBounds { index: usize, slot_count: usize },
    /// Ownership transfer requested on a proxy that does not own its handle
    #[error("handle {address} is not owned by this proxy")]
    NotOwner { address: HandleAddress },
    /// Lifetime extension towards an object that is no longer live
    #[error("cannot extend a lifetime to a dead dependency")]
    DeadDependency,
    /// Lifetime extension from an object to itself
    #[error("an object cannot extend its own lifetime")]
    SelfDependency,
    /// An owning registration was requested for a null address
    #[error("cannot register a release for a null address")]
    NullAddress,
    /// The cleaner owning a registration has been dropped
    #[error("the cleaner for registry slot {index} no longer exists")]
    CleanerGone { index: usize },
    /// The foreign release call failed
    #[error(transparent)]
    Release(#[from] ReleaseError),
    /// Aggregated failures of one drain
    #[error("{} cleanup action(s) failed, {released} released", .failures.len())]
    CleanupFailed {
        released: usize,
        failures: Vec<LifetimeError>,
    },
}

/// Result type for lifetime operations
pub type LifetimeResult<T> = Result<T, LifetimeError>;
