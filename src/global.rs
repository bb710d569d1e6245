//! Process-wide cleaner and extender
//!
//! Binding code that does not thread a cleaner through every constructor
//! registers with these instances instead. They live for the whole
//! process, so nothing registered here is ever leaked by a cleaner drop.

use once_cell::sync::Lazy;

use crate::config::CleanerConfig;
use crate::error::{LifetimeResult, ReleaseError};
use crate::handle::{ForeignHandle, HandleAddress};
use crate::lifetime::{LifetimeExtender, ManualCleaner, Registration};

static MANUAL_CLEANER: Lazy<ManualCleaner> =
    Lazy::new(|| ManualCleaner::with_config(CleanerConfig::named("global")));

static LIFETIME_EXTENDER: Lazy<LifetimeExtender> = Lazy::new(LifetimeExtender::new);

pub fn manual_cleaner() -> &'static ManualCleaner {
    &MANUAL_CLEANER
}

pub fn lifetime_extender() -> &'static LifetimeExtender {
    &LIFETIME_EXTENDER
}

/// Register `release` for an owning handle with the global cleaner.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tether::global;
/// use tether::handle::ForeignHandle;
/// use tether::test_utils::MockNativeHeap;
///
/// let heap = Arc::new(MockNativeHeap::new());
/// let address = heap.allocate();
///
/// let registration = global::register_deletion(ForeignHandle::owned(address), heap.releaser());
/// assert!(registration.is_some());
///
/// drop(registration);
/// global::cleanup_unreachable().unwrap();
/// assert!(!heap.is_live(address));
/// ```
pub fn register_deletion<F>(handle: ForeignHandle, release: F) -> Option<Registration>
where
    F: FnOnce(HandleAddress) -> Result<(), ReleaseError> + Send + 'static,
{
    MANUAL_CLEANER.register_release("deletion", handle, release)
}

/// Drain the global cleaner.
pub fn cleanup_unreachable() -> LifetimeResult<usize> {
    MANUAL_CLEANER.cleanup_unreachable()
}
