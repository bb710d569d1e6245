//! Deferred cleanup references
//!
//! A resource registered with a [`ManualCleaner`](super::ManualCleaner) is
//! split in two halves:
//!
//! - [`CleanupReference`] owns the release action and lives in the
//!   cleaner's registry until it runs, so it cannot disappear before firing.
//! - [`Registration`] is held by the proxy object. It does not keep the
//!   resource alive; dropping it only enqueues the slot index for the next
//!   drain. The drop may happen on any thread.

use std::fmt;
use std::sync::Weak;

use flume::Sender;

use crate::error::{LifetimeError, LifetimeResult, ReleaseError};

use super::cleaner::CleanerShared;

/// A release action for one foreign resource
pub type CleanupAction = Box<dyn FnOnce() -> Result<(), ReleaseError> + Send + 'static>;

/// Registry entry pairing a release action with the slot it occupies.
pub struct CleanupReference {
    index: usize,
    label: &'static str,
    action: CleanupAction,
}

impl CleanupReference {
    pub(crate) fn new(index: usize, label: &'static str, action: CleanupAction) -> Self {
        Self {
            index,
            label,
            action,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Run the release action, consuming the reference.
    pub fn cleanup(self) -> Result<(), ReleaseError> {
        (self.action)()
    }
}

impl fmt::Debug for CleanupReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupReference")
            .field("index", &self.index)
            .field("label", &self.label)
            .finish()
    }
}

/// Proxy-side half of a registration.
///
/// Dropping an armed registration enqueues its slot for release by the
/// next [`ManualCleaner::cleanup_unreachable`](super::ManualCleaner::cleanup_unreachable).
/// [`prevent`](Registration::prevent) opts the resource out of cleanup;
/// [`release_now`](Registration::release_now) releases it immediately.
pub struct Registration {
    index: usize,
    armed: bool,
    queue: Sender<usize>,
    cleaner: Weak<CleanerShared>,
}

impl Registration {
    pub(crate) fn new(index: usize, queue: Sender<usize>, cleaner: Weak<CleanerShared>) -> Self {
        Self {
            index,
            armed: true,
            queue,
            cleaner,
        }
    }

    /// Registry slot holding the release action
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether dropping this registration will still enqueue a release
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Cancel the pending release and free its slot without running it.
    ///
    /// Used when ownership of the resource moves elsewhere. Returns `false`
    /// when the registration was already disarmed.
    pub fn prevent(&mut self) -> bool {
        if !self.armed {
            return false;
        }
        self.armed = false;

        if let Some(cleaner) = self.cleaner.upgrade() {
            if let Err(err) = cleaner.cancel(self.index) {
                tracing::error!(slot = self.index, error = %err, "failed to cancel cleanup");
            }
        }
        true
    }

    /// Release the resource now, on the calling thread.
    ///
    /// Waits for any drain in progress, so the release never overlaps
    /// another foreign call made through the same cleaner.
    pub fn release_now(mut self) -> LifetimeResult<()> {
        if !self.armed {
            return Err(LifetimeError::DoubleRemove { index: self.index });
        }
        self.armed = false;

        let cleaner = self
            .cleaner
            .upgrade()
            .ok_or(LifetimeError::CleanerGone { index: self.index })?;
        cleaner.release(self.index)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self.queue.send(self.index).is_err() {
            tracing::warn!(
                slot = self.index,
                "cleaner dropped before registration; resource leaked"
            );
        } else {
            tracing::trace!(slot = self.index, "enqueued for cleanup");
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("index", &self.index)
            .field("armed", &self.armed)
            .finish()
    }
}
