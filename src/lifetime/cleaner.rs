//! Manual cleaner
//!
//! Owns the registry of pending releases and the queue that proxy drops
//! feed. Foreign `release` calls happen only inside
//! [`ManualCleaner::cleanup_unreachable`] (or an explicit
//! [`Registration::release_now`]), so a foreign library that is not
//! thread-safe is only ever touched from the path that drains.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use flume::{Receiver, Sender};
use parking_lot::{Mutex, ReentrantMutex};

use crate::config::CleanerConfig;
use crate::error::{LifetimeError, LifetimeResult, ReleaseError};
use crate::handle::{ForeignHandle, HandleAddress};

use super::reference::{CleanupAction, CleanupReference, Registration};
use super::registry::FixedIndexRegistry;

/// State shared between a cleaner and its registrations.
pub(crate) struct CleanerShared {
    config: CleanerConfig,
    registry: Mutex<FixedIndexRegistry<CleanupReference>>,
    /// Producer side handed to registrations; any thread may enqueue
    queue_sender: Sender<usize>,
    queue_receiver: Receiver<usize>,
    /// Serializes every foreign release. Reentrant so an action may drain
    /// or delete through the same cleaner.
    drain_lock: ReentrantMutex<()>,
    above_threshold: AtomicBool,
    total_registered: AtomicUsize,
    total_released: AtomicUsize,
    total_failed: AtomicUsize,
    total_prevented: AtomicUsize,
}

impl CleanerShared {
    /// Remove the entry and run it now, under the drain lock.
    pub(crate) fn release(&self, index: usize) -> LifetimeResult<()> {
        let _drain = self.drain_lock.lock();
        let reference = self.registry.lock().remove(index)?;
        self.run(reference)
    }

    /// Remove the entry without running it.
    pub(crate) fn cancel(&self, index: usize) -> LifetimeResult<()> {
        let reference = self.registry.lock().remove(index)?;
        self.total_prevented.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            cleaner = %self.config.name,
            slot = index,
            label = reference.label(),
            "cleanup prevented"
        );
        Ok(())
    }

    /// Run a reference already removed from the registry.
    ///
    /// The registry lock is not held here: an action may drop other proxies
    /// or register new resources.
    pub(crate) fn run(&self, reference: CleanupReference) -> LifetimeResult<()> {
        let index = reference.index();
        let label = reference.label();
        match reference.cleanup() {
            Ok(()) => {
                self.total_released.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(cleaner = %self.config.name, slot = index, label, "released");
                Ok(())
            }
            Err(err) => {
                self.total_failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    cleaner = %self.config.name,
                    slot = index,
                    label,
                    error = %err,
                    "foreign release failed"
                );
                Err(err.into())
            }
        }
    }

    fn check_threshold(&self, live: usize) {
        let Some(threshold) = self.config.slot_warning_threshold else {
            return;
        };
        if live > threshold {
            if !self.above_threshold.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    cleaner = %self.config.name,
                    live,
                    threshold,
                    "live registrations crossed warning threshold; drain more often"
                );
            }
        } else {
            self.above_threshold.store(false, Ordering::Relaxed);
        }
    }

    fn drain_queue(&self) -> (usize, Vec<LifetimeError>) {
        let _drain = self.drain_lock.lock();
        let mut released = 0;
        let mut failures = Vec::new();

        while let Ok(index) = self.queue_receiver.try_recv() {
            // Take the slot first: it is freed even if the action fails
            let removed = self.registry.lock().remove(index);
            let outcome = removed.and_then(|reference| self.run(reference));
            match outcome {
                Ok(()) => released += 1,
                Err(err) => {
                    if !matches!(err, LifetimeError::Release(_)) {
                        tracing::error!(
                            cleaner = %self.config.name,
                            slot = index,
                            error = %err,
                            "registry inconsistency during drain"
                        );
                    }
                    failures.push(err);
                }
            }
        }

        (released, failures)
    }
}

impl Drop for CleanerShared {
    fn drop(&mut self) {
        let (released, failures) = self.drain_queue();
        let leaked = self.registry.get_mut().len();
        if released > 0 || !failures.is_empty() {
            tracing::debug!(
                cleaner = %self.config.name,
                released,
                failed = failures.len(),
                "final drain on cleaner drop"
            );
        }
        if leaked > 0 {
            tracing::warn!(
                cleaner = %self.config.name,
                leaked,
                "cleaner dropped with live registrations; their resources are never released"
            );
        }
    }
}

/// Drains released proxies and calls their foreign release actions.
///
/// Cloning is cheap and shares the same registry and queue.
///
/// # Examples
///
/// ```
/// use tether::lifetime::ManualCleaner;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let cleaner = ManualCleaner::new();
/// let released = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&released);
///
/// let registration = cleaner.register("matrix", Box::new(move || {
///     counter.fetch_add(1, Ordering::Relaxed);
///     Ok(())
/// }));
///
/// // Dropping the registration only enqueues the release.
/// drop(registration);
/// assert_eq!(released.load(Ordering::Relaxed), 0);
///
/// assert_eq!(cleaner.cleanup_unreachable().unwrap(), 1);
/// assert_eq!(released.load(Ordering::Relaxed), 1);
///
/// // Nothing left: draining again is a no-op.
/// assert_eq!(cleaner.cleanup_unreachable().unwrap(), 0);
/// ```
#[derive(Clone)]
pub struct ManualCleaner {
    shared: Arc<CleanerShared>,
}

impl ManualCleaner {
    pub fn new() -> Self {
        Self::with_config(CleanerConfig::default())
    }

    pub fn with_config(config: CleanerConfig) -> Self {
        let (queue_sender, queue_receiver) = flume::unbounded();
        let registry = FixedIndexRegistry::with_capacity(config.initial_capacity);

        Self {
            shared: Arc::new(CleanerShared {
                config,
                registry: Mutex::new(registry),
                queue_sender,
                queue_receiver,
                drain_lock: ReentrantMutex::new(()),
                above_threshold: AtomicBool::new(false),
                total_registered: AtomicUsize::new(0),
                total_released: AtomicUsize::new(0),
                total_failed: AtomicUsize::new(0),
                total_prevented: AtomicUsize::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn config(&self) -> &CleanerConfig {
        &self.shared.config
    }

    /// Register a release action; the returned registration arms it.
    pub fn register(&self, label: &'static str, action: CleanupAction) -> Registration {
        let (index, live) = {
            let mut registry = self.shared.registry.lock();
            let index = registry.put_with(|index| CleanupReference::new(index, label, action));
            (index, registry.len())
        };
        self.shared.total_registered.fetch_add(1, Ordering::Relaxed);
        self.shared.check_threshold(live);

        tracing::trace!(cleaner = %self.shared.config.name, slot = index, label, "registered");

        Registration::new(
            index,
            self.shared.queue_sender.clone(),
            Arc::downgrade(&self.shared),
        )
    }

    /// Register `release(address)` for an owning handle.
    ///
    /// Borrowed and null handles are never released by this side, so they
    /// get no registration.
    pub fn register_release<F>(
        &self,
        label: &'static str,
        handle: ForeignHandle,
        release: F,
    ) -> Option<Registration>
    where
        F: FnOnce(HandleAddress) -> Result<(), ReleaseError> + Send + 'static,
    {
        if !handle.owns_memory() || handle.is_null() {
            return None;
        }
        let address = handle.address();
        Some(self.register(label, Box::new(move || release(address))))
    }

    /// Release everything enqueued so far.
    ///
    /// Does not wait for more registrations to be dropped. Safe to call
    /// from inside a release action; the inner call drains whatever is
    /// still queued. Returns the
    /// number of successful releases; when any action fails, every slot is
    /// still freed and the failures come back together in
    /// [`LifetimeError::CleanupFailed`].
    pub fn cleanup_unreachable(&self) -> LifetimeResult<usize> {
        let (released, failures) = self.shared.drain_queue();

        if released > 0 || !failures.is_empty() {
            tracing::debug!(
                cleaner = %self.shared.config.name,
                released,
                failed = failures.len(),
                "drained unreachable resources"
            );
        }
        let live = self.shared.registry.lock().len();
        self.shared.check_threshold(live);

        if failures.is_empty() {
            Ok(released)
        } else {
            Err(LifetimeError::CleanupFailed { released, failures })
        }
    }

    /// Releases enqueued but not yet drained
    pub fn pending(&self) -> usize {
        self.shared.queue_receiver.len()
    }

    /// Registrations whose slot is still occupied, drained or not
    pub fn live(&self) -> usize {
        self.shared.registry.lock().len()
    }

    pub fn stats(&self) -> CleanerStats {
        let registry = self.shared.registry.lock().stats();
        CleanerStats {
            name: self.shared.config.name.clone(),
            total_registered: self.shared.total_registered.load(Ordering::Relaxed),
            total_released: self.shared.total_released.load(Ordering::Relaxed),
            total_failed: self.shared.total_failed.load(Ordering::Relaxed),
            total_prevented: self.shared.total_prevented.load(Ordering::Relaxed),
            pending: self.pending(),
            live: registry.live,
            slot_count: registry.slot_count,
        }
    }
}

impl Default for ManualCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ManualCleaner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualCleaner")
            .field("name", &self.shared.config.name)
            .field("pending", &self.pending())
            .field("live", &self.live())
            .finish()
    }
}

/// Statistics for a manual cleaner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanerStats {
    pub name: String,
    pub total_registered: usize,
    pub total_released: usize,
    pub total_failed: usize,
    pub total_prevented: usize,
    pub pending: usize,
    pub live: usize,
    pub slot_count: usize,
}
