//! Test utilities
//!
//! [`MockNativeHeap`] stands in for a foreign allocator in tests, doc
//! examples and benchmarks. It hands out fake addresses, records every
//! release and detects double or unknown frees the way a debugging
//! allocator would.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;

use crate::error::ReleaseError;
use crate::handle::HandleAddress;

const BASE_ADDRESS: usize = 0x1_0000;
const ALLOCATION_STRIDE: usize = 0x100;
const WORD: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AllocationState {
    Live,
    Released { count: usize },
}

/// Fake foreign allocator that checks release discipline.
///
/// # Examples
///
/// ```
/// use tether::test_utils::MockNativeHeap;
///
/// let heap = MockNativeHeap::new();
/// let address = heap.allocate();
/// assert!(heap.is_live(address));
///
/// heap.release(address).unwrap();
/// assert!(heap.release(address).is_err());
/// assert_eq!(heap.double_frees(), 1);
/// ```
#[derive(Debug)]
pub struct MockNativeHeap {
    allocations: DashMap<HandleAddress, AllocationState>,
    failing: DashSet<HandleAddress>,
    next_address: AtomicUsize,
    double_frees: AtomicUsize,
    release_order: Mutex<Vec<HandleAddress>>,
}

impl MockNativeHeap {
    pub fn new() -> Self {
        Self {
            allocations: DashMap::new(),
            failing: DashSet::new(),
            next_address: AtomicUsize::new(BASE_ADDRESS),
            double_frees: AtomicUsize::new(0),
            release_order: Mutex::new(Vec::new()),
        }
    }

    /// Allocate a fresh foreign object.
    pub fn allocate(&self) -> HandleAddress {
        let raw = self
            .next_address
            .fetch_add(ALLOCATION_STRIDE, Ordering::Relaxed);
        let address = HandleAddress::new(raw);
        self.allocations.insert(address, AllocationState::Live);
        address
    }

    /// Address of the `word`-th element inside an allocation.
    ///
    /// Interior addresses are never allocations of their own; releasing one
    /// is reported as an unknown free.
    pub fn interior(&self, base: HandleAddress, word: usize) -> HandleAddress {
        HandleAddress::new(base.as_usize() + word * WORD)
    }

    /// Free `address`, as the foreign `release` function would.
    pub fn release(&self, address: HandleAddress) -> Result<(), ReleaseError> {
        if self.failing.contains(&address) {
            return Err(ReleaseError::new(address, "injected release failure"));
        }

        let mut entry = self
            .allocations
            .get_mut(&address)
            .ok_or_else(|| ReleaseError::new(address, "unknown address"))?;

        let state = *entry;
        match state {
            AllocationState::Live => {
                *entry = AllocationState::Released { count: 1 };
                drop(entry);
                self.release_order.lock().push(address);
                Ok(())
            }
            AllocationState::Released { count } => {
                *entry = AllocationState::Released { count: count + 1 };
                self.double_frees.fetch_add(1, Ordering::Relaxed);
                Err(ReleaseError::new(address, "double free"))
            }
        }
    }

    /// Release closure suitable for a cleaner registration.
    pub fn releaser(
        self: &Arc<Self>,
    ) -> impl FnOnce(HandleAddress) -> Result<(), ReleaseError> + Send + 'static {
        let heap = Arc::clone(self);
        move |address| heap.release(address)
    }

    /// Make every release of `address` fail until [`heal`](Self::heal).
    pub fn fail_releases_of(&self, address: HandleAddress) {
        self.failing.insert(address);
    }

    pub fn heal(&self, address: HandleAddress) {
        self.failing.remove(&address);
    }

    pub fn is_live(&self, address: HandleAddress) -> bool {
        matches!(
            self.allocations.get(&address).map(|entry| *entry),
            Some(AllocationState::Live)
        )
    }

    /// How many times `address` was released, failed double frees included.
    pub fn release_count(&self, address: HandleAddress) -> usize {
        match self.allocations.get(&address).map(|entry| *entry) {
            Some(AllocationState::Released { count }) => count,
            _ => 0,
        }
    }

    pub fn live_count(&self) -> usize {
        self.allocations
            .iter()
            .filter(|entry| *entry.value() == AllocationState::Live)
            .count()
    }

    pub fn double_frees(&self) -> usize {
        self.double_frees.load(Ordering::Relaxed)
    }

    /// Successful releases in the order they happened
    pub fn release_order(&self) -> Vec<HandleAddress> {
        self.release_order.lock().clone()
    }
}

impl Default for MockNativeHeap {
    fn default() -> Self {
        Self::new()
    }
}
