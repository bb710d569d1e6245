//! Fixed-index registry
//!
//! A slot container whose entries never move once inserted. Removed slots
//! become gaps that later insertions reuse, so an index handed out by
//! [`FixedIndexRegistry::put`] keeps naming the same entry until that entry
//! is removed.

use crate::error::{LifetimeError, LifetimeResult};

/// Slot storage with stable indices and gap reuse.
///
/// Not internally synchronized: callers that share a registry wrap it in a
/// lock, as [`ManualCleaner`](super::ManualCleaner) does.
///
/// # Examples
///
/// ```
/// use tether::lifetime::FixedIndexRegistry;
///
/// let mut registry = FixedIndexRegistry::new();
/// let a = registry.put("a");
/// let b = registry.put("b");
///
/// assert_eq!(registry.remove(a).unwrap(), "a");
/// assert!(registry.remove(a).is_err());
///
/// // The gap left by `a` is reused; `b` did not move.
/// let c = registry.put("c");
/// assert_eq!(c, a);
/// assert_eq!(*registry.get(b).unwrap(), "b");
/// ```
#[derive(Debug)]
pub struct FixedIndexRegistry<T> {
    slots: Vec<Option<T>>,
    gaps: Vec<usize>,
}

impl<T> FixedIndexRegistry<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            gaps: Vec::new(),
        }
    }

    /// Insert `value` and return its index.
    pub fn put(&mut self, value: T) -> usize {
        self.put_with(|_| value)
    }

    /// Insert the value built from its own future index.
    ///
    /// Entries that need to know where they live (to remove themselves
    /// later) are built here rather than patched after insertion.
    pub fn put_with(&mut self, build: impl FnOnce(usize) -> T) -> usize {
        let index = self.acquire_free_index();
        self.slots[index] = Some(build(index));
        index
    }

    // The returned slot is empty and must be filled by the caller.
    fn acquire_free_index(&mut self) -> usize {
        match self.gaps.pop() {
            Some(index) => index,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        }
    }

    /// Entry currently stored at `index`.
    pub fn get(&self, index: usize) -> LifetimeResult<&T> {
        match self.slots.get(index) {
            Some(Some(value)) => Ok(value),
            Some(None) => Err(LifetimeError::StaleIndex { index }),
            None => Err(self.out_of_bounds(index)),
        }
    }

    pub fn get_mut(&mut self, index: usize) -> LifetimeResult<&mut T> {
        let slot_count = self.slots.len();
        match self.slots.get_mut(index) {
            Some(Some(value)) => Ok(value),
            Some(None) => Err(LifetimeError::StaleIndex { index }),
            None => Err(LifetimeError::OutOfBounds { index, slot_count }),
        }
    }

    /// Take the entry at `index` out, leaving a reusable gap.
    ///
    /// Removing the same index twice fails with
    /// [`LifetimeError::DoubleRemove`]; the gap list is left untouched so a
    /// double removal can never hand the same slot out twice.
    pub fn remove(&mut self, index: usize) -> LifetimeResult<T> {
        let slot_count = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(LifetimeError::OutOfBounds { index, slot_count })?;
        let previous = slot.take().ok_or(LifetimeError::DoubleRemove { index })?;
        self.gaps.push(index);
        Ok(previous)
    }

    pub fn contains(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.slots.len() - self.gaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots in backing storage, live or gap
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn gap_count(&self) -> usize {
        self.gaps.len()
    }

    /// Iterate over live entries with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|value| (index, value)))
    }

    /// Remove every live entry, returning them in index order.
    pub fn drain(&mut self) -> Vec<(usize, T)> {
        let drained: Vec<(usize, T)> = self
            .slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.take().map(|value| (index, value)))
            .collect();
        self.gaps = (0..self.slots.len()).rev().collect();
        drained
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            live: self.len(),
            gaps: self.gap_count(),
            slot_count: self.slot_count(),
        }
    }

    fn out_of_bounds(&self, index: usize) -> LifetimeError {
        LifetimeError::OutOfBounds {
            index,
            slot_count: self.slots.len(),
        }
    }
}

impl<T> Default for FixedIndexRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Occupancy of a [`FixedIndexRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub live: usize,
    pub gaps: usize,
    pub slot_count: usize,
}
