//! Tests for the lifetime bridge
//!
//! Exercises the registry, cleaner, prevention and lifetime extension
//! together against a mock foreign heap.

use super::*;
use crate::error::LifetimeError;
use crate::handle::{ForeignHandle, HandleAddress};
use crate::proxy::ForeignProxy;
use crate::test_utils::MockNativeHeap;
use std::sync::Arc;

#[test]
fn test_release_happens_once_across_repeated_drains() {
    let heap = Arc::new(MockNativeHeap::new());
    let cleaner = ManualCleaner::new();
    let addresses: Vec<HandleAddress> = (0..16).map(|_| heap.allocate()).collect();

    let proxies: Vec<ForeignProxy> = addresses
        .iter()
        .map(|&address| ForeignProxy::owned(&cleaner, "MX", address, heap.releaser()))
        .collect();
    drop(proxies);

    for _ in 0..4 {
        cleaner.cleanup_unreachable().unwrap();
    }

    for address in addresses {
        assert_eq!(heap.release_count(address), 1);
    }
    assert_eq!(heap.double_frees(), 0);
    assert_eq!(cleaner.stats().total_released, 16);
}

#[test]
fn test_concrete_slot_scenario_through_cleaner() {
    let heap = Arc::new(MockNativeHeap::new());
    let cleaner = ManualCleaner::new();
    let a = heap.allocate();
    let b = heap.allocate();
    let c = heap.allocate();

    let reg_a = cleaner
        .register_release("A", ForeignHandle::owned(a), heap.releaser())
        .unwrap();
    let reg_b = cleaner
        .register_release("B", ForeignHandle::owned(b), heap.releaser())
        .unwrap();
    assert_eq!((reg_a.index(), reg_b.index()), (0, 1));

    drop(reg_a);
    cleaner.cleanup_unreachable().unwrap();
    assert_eq!(heap.release_count(a), 1);

    let reg_c = cleaner
        .register_release("C", ForeignHandle::owned(c), heap.releaser())
        .unwrap();
    assert_eq!(reg_c.index(), 0);
    assert_eq!(reg_b.index(), 1);
    assert!(heap.is_live(b));
    assert!(heap.is_live(c));
}

#[test]
fn test_prevent_before_enqueue() {
    let heap = Arc::new(MockNativeHeap::new());
    let cleaner = ManualCleaner::new();
    let address = heap.allocate();
    let mut registration = cleaner
        .register_release("Function", ForeignHandle::owned(address), heap.releaser())
        .unwrap();
    let index = registration.index();

    registration.prevent();
    drop(registration);
    cleaner.cleanup_unreachable().unwrap();
    assert!(heap.is_live(address));

    // The freed slot is handed out again
    let other = cleaner.register("other", Box::new(|| Ok(())));
    assert_eq!(other.index(), index);
}

#[test]
fn test_view_delays_container_release() {
    let heap = Arc::new(MockNativeHeap::new());
    let cleaner = ManualCleaner::new();
    let extender = LifetimeExtender::new();
    let container_address = heap.allocate();

    let container = Arc::new(ForeignProxy::owned(
        &cleaner,
        "StdVectorDM",
        container_address,
        heap.releaser(),
    ));
    let element = container
        .view(&extender, "DM", heap.interior(container_address, 2))
        .unwrap();

    drop(container);
    cleaner.cleanup_unreachable().unwrap();
    assert!(heap.is_live(container_address));

    drop(element);
    cleaner.cleanup_unreachable().unwrap();
    assert!(!heap.is_live(container_address));
    assert_eq!(extender.links(), 1);
}

#[test]
fn test_owning_view_released_before_container() {
    let heap = Arc::new(MockNativeHeap::new());
    let cleaner = ManualCleaner::new();
    let extender = LifetimeExtender::new();
    let container_address = heap.allocate();
    let copy_address = heap.allocate();

    let container = Arc::new(ForeignProxy::owned(
        &cleaner,
        "StdVectorVectorMX",
        container_address,
        heap.releaser(),
    ));
    let dependent = ForeignProxy::owned(&cleaner, "StdVectorMX", copy_address, heap.releaser());
    extender.extend(&dependent, &container).unwrap();

    drop(container);
    drop(dependent);
    cleaner.cleanup_unreachable().unwrap();

    assert_eq!(heap.release_order(), vec![copy_address, container_address]);
}

#[test]
fn test_failed_release_reported_and_slot_reclaimed() {
    let heap = Arc::new(MockNativeHeap::new());
    let cleaner = ManualCleaner::new();
    let address = heap.allocate();
    heap.fail_releases_of(address);

    let proxy = ForeignProxy::owned(&cleaner, "Sparsity", address, heap.releaser());
    assert_eq!(cleaner.stats().live, 1);
    drop(proxy);

    let err = cleaner.cleanup_unreachable().unwrap_err();
    assert!(matches!(
        err,
        LifetimeError::CleanupFailed { released: 0, ref failures } if failures.len() == 1
    ));
    assert_eq!(cleaner.live(), 0);

    // A second drain does not retry the failed release
    assert_eq!(cleaner.cleanup_unreachable(), Ok(0));
    let next = cleaner.register("next", Box::new(|| Ok(())));
    assert_eq!(next.index(), 0);
}

#[test]
fn test_cleaner_drop_drains_enqueued_releases() {
    let heap = Arc::new(MockNativeHeap::new());
    let address = heap.allocate();
    let kept = heap.allocate();
    {
        let cleaner = ManualCleaner::new();
        let proxy = ForeignProxy::owned(&cleaner, "DM", address, heap.releaser());
        let survivor = ForeignProxy::owned(&cleaner, "DM", kept, heap.releaser());
        drop(proxy);
        drop(cleaner);
        // The survivor outlives its cleaner and is never released
        drop(survivor);
    }
    assert_eq!(heap.release_count(address), 1);
    assert!(heap.is_live(kept));
}
