//! Proxy objects for foreign resources
//!
//! A [`ForeignProxy`] is the Rust-side stand-in for one object of the
//! foreign library. Owning proxies register their release with a
//! [`ManualCleaner`]; borrowed proxies (views returned by accessors) never
//! release anything and instead keep their container reachable through a
//! reachability fence.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{LifetimeError, LifetimeResult, ReleaseError};
use crate::handle::{ForeignHandle, HandleAddress};
use crate::lifetime::{
    Fenced, ForeignView, LifetimeExtender, ManualCleaner, ReachabilityFences, Registration,
};

/// Ownership state of a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    /// Refers to memory owned by someone else; never released here
    Borrowed,
    /// Release registered with a cleaner
    Owned,
    /// Released explicitly through [`ForeignProxy::delete`]
    Deleted,
    /// Ownership handed to the foreign side
    Transferred,
}

struct ProxyInner {
    address: HandleAddress,
    state: ProxyState,
    registration: Option<Registration>,
}

/// Shared proxy for one foreign object.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tether::lifetime::{LifetimeExtender, ManualCleaner};
/// use tether::proxy::{ForeignProxy, ProxyState};
/// use tether::test_utils::MockNativeHeap;
///
/// let heap = Arc::new(MockNativeHeap::new());
/// let cleaner = ManualCleaner::new();
/// let extender = LifetimeExtender::new();
///
/// let vector = Arc::new(ForeignProxy::owned(
///     &cleaner,
///     "StdVectorMX",
///     heap.allocate(),
///     heap.releaser(),
/// ));
/// let element = vector.view(&extender, "MX", heap.interior(vector.address(), 1)).unwrap();
/// assert_eq!(element.state(), ProxyState::Borrowed);
///
/// // The element keeps the vector reachable.
/// drop(vector);
/// cleaner.cleanup_unreachable().unwrap();
/// assert_eq!(heap.live_count(), 1);
///
/// drop(element);
/// cleaner.cleanup_unreachable().unwrap();
/// assert_eq!(heap.live_count(), 0);
/// ```
pub struct ForeignProxy {
    kind: &'static str,
    // Declared before `fences` so a proxy's own release is enqueued before
    // the containers it keeps alive are dropped.
    inner: Mutex<ProxyInner>,
    fences: ReachabilityFences,
}

impl ForeignProxy {
    /// Wrap `handle`, registering `release` if the handle owns its memory.
    pub fn new<F>(
        cleaner: &ManualCleaner,
        kind: &'static str,
        handle: ForeignHandle,
        release: F,
    ) -> Self
    where
        F: FnOnce(HandleAddress) -> Result<(), ReleaseError> + Send + 'static,
    {
        let registration = cleaner.register_release(kind, handle, release);
        Self::from_parts(kind, handle.address(), registration)
    }

    pub fn owned<F>(
        cleaner: &ManualCleaner,
        kind: &'static str,
        address: impl Into<HandleAddress>,
        release: F,
    ) -> Self
    where
        F: FnOnce(HandleAddress) -> Result<(), ReleaseError> + Send + 'static,
    {
        Self::new(cleaner, kind, ForeignHandle::owned(address), release)
    }

    /// Owning proxy whose release targets the most-derived object.
    ///
    /// Releasing a derived object through its base address is undefined in
    /// the foreign runtime, so the subtype's own address and release
    /// function are registered instead. A null subtype address fails with
    /// [`LifetimeError::NullAddress`] rather than producing a proxy that
    /// is never released.
    pub fn with_subtype_release<F>(
        cleaner: &ManualCleaner,
        kind: &'static str,
        address: impl Into<HandleAddress>,
        subtype_address: impl Into<HandleAddress>,
        release: F,
    ) -> LifetimeResult<Self>
    where
        F: FnOnce(HandleAddress) -> Result<(), ReleaseError> + Send + 'static,
    {
        let address = address.into();
        let subtype_address = subtype_address.into();
        if subtype_address.is_null() {
            return Err(LifetimeError::NullAddress);
        }
        let registration =
            cleaner.register_release(kind, ForeignHandle::owned(subtype_address), release);
        Ok(Self::from_parts(kind, address, registration))
    }

    pub fn borrowed(kind: &'static str, address: impl Into<HandleAddress>) -> Self {
        Self::from_parts(kind, address.into(), None)
    }

    fn from_parts(
        kind: &'static str,
        address: HandleAddress,
        registration: Option<Registration>,
    ) -> Self {
        let state = if registration.is_some() {
            ProxyState::Owned
        } else {
            ProxyState::Borrowed
        };
        Self {
            kind,
            inner: Mutex::new(ProxyInner {
                address,
                state,
                registration,
            }),
            fences: ReachabilityFences::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Foreign address, or null once deleted or transferred.
    pub fn address(&self) -> HandleAddress {
        self.inner.lock().address
    }

    pub fn state(&self) -> ProxyState {
        self.inner.lock().state
    }

    pub fn owns_memory(&self) -> bool {
        self.state() == ProxyState::Owned
    }

    /// Release the foreign object now.
    ///
    /// Calling it again, or on a borrowed proxy, only clears the address.
    pub fn delete(&self) -> LifetimeResult<()> {
        let registration = {
            let mut inner = self.inner.lock();
            if inner.address.is_null() {
                return Ok(());
            }
            inner.address = HandleAddress::NULL;
            if inner.state == ProxyState::Owned {
                inner.state = ProxyState::Deleted;
            }
            inner.registration.take()
        };

        match registration {
            Some(registration) => registration.release_now(),
            None => Ok(()),
        }
    }

    /// Hand ownership to the foreign side and return the address.
    ///
    /// The proxy stops referring to the object afterwards.
    pub fn release_ownership(&self) -> LifetimeResult<HandleAddress> {
        let mut inner = self.inner.lock();
        if inner.state != ProxyState::Owned {
            return Err(LifetimeError::NotOwner {
                address: inner.address,
            });
        }
        if let Some(mut registration) = inner.registration.take() {
            registration.prevent();
        }
        inner.state = ProxyState::Transferred;
        Ok(std::mem::replace(&mut inner.address, HandleAddress::NULL))
    }

    /// Borrowed proxy for a sub-object that keeps `self` reachable.
    pub fn view(
        self: &Arc<Self>,
        extender: &LifetimeExtender,
        kind: &'static str,
        address: impl Into<HandleAddress>,
    ) -> LifetimeResult<Arc<ForeignProxy>> {
        let view = Arc::new(ForeignProxy::borrowed(kind, address));
        extender.extend(view.as_ref(), self)?;
        Ok(view)
    }

    /// Scoped view for a sub-object, tied to this proxy's borrow.
    pub fn borrow_view(
        &self,
        kind: &'static str,
        address: impl Into<HandleAddress>,
    ) -> LifetimeResult<ForeignView<'_>> {
        if !self.is_live() {
            return Err(LifetimeError::DeadDependency);
        }
        Ok(ForeignView::new(self, kind, address.into()))
    }
}

impl Fenced for ForeignProxy {
    fn fences(&self) -> &ReachabilityFences {
        &self.fences
    }

    fn is_live(&self) -> bool {
        !self.inner.lock().address.is_null()
    }
}

impl fmt::Debug for ForeignProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ForeignProxy")
            .field("kind", &self.kind)
            .field("address", &inner.address)
            .field("state", &inner.state)
            .field("fences", &self.fences.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockNativeHeap;

    #[test]
    fn test_owned_proxy_released_after_drain() {
        let heap = Arc::new(MockNativeHeap::new());
        let cleaner = ManualCleaner::new();
        let address = heap.allocate();

        let proxy = ForeignProxy::owned(&cleaner, "DM", address, heap.releaser());
        assert!(proxy.owns_memory());
        assert_eq!(proxy.address(), address);

        drop(proxy);
        assert!(heap.is_live(address));
        cleaner.cleanup_unreachable().unwrap();
        assert!(!heap.is_live(address));
        assert_eq!(heap.release_count(address), 1);
    }

    #[test]
    fn test_borrowed_proxy_never_releases() {
        let cleaner = ManualCleaner::new();
        let proxy = ForeignProxy::borrowed("SX", 0x900usize);
        assert_eq!(proxy.state(), ProxyState::Borrowed);
        drop(proxy);
        assert_eq!(cleaner.cleanup_unreachable(), Ok(0));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let heap = Arc::new(MockNativeHeap::new());
        let cleaner = ManualCleaner::new();
        let address = heap.allocate();
        let proxy = ForeignProxy::owned(&cleaner, "Function", address, heap.releaser());

        proxy.delete().unwrap();
        assert_eq!(proxy.state(), ProxyState::Deleted);
        assert!(proxy.address().is_null());
        proxy.delete().unwrap();

        drop(proxy);
        cleaner.cleanup_unreachable().unwrap();
        assert_eq!(heap.release_count(address), 1);
        assert_eq!(heap.double_frees(), 0);
    }

    #[test]
    fn test_release_ownership_prevents_cleanup() {
        let heap = Arc::new(MockNativeHeap::new());
        let cleaner = ManualCleaner::new();
        let address = heap.allocate();
        let proxy = ForeignProxy::owned(&cleaner, "Sparsity", address, heap.releaser());

        assert_eq!(proxy.release_ownership(), Ok(address));
        assert_eq!(proxy.state(), ProxyState::Transferred);
        assert_eq!(cleaner.live(), 0);

        drop(proxy);
        cleaner.cleanup_unreachable().unwrap();
        assert!(heap.is_live(address));
    }

    #[test]
    fn test_release_ownership_requires_owner() {
        let proxy = ForeignProxy::borrowed("MX", 0x40usize);
        assert_eq!(
            proxy.release_ownership(),
            Err(LifetimeError::NotOwner {
                address: HandleAddress::new(0x40)
            })
        );
    }

    #[test]
    fn test_subtype_release_targets_derived_address() {
        let heap = Arc::new(MockNativeHeap::new());
        let cleaner = ManualCleaner::new();
        let derived = heap.allocate();
        let base = heap.interior(derived, 1);

        let proxy =
            ForeignProxy::with_subtype_release(&cleaner, "Linsol", base, derived, heap.releaser())
                .unwrap();
        assert_eq!(proxy.address(), base);
        assert_eq!(proxy.state(), ProxyState::Owned);

        drop(proxy);
        cleaner.cleanup_unreachable().unwrap();
        assert_eq!(heap.release_count(derived), 1);
    }

    #[test]
    fn test_subtype_release_rejects_null_address() {
        let heap = Arc::new(MockNativeHeap::new());
        let cleaner = ManualCleaner::new();
        let base = heap.allocate();

        let result = ForeignProxy::with_subtype_release(
            &cleaner,
            "Linsol",
            base,
            HandleAddress::NULL,
            heap.releaser(),
        );
        assert!(matches!(result, Err(LifetimeError::NullAddress)));
        assert_eq!(cleaner.live(), 0);
    }

    #[test]
    fn test_view_of_dead_container_fails() {
        let heap = Arc::new(MockNativeHeap::new());
        let cleaner = ManualCleaner::new();
        let extender = LifetimeExtender::new();
        let container = Arc::new(ForeignProxy::owned(
            &cleaner,
            "StdVectorSX",
            heap.allocate(),
            heap.releaser(),
        ));
        container.delete().unwrap();

        assert_eq!(
            container.view(&extender, "SX", 0x10usize).unwrap_err(),
            LifetimeError::DeadDependency
        );
        assert!(matches!(
            container.borrow_view("SX", 0x10usize),
            Err(LifetimeError::DeadDependency)
        ));
    }

    #[test]
    fn test_borrow_view_of_live_proxy() {
        let heap = Arc::new(MockNativeHeap::new());
        let cleaner = ManualCleaner::new();
        let proxy = ForeignProxy::owned(&cleaner, "DM", heap.allocate(), heap.releaser());
        let element = heap.interior(proxy.address(), 3);

        let view = proxy.borrow_view("double", element).unwrap();
        assert_eq!(view.address(), element);
        assert_eq!(view.kind(), "double");
    }
}
