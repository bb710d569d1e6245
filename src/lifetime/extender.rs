//! Lifetime extension between proxies
//!
//! When a foreign call returns a view into memory owned by a container
//! (an element of a vector, a row of a matrix), the view must not outlive
//! the container. [`LifetimeExtender::extend`] makes the view hold a strong
//! reference to the container; the container can only become unreachable
//! after the view has been dropped.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{LifetimeError, LifetimeResult};
use crate::handle::HandleAddress;

/// Strong references a dependent object keeps to its dependencies.
///
/// The fences do nothing except exist; they are released when the
/// dependent is dropped.
#[derive(Default)]
pub struct ReachabilityFences {
    held: Mutex<Vec<Arc<dyn Any + Send + Sync>>>,
}

impl ReachabilityFences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hold(&self, dependency: Arc<dyn Any + Send + Sync>) {
        self.held.lock().push(dependency);
    }

    pub fn len(&self) -> usize {
        self.held.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ReachabilityFences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReachabilityFences")
            .field("held", &self.len())
            .finish()
    }
}

/// Objects that can carry reachability fences.
pub trait Fenced {
    fn fences(&self) -> &ReachabilityFences;

    /// Whether the object still refers to a live foreign resource.
    fn is_live(&self) -> bool {
        true
    }
}

/// Records "`dependency` stays reachable while `dependent` is".
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tether::lifetime::{Fenced, LifetimeExtender, ReachabilityFences};
///
/// #[derive(Default)]
/// struct Node {
///     fences: ReachabilityFences,
/// }
///
/// impl Fenced for Node {
///     fn fences(&self) -> &ReachabilityFences {
///         &self.fences
///     }
/// }
///
/// let extender = LifetimeExtender::new();
/// let container = Arc::new(Node::default());
/// let view = Node::default();
///
/// extender.extend(&view, &container).unwrap();
/// assert_eq!(Arc::strong_count(&container), 2);
///
/// drop(view);
/// assert_eq!(Arc::strong_count(&container), 1);
/// ```
#[derive(Debug, Default)]
pub struct LifetimeExtender {
    links: AtomicUsize,
}

impl LifetimeExtender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defer `dependency`'s release until `dependent` is dropped.
    ///
    /// Ownership is not changed: `dependency` keeps its own registration.
    ///
    /// Links must form a forest. An object linked to itself is rejected;
    /// longer cycles are not detected and keep every object on the cycle
    /// alive forever, so their resources are never released.
    pub fn extend<D, T>(&self, dependent: &D, dependency: &Arc<T>) -> LifetimeResult<()>
    where
        D: Fenced + ?Sized,
        T: Fenced + Send + Sync + 'static,
    {
        if std::ptr::addr_eq(dependent as *const D, Arc::as_ptr(dependency)) {
            return Err(LifetimeError::SelfDependency);
        }
        if !dependency.is_live() {
            return Err(LifetimeError::DeadDependency);
        }
        dependent
            .fences()
            .hold(Arc::clone(dependency) as Arc<dyn Any + Send + Sync>);
        self.links.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Number of links created so far
    pub fn links(&self) -> usize {
        self.links.load(Ordering::Relaxed)
    }
}

/// A non-owning view into a container, checked by the borrow checker.
///
/// The alternative to [`LifetimeExtender`] when the view does not need to
/// be shared: the container cannot be dropped while the view exists.
#[derive(Debug, Clone, Copy)]
pub struct ForeignView<'a> {
    kind: &'static str,
    address: HandleAddress,
    _container: PhantomData<&'a ()>,
}

impl<'a> ForeignView<'a> {
    pub fn new<C: ?Sized>(_container: &'a C, kind: &'static str, address: HandleAddress) -> Self {
        Self {
            kind,
            address,
            _container: PhantomData,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn address(&self) -> HandleAddress {
        self.address
    }
}
