//! Foreign handles: addresses of resources owned by an allocator outside Rust.

use std::fmt;

/// Address of a resource in the foreign runtime.
///
/// The value is opaque to this crate; it is only ever handed back to the
/// foreign `release` function it came from. Zero means "no object".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct HandleAddress(usize);

impl HandleAddress {
    pub const NULL: HandleAddress = HandleAddress(0);

    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn as_usize(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl From<usize> for HandleAddress {
    fn from(raw: usize) -> Self {
        Self(raw)
    }
}

impl fmt::Display for HandleAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A foreign address plus the ownership flag that decides who releases it.
///
/// An owning handle must be released exactly once, and only by this side.
/// A borrowed handle is never released by this side.
///
/// # Examples
///
/// ```
/// use tether::handle::ForeignHandle;
///
/// let owned = ForeignHandle::owned(0x7f00usize);
/// assert!(owned.owns_memory());
///
/// let view = ForeignHandle::borrowed(0x7f08usize);
/// assert!(!view.owns_memory());
/// assert!(ForeignHandle::null().is_null());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForeignHandle {
    address: HandleAddress,
    owns_memory: bool,
}

impl ForeignHandle {
    pub fn new(address: impl Into<HandleAddress>, owns_memory: bool) -> Self {
        Self {
            address: address.into(),
            owns_memory,
        }
    }

    pub fn owned(address: impl Into<HandleAddress>) -> Self {
        Self::new(address, true)
    }

    pub fn borrowed(address: impl Into<HandleAddress>) -> Self {
        Self::new(address, false)
    }

    pub const fn null() -> Self {
        Self {
            address: HandleAddress::NULL,
            owns_memory: false,
        }
    }

    pub fn address(&self) -> HandleAddress {
        self.address
    }

    pub fn owns_memory(&self) -> bool {
        self.owns_memory
    }

    pub fn is_null(&self) -> bool {
        self.address.is_null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_address_is_zero() {
        assert!(HandleAddress::NULL.is_null());
        assert_eq!(HandleAddress::default(), HandleAddress::NULL);
        assert!(!HandleAddress::new(8).is_null());
    }

    #[test]
    fn address_displays_as_hex() {
        assert_eq!(HandleAddress::new(255).to_string(), "0xff");
    }

    #[test]
    fn null_handle_never_owns() {
        let handle = ForeignHandle::null();
        assert!(handle.is_null());
        assert!(!handle.owns_memory());
    }
}
