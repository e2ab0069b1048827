//! Virtual Address Type
//!
//! Userspace addresses arrive as raw register values. `VirtAddr` wraps them so
//! range arithmetic is always overflow-checked and never silently wraps into
//! kernel space.

use core::fmt;

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;

/// A virtual memory address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(usize);

impl VirtAddr {
    /// The null address.
    pub const NULL: Self = Self(0);

    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Add an offset, failing on overflow.
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Distance from `self` up to `end`, or zero if `end` is below.
    #[inline]
    pub const fn distance_to(self, end: Self) -> usize {
        end.0.saturating_sub(self.0)
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
