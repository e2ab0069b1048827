//! Task Address Space Regions
//!
//! A task's userspace is described by a small set of regions, each a
//! half-open range `[start, end)` with access permissions. On MMU targets the
//! table mirrors the VMAs backing the page tables; on MPU/NOMMU targets it is
//! the protection map itself.
//!
//! # Design
//! - Fixed-size array of region slots, no allocation
//! - Slots are guarded by a reader/writer spinlock so validation (readers)
//!   never observes a half-updated region
//! - Regions never overlap and always lie inside the userspace bounds

use bitflags::bitflags;
use spin::RwLock;

use super::address::VirtAddr;
use crate::config::MAX_REGIONS;

bitflags! {
    /// Access permissions of a region, and the permission requested by a
    /// validation.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct Prot: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

/// One mapped region of a task's address space.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Region {
    pub start: VirtAddr,
    pub end: VirtAddr,
    pub prot: Prot,
}

impl Region {
    /// An empty region slot.
    pub const fn empty() -> Self {
        Self {
            start: VirtAddr::NULL,
            end: VirtAddr::NULL,
            prot: Prot::empty(),
        }
    }

    /// Create a region covering `len` bytes from `start`.
    pub const fn new(start: usize, len: usize, prot: Prot) -> Self {
        Self {
            start: VirtAddr::new(start),
            end: VirtAddr::new(start.saturating_add(len)),
            prot,
        }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.start.as_usize() >= self.end.as_usize()
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.start.distance_to(self.end)
    }

    #[inline]
    pub fn contains(&self, addr: VirtAddr) -> bool {
        self.start <= addr && addr < self.end
    }

    #[inline]
    pub fn overlaps(&self, other: &Region) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// The per-task address-space descriptor queried by pointer validation.
///
/// # Safety
/// Every region reported by `region_at` must be backed by memory the kernel
/// can access with the region's permissions while the task's access lock is
/// held. Validation dereferences what this trait reports.
pub unsafe trait AddressSpace: Sync {
    /// Userspace bounds `[start, end)` of this task.
    fn user_bounds(&self) -> (VirtAddr, VirtAddr);

    /// The mapped region containing `addr`, if any.
    fn region_at(&self, addr: VirtAddr) -> Option<Region>;
}

/// Error type for region table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionError {
    /// Empty range, or range outside userspace bounds.
    InvalidRange,
    /// The range overlaps an existing region.
    Overlap,
    /// No region starts at the given address.
    NotMapped,
    /// Every slot is in use.
    Full,
}

impl core::fmt::Display for RegionError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidRange => write!(f, "invalid region range"),
            Self::Overlap => write!(f, "region overlaps an existing mapping"),
            Self::NotMapped => write!(f, "no region at address"),
            Self::Full => write!(f, "region table full"),
        }
    }
}

/// Fixed-capacity region table for one task.
#[derive(Debug)]
pub struct RegionTable {
    bounds: (VirtAddr, VirtAddr),
    slots: RwLock<[Region; MAX_REGIONS]>,
}

impl RegionTable {
    /// Create an empty table for a task whose userspace spans `[start, end)`.
    pub const fn new(start: usize, end: usize) -> Self {
        const EMPTY: Region = Region::empty();
        Self {
            bounds: (VirtAddr::new(start), VirtAddr::new(end)),
            slots: RwLock::new([EMPTY; MAX_REGIONS]),
        }
    }

    fn in_bounds(&self, region: &Region) -> bool {
        !region.is_empty() && region.start >= self.bounds.0 && region.end <= self.bounds.1
    }

    /// Map a new region.
    ///
    /// On MPU/NOMMU targets callers must hold the owning task's access lock
    /// (`AccessLock::lock_for_remap`).
    ///
    /// # Safety
    /// `[region.start, region.end)` must be backed by kernel-accessible memory
    /// allowing `region.prot` until it is unmapped.
    pub unsafe fn map(&self, region: Region) -> Result<(), RegionError> {
        if !self.in_bounds(&region) {
            return Err(RegionError::InvalidRange);
        }
        let mut slots = self.slots.write();
        if slots
            .iter()
            .any(|r| !r.is_empty() && r.overlaps(&region))
        {
            return Err(RegionError::Overlap);
        }
        let free = slots
            .iter_mut()
            .find(|r| r.is_empty())
            .ok_or(RegionError::Full)?;
        *free = region;
        Ok(())
    }

    /// Remove the region starting at `start`, returning it.
    pub fn unmap(&self, start: VirtAddr) -> Result<Region, RegionError> {
        let mut slots = self.slots.write();
        let slot = slots
            .iter_mut()
            .find(|r| !r.is_empty() && r.start == start)
            .ok_or(RegionError::NotMapped)?;
        Ok(core::mem::replace(slot, Region::empty()))
    }

    /// Change the permissions of the region starting at `start`.
    ///
    /// # Safety
    /// The backing memory must allow the new `prot`.
    pub unsafe fn protect(&self, start: VirtAddr, prot: Prot) -> Result<(), RegionError> {
        let mut slots = self.slots.write();
        let slot = slots
            .iter_mut()
            .find(|r| !r.is_empty() && r.start == start)
            .ok_or(RegionError::NotMapped)?;
        slot.prot = prot;
        Ok(())
    }

    /// Number of mapped regions.
    pub fn count(&self) -> usize {
        self.slots.read().iter().filter(|r| !r.is_empty()).count()
    }
}

// SAFETY: regions only enter the table through `map`/`protect`, whose
// callers vouch for the backing memory.
unsafe impl AddressSpace for RegionTable {
    fn user_bounds(&self) -> (VirtAddr, VirtAddr) {
        self.bounds
    }

    fn region_at(&self, addr: VirtAddr) -> Option<Region> {
        self.slots
            .read()
            .iter()
            .find(|r| !r.is_empty() && r.contains(addr))
            .copied()
    }
}
