//! Memory management module
//!
//! Provides:
//! - Overflow-checked virtual address type
//! - Per-task region table describing accessible userspace
//!
//! Page table construction and frame allocation live with the platform
//! port; the syscall layer only needs to know what a task may touch.

pub mod address;
pub mod region;

pub use address::{VirtAddr, PAGE_SIZE};
pub use region::{AddressSpace, Prot, Region, RegionError, RegionTable};
