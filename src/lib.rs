//! Ocelot - userspace access layer for a small-footprint POSIX kernel
//!
//! The part of the kernel that stands between a syscall trap and the
//! filesystem: every pointer a task hands the kernel is validated against the
//! task's region table inside a locked access window before it is touched.
//!
//! # Security Features
//! - Table-driven syscall dispatch, ENOSYS for anything not listed
//! - Validated user views that cannot outlive their access window
//! - Scatter/gather I/O in bounded batches with POSIX partial-transfer results
//! - Capability checks for administrative calls
//! - Late user access faults stubbed and reported as EFAULT (MMU targets)
//! - User memory copied through fault-fixup helpers, never borrowed
//!
//! # Architecture
//! - Target: AArch64 kernels running AArch32 EABI tasks; AArch64 SVCs get
//!   ENOSYS
//! - Hardware protection model chosen at build time: `mmu` (default) or `mpu`
//! - The embedding kernel provides the `task::Task` and `fs::FileSystem`
//!   collaborators

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod abi;
pub mod cap;
pub mod config;
pub mod error;
pub mod exception;
pub mod fs;
pub mod klog;
pub mod mm;
pub mod syscall;
pub mod task;
pub mod uaccess;

#[cfg(test)]
mod testing;

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
