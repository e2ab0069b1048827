//! Task Capabilities
//!
//! Coarse per-task permission bits gating privileged operations.
//!
//! # Design
//! - Each task carries a `Capability` set fixed at creation
//! - Syscall handlers query the calling task through `Task::has_capability`

pub mod capability;

pub use capability::{require, Capability};
