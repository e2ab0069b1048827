//! Userspace Access
//!
//! The serialization and fault-recovery half of the user pointer trust
//! boundary. Validation itself lives in `syscall::validate`.
//!
//! # Rules
//! - A user pointer is dereferenced only inside an access window: the task's
//!   `AccessLock` is held from validation through the last dereference
//! - Every window is released on every exit path (`AccessGuard` drop)
//! - On MMU targets a late fault is stubbed and reported at syscall return
//! - User memory is only touched through the `copy` helpers, never through a
//!   Rust reference

pub mod copy;
mod fault;
mod lock;

pub use copy::{extable, search_extable, ExtableEntry};
pub use fault::{
    ActiveFaultModel, FaultAccess, FaultFlag, FaultModel, LockedWindow, StubAction, TrapAndStub,
};
pub use lock::{lock, AccessGuard, AccessLock, AccessWindow};
