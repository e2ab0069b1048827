//! Calling-task interface
//!
//! The scheduler owns tasks and threads; the syscall layer only sees the
//! calling thread through this trait.

use crate::cap::Capability;
use crate::mm::{AddressSpace, VirtAddr};
use crate::uaccess::{AccessLock, FaultFlag};

/// The calling thread and the task (process) it belongs to.
pub trait Task: Sync {
    /// The task's address-space descriptor.
    fn address_space(&self) -> &dyn AddressSpace;

    /// The task-wide user access lock, created with the task and torn down
    /// with it.
    fn access_lock(&self) -> &AccessLock;

    /// The calling thread's fault flag.
    fn fault_flag(&self) -> &FaultFlag;

    /// Whether an unblocked signal is pending for the calling thread.
    fn signal_pending(&self) -> bool;

    /// Whether the task holds `cap`.
    fn has_capability(&self, cap: Capability) -> bool;

    fn pid(&self) -> i32;

    fn ppid(&self) -> i32;

    fn tid(&self) -> i32;

    /// Set the calling thread's TLS pointer.
    fn set_tls(&self, tls: VirtAddr);
}
