//! Capability bits and checks.

use bitflags::bitflags;

use crate::error::{Errno, KResult};
use crate::task::Task;

bitflags! {
    /// Capabilities that can be held by a task.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct Capability: u32 {
        /// Administrative operations: mount, umount, reboot.
        const ADMIN = 1 << 0;
        /// Set the system clock.
        const SYS_TIME = 1 << 1;
        /// Signal tasks owned by other users.
        const KILL = 1 << 2;
        /// Raw device and port I/O.
        const RAW_IO = 1 << 3;
    }
}

/// Fail with `EPERM` unless the calling task holds `cap`.
pub fn require(task: &dyn Task, cap: Capability) -> KResult<()> {
    if task.has_capability(cap) {
        Ok(())
    } else {
        log::debug!(target: "cap", "task {} lacks {:?}", task.pid(), cap);
        Err(Errno::EPERM)
    }
}
