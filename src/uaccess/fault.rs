//! User access fault handling
//!
//! A validation is a point-in-time answer. Between the check and the kernel's
//! dereference another thread may unmap or reprotect the range. What happens
//! then depends on the protection hardware:
//!
//! - **MMU** (`TrapAndStub`): the data abort is caught, the faulting load
//!   yields zero, the faulting store is dropped, and the thread's `FaultFlag`
//!   is raised. At syscall return the flag turns the result into `EFAULT`.
//! - **MPU/NOMMU** (`LockedWindow`): nothing can be stubbed. A remap mid-access
//!   would silently hit reassigned memory rather than trap, so correctness
//!   rests entirely on the access lock pinning the address space for the
//!   whole window. A kernel-mode fault here is fatal.
//!
//! The strategy is chosen once by cargo feature through `ActiveFaultModel`.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::error::Errno;

/// Per-thread sticky fault bit, set only from the trap path.
#[derive(Debug, Default)]
pub struct FaultFlag(AtomicBool);

impl FaultFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Record a stubbed fault.
    #[inline]
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Read and clear the flag.
    #[inline]
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Direction of the faulting kernel access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAccess {
    Read,
    Write,
}

/// How the trap path neutralises a faulting user access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubAction {
    /// The load completes with zero.
    ReadZero,
    /// The store is dropped.
    DiscardWrite,
}

/// Hardware fault strategy.
pub trait FaultModel {
    const NAME: &'static str;

    /// Whether faulting user accesses are survivable.
    const STUBS_FAULTS: bool;

    /// Trap path: decide how to neutralise a faulting user access, recording
    /// it in `flag`. `None` means the fault cannot be survived.
    fn stub(flag: &FaultFlag, access: FaultAccess) -> Option<StubAction>;

    /// Syscall return path: reconcile `rval` with faults recorded during the
    /// call. Always leaves the flag clear.
    fn complete(flag: &FaultFlag, rval: isize) -> isize;
}

/// MMU strategy: trap, stub, report at return.
#[derive(Debug, Clone, Copy)]
pub struct TrapAndStub;

impl FaultModel for TrapAndStub {
    const NAME: &'static str = "trap-and-stub";
    const STUBS_FAULTS: bool = true;

    fn stub(flag: &FaultFlag, access: FaultAccess) -> Option<StubAction> {
        flag.raise();
        Some(match access {
            FaultAccess::Read => StubAction::ReadZero,
            FaultAccess::Write => StubAction::DiscardWrite,
        })
    }

    fn complete(flag: &FaultFlag, rval: isize) -> isize {
        if flag.take() {
            log::debug!(target: "uaccess", "stubbed fault overrides result {}", rval);
            Errno::EFAULT.as_sysret()
        } else {
            rval
        }
    }
}

/// MPU/NOMMU strategy: the access lock is the only protection.
#[derive(Debug, Clone, Copy)]
pub struct LockedWindow;

impl FaultModel for LockedWindow {
    const NAME: &'static str = "locked-window";
    const STUBS_FAULTS: bool = false;

    fn stub(_flag: &FaultFlag, _access: FaultAccess) -> Option<StubAction> {
        None
    }

    fn complete(flag: &FaultFlag, rval: isize) -> isize {
        // Nothing on this path raises the flag.
        debug_assert!(!flag.is_raised());
        flag.take();
        rval
    }
}

#[cfg(feature = "mpu")]
pub type ActiveFaultModel = LockedWindow;

#[cfg(not(feature = "mpu"))]
pub type ActiveFaultModel = TrapAndStub;
