//! User access lock
//!
//! Keeps a task's address space immobile while the kernel validates and then
//! dereferences user pointers. One lock exists per task; it is created with
//! the task and dropped with it.
//!
//! # Acquisition
//! - `lock_interruptible` spins until the lock is free, abandoning the wait
//!   with `EINTR` as soon as a signal is pending. An interrupted wait never
//!   holds the lock.
//! - `lock_for_remap` is the uninterruptible form used by the memory manager
//!   before it changes a task's mappings on MPU/NOMMU targets.
//! - Release happens when the `AccessGuard` is dropped, on every exit path.

use core::sync::atomic::{AtomicUsize, Ordering};

use spin::{Mutex, MutexGuard};

use crate::error::{Errno, KResult};
use crate::task::Task;

/// Task-wide user access lock.
#[derive(Debug, Default)]
pub struct AccessLock {
    inner: Mutex<()>,
    interrupted: AtomicUsize,
}

/// Proof that the calling thread holds its task's access lock.
///
/// Validated user views borrow this guard, so they cannot outlive the window.
#[must_use = "dropping the guard releases the access lock"]
pub struct AccessGuard<'a> {
    _held: MutexGuard<'a, ()>,
}

impl AccessLock {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(()),
            interrupted: AtomicUsize::new(0),
        }
    }

    /// Acquire the lock, giving up with `EINTR` if `signal_pending` reports a
    /// signal while waiting.
    pub fn lock_interruptible<F>(&self, mut signal_pending: F) -> KResult<AccessGuard<'_>>
    where
        F: FnMut() -> bool,
    {
        loop {
            if let Some(held) = self.inner.try_lock() {
                return Ok(AccessGuard { _held: held });
            }
            if signal_pending() {
                self.interrupted.fetch_add(1, Ordering::Relaxed);
                return Err(Errno::EINTR);
            }
            core::hint::spin_loop();
        }
    }

    /// Acquire the lock without regard to signals.
    pub fn lock_for_remap(&self) -> AccessGuard<'_> {
        AccessGuard {
            _held: self.inner.lock(),
        }
    }

    pub fn try_lock(&self) -> Option<AccessGuard<'_>> {
        self.inner.try_lock().map(|held| AccessGuard { _held: held })
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Number of acquisitions abandoned because of a signal.
    pub fn interrupted_waits(&self) -> usize {
        self.interrupted.load(Ordering::Relaxed)
    }
}

impl AccessGuard<'_> {
    /// Release the lock explicitly.
    #[inline]
    pub fn end(self) {}
}

/// Acquire the calling task's access lock, interruptible by its signals.
pub fn lock(task: &dyn Task) -> KResult<AccessGuard<'_>> {
    let access = task.access_lock();
    access
        .lock_interruptible(|| task.signal_pending())
        .map_err(|err| {
            log::debug!(
                target: "uaccess",
                "task {} access wait interrupted ({} so far)",
                task.pid(),
                access.interrupted_waits()
            );
            err
        })
}

/// A conditionally held access window.
///
/// Used where only some argument shapes carry a user pointer (fcntl lock
/// commands, ioctls with a direction): the window is opened for those shapes
/// and left closed for the rest. Either way it is released when the window
/// goes out of scope, including early returns.
pub struct AccessWindow<'a> {
    guard: Option<AccessGuard<'a>>,
}

impl<'a> AccessWindow<'a> {
    /// Open the window when `needed`, otherwise return a closed one.
    pub fn begin_if(task: &'a dyn Task, needed: bool) -> KResult<Self> {
        let guard = if needed { Some(lock(task)?) } else { None };
        Ok(Self { guard })
    }

    /// The held guard, if the window is open.
    pub fn guard(&self) -> Option<&AccessGuard<'a>> {
        self.guard.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.guard.is_some()
    }

    /// Close the window.
    pub fn end(self) {}
}
