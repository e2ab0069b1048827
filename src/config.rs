//! Kernel configuration
//!
//! Compile-time limits for the syscall layer plus a small set of runtime
//! switches.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::LevelFilter;

/// Maximum number of descriptors accepted by readv/writev/preadv/pwritev.
pub const IOV_MAX: usize = 1024;

/// Descriptors processed per batch by the scatter/gather engine.
pub const IOV_BATCH: usize = 16;

/// Maximum path length, including the terminating NUL.
pub const PATH_MAX: usize = 4096;

/// Capacity of a task's region table.
pub const MAX_REGIONS: usize = 32;

/// Runtime configuration.
#[derive(Debug)]
pub struct KernelConfig {
    trace_syscalls: AtomicBool,
    log_level: AtomicUsize,
}

impl KernelConfig {
    const fn new() -> Self {
        Self {
            trace_syscalls: AtomicBool::new(false),
            log_level: AtomicUsize::new(LevelFilter::Info as usize),
        }
    }

    /// Whether every syscall entry and return is traced.
    pub fn trace_syscalls(&self) -> bool {
        self.trace_syscalls.load(Ordering::Relaxed)
    }

    pub fn set_trace_syscalls(&self, on: bool) {
        self.trace_syscalls.store(on, Ordering::Relaxed);
    }

    pub fn log_level(&self) -> LevelFilter {
        match self.log_level.load(Ordering::Relaxed) {
            0 => LevelFilter::Off,
            1 => LevelFilter::Error,
            2 => LevelFilter::Warn,
            3 => LevelFilter::Info,
            4 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    pub fn set_log_level(&self, level: LevelFilter) {
        self.log_level.store(level as usize, Ordering::Relaxed);
        log::set_max_level(level);
    }
}

static KERNEL_CONFIG: KernelConfig = KernelConfig::new();

pub fn get() -> &'static KernelConfig {
    &KERNEL_CONFIG
}
