//! ARM64 Exception Handling
//!
//! Trap entry points for syscalls and user access faults.
//!
//! # Exception Levels
//! - EL0: User applications (AArch32 EABI)
//! - EL1: Kernel (where we run)
//!
//! # Handled Exception Types
//! - SVC from AArch32 EL0: enters the syscall dispatcher
//! - SVC from AArch64 EL0: ENOSYS
//! - Data abort at EL1 on a userspace address, raised by a registered user
//!   access helper: stubbed by the active `FaultModel` when it supports
//!   stubbing, fatal otherwise
//! - Aborts from EL0: the faulting task must be killed
//!
//! The assembly vector stubs save an `ExceptionContext` and call the
//! `handle_*` functions below. The kernel supplies the calling task and its
//! filesystem through `install_hooks`.

use spin::Once;

use crate::error::Errno;
use crate::fs::FileSystem;
use crate::syscall::{self, validate, SyscallArgs, SyscallEnv};
use crate::task::Task;
use crate::uaccess::{
    self, search_extable, ActiveFaultModel, ExtableEntry, FaultAccess, FaultModel,
};

/// Exception context saved on the stack
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionContext {
    /// General purpose registers x0-x30
    pub gpr: [u64; 31],
    /// Exception Link Register (return address)
    pub elr: u64,
    /// Saved Program Status Register
    pub spsr: u64,
    /// Exception Syndrome Register
    pub esr: u64,
    /// Fault Address Register
    pub far: u64,
}

/// Exception class extracted from ESR_EL1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionClass {
    Unknown = 0x00,
    SvcAarch32 = 0x11,
    SvcAarch64 = 0x15,
    InstructionAbortLowerEl = 0x20,
    InstructionAbortSameEl = 0x21,
    DataAbortLowerEl = 0x24,
    DataAbortSameEl = 0x25,
    Other = 0xFF,
}

impl From<u64> for ExceptionClass {
    fn from(esr: u64) -> Self {
        let ec = ((esr >> 26) & 0x3F) as u8;
        match ec {
            0x00 => ExceptionClass::Unknown,
            0x11 => ExceptionClass::SvcAarch32,
            0x15 => ExceptionClass::SvcAarch64,
            0x20 => ExceptionClass::InstructionAbortLowerEl,
            0x21 => ExceptionClass::InstructionAbortSameEl,
            0x24 => ExceptionClass::DataAbortLowerEl,
            0x25 => ExceptionClass::DataAbortSameEl,
            _ => ExceptionClass::Other,
        }
    }
}

/// Direction of a data abort, from the WnR bit of ESR_EL1.
///
/// WnR is reported whether or not the instruction syndrome is valid, so it
/// also covers pair and SIMD accesses.
pub fn abort_access(esr: u64) -> FaultAccess {
    if esr & (1 << 6) != 0 {
        FaultAccess::Write
    } else {
        FaultAccess::Read
    }
}

/// What the trap return path must do with the interrupted context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    /// Resume at `ctx.elr`.
    Resume,
    /// The current task cannot continue and must be killed.
    KillTask,
}

/// Kernel services the trap entry points need.
pub struct TrapHooks {
    /// The task running on this CPU, if any.
    pub current_task: fn() -> Option<&'static dyn Task>,
    pub filesystem: &'static dyn FileSystem,
}

static HOOKS: Once<TrapHooks> = Once::new();

/// Register the kernel's trap hooks. Later calls are ignored.
pub fn install_hooks(hooks: TrapHooks) {
    HOOKS.call_once(|| hooks);
}

/// Install the exception vector table.
///
/// # Safety
/// `vectors` must be the address of a 2KB-aligned vector table whose entries
/// save an `ExceptionContext` and call the handlers in this module. Must be
/// called once at EL1 during kernel initialization.
#[cfg(target_arch = "aarch64")]
pub unsafe fn install_vectors(vectors: usize) {
    // SAFETY: writing VBAR_EL1 is valid at EL1; the caller vouches for the
    // table.
    unsafe {
        core::arch::asm!(
            "msr vbar_el1, {v}",
            "isb",
            v = in(reg) vectors as u64,
            options(nostack, preserves_flags)
        );
    }
    log::info!(target: "exception", "vectors installed at {:#x}", vectors);
}

/// Service a syscall trap: decode number and arguments, dispatch, and store
/// the result in r0.
///
/// Tasks use the AArch32 EABI: number in r7, arguments in r0-r6, each a
/// 32-bit word. The upper halves of the saved X registers are not part of
/// the call. AArch64 tasks would need their own numbering and argument
/// layout, neither of which exists, so their SVCs fail with ENOSYS.
pub fn handle_svc(
    ctx: &mut ExceptionContext,
    class: ExceptionClass,
    task: &dyn Task,
    fs: &dyn FileSystem,
) {
    if class != ExceptionClass::SvcAarch32 {
        log::warn!(
            target: "exception",
            "task {} AArch64 syscall {} rejected",
            task.pid(),
            ctx.gpr[8]
        );
        ctx.gpr[0] = Errno::ENOSYS.as_sysret() as u64;
        return;
    }

    let mut raw = [0usize; 7];
    for (slot, reg) in raw.iter_mut().zip(ctx.gpr.iter()) {
        *slot = *reg as u32 as usize;
    }
    let args = SyscallArgs::new(ctx.gpr[7] as u32 as usize, &raw);
    let ret = syscall::dispatch(&SyscallEnv::new(task, fs), &args);
    ctx.gpr[0] = ret as u32 as u64;
}

/// Try to stub a kernel-mode data abort under fault model `M`, using the
/// image's exception table.
pub fn stub_kernel_abort<M: FaultModel>(ctx: &mut ExceptionContext, task: &dyn Task) -> bool {
    stub_user_access::<M>(ctx, task, uaccess::extable())
}

/// Try to stub a kernel-mode data abort raised by one of the user access
/// helpers listed in `table`.
///
/// Only aborts on userspace addresses at a registered access instruction
/// are candidates. The fault is recorded in the task's fault flag and
/// execution resumes at the helper's fixup, which yields zero for a load
/// and skips a store. Returns `false` if the abort was not stubbed.
pub fn stub_user_access<M: FaultModel>(
    ctx: &mut ExceptionContext,
    task: &dyn Task,
    table: &[ExtableEntry],
) -> bool {
    if !M::STUBS_FAULTS {
        return false;
    }
    if ExceptionClass::from(ctx.esr) != ExceptionClass::DataAbortSameEl {
        return false;
    }
    if !validate::address_in_userspace(task.address_space(), ctx.far as usize) {
        return false;
    }
    let fixup = match search_extable(table, ctx.elr as usize) {
        Some(fixup) => fixup,
        None => return false,
    };

    let access = abort_access(ctx.esr);
    if M::stub(task.fault_flag(), access).is_none() {
        return false;
    }
    log::trace!(
        target: "exception",
        "stubbed {:?} fault at {:#x}, pc {:#x} -> {:#x}",
        access,
        ctx.far,
        ctx.elr,
        fixup
    );
    ctx.elr = fixup as u64;
    true
}

/// Handle a synchronous exception from EL0.
pub fn handle_lower_el(
    ctx: &mut ExceptionContext,
    task: &dyn Task,
    fs: &dyn FileSystem,
) -> TrapOutcome {
    let ec = ExceptionClass::from(ctx.esr);
    match ec {
        ExceptionClass::SvcAarch32 | ExceptionClass::SvcAarch64 => {
            handle_svc(ctx, ec, task, fs);
            TrapOutcome::Resume
        }
        ExceptionClass::DataAbortLowerEl | ExceptionClass::InstructionAbortLowerEl => {
            log::error!(
                target: "exception",
                "task {} user abort at {:#x}, ESR {:#x}",
                task.pid(),
                ctx.far,
                ctx.esr
            );
            TrapOutcome::KillTask
        }
        _ => {
            log::error!(
                target: "exception",
                "task {} unhandled exception {:?}, ESR {:#x}",
                task.pid(),
                ec,
                ctx.esr
            );
            TrapOutcome::KillTask
        }
    }
}

/// Assembly entry: synchronous exception from lower EL (user mode).
///
/// Returns nonzero when the current task must be killed.
#[no_mangle]
pub extern "C" fn handle_sync_exception_lower_el(ctx: &mut ExceptionContext) -> u64 {
    let hooks = match HOOKS.get() {
        Some(hooks) => hooks,
        None => fatal(ctx, "trap hooks not installed"),
    };
    let task = match (hooks.current_task)() {
        Some(task) => task,
        None => fatal(ctx, "user exception with no current task"),
    };
    match handle_lower_el(ctx, task, hooks.filesystem) {
        TrapOutcome::Resume => 0,
        TrapOutcome::KillTask => 1,
    }
}

/// Assembly entry: synchronous exception from current EL (kernel mode).
///
/// Survivable only when the active fault model stubs a user access.
#[no_mangle]
pub extern "C" fn handle_sync_exception_same_el(ctx: &mut ExceptionContext) {
    let task = HOOKS.get().and_then(|hooks| (hooks.current_task)());
    if let Some(task) = task {
        if stub_kernel_abort::<ActiveFaultModel>(ctx, task) {
            return;
        }
    }
    fatal(ctx, "kernel exception")
}

fn fatal(ctx: &ExceptionContext, what: &str) -> ! {
    panic!(
        "{} ({} model): EC {:?}, ESR {:#x}, ELR {:#x}, FAR {:#x}",
        what,
        ActiveFaultModel::NAME,
        ExceptionClass::from(ctx.esr),
        ctx.esr,
        ctx.elr,
        ctx.far
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::Prot;
    use crate::syscall::numbers::*;
    use crate::testing::{FakeFs, FakeTask, KERNEL_ADDR};
    use crate::uaccess::{LockedWindow, TrapAndStub};

    const EC_SHIFT: u64 = 26;
    const WNR: u64 = 1 << 6;

    /// Two helpers: a load at 0x1000 and a store at 0x2000.
    const TABLE: [ExtableEntry; 2] = [
        ExtableEntry {
            insn: 0x1000,
            fixup: 0x1008,
        },
        ExtableEntry {
            insn: 0x2000,
            fixup: 0x2004,
        },
    ];

    /// A same-EL data abort without a valid instruction syndrome, as an LDP
    /// or SIMD access reports it.
    fn abort_ctx(far: usize, pc: u64, write: bool) -> ExceptionContext {
        let mut ctx = ExceptionContext {
            esr: (0x25 << EC_SHIFT) | if write { WNR } else { 0 },
            far: far as u64,
            elr: pc,
            ..ExceptionContext::default()
        };
        ctx.gpr[0] = 0xdead;
        ctx
    }

    fn svc32(nr: usize, args: &[u64]) -> ExceptionContext {
        let mut ctx = ExceptionContext {
            esr: 0x11 << EC_SHIFT,
            ..ExceptionContext::default()
        };
        ctx.gpr[..args.len()].copy_from_slice(args);
        ctx.gpr[7] = nr as u64;
        ctx
    }

    #[test]
    fn test_decode_data_abort() {
        let esr = (0x25 << EC_SHIFT) | WNR;
        assert_eq!(ExceptionClass::from(esr), ExceptionClass::DataAbortSameEl);
        assert_eq!(abort_access(esr), FaultAccess::Write);
        assert_eq!(abort_access(0x25 << EC_SHIFT), FaultAccess::Read);
        assert_eq!(ExceptionClass::from(0x3F << EC_SHIFT), ExceptionClass::Other);
    }

    #[test]
    fn test_stubbed_load_resumes_at_fixup() {
        let task = FakeTask::new();
        let addr = task.alloc(8, Prot::READ);
        let mut ctx = abort_ctx(addr, 0x1000, false);

        assert!(stub_user_access::<TrapAndStub>(&mut ctx, &task, &TABLE));
        assert_eq!(ctx.elr, 0x1008);
        // The fixup produces the zero; no register is patched here.
        assert_eq!(ctx.gpr[0], 0xdead);
        assert!(task.fault_flag().is_raised());
        // The flag overrides whatever the syscall would have returned.
        assert_eq!(TrapAndStub::complete(task.fault_flag(), 8), Errno::EFAULT.as_sysret());
    }

    #[test]
    fn test_stubbed_store_resumes_at_fixup() {
        let task = FakeTask::new();
        let mut ctx = abort_ctx(0x4000, 0x2000, true);
        assert!(stub_user_access::<TrapAndStub>(&mut ctx, &task, &TABLE));
        assert_eq!(ctx.elr, 0x2004);
        assert!(task.fault_flag().take());
    }

    #[test]
    fn test_abort_not_stubbed() {
        let task = FakeTask::new();

        let mut kernel = abort_ctx(KERNEL_ADDR, 0x1000, false);
        assert!(!stub_user_access::<TrapAndStub>(&mut kernel, &task, &TABLE));

        // A user address touched outside the copy helpers is a kernel bug.
        let mut stray = abort_ctx(0x4000, 0x3000, false);
        assert!(!stub_user_access::<TrapAndStub>(&mut stray, &task, &TABLE));
        assert_eq!(stray.elr, 0x3000);

        let mut locked = abort_ctx(0x4000, 0x1000, false);
        assert!(!stub_user_access::<LockedWindow>(&mut locked, &task, &TABLE));
        assert_eq!(locked.elr, 0x1000);
        assert!(!task.fault_flag().is_raised());

        // Host builds register no helpers.
        let mut host = abort_ctx(0x4000, 0x1000, false);
        assert!(!stub_kernel_abort::<TrapAndStub>(&mut host, &task));
    }

    #[test]
    fn test_svc_dispatch() {
        let task = FakeTask::new();
        let fs = FakeFs::new();

        let mut ctx = svc32(SYS_GETPID, &[]);
        assert_eq!(handle_lower_el(&mut ctx, &task, &fs), TrapOutcome::Resume);
        assert_eq!(ctx.gpr[0], 42);

        // Stale upper register halves are ignored.
        let mut ctx = svc32(SYS_CLOSE, &[0xdead_beef_0000_0009]);
        ctx.gpr[7] |= 0xffff_0000_0000_0000;
        assert_eq!(handle_lower_el(&mut ctx, &task, &fs), TrapOutcome::Resume);
        assert_eq!(ctx.gpr[0], 0);
        assert_eq!(fs.calls(), ["close 9"]);

        // Errors come back as a negative 32-bit word.
        let mut ctx = svc32(SYS_CLOSE, &[0xffff_ffff]);
        handle_lower_el(&mut ctx, &task, &fs);
        assert_eq!(ctx.gpr[0], Errno::EBADF.as_sysret() as u32 as u64);
    }

    #[test]
    fn test_svc_pread64_offset_pair() {
        let task = FakeTask::new();
        let fs = FakeFs::with_file(b"hello world");
        // Host buffers sit above 4GB, so only empty reads fit in a 32-bit
        // register; the offset decoding is what matters here.
        let buf = 0x1000_0000;

        // pread64(fd, buf, count, pad, offset_lo, offset_hi)
        let mut ctx = svc32(SYS_PREAD64, &[3, buf, 0, 0, 6, 0]);
        handle_lower_el(&mut ctx, &task, &fs);
        assert_eq!(ctx.gpr[0], 0);

        let mut ctx = svc32(SYS_PREAD64, &[3, buf, 0, 0x77, 6, 1]);
        handle_lower_el(&mut ctx, &task, &fs);
        assert_eq!(ctx.gpr[0], 0);

        assert_eq!(fs.calls(), ["read 3 0 At(6)", "read 3 0 At(4294967302)"]);
    }

    #[test]
    fn test_aarch64_svc_rejected() {
        let task = FakeTask::new();
        let fs = FakeFs::new();
        let mut ctx = ExceptionContext {
            esr: 0x15 << EC_SHIFT,
            ..ExceptionContext::default()
        };
        // x8 = 57 is close on AArch64 but nothing here speaks that table.
        ctx.gpr[0] = 3;
        ctx.gpr[8] = 57;
        assert_eq!(handle_lower_el(&mut ctx, &task, &fs), TrapOutcome::Resume);
        assert_eq!(ctx.gpr[0], Errno::ENOSYS.as_sysret() as u64);
        assert!(fs.calls().is_empty());
    }

    #[test]
    fn test_user_abort_kills_task() {
        let task = FakeTask::new();
        let fs = FakeFs::new();
        let mut ctx = ExceptionContext {
            esr: 0x24 << EC_SHIFT,
            far: 0x10,
            ..ExceptionContext::default()
        };
        assert_eq!(handle_lower_el(&mut ctx, &task, &fs), TrapOutcome::KillTask);
    }
}
