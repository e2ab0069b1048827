//! System Call Handler
//!
//! Dispatches system calls through a static table indexed by ARM EABI
//! syscall number. Arguments follow the EABI register convention whatever
//! the kernel's own pointer width: every register is a 32-bit word and a
//! 64-bit argument occupies an even/odd register pair, low word first.
//!
//! # Table policy
//! - `Direct`: no pointer arguments and a contract matching the underlying
//!   primitive; arguments are passed straight through
//! - `Wrapped`: the handler validates every pointer argument inside an
//!   access window before calling down (see `syscall::fs`)
//! - Numbers with no entry return ENOSYS
//!
//! A validation only holds at the instant it is made. On MMU targets a later
//! fault on a validated range is stubbed by the trap path and surfaces here,
//! at syscall return, as EFAULT.

use crate::abi::{Fd, SEEK_END};
use crate::config;
use crate::error::{to_sysret, Errno, KResult};
use crate::fs::FileSystem;
use crate::mm::VirtAddr;
use crate::task::Task;
use crate::uaccess::{AccessGuard, ActiveFaultModel, FaultModel};

use super::fs::*;
use super::validate::{self, UserAccess};

/// System call numbers (ARM EABI)
pub mod numbers {
    pub const SYS_READ: usize = 3;
    pub const SYS_WRITE: usize = 4;
    pub const SYS_OPEN: usize = 5;
    pub const SYS_CLOSE: usize = 6;
    pub const SYS_UNLINK: usize = 10;
    pub const SYS_CHDIR: usize = 12;
    pub const SYS_MKNOD: usize = 14;
    pub const SYS_CHMOD: usize = 15;
    pub const SYS_LSEEK: usize = 19;
    pub const SYS_GETPID: usize = 20;
    pub const SYS_MOUNT: usize = 21;
    pub const SYS_ACCESS: usize = 33;
    pub const SYS_SYNC: usize = 36;
    pub const SYS_RENAME: usize = 38;
    pub const SYS_MKDIR: usize = 39;
    pub const SYS_RMDIR: usize = 40;
    pub const SYS_DUP: usize = 41;
    pub const SYS_PIPE: usize = 42;
    pub const SYS_UMOUNT2: usize = 52;
    pub const SYS_IOCTL: usize = 54;
    pub const SYS_UMASK: usize = 60;
    pub const SYS_DUP2: usize = 63;
    pub const SYS_GETPPID: usize = 64;
    pub const SYS_SYMLINK: usize = 83;
    pub const SYS_READLINK: usize = 85;
    pub const SYS_FCHMOD: usize = 94;
    pub const SYS_FSYNC: usize = 118;
    pub const SYS__LLSEEK: usize = 140;
    pub const SYS_READV: usize = 145;
    pub const SYS_WRITEV: usize = 146;
    pub const SYS_PREAD64: usize = 180;
    pub const SYS_PWRITE64: usize = 181;
    pub const SYS_GETCWD: usize = 183;
    pub const SYS_STAT64: usize = 195;
    pub const SYS_LSTAT64: usize = 196;
    pub const SYS_FSTAT64: usize = 197;
    pub const SYS_LCHOWN32: usize = 198;
    pub const SYS_FCHOWN32: usize = 207;
    pub const SYS_CHOWN32: usize = 212;
    pub const SYS_GETDENTS64: usize = 217;
    pub const SYS_FCNTL64: usize = 221;
    pub const SYS_GETTID: usize = 224;
    pub const SYS_STATFS64: usize = 266;
    pub const SYS_FSTATFS64: usize = 267;
    pub const SYS_OPENAT: usize = 322;
    pub const SYS_MKDIRAT: usize = 323;
    pub const SYS_MKNODAT: usize = 324;
    pub const SYS_FCHOWNAT: usize = 325;
    pub const SYS_FSTATAT64: usize = 327;
    pub const SYS_UNLINKAT: usize = 328;
    pub const SYS_RENAMEAT: usize = 329;
    pub const SYS_SYMLINKAT: usize = 331;
    pub const SYS_READLINKAT: usize = 332;
    pub const SYS_FCHMODAT: usize = 333;
    pub const SYS_FACCESSAT: usize = 334;
    pub const SYS_UTIMENSAT: usize = 348;
    pub const SYS_PIPE2: usize = 359;
    pub const SYS_PREADV: usize = 361;
    pub const SYS_PWRITEV: usize = 362;

    /// ARM private syscalls
    pub const ARM_NR_BASE: usize = 0x0f_0000;
    pub const ARM_NR_BREAKPOINT: usize = ARM_NR_BASE + 1;
    pub const ARM_NR_CACHEFLUSH: usize = ARM_NR_BASE + 2;
    pub const ARM_NR_USR26: usize = ARM_NR_BASE + 3;
    pub const ARM_NR_USR32: usize = ARM_NR_BASE + 4;
    pub const ARM_NR_SET_TLS: usize = ARM_NR_BASE + 5;
    pub const ARM_NR_GET_TLS: usize = ARM_NR_BASE + 6;
}

use numbers::*;

/// Number of slots in the syscall table.
pub const SYSCALL_TABLE_SIZE: usize = 400;

/// Raw syscall arguments as taken from the trap frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyscallArgs {
    pub nr: usize,
    pub args: [usize; 7],
}

impl SyscallArgs {
    pub fn new(nr: usize, args: &[usize]) -> Self {
        let mut all = [0usize; 7];
        let n = core::cmp::min(args.len(), all.len());
        all[..n].copy_from_slice(&args[..n]);
        Self { nr, args: all }
    }

    #[inline]
    pub fn arg(&self, index: usize) -> usize {
        self.args[index]
    }

    /// A user pointer argument.
    #[inline]
    pub fn ptr(&self, index: usize) -> usize {
        self.args[index]
    }

    #[inline]
    pub fn fd(&self, index: usize) -> Fd {
        self.args[index] as Fd
    }

    #[inline]
    pub fn int(&self, index: usize) -> i32 {
        self.args[index] as i32
    }

    #[inline]
    pub fn uint(&self, index: usize) -> u32 {
        self.args[index] as u32
    }

    /// A 64-bit argument held in the register pair starting at `index`,
    /// low word first.
    #[inline]
    pub fn arg64(&self, index: usize) -> i64 {
        let lo = self.args[index] as u32 as u64;
        let hi = self.args[index + 1] as u32 as u64;
        (hi << 32 | lo) as i64
    }
}

/// Everything a handler may touch: the calling task and the filesystem.
#[derive(Clone, Copy)]
pub struct SyscallEnv<'a> {
    pub task: &'a dyn Task,
    pub fs: &'a dyn FileSystem,
}

impl<'a> SyscallEnv<'a> {
    pub fn new(task: &'a dyn Task, fs: &'a dyn FileSystem) -> Self {
        Self { task, fs }
    }

    /// Validation scope for the window held by `guard`.
    pub fn user<'g>(&'g self, guard: &'g AccessGuard<'_>) -> UserAccess<'g> {
        UserAccess::new(guard, self.task.address_space())
    }
}

pub type Handler = fn(&SyscallEnv<'_>, &SyscallArgs) -> KResult<usize>;

/// How a table entry treats its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Direct,
    Wrapped,
}

#[derive(Clone, Copy)]
pub struct SyscallEntry {
    pub name: &'static str,
    pub policy: Policy,
    pub handler: Option<Handler>,
}

impl SyscallEntry {
    const EMPTY: Self = Self {
        name: "UNKNOWN",
        policy: Policy::Direct,
        handler: None,
    };

    const fn direct(name: &'static str, handler: Handler) -> Self {
        Self {
            name,
            policy: Policy::Direct,
            handler: Some(handler),
        }
    }

    const fn wrapped(name: &'static str, handler: Handler) -> Self {
        Self {
            name,
            policy: Policy::Wrapped,
            handler: Some(handler),
        }
    }
}

static SYSCALL_TABLE: [SyscallEntry; SYSCALL_TABLE_SIZE] = {
    let mut table = [SyscallEntry::EMPTY; SYSCALL_TABLE_SIZE];

    // Direct
    table[SYS_CLOSE] = SyscallEntry::direct("close", sys_close);
    table[SYS_DUP] = SyscallEntry::direct("dup", sys_dup);
    table[SYS_DUP2] = SyscallEntry::direct("dup2", sys_dup2);
    table[SYS_FCHMOD] = SyscallEntry::direct("fchmod", sys_fchmod);
    table[SYS_FCHOWN32] = SyscallEntry::direct("fchown32", sys_fchown);
    table[SYS_FSYNC] = SyscallEntry::direct("fsync", sys_fsync);
    table[SYS_GETPID] = SyscallEntry::direct("getpid", sys_getpid);
    table[SYS_GETPPID] = SyscallEntry::direct("getppid", sys_getppid);
    table[SYS_GETTID] = SyscallEntry::direct("gettid", sys_gettid);
    table[SYS_SYNC] = SyscallEntry::direct("sync", sys_sync);
    table[SYS_UMASK] = SyscallEntry::direct("umask", sys_umask);
    table[SYS_LSEEK] = SyscallEntry::direct("lseek", sys_lseek);

    // Wrapped
    table[SYS_ACCESS] = SyscallEntry::wrapped("access", sys_access);
    table[SYS_CHDIR] = SyscallEntry::wrapped("chdir", sys_chdir);
    table[SYS_CHMOD] = SyscallEntry::wrapped("chmod", sys_chmod);
    table[SYS_CHOWN32] = SyscallEntry::wrapped("chown32", sys_chown);
    table[SYS_FACCESSAT] = SyscallEntry::wrapped("faccessat", sys_faccessat);
    table[SYS_FCHMODAT] = SyscallEntry::wrapped("fchmodat", sys_fchmodat);
    table[SYS_FCHOWNAT] = SyscallEntry::wrapped("fchownat", sys_fchownat);
    table[SYS_FCNTL64] = SyscallEntry::wrapped("fcntl64", sys_fcntl);
    table[SYS_FSTAT64] = SyscallEntry::wrapped("fstat64", sys_fstat);
    table[SYS_FSTATAT64] = SyscallEntry::wrapped("fstatat64", sys_fstatat);
    table[SYS_FSTATFS64] = SyscallEntry::wrapped("fstatfs64", sys_fstatfs);
    table[SYS_GETCWD] = SyscallEntry::wrapped("getcwd", sys_getcwd);
    table[SYS_GETDENTS64] = SyscallEntry::wrapped("getdents64", sys_getdents);
    table[SYS_IOCTL] = SyscallEntry::wrapped("ioctl", sys_ioctl);
    table[SYS_LCHOWN32] = SyscallEntry::wrapped("lchown32", sys_lchown);
    table[SYS__LLSEEK] = SyscallEntry::wrapped("_llseek", sys_llseek);
    table[SYS_LSTAT64] = SyscallEntry::wrapped("lstat64", sys_lstat);
    table[SYS_MKDIR] = SyscallEntry::wrapped("mkdir", sys_mkdir);
    table[SYS_MKDIRAT] = SyscallEntry::wrapped("mkdirat", sys_mkdirat);
    table[SYS_MKNOD] = SyscallEntry::wrapped("mknod", sys_mknod);
    table[SYS_MKNODAT] = SyscallEntry::wrapped("mknodat", sys_mknodat);
    table[SYS_MOUNT] = SyscallEntry::wrapped("mount", sys_mount);
    table[SYS_OPEN] = SyscallEntry::wrapped("open", sys_open);
    table[SYS_OPENAT] = SyscallEntry::wrapped("openat", sys_openat);
    table[SYS_PIPE] = SyscallEntry::wrapped("pipe", sys_pipe);
    table[SYS_PIPE2] = SyscallEntry::wrapped("pipe2", sys_pipe2);
    table[SYS_PREAD64] = SyscallEntry::wrapped("pread64", sys_pread);
    table[SYS_PREADV] = SyscallEntry::wrapped("preadv", sys_preadv);
    table[SYS_PWRITE64] = SyscallEntry::wrapped("pwrite64", sys_pwrite);
    table[SYS_PWRITEV] = SyscallEntry::wrapped("pwritev", sys_pwritev);
    table[SYS_READ] = SyscallEntry::wrapped("read", sys_read);
    table[SYS_READLINK] = SyscallEntry::wrapped("readlink", sys_readlink);
    table[SYS_READLINKAT] = SyscallEntry::wrapped("readlinkat", sys_readlinkat);
    table[SYS_READV] = SyscallEntry::wrapped("readv", sys_readv);
    table[SYS_RENAME] = SyscallEntry::wrapped("rename", sys_rename);
    table[SYS_RENAMEAT] = SyscallEntry::wrapped("renameat", sys_renameat);
    table[SYS_RMDIR] = SyscallEntry::wrapped("rmdir", sys_rmdir);
    table[SYS_STAT64] = SyscallEntry::wrapped("stat64", sys_stat);
    table[SYS_STATFS64] = SyscallEntry::wrapped("statfs64", sys_statfs);
    table[SYS_SYMLINK] = SyscallEntry::wrapped("symlink", sys_symlink);
    table[SYS_SYMLINKAT] = SyscallEntry::wrapped("symlinkat", sys_symlinkat);
    table[SYS_UMOUNT2] = SyscallEntry::wrapped("umount2", sys_umount2);
    table[SYS_UNLINK] = SyscallEntry::wrapped("unlink", sys_unlink);
    table[SYS_UNLINKAT] = SyscallEntry::wrapped("unlinkat", sys_unlinkat);
    table[SYS_UTIMENSAT] = SyscallEntry::wrapped("utimensat", sys_utimensat);
    table[SYS_WRITE] = SyscallEntry::wrapped("write", sys_write);
    table[SYS_WRITEV] = SyscallEntry::wrapped("writev", sys_writev);

    table
};

/// Look up the table entry for `nr`, if one is implemented.
pub fn lookup(nr: usize) -> Option<&'static SyscallEntry> {
    SYSCALL_TABLE.get(nr).filter(|e| e.handler.is_some())
}

/// Human-readable name of a syscall number, for tracing.
pub fn syscall_name(nr: usize) -> &'static str {
    match nr {
        ARM_NR_BREAKPOINT => "ARM_breakpoint",
        ARM_NR_CACHEFLUSH => "ARM_cacheflush",
        ARM_NR_USR26 => "ARM_usr26",
        ARM_NR_USR32 => "ARM_usr32",
        ARM_NR_SET_TLS => "ARM_set_tls",
        ARM_NR_GET_TLS => "ARM_get_tls",
        _ => SYSCALL_TABLE.get(nr).map_or("UNKNOWN", |e| e.name),
    }
}

/// Dispatch a system call
///
/// # Returns
/// The value for the return register: a non-negative result or a negated
/// errno.
///
/// # Security
/// - Unknown syscall numbers are rejected with ENOSYS
/// - A fault stubbed during the call overrides its result with EFAULT
pub fn dispatch(env: &SyscallEnv<'_>, args: &SyscallArgs) -> isize {
    let trace = config::get().trace_syscalls();
    if trace {
        trace_entry(env.task, args);
    }

    let result = match lookup(args.nr) {
        Some(entry) => match entry.handler {
            Some(handler) => handler(env, args),
            None => Err(Errno::ENOSYS),
        },
        None if args.nr >= ARM_NR_BASE => arch_syscall(env, args),
        None => {
            log::warn!(target: "syscall", "unimplemented syscall {}", args.nr);
            Err(Errno::ENOSYS)
        }
    };

    let rval = ActiveFaultModel::complete(env.task.fault_flag(), to_sysret(result));
    if trace {
        trace_return(env.task, rval, args.nr);
    }
    rval
}

/// Architecture specific syscalls for ARM.
fn arch_syscall(env: &SyscallEnv<'_>, args: &SyscallArgs) -> KResult<usize> {
    match args.nr {
        ARM_NR_SET_TLS => {
            let tls = args.ptr(0);
            // Never dereferenced by the kernel, so only the address is checked.
            if !validate::address_in_userspace(env.task.address_space(), tls) {
                return Err(Errno::EFAULT);
            }
            env.task.set_tls(VirtAddr::new(tls));
            Ok(0)
        }
        nr => {
            log::warn!(target: "syscall", "unimplemented syscall {:#x} {}", nr, syscall_name(nr));
            Err(Errno::ENOSYS)
        }
    }
}

fn trace_entry(task: &dyn Task, args: &SyscallArgs) {
    let r = &args.args;
    log::trace!(
        target: "syscall",
        "SC: pid {} tid {} r0 {:08x} r1 {:08x} r2 {:08x} r3 {:08x} r4 {:08x} r5 {:08x} r6 {:08x} n {} {}",
        task.pid(),
        task.tid(),
        r[0],
        r[1],
        r[2],
        r[3],
        r[4],
        r[5],
        r[6],
        args.nr,
        syscall_name(args.nr)
    );
}

fn trace_return(task: &dyn Task, rval: isize, nr: usize) {
    if Errno::from_sysret(rval) == Some(Errno::ERESTARTSYS) {
        log::debug!(target: "syscall", "RESTART: n {} {}", nr, syscall_name(nr));
        return;
    }
    log::trace!(
        target: "syscall",
        "SR: pid {} tid {} rval {:08x} n {} {}",
        task.pid(),
        task.tid(),
        rval,
        nr,
        syscall_name(nr)
    );
}

// Direct handlers

fn sys_close(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    env.fs.close(a.fd(0))
}

fn sys_dup(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    env.fs.dup(a.fd(0))
}

fn sys_dup2(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    env.fs.dup2(a.fd(0), a.fd(1))
}

fn sys_fchmod(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    env.fs.fchmod(a.fd(0), a.uint(1))
}

fn sys_fchown(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    env.fs.fchown(a.fd(0), a.uint(1), a.uint(2))
}

fn sys_fsync(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    env.fs.fsync(a.fd(0))
}

fn sys_sync(env: &SyscallEnv<'_>, _a: &SyscallArgs) -> KResult<usize> {
    env.fs.sync()
}

fn sys_umask(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    env.fs.umask(a.uint(0))
}

/// 32-bit offsets; positions past `i32::MAX` need `_llseek`.
fn sys_lseek(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    let whence = check_whence(a.uint(2))?;
    let pos = env.fs.lseek(a.fd(0), a.int(1) as i64, whence)?;
    if pos < 0 {
        return Err(Errno::EINVAL);
    }
    i32::try_from(pos).map(|pos| pos as usize).map_err(|_| Errno::EOVERFLOW)
}

/// Reject unknown lseek origins before the filesystem sees them.
pub(super) fn check_whence(whence: u32) -> KResult<u32> {
    if whence > SEEK_END {
        return Err(Errno::EINVAL);
    }
    Ok(whence)
}

fn sys_getpid(env: &SyscallEnv<'_>, _a: &SyscallArgs) -> KResult<usize> {
    Ok(env.task.pid() as usize)
}

fn sys_getppid(env: &SyscallEnv<'_>, _a: &SyscallArgs) -> KResult<usize> {
    Ok(env.task.ppid() as usize)
}

fn sys_gettid(env: &SyscallEnv<'_>, _a: &SyscallArgs) -> KResult<usize> {
    Ok(env.task.tid() as usize)
}
