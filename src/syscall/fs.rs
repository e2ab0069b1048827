//! Filesystem syscall wrappers
//!
//! One wrapper per pointer-carrying syscall. Each one:
//! 1. Rejects malformed scalar arguments (negative offsets, size mismatches,
//!    missing capabilities) before touching userspace
//! 2. Opens an access window and validates every pointer argument
//! 3. Calls down with validated views only
//!
//! The window closes when the guard drops, on every return path. Non-"at"
//! variants supply `AT_FDCWD` and delegate to their "at" counterpart.

use core::mem::size_of;

use crate::abi::{ioc, AtFlags, Fd, Flock, StatFs, Timespec, AT_FDCWD, F_GETLK, F_SETLK, F_SETLKW};
use crate::cap::{self, Capability};
use crate::error::{Errno, KResult};
use crate::fs::{FcntlArg, FilePos, IoctlArg};
use crate::uaccess::{self, AccessWindow};

use super::handler::{check_whence, SyscallArgs, SyscallEnv};
use super::iov::{descriptor_count, do_iov};
use super::validate::{self, UserBuffer, UserBufferMut};

/// Argument slot of the pread64/pwrite64 offset. EABI aligns 64-bit
/// arguments to an even register pair, so r3 is padding.
const PRW_OFFSET_ARG: usize = 4;

/// Argument slot of the preadv/pwritev offset pair.
const PRWV_OFFSET_ARG: usize = 3;

fn at_flags(raw: u32) -> AtFlags {
    AtFlags::from_bits_retain(raw)
}

// access / faccessat

fn faccessat(env: &SyscallEnv<'_>, dirfd: Fd, path: usize, mode: u32, flags: u32) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let path = env.user(&guard).path(path)?;
    env.fs.access_at(dirfd, path.as_bytes(), mode, at_flags(flags))
}

pub(super) fn sys_access(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    faccessat(env, AT_FDCWD, a.ptr(0), a.uint(1), 0)
}

pub(super) fn sys_faccessat(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    faccessat(env, a.fd(0), a.ptr(1), a.uint(2), a.uint(3))
}

pub(super) fn sys_chdir(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let path = env.user(&guard).path(a.ptr(0))?;
    env.fs.chdir(path.as_bytes())
}

// chmod / fchmodat

fn fchmodat(env: &SyscallEnv<'_>, dirfd: Fd, path: usize, mode: u32, flags: u32) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let path = env.user(&guard).path(path)?;
    env.fs.chmod_at(dirfd, path.as_bytes(), mode, at_flags(flags))
}

pub(super) fn sys_chmod(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    fchmodat(env, AT_FDCWD, a.ptr(0), a.uint(1), 0)
}

pub(super) fn sys_fchmodat(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    fchmodat(env, a.fd(0), a.ptr(1), a.uint(2), a.uint(3))
}

// chown / lchown / fchownat

fn fchownat(
    env: &SyscallEnv<'_>,
    dirfd: Fd,
    path: usize,
    uid: u32,
    gid: u32,
    flags: AtFlags,
) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let path = env.user(&guard).path(path)?;
    env.fs.chown_at(dirfd, path.as_bytes(), uid, gid, flags)
}

pub(super) fn sys_chown(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    fchownat(env, AT_FDCWD, a.ptr(0), a.uint(1), a.uint(2), AtFlags::empty())
}

pub(super) fn sys_lchown(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    fchownat(env, AT_FDCWD, a.ptr(0), a.uint(1), a.uint(2), AtFlags::SYMLINK_NOFOLLOW)
}

pub(super) fn sys_fchownat(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    fchownat(env, a.fd(0), a.ptr(1), a.uint(2), a.uint(3), at_flags(a.uint(4)))
}

pub(super) fn sys_fcntl(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    let (fd, cmd, arg) = (a.fd(0), a.uint(1), a.ptr(2));
    let is_lock = matches!(cmd, F_GETLK | F_SETLK | F_SETLKW);

    let window = AccessWindow::begin_if(env.task, is_lock)?;
    let guard = match window.guard() {
        Some(guard) => guard,
        None => return env.fs.fcntl(fd, cmd, FcntlArg::Value(arg)),
    };
    let ua = env.user(guard);
    let src = ua.input::<Flock>(arg)?;
    let mut dst = ua.output::<Flock>(arg)?;

    let mut lock = src.read();
    let r = env.fs.fcntl(fd, cmd, FcntlArg::Lock(&mut lock))?;
    if cmd == F_GETLK {
        dst.write(lock);
    }
    Ok(r)
}

// stat family

pub(super) fn sys_fstat(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let mut out = env.user(&guard).output(a.ptr(1))?;
    out.write(env.fs.fstat(a.fd(0))?);
    Ok(0)
}

fn fstatat(env: &SyscallEnv<'_>, dirfd: Fd, path: usize, st: usize, flags: AtFlags) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let ua = env.user(&guard);
    let path = ua.path(path)?;
    let mut out = ua.output(st)?;
    out.write(env.fs.stat_at(dirfd, path.as_bytes(), flags)?);
    Ok(0)
}

pub(super) fn sys_stat(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    fstatat(env, AT_FDCWD, a.ptr(0), a.ptr(1), AtFlags::empty())
}

pub(super) fn sys_lstat(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    fstatat(env, AT_FDCWD, a.ptr(0), a.ptr(1), AtFlags::SYMLINK_NOFOLLOW)
}

pub(super) fn sys_fstatat(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    fstatat(env, a.fd(0), a.ptr(1), a.ptr(2), at_flags(a.uint(3)))
}

fn check_statfs_size(size: usize) -> KResult<()> {
    if size != size_of::<StatFs>() {
        return Err(Errno::EINVAL);
    }
    Ok(())
}

pub(super) fn sys_statfs(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    check_statfs_size(a.arg(1))?;
    let guard = uaccess::lock(env.task)?;
    let ua = env.user(&guard);
    let path = ua.path(a.ptr(0))?;
    let mut out = ua.output(a.ptr(2))?;
    out.write(env.fs.statfs(path.as_bytes())?);
    Ok(0)
}

pub(super) fn sys_fstatfs(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    check_statfs_size(a.arg(1))?;
    let guard = uaccess::lock(env.task)?;
    let mut out = env.user(&guard).output(a.ptr(2))?;
    out.write(env.fs.fstatfs(a.fd(0))?);
    Ok(0)
}

pub(super) fn sys_getcwd(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let mut buf = env.user(&guard).buf_mut(a.ptr(0), a.arg(1))?;
    env.fs.getcwd(&mut buf)
}

pub(super) fn sys_getdents(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let mut buf = env.user(&guard).buf_mut(a.ptr(1), a.arg(2))?;
    env.fs.getdents(a.fd(0), &mut buf)
}

pub(super) fn sys_ioctl(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    let (fd, request, argp) = (a.fd(0), a.uint(1), a.ptr(2));
    let dir = ioc::dir(request);
    if dir == ioc::NONE {
        return env.fs.ioctl(fd, request, IoctlArg::None(argp));
    }

    let guard = uaccess::lock(env.task)?;
    let ua = env.user(&guard);
    let size = ioc::size(request);
    match dir {
        // Userspace writes, the driver reads.
        ioc::WRITE => {
            env.fs.ioctl(fd, request, IoctlArg::In(ua.buf(argp, size)?))
        }
        // The driver writes, userspace reads.
        ioc::READ => {
            env.fs.ioctl(fd, request, IoctlArg::Out(ua.buf_mut(argp, size)?))
        }
        _ => {
            env.fs.ioctl(fd, request, IoctlArg::InOut(ua.buf_rw(argp, size)?))
        }
    }
}

/// `_llseek(fd, offset_high, offset_low, result, whence)`
pub(super) fn sys_llseek(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    let offset = ((a.uint(1) as u64) << 32 | a.uint(2) as u64) as i64;
    let whence = check_whence(a.uint(4))?;
    let guard = uaccess::lock(env.task)?;
    let mut out = env.user(&guard).output::<i64>(a.ptr(3))?;
    let pos = env.fs.lseek(a.fd(0), offset, whence)?;
    out.write(pos);
    Ok(0)
}

// mkdir / mknod

fn mkdirat(env: &SyscallEnv<'_>, dirfd: Fd, path: usize, mode: u32) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let path = env.user(&guard).path(path)?;
    env.fs.mkdir_at(dirfd, path.as_bytes(), mode)
}

pub(super) fn sys_mkdir(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    mkdirat(env, AT_FDCWD, a.ptr(0), a.uint(1))
}

pub(super) fn sys_mkdirat(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    mkdirat(env, a.fd(0), a.ptr(1), a.uint(2))
}

fn mknodat(env: &SyscallEnv<'_>, dirfd: Fd, path: usize, mode: u32, dev: u64) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let path = env.user(&guard).path(path)?;
    env.fs.mknod_at(dirfd, path.as_bytes(), mode, dev)
}

pub(super) fn sys_mknod(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    mknodat(env, AT_FDCWD, a.ptr(0), a.uint(1), a.arg(2) as u64)
}

pub(super) fn sys_mknodat(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    mknodat(env, a.fd(0), a.ptr(1), a.uint(2), a.arg(3) as u64)
}

// mount / umount2

pub(super) fn sys_mount(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    cap::require(env.task, Capability::ADMIN)?;
    let guard = uaccess::lock(env.task)?;
    let ua = env.user(&guard);
    let dev = ua.path(a.ptr(0))?;
    let dir = ua.path(a.ptr(1))?;
    let fstype = ua.path(a.ptr(2))?;
    // Mount options are opaque to this layer and handed on unread.
    let data = a.ptr(4);
    if data != 0 && !validate::address_in_userspace(ua.space(), data) {
        return Err(Errno::EFAULT);
    }
    env.fs.mount(dev.as_bytes(), dir.as_bytes(), fstype.as_bytes(), a.arg(3) as u64, data)
}

pub(super) fn sys_umount2(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    cap::require(env.task, Capability::ADMIN)?;
    let guard = uaccess::lock(env.task)?;
    let dir = env.user(&guard).path(a.ptr(0))?;
    env.fs.umount2(dir.as_bytes(), a.uint(1))
}

// open / openat

fn openat(env: &SyscallEnv<'_>, dirfd: Fd, path: usize, flags: u32, mode: u32) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let path = env.user(&guard).path(path)?;
    env.fs.open_at(dirfd, path.as_bytes(), flags, mode)
}

pub(super) fn sys_open(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    openat(env, AT_FDCWD, a.ptr(0), a.uint(1), a.uint(2))
}

pub(super) fn sys_openat(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    openat(env, a.fd(0), a.ptr(1), a.uint(2), a.uint(3))
}

// pipe / pipe2

fn pipe2(env: &SyscallEnv<'_>, fds: usize, flags: u32) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let mut out = env.user(&guard).output::<[Fd; 2]>(fds)?;
    out.write(env.fs.pipe2(flags)?);
    Ok(0)
}

pub(super) fn sys_pipe(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    pipe2(env, a.ptr(0), 0)
}

pub(super) fn sys_pipe2(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    pipe2(env, a.ptr(0), a.uint(1))
}

// rename / renameat

fn renameat(env: &SyscallEnv<'_>, from_dir: Fd, from: usize, to_dir: Fd, to: usize) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let ua = env.user(&guard);
    let from = ua.path(from)?;
    let to = ua.path(to)?;
    env.fs.rename_at(from_dir, from.as_bytes(), to_dir, to.as_bytes())
}

pub(super) fn sys_rename(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    renameat(env, AT_FDCWD, a.ptr(0), AT_FDCWD, a.ptr(1))
}

pub(super) fn sys_renameat(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    renameat(env, a.fd(0), a.ptr(1), a.fd(2), a.ptr(3))
}

pub(super) fn sys_rmdir(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let path = env.user(&guard).path(a.ptr(0))?;
    env.fs.rmdir(path.as_bytes())
}

// symlink / symlinkat

fn symlinkat(env: &SyscallEnv<'_>, target: usize, dirfd: Fd, path: usize) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let ua = env.user(&guard);
    let target = ua.path(target)?;
    let path = ua.path(path)?;
    env.fs.symlink_at(target.as_bytes(), dirfd, path.as_bytes())
}

pub(super) fn sys_symlink(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    symlinkat(env, a.ptr(0), AT_FDCWD, a.ptr(1))
}

pub(super) fn sys_symlinkat(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    symlinkat(env, a.ptr(0), a.fd(1), a.ptr(2))
}

// unlink / unlinkat

fn unlinkat(env: &SyscallEnv<'_>, dirfd: Fd, path: usize, flags: AtFlags) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let path = env.user(&guard).path(path)?;
    env.fs.unlink_at(dirfd, path.as_bytes(), flags)
}

pub(super) fn sys_unlink(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    unlinkat(env, AT_FDCWD, a.ptr(0), AtFlags::empty())
}

pub(super) fn sys_unlinkat(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    unlinkat(env, a.fd(0), a.ptr(1), at_flags(a.uint(2)))
}

/// A null `times` pointer means "set both to now".
pub(super) fn sys_utimensat(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let ua = env.user(&guard);
    let path = ua.path(a.ptr(1))?;
    let times = match a.ptr(2) {
        0 => None,
        ptr => Some(ua.input::<[Timespec; 2]>(ptr)?.read()),
    };
    env.fs.utimens_at(a.fd(0), path.as_bytes(), times, at_flags(a.uint(3)))
}

// read / write

pub(super) fn sys_read(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let mut buf = env.user(&guard).buf_mut(a.ptr(1), a.arg(2))?;
    env.fs.read(a.fd(0), &mut buf, FilePos::Current)
}

pub(super) fn sys_write(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let buf = env.user(&guard).buf(a.ptr(1), a.arg(2))?;
    env.fs.write(a.fd(0), &buf, FilePos::Current)
}

pub(super) fn sys_pread(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    let pos = FilePos::explicit(a.arg64(PRW_OFFSET_ARG))?;
    let guard = uaccess::lock(env.task)?;
    let mut buf = env.user(&guard).buf_mut(a.ptr(1), a.arg(2))?;
    env.fs.read(a.fd(0), &mut buf, pos)
}

pub(super) fn sys_pwrite(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    let pos = FilePos::explicit(a.arg64(PRW_OFFSET_ARG))?;
    let guard = uaccess::lock(env.task)?;
    let buf = env.user(&guard).buf(a.ptr(1), a.arg(2))?;
    env.fs.write(a.fd(0), &buf, pos)
}

// readlink / readlinkat

fn readlinkat(env: &SyscallEnv<'_>, dirfd: Fd, path: usize, buf: usize, len: usize) -> KResult<usize> {
    let guard = uaccess::lock(env.task)?;
    let ua = env.user(&guard);
    let path = ua.path(path)?;
    let mut buf = ua.buf_mut(buf, len)?;
    env.fs.readlink_at(dirfd, path.as_bytes(), &mut buf)
}

pub(super) fn sys_readlink(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    readlinkat(env, AT_FDCWD, a.ptr(0), a.ptr(1), a.arg(2))
}

pub(super) fn sys_readlinkat(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    readlinkat(env, a.fd(0), a.ptr(1), a.ptr(2), a.arg(3))
}

// Vectored I/O

fn readv_at(env: &SyscallEnv<'_>, a: &SyscallArgs, pos: FilePos) -> KResult<usize> {
    let (fd, uiov) = (a.fd(0), a.ptr(1));
    let count = descriptor_count(a.int(2))?;
    let guard = uaccess::lock(env.task)?;
    let ua = env.user(&guard);
    do_iov::<UserBufferMut<'_>, _>(&ua, uiov, count, pos, |bufs, pos| {
        env.fs.preadv(fd, bufs, pos)
    })
}

fn writev_at(env: &SyscallEnv<'_>, a: &SyscallArgs, pos: FilePos) -> KResult<usize> {
    let (fd, uiov) = (a.fd(0), a.ptr(1));
    let count = descriptor_count(a.int(2))?;
    let guard = uaccess::lock(env.task)?;
    let ua = env.user(&guard);
    do_iov::<UserBuffer<'_>, _>(&ua, uiov, count, pos, |bufs, pos| {
        env.fs.pwritev(fd, bufs, pos)
    })
}

pub(super) fn sys_readv(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    readv_at(env, a, FilePos::Current)
}

pub(super) fn sys_writev(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    writev_at(env, a, FilePos::Current)
}

pub(super) fn sys_preadv(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    let pos = FilePos::explicit(a.arg64(PRWV_OFFSET_ARG))?;
    readv_at(env, a, pos)
}

pub(super) fn sys_pwritev(env: &SyscallEnv<'_>, a: &SyscallArgs) -> KResult<usize> {
    let pos = FilePos::explicit(a.arg64(PRWV_OFFSET_ARG))?;
    writev_at(env, a, pos)
}
