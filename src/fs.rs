//! Filesystem entry points
//!
//! The syscall layer hands the filesystem only arguments it has already
//! proven safe: kernel copies of paths (without their terminator) and of
//! user structs, and validated buffer views. Buffers stay in user memory
//! and are reached through the views' copy methods, never as Rust slices.
//! Struct results are returned by value and copied out by the caller.
//!
//! Every entry point defaults to `ENOSYS`, so a filesystem implements only
//! what it supports.

use crate::abi::{AtFlags, Fd, Flock, Stat, StatFs, Timespec};
use crate::error::{Errno, KResult};
use crate::syscall::{UserBuffer, UserBufferMut};

/// File position used by a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilePos {
    /// The file's own position, advanced by the filesystem.
    Current,
    /// An explicit offset; the file position is left untouched.
    At(u64),
}

impl FilePos {
    /// Build an explicit position, rejecting negative offsets.
    pub fn explicit(offset: i64) -> KResult<Self> {
        u64::try_from(offset)
            .map(Self::At)
            .map_err(|_| Errno::EINVAL)
    }

    /// Position after `n` more bytes have been transferred.
    pub fn advance(self, n: usize) -> Self {
        match self {
            Self::Current => Self::Current,
            Self::At(off) => Self::At(off.saturating_add(n as u64)),
        }
    }
}

/// Argument of an fcntl call.
#[derive(Debug)]
pub enum FcntlArg<'a> {
    /// Plain integer argument.
    Value(usize),
    /// Record-lock commands. For `F_GETLK` the filesystem updates the record
    /// and the caller copies it back out.
    Lock(&'a mut Flock),
}

/// Argument of an ioctl call, shaped by the request's direction bits.
#[derive(Debug)]
pub enum IoctlArg<'a> {
    /// No data transfer; the raw argument is passed through unexamined.
    None(usize),
    /// The driver reads the argument.
    In(UserBuffer<'a>),
    /// The driver writes the argument.
    Out(UserBufferMut<'a>),
    /// The driver reads and writes the argument.
    InOut(UserBufferMut<'a>),
}

/// Filesystem and file-descriptor operations reached from syscalls.
#[allow(unused_variables)]
pub trait FileSystem: Sync {
    fn open_at(&self, dirfd: Fd, path: &[u8], flags: u32, mode: u32) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn close(&self, fd: Fd) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn dup(&self, fd: Fd) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn dup2(&self, fd: Fd, newfd: Fd) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn fsync(&self, fd: Fd) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn sync(&self) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    /// Set the file mode creation mask, returning the previous mask.
    fn umask(&self, mask: u32) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn fchmod(&self, fd: Fd, mode: u32) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn fchown(&self, fd: Fd, uid: u32, gid: u32) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn lseek(&self, fd: Fd, offset: i64, whence: u32) -> KResult<i64> {
        Err(Errno::ENOSYS)
    }

    fn chdir(&self, path: &[u8]) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn access_at(&self, dirfd: Fd, path: &[u8], mode: u32, flags: AtFlags) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn chmod_at(&self, dirfd: Fd, path: &[u8], mode: u32, flags: AtFlags) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn chown_at(
        &self,
        dirfd: Fd,
        path: &[u8],
        uid: u32,
        gid: u32,
        flags: AtFlags,
    ) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn mkdir_at(&self, dirfd: Fd, path: &[u8], mode: u32) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn mknod_at(&self, dirfd: Fd, path: &[u8], mode: u32, dev: u64) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn rename_at(&self, from_dir: Fd, from: &[u8], to_dir: Fd, to: &[u8]) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn rmdir(&self, path: &[u8]) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn symlink_at(&self, target: &[u8], dirfd: Fd, path: &[u8]) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn unlink_at(&self, dirfd: Fd, path: &[u8], flags: AtFlags) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    /// Set file timestamps; `None` means "now" for both.
    fn utimens_at(
        &self,
        dirfd: Fd,
        path: &[u8],
        times: Option<[Timespec; 2]>,
        flags: AtFlags,
    ) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn readlink_at(
        &self,
        dirfd: Fd,
        path: &[u8],
        buf: &mut UserBufferMut<'_>,
    ) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn stat_at(&self, dirfd: Fd, path: &[u8], flags: AtFlags) -> KResult<Stat> {
        Err(Errno::ENOSYS)
    }

    fn fstat(&self, fd: Fd) -> KResult<Stat> {
        Err(Errno::ENOSYS)
    }

    fn statfs(&self, path: &[u8]) -> KResult<StatFs> {
        Err(Errno::ENOSYS)
    }

    fn fstatfs(&self, fd: Fd) -> KResult<StatFs> {
        Err(Errno::ENOSYS)
    }

    /// Write the working directory into `buf`, returning the length used.
    fn getcwd(&self, buf: &mut UserBufferMut<'_>) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn getdents(&self, fd: Fd, buf: &mut UserBufferMut<'_>) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn pipe2(&self, flags: u32) -> KResult<[Fd; 2]> {
        Err(Errno::ENOSYS)
    }

    /// `data` is an opaque userspace address handed to the filesystem driver.
    fn mount(
        &self,
        dev: &[u8],
        dir: &[u8],
        fstype: &[u8],
        flags: u64,
        data: usize,
    ) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn umount2(&self, dir: &[u8], flags: u32) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn read(&self, fd: Fd, buf: &mut UserBufferMut<'_>, pos: FilePos) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn write(&self, fd: Fd, buf: &UserBuffer<'_>, pos: FilePos) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    /// Scatter read into one validated batch.
    fn preadv(&self, fd: Fd, bufs: &mut [UserBufferMut<'_>], pos: FilePos) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    /// Gather write from one validated batch.
    fn pwritev(&self, fd: Fd, bufs: &[UserBuffer<'_>], pos: FilePos) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn fcntl(&self, fd: Fd, cmd: u32, arg: FcntlArg<'_>) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }

    fn ioctl(&self, fd: Fd, request: u32, arg: IoctlArg<'_>) -> KResult<usize> {
        Err(Errno::ENOSYS)
    }
}
