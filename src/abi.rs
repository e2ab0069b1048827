//! Userspace ABI
//!
//! Structures and constants shared with the C library. Layouts are `repr(C)`
//! and must not change.

use bitflags::bitflags;

/// File descriptor.
pub type Fd = i32;

/// Directory handle meaning "the current working directory".
pub const AT_FDCWD: Fd = -100;

bitflags! {
    /// Flags accepted by the "at"-suffixed path syscalls.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct AtFlags: u32 {
        const SYMLINK_NOFOLLOW = 0x100;
        const REMOVEDIR = 0x200;
        const EACCESS = 0x200;
        const SYMLINK_FOLLOW = 0x400;
        const EMPTY_PATH = 0x1000;
    }
}

/// fcntl commands that take a pointer to a `Flock`.
pub const F_GETLK: u32 = 5;
pub const F_SETLK: u32 = 6;
pub const F_SETLKW: u32 = 7;

/// lseek whence values.
pub const SEEK_SET: u32 = 0;
pub const SEEK_CUR: u32 = 1;
pub const SEEK_END: u32 = 2;

/// ioctl request encoding.
pub mod ioc {
    pub const NRBITS: u32 = 8;
    pub const TYPEBITS: u32 = 8;
    pub const SIZEBITS: u32 = 14;
    pub const DIRBITS: u32 = 2;

    pub const NRSHIFT: u32 = 0;
    pub const TYPESHIFT: u32 = NRSHIFT + NRBITS;
    pub const SIZESHIFT: u32 = TYPESHIFT + TYPEBITS;
    pub const DIRSHIFT: u32 = SIZESHIFT + SIZEBITS;

    /// No data transfer.
    pub const NONE: u32 = 0;
    /// Userspace writes, kernel reads the argument.
    pub const WRITE: u32 = 1;
    /// Kernel writes, userspace reads the argument.
    pub const READ: u32 = 2;

    /// Encode a request number.
    pub const fn ioc(dir: u32, ty: u32, nr: u32, size: u32) -> u32 {
        (dir << DIRSHIFT) | (ty << TYPESHIFT) | (nr << NRSHIFT) | (size << SIZESHIFT)
    }

    /// Direction bits of a request.
    pub const fn dir(request: u32) -> u32 {
        (request >> DIRSHIFT) & ((1 << DIRBITS) - 1)
    }

    /// Argument size of a request.
    pub const fn size(request: u32) -> usize {
        ((request >> SIZESHIFT) & ((1 << SIZEBITS) - 1)) as usize
    }
}

/// Scatter/gather descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoVec {
    /// Base address of the buffer; null entries are skipped
    pub iov_base: usize,
    /// Length of the buffer in bytes
    pub iov_len: usize,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timespec {
    pub tv_sec: i64,
    pub tv_nsec: i64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    pub st_dev: u64,
    pub st_ino: u64,
    pub st_mode: u32,
    pub st_nlink: u32,
    pub st_uid: u32,
    pub st_gid: u32,
    pub st_rdev: u64,
    pub st_size: i64,
    pub st_blksize: i32,
    pub _pad0: i32,
    pub st_blocks: i64,
    pub st_atim: Timespec,
    pub st_mtim: Timespec,
    pub st_ctim: Timespec,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatFs {
    pub f_type: u32,
    pub f_bsize: u32,
    pub f_blocks: u64,
    pub f_bfree: u64,
    pub f_bavail: u64,
    pub f_files: u64,
    pub f_ffree: u64,
    pub f_fsid: [i32; 2],
    pub f_namelen: u32,
    pub f_frsize: u32,
    pub f_flags: u32,
    pub f_spare: [u32; 4],
    pub _pad0: u32,
}

/// Advisory record lock.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flock {
    pub l_type: i16,
    pub l_whence: i16,
    pub _pad0: i32,
    pub l_start: i64,
    pub l_len: i64,
    pub l_pid: i32,
    pub _pad1: i32,
}

/// Types that may be copied to and from userspace byte-for-byte.
///
/// # Safety
/// Implementors must be `repr(C)` (or primitive) and valid for every bit
/// pattern, so reading arbitrary user bytes into them is sound. They must
/// also have no padding bytes: every byte of a value is copied out to the
/// task, so padding would hand it uninitialized kernel memory. Reserve the
/// gaps with explicit `_pad` fields and check the layout with
/// `assert_no_padding!`.
pub unsafe trait Plain: Copy {}

/// Fails the build if `$ty` is larger than the sum of its fields.
macro_rules! assert_no_padding {
    ($ty:ty: $($field:ty),+ $(,)?) => {
        const _: () = assert!(
            core::mem::size_of::<$ty>() == 0 $(+ core::mem::size_of::<$field>())+
        );
    };
}

assert_no_padding!(IoVec: usize, usize);
assert_no_padding!(Timespec: i64, i64);
assert_no_padding!(Stat:
    u64, u64, u32, u32, u32, u32, u64, i64, i32, i32, i64,
    Timespec, Timespec, Timespec,
);
assert_no_padding!(StatFs:
    u32, u32, u64, u64, u64, u64, u64, [i32; 2], u32, u32, u32, [u32; 4], u32,
);
assert_no_padding!(Flock: i16, i16, i32, i64, i64, i32, i32);

unsafe impl Plain for u8 {}
unsafe impl Plain for i32 {}
unsafe impl Plain for u32 {}
unsafe impl Plain for i64 {}
unsafe impl Plain for u64 {}
unsafe impl Plain for usize {}
unsafe impl Plain for IoVec {}
unsafe impl Plain for Timespec {}
unsafe impl Plain for Stat {}
unsafe impl Plain for StatFs {}
unsafe impl Plain for Flock {}
unsafe impl<T: Plain, const N: usize> Plain for [T; N] {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ioc_encoding() {
        let req = ioc::ioc(ioc::READ, b'T' as u32, 0x13, 36);
        assert_eq!(ioc::dir(req), ioc::READ);
        assert_eq!(ioc::size(req), 36);
        let both = ioc::ioc(ioc::READ | ioc::WRITE, 0, 1, 8);
        assert_eq!(ioc::dir(both), 3);
        assert_eq!(ioc::dir(0x5401), ioc::NONE);
    }

    #[test]
    fn test_padding_is_explicit() {
        use core::mem::{offset_of, size_of};
        assert_eq!(offset_of!(Stat, _pad0), 52);
        assert_eq!(offset_of!(Stat, st_blocks), 56);
        assert_eq!(offset_of!(Flock, _pad0), 4);
        assert_eq!(offset_of!(Flock, _pad1), 28);
        assert_eq!(size_of::<Flock>(), 32);
        assert_eq!(offset_of!(StatFs, _pad0), 84);
        assert_eq!(size_of::<StatFs>(), 88);
    }

    #[test]
    fn test_iovec_layout() {
        assert_eq!(
            core::mem::size_of::<IoVec>(),
            2 * core::mem::size_of::<usize>()
        );
    }
}
