//! Kernel Error Numbers
//!
//! POSIX error numbers returned across the syscall boundary.
//!
//! # Conventions
//! - Kernel code carries errors as `Errno` inside `KResult`
//! - Userspace sees a negative status (`-errno`) in the return register
//! - Filesystem and process errors pass through the syscall layer unchanged

use core::fmt;

/// Result type used throughout the kernel.
pub type KResult<T> = Result<T, Errno>;

/// POSIX error numbers.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Errno {
    /// Operation not permitted
    EPERM = 1,
    /// No such file or directory
    ENOENT = 2,
    /// No such process
    ESRCH = 3,
    /// Interrupted system call
    EINTR = 4,
    /// I/O error
    EIO = 5,
    /// Bad file descriptor
    EBADF = 9,
    /// Try again
    EAGAIN = 11,
    /// Out of memory
    ENOMEM = 12,
    /// Permission denied
    EACCES = 13,
    /// Bad address (invalid pointer)
    EFAULT = 14,
    /// Device or resource busy
    EBUSY = 16,
    /// File exists
    EEXIST = 17,
    /// Not a directory
    ENOTDIR = 20,
    /// Is a directory
    EISDIR = 21,
    /// Invalid argument
    EINVAL = 22,
    /// Too many open files
    EMFILE = 24,
    /// Not a typewriter
    ENOTTY = 25,
    /// No space left on device
    ENOSPC = 28,
    /// Illegal seek
    ESPIPE = 29,
    /// Read-only file system
    EROFS = 30,
    /// Result out of range
    ERANGE = 34,
    /// File name too long
    ENAMETOOLONG = 36,
    /// Invalid system call number
    ENOSYS = 38,
    /// Directory not empty
    ENOTEMPTY = 39,
    /// Too many symbolic links
    ELOOP = 40,
    /// Value too large for defined data type
    EOVERFLOW = 75,
    /// Restart the system call after signal delivery (never seen by userspace)
    ERESTARTSYS = 512,
}

/// Coarse classification of an error for callers that care about the
/// failure class rather than the exact number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed argument shape: negative length, count out of bounds, size mismatch.
    Input,
    /// Pointer outside the accessible range.
    Fault,
    /// Missing capability.
    Permission,
    /// Signal arrived while blocked on the access guard.
    Interrupted,
    /// Error produced by a collaborator and forwarded unchanged.
    Passthrough,
}

impl Errno {
    /// Raw positive error number.
    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Negative status placed in the syscall return register.
    #[inline]
    pub const fn as_sysret(self) -> isize {
        -(self as i32 as isize)
    }

    /// Recover an error from a negative syscall status.
    pub const fn from_sysret(rval: isize) -> Option<Self> {
        if rval >= 0 {
            return None;
        }
        Some(match -rval {
            1 => Self::EPERM,
            2 => Self::ENOENT,
            3 => Self::ESRCH,
            4 => Self::EINTR,
            5 => Self::EIO,
            9 => Self::EBADF,
            11 => Self::EAGAIN,
            12 => Self::ENOMEM,
            13 => Self::EACCES,
            14 => Self::EFAULT,
            16 => Self::EBUSY,
            17 => Self::EEXIST,
            20 => Self::ENOTDIR,
            21 => Self::EISDIR,
            22 => Self::EINVAL,
            24 => Self::EMFILE,
            25 => Self::ENOTTY,
            28 => Self::ENOSPC,
            29 => Self::ESPIPE,
            30 => Self::EROFS,
            34 => Self::ERANGE,
            36 => Self::ENAMETOOLONG,
            38 => Self::ENOSYS,
            39 => Self::ENOTEMPTY,
            40 => Self::ELOOP,
            75 => Self::EOVERFLOW,
            512 => Self::ERESTARTSYS,
            _ => return None,
        })
    }

    /// Failure class of this error.
    pub const fn kind(self) -> ErrorKind {
        match self {
            Self::EINVAL => ErrorKind::Input,
            Self::EFAULT => ErrorKind::Fault,
            Self::EPERM => ErrorKind::Permission,
            Self::EINTR => ErrorKind::Interrupted,
            _ => ErrorKind::Passthrough,
        }
    }

    /// Short symbolic name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::EPERM => "EPERM",
            Self::ENOENT => "ENOENT",
            Self::ESRCH => "ESRCH",
            Self::EINTR => "EINTR",
            Self::EIO => "EIO",
            Self::EBADF => "EBADF",
            Self::EAGAIN => "EAGAIN",
            Self::ENOMEM => "ENOMEM",
            Self::EACCES => "EACCES",
            Self::EFAULT => "EFAULT",
            Self::EBUSY => "EBUSY",
            Self::EEXIST => "EEXIST",
            Self::ENOTDIR => "ENOTDIR",
            Self::EISDIR => "EISDIR",
            Self::EINVAL => "EINVAL",
            Self::EMFILE => "EMFILE",
            Self::ENOTTY => "ENOTTY",
            Self::ENOSPC => "ENOSPC",
            Self::ESPIPE => "ESPIPE",
            Self::EROFS => "EROFS",
            Self::ERANGE => "ERANGE",
            Self::ENAMETOOLONG => "ENAMETOOLONG",
            Self::ENOSYS => "ENOSYS",
            Self::ENOTEMPTY => "ENOTEMPTY",
            Self::ELOOP => "ELOOP",
            Self::EOVERFLOW => "EOVERFLOW",
            Self::ERESTARTSYS => "ERESTARTSYS",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// Fold a handler result into the value placed in the return register.
#[inline]
pub fn to_sysret(result: KResult<usize>) -> isize {
    match result {
        Ok(n) => n as isize,
        Err(e) => e.as_sysret(),
    }
}
