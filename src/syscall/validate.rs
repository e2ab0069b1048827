//! System Call Pointer Validation
//!
//! Every pointer a syscall receives is untrusted until checked here.
//!
//! # Queries
//! - `address_in_userspace`: the address lies inside the task's userspace
//!   bounds. For opaque pointers the kernel never dereferences.
//! - `range_accessible`: all of `[ptr, ptr + len)` is mapped with at least the
//!   requested permission. The gate before any kernel read or write of a
//!   user buffer.
//! - `bounded_string_valid`: a NUL terminator is found within `maxlen` bytes
//!   and every byte up to it is readable.
//!
//! A `true` answer only holds while the task's access lock is held. The
//! validated views below (`UserBuffer`, `UserStr`, ...) borrow the
//! `AccessGuard` to make that rule a compile-time one.

use core::marker::PhantomData;
use core::ptr;

use crate::abi::Plain;
use crate::config::PATH_MAX;
use crate::error::{Errno, KResult};
use crate::mm::{AddressSpace, Prot, VirtAddr};
use crate::uaccess::copy;
use crate::uaccess::AccessGuard;

/// Check that `ptr` lies inside the task's userspace bounds.
pub fn address_in_userspace(space: &dyn AddressSpace, ptr: usize) -> bool {
    let (start, end) = space.user_bounds();
    let addr = VirtAddr::new(ptr);
    addr >= start && addr < end
}

/// Check that `[ptr, ptr + len)` is in userspace and mapped with `prot`.
///
/// A zero-length range is accessible iff `ptr` is a userspace address.
pub fn range_accessible(space: &dyn AddressSpace, ptr: usize, len: usize, prot: Prot) -> bool {
    if len == 0 {
        return address_in_userspace(space, ptr);
    }

    let mut cursor = VirtAddr::new(ptr);
    let end = match cursor.checked_add(len) {
        Some(end) => end,
        None => return false,
    };

    let (ustart, uend) = space.user_bounds();
    if cursor < ustart || end > uend {
        return false;
    }

    // Walk the regions covering the range; any hole or weaker mapping fails.
    while cursor < end {
        let region = match space.region_at(cursor) {
            Some(r) => r,
            None => return false,
        };
        if !region.prot.contains(prot) {
            return false;
        }
        cursor = region.end;
    }
    true
}

/// Length of the NUL-terminated user string at `ptr`, scanning at most
/// `maxlen` bytes. `None` if no terminator is found in bounds or a scanned
/// byte is not readable.
pub fn user_strnlen(space: &dyn AddressSpace, ptr: usize, maxlen: usize) -> Option<usize> {
    if !address_in_userspace(space, ptr) {
        return None;
    }
    let limit = VirtAddr::new(ptr.saturating_add(maxlen));
    let mut cursor = VirtAddr::new(ptr);

    while cursor < limit {
        let region = space.region_at(cursor)?;
        if !region.prot.contains(Prot::READ) {
            return None;
        }
        let stop = core::cmp::min(region.end, limit);
        for addr in cursor.as_usize()..stop.as_usize() {
            // SAFETY: addr lies in a region the address space reports as
            // mapped and readable (AddressSpace contract).
            let byte = unsafe { copy::get_user_u8(addr as *const u8) };
            if byte == 0 {
                return Some(addr - ptr);
            }
        }
        cursor = stop;
    }
    None
}

/// Check for a NUL-terminated user string of at most `maxlen` bytes
/// including the terminator.
pub fn bounded_string_valid(space: &dyn AddressSpace, ptr: usize, maxlen: usize) -> bool {
    user_strnlen(space, ptr, maxlen).is_some()
}

/// Validation scope: an address space plus proof that its access lock is held.
#[derive(Clone, Copy)]
pub struct UserAccess<'g> {
    space: &'g dyn AddressSpace,
    _window: PhantomData<&'g ()>,
}

impl<'g> UserAccess<'g> {
    pub fn new(_guard: &'g AccessGuard<'_>, space: &'g dyn AddressSpace) -> Self {
        Self {
            space,
            _window: PhantomData,
        }
    }

    pub fn space(&self) -> &'g dyn AddressSpace {
        self.space
    }

    /// Validate a buffer the kernel will read.
    pub fn buf(&self, ptr: usize, len: usize) -> KResult<UserBuffer<'g>> {
        if !range_accessible(self.space, ptr, len, Prot::READ) {
            return Err(Errno::EFAULT);
        }
        Ok(UserBuffer {
            ptr: ptr as *const u8,
            len,
            _window: PhantomData,
        })
    }

    /// Validate a buffer the kernel will write.
    pub fn buf_mut(&self, ptr: usize, len: usize) -> KResult<UserBufferMut<'g>> {
        if !range_accessible(self.space, ptr, len, Prot::WRITE) {
            return Err(Errno::EFAULT);
        }
        Ok(UserBufferMut {
            ptr: ptr as *mut u8,
            len,
            _window: PhantomData,
        })
    }

    /// Validate a buffer the kernel both reads and writes.
    pub fn buf_rw(&self, ptr: usize, len: usize) -> KResult<UserBufferMut<'g>> {
        if !range_accessible(self.space, ptr, len, Prot::READ | Prot::WRITE) {
            return Err(Errno::EFAULT);
        }
        Ok(UserBufferMut {
            ptr: ptr as *mut u8,
            len,
            _window: PhantomData,
        })
    }

    /// Validate a NUL-terminated string of at most `maxlen` bytes.
    pub fn cstr(&self, ptr: usize, maxlen: usize) -> KResult<UserStr<'g>> {
        let len = user_strnlen(self.space, ptr, maxlen).ok_or(Errno::EFAULT)?;
        Ok(UserStr {
            ptr: ptr as *const u8,
            len,
            _window: PhantomData,
        })
    }

    /// Validate a path argument and copy it into the kernel.
    pub fn path(&self, ptr: usize) -> KResult<KPath> {
        let s = self.cstr(ptr, PATH_MAX)?;
        let mut path = KPath {
            bytes: [0; PATH_MAX],
            len: 0,
        };
        let copied = s.copy_to(&mut path.bytes);
        // The task may have shortened the string since it was measured.
        path.len = path.bytes[..copied]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(copied);
        Ok(path)
    }

    /// Validate a user object the kernel will read.
    pub fn input<T: Plain>(&self, ptr: usize) -> KResult<UserIn<'g, T>> {
        if !range_accessible(self.space, ptr, core::mem::size_of::<T>(), Prot::READ) {
            return Err(Errno::EFAULT);
        }
        Ok(UserIn {
            ptr: ptr as *const T,
            _window: PhantomData,
        })
    }

    /// Validate a readable array of `count` user objects.
    pub fn slice<T: Plain>(&self, ptr: usize, count: usize) -> KResult<UserSlice<'g, T>> {
        let len = count
            .checked_mul(core::mem::size_of::<T>())
            .ok_or(Errno::EFAULT)?;
        if !range_accessible(self.space, ptr, len, Prot::READ) {
            return Err(Errno::EFAULT);
        }
        Ok(UserSlice {
            ptr: ptr as *const T,
            count,
            _window: PhantomData,
        })
    }

    /// Validate a user object the kernel will write.
    pub fn output<T: Plain>(&self, ptr: usize) -> KResult<UserOut<'g, T>> {
        if !range_accessible(self.space, ptr, core::mem::size_of::<T>(), Prot::WRITE) {
            return Err(Errno::EFAULT);
        }
        Ok(UserOut {
            ptr: ptr as *mut T,
            _window: PhantomData,
        })
    }
}

/// A validated user-space buffer the kernel reads.
///
/// This type guarantees that:
/// - The buffer is mapped readable for the whole length
/// - The length doesn't overflow
/// - The access window it was validated in is still open
#[derive(Debug)]
pub struct UserBuffer<'g> {
    ptr: *const u8,
    len: usize,
    _window: PhantomData<&'g ()>,
}

impl<'g> UserBuffer<'g> {
    /// An empty buffer, valid in any window.
    pub const fn empty() -> Self {
        Self {
            ptr: ptr::null(),
            len: 0,
            _window: PhantomData,
        }
    }

    /// Copy bytes starting at `offset` into `dst`. Returns the number of
    /// bytes copied, short when the buffer ends first.
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> usize {
        read_span(self.ptr, self.len, offset, dst)
    }

    pub fn addr(&self) -> usize {
        self.ptr as usize
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A validated mutable user-space buffer.
#[derive(Debug)]
pub struct UserBufferMut<'g> {
    ptr: *mut u8,
    len: usize,
    _window: PhantomData<&'g ()>,
}

impl<'g> UserBufferMut<'g> {
    /// An empty buffer, valid in any window.
    pub const fn empty() -> Self {
        Self {
            ptr: ptr::null_mut(),
            len: 0,
            _window: PhantomData,
        }
    }

    /// Copy `src` into the buffer starting at `offset`. Returns the number
    /// of bytes stored, short when the buffer ends first.
    pub fn write_at(&mut self, offset: usize, src: &[u8]) -> usize {
        let n = span(self.len, offset, src.len());
        if n > 0 {
            // SAFETY: offset + n <= len and the range was validated
            // writable; the window is held for 'g.
            unsafe { copy::copy_to_user(self.ptr.wrapping_add(offset), &src[..n]) };
        }
        n
    }

    /// Copy bytes starting at `offset` into `dst`. Only meaningful for
    /// buffers validated with `UserAccess::buf_rw`.
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> usize {
        read_span(self.ptr, self.len, offset, dst)
    }

    pub fn addr(&self) -> usize {
        self.ptr as usize
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A validated NUL-terminated user string.
#[derive(Debug, Clone, Copy)]
pub struct UserStr<'g> {
    ptr: *const u8,
    len: usize,
    _window: PhantomData<&'g ()>,
}

impl<'g> UserStr<'g> {
    /// Copy the string, without the terminator, into `dst`. Returns the
    /// number of bytes copied.
    pub fn copy_to(&self, dst: &mut [u8]) -> usize {
        read_span(self.ptr, self.len, 0, dst)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A path copied in from userspace. Filesystems only ever see this copy,
/// so a task rewriting its string mid-call cannot change what was checked.
pub struct KPath {
    bytes: [u8; PATH_MAX],
    len: usize,
}

impl KPath {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl core::fmt::Debug for KPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "KPath({:?})", core::str::from_utf8(self.as_bytes()).unwrap_or("<binary>"))
    }
}

/// Bytes available from `offset` in a buffer of `len`, capped at `want`.
fn span(len: usize, offset: usize, want: usize) -> usize {
    len.saturating_sub(offset).min(want)
}

fn read_span(ptr: *const u8, len: usize, offset: usize, dst: &mut [u8]) -> usize {
    let n = span(len, offset, dst.len());
    if n > 0 {
        // SAFETY: offset + n <= len and the range was validated readable;
        // the window is held by the view's owner.
        unsafe { copy::copy_from_user(&mut dst[..n], ptr.wrapping_add(offset)) };
    }
    n
}

/// A validated user object the kernel reads.
#[derive(Debug)]
pub struct UserIn<'g, T: Plain> {
    ptr: *const T,
    _window: PhantomData<&'g T>,
}

impl<T: Plain> UserIn<'_, T> {
    pub fn read(&self) -> T {
        // SAFETY: size_of::<T>() bytes validated readable; T is Plain.
        unsafe { copy::read_user(self.ptr) }
    }
}

/// A validated, read-only array of user objects.
///
/// Elements are copied out one at a time; userspace may rewrite the array
/// concurrently, so no reference into it is ever handed out.
#[derive(Debug)]
pub struct UserSlice<'g, T: Plain> {
    ptr: *const T,
    count: usize,
    _window: PhantomData<&'g T>,
}

impl<T: Plain> UserSlice<'_, T> {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Copy element `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<T> {
        if index >= self.count {
            return None;
        }
        // SAFETY: index < count and the whole array was validated readable.
        Some(unsafe { copy::read_user(self.ptr.wrapping_add(index)) })
    }
}

/// A validated user object the kernel writes.
#[derive(Debug)]
pub struct UserOut<'g, T: Plain> {
    ptr: *mut T,
    _window: PhantomData<&'g mut T>,
}

impl<T: Plain> UserOut<'_, T> {
    pub fn write(&mut self, value: T) {
        // SAFETY: size_of::<T>() bytes validated writable; T is Plain.
        unsafe { copy::write_user(self.ptr, &value) }
    }

    pub fn addr(&self) -> usize {
        self.ptr as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTask;
    use crate::uaccess;

    #[test]
    fn test_zero_length() {
        let task = FakeTask::new();
        let space = task.space();
        let buf = task.alloc(16, Prot::READ);
        assert!(range_accessible(space, buf, 0, Prot::WRITE));
        assert!(!range_accessible(space, 0, 0, Prot::READ));
    }

    #[test]
    fn test_null_pointer() {
        let task = FakeTask::new();
        assert!(!range_accessible(task.space(), 0, 100, Prot::READ));
        assert!(!address_in_userspace(task.space(), 0));
    }

    #[test]
    fn test_overflow() {
        let task = FakeTask::new();
        assert!(!range_accessible(task.space(), usize::MAX - 10, 100, Prot::READ));
    }

    #[test]
    fn test_kernel_address() {
        let task = FakeTask::new();
        assert!(!address_in_userspace(task.space(), usize::MAX - 0x1000));
    }

    #[test]
    fn test_permission_and_holes() {
        let task = FakeTask::new();
        let space = task.space();
        let ro = task.alloc(64, Prot::READ);
        assert!(range_accessible(space, ro, 64, Prot::READ));
        assert!(!range_accessible(space, ro, 64, Prot::WRITE));
        assert!(!range_accessible(space, ro, 65, Prot::READ));
        assert!(range_accessible(space, ro + 8, 8, Prot::READ));
    }

    #[test]
    fn test_range_spanning_adjacent_regions() {
        let task = FakeTask::new();
        let base = task.alloc_unmapped(128);
        task.map(base, 64, Prot::READ | Prot::WRITE);
        task.map(base + 64, 64, Prot::READ);
        let space = task.space();
        assert!(range_accessible(space, base, 128, Prot::READ));
        assert!(!range_accessible(space, base, 128, Prot::WRITE));
        assert!(range_accessible(space, base, 64, Prot::WRITE));
    }

    #[test]
    fn test_string_terminator_bounds() {
        let task = FakeTask::new();
        let space = task.space();
        let s = task.alloc_bytes(b"abcd\0", Prot::READ);
        // Terminator at index 4.
        assert!(bounded_string_valid(space, s, 5));
        assert!(!bounded_string_valid(space, s, 4));
        assert!(!bounded_string_valid(space, s, 0));
        assert_eq!(user_strnlen(space, s, 64), Some(4));
    }

    #[test]
    fn test_string_running_off_mapping() {
        let task = FakeTask::new();
        let s = task.alloc_bytes(b"abcd", Prot::READ);
        assert!(!bounded_string_valid(task.space(), s, 64));
    }

    #[test]
    fn test_string_across_regions() {
        let task = FakeTask::new();
        let base = task.alloc_unmapped(8);
        task.write_bytes(base, b"abcdef\0\0");
        task.map(base, 4, Prot::READ);
        task.map(base + 4, 4, Prot::READ);
        assert_eq!(user_strnlen(task.space(), base, 8), Some(6));

        let other = task.alloc_unmapped(8);
        task.write_bytes(other, b"abcdef\0\0");
        task.map(other, 4, Prot::READ);
        task.map(other + 4, 4, Prot::WRITE);
        assert!(!bounded_string_valid(task.space(), other, 8));
    }

    #[test]
    fn test_views_read_and_write() {
        let task = FakeTask::new();
        let src = task.alloc_bytes(b"hello", Prot::READ);
        let dst = task.alloc(8, Prot::READ | Prot::WRITE);
        let path = task.alloc_bytes(b"/etc/motd\0", Prot::READ);

        let guard = uaccess::lock(&task).unwrap();
        let ua = UserAccess::new(&guard, task.space());

        let mut hello = [0u8; 8];
        assert_eq!(ua.buf(src, 5).unwrap().read_at(0, &mut hello), 5);
        assert_eq!(&hello[..5], b"hello");
        assert_eq!(ua.buf_mut(src, 5).err(), Some(Errno::EFAULT));
        assert_eq!(ua.path(path).unwrap().as_bytes(), b"/etc/motd");

        let mut out = ua.output::<u64>(dst).unwrap();
        out.write(0x1122_3344_5566_7788);
        assert_eq!(ua.input::<u64>(dst).unwrap().read(), 0x1122_3344_5566_7788);

        let arr = ua.slice::<u64>(dst, 1).unwrap();
        assert_eq!(arr.get(0), Some(0x1122_3344_5566_7788));
        assert_eq!(arr.get(1), None);
        assert!(ua.slice::<u64>(dst, 2).is_err());
        assert!(ua.slice::<u64>(dst, usize::MAX).is_err());
        assert!(ua.buf_rw(src, 1).is_err());

        let mut bytes = ua.buf_mut(dst, 2).unwrap();
        assert_eq!(bytes.write_at(0, b"okay"), 2);
        drop(guard);
        assert_eq!(&task.read_bytes(dst, 2)[..], b"ok");
    }

    #[test]
    fn test_buffer_offsets() {
        let task = FakeTask::new();
        let base = task.alloc_bytes(b"abcdef", Prot::READ | Prot::WRITE);
        let guard = uaccess::lock(&task).unwrap();
        let ua = UserAccess::new(&guard, task.space());

        let buf = ua.buf(base, 6).unwrap();
        let mut out = [0u8; 4];
        assert_eq!(buf.read_at(4, &mut out), 2);
        assert_eq!(&out[..2], b"ef");
        assert_eq!(buf.read_at(6, &mut out), 0);
        assert_eq!(buf.read_at(usize::MAX, &mut out), 0);

        let mut rw = ua.buf_rw(base, 6).unwrap();
        assert_eq!(rw.write_at(5, b"XY"), 1);
        assert_eq!(rw.write_at(9, b"Z"), 0);
        assert_eq!(rw.read_at(3, &mut out), 3);
        assert_eq!(&out[..3], b"deX");
    }

    #[test]
    fn test_aliasing_views_copy_through() {
        let task = FakeTask::new();
        let base = task.alloc_bytes(b"1234", Prot::READ | Prot::WRITE);
        let guard = uaccess::lock(&task).unwrap();
        let ua = UserAccess::new(&guard, task.space());

        // Two live views over the same bytes, as overlapping iovecs produce.
        let mut a = ua.buf_mut(base, 4).unwrap();
        let mut b = ua.buf_mut(base + 2, 2).unwrap();
        a.write_at(0, b"wxyz");
        b.write_at(0, b"!!");
        let mut out = [0u8; 4];
        a.read_at(0, &mut out);
        assert_eq!(&out, b"wx!!");
    }

    #[test]
    fn test_path_is_copied_in() {
        let task = FakeTask::new();
        let p = task.alloc_bytes(b"/etc/motd\0", Prot::READ | Prot::WRITE);
        let guard = uaccess::lock(&task).unwrap();
        let ua = UserAccess::new(&guard, task.space());

        let path = ua.path(p).unwrap();
        // Rewriting the user string does not change the kernel copy.
        task.write_bytes(p, b"/bin");
        assert_eq!(path.as_bytes(), b"/etc/motd");
        assert_eq!(ua.path(p).unwrap().as_bytes(), b"/binmotd");
    }
}
