//! Host-side test doubles.
//!
//! `FakeTask` backs its region table with real host memory, so everything the
//! validators approve is genuinely dereferenced by the code under test.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::abi::{
    AtFlags, Fd, Flock, Plain, Stat, StatFs, Timespec, F_GETLK, SEEK_CUR, SEEK_END, SEEK_SET,
};
use crate::cap::Capability;
use crate::error::{Errno, KResult};
use crate::fs::{FcntlArg, FilePos, FileSystem, IoctlArg};
use crate::mm::{AddressSpace, Prot, Region, RegionTable, VirtAddr, PAGE_SIZE};
use crate::syscall::{UserBuffer, UserBufferMut};
use crate::task::Task;
use crate::uaccess::{AccessLock, FaultFlag};

/// Upper half of the address space stands in for kernel memory.
pub const USER_END: usize = 1 << (usize::BITS - 1);

/// An address no task can reach.
pub const KERNEL_ADDR: usize = usize::MAX - 0xfff;

pub struct FakeTask {
    regions: RegionTable,
    lock: AccessLock,
    fault: FaultFlag,
    signal: AtomicBool,
    caps: Capability,
    tls: AtomicUsize,
}

impl FakeTask {
    pub fn new() -> Self {
        Self {
            regions: RegionTable::new(PAGE_SIZE, USER_END),
            lock: AccessLock::new(),
            fault: FaultFlag::new(),
            signal: AtomicBool::new(false),
            caps: Capability::empty(),
            tls: AtomicUsize::new(0),
        }
    }

    pub fn with_caps(mut self, caps: Capability) -> Self {
        self.caps = caps;
        self
    }

    pub fn space(&self) -> &dyn AddressSpace {
        &self.regions
    }

    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }

    pub fn raise_signal(&self) {
        self.signal.store(true, Ordering::SeqCst);
    }

    pub fn tls(&self) -> usize {
        self.tls.load(Ordering::SeqCst)
    }

    /// Host memory not yet described by any region. Leaked, so addresses stay
    /// valid for the rest of the test process.
    pub fn alloc_unmapped(&self, len: usize) -> usize {
        let words = len.div_ceil(8).max(1);
        let mem: &'static mut [u64] = vec![0u64; words].leak();
        mem.as_mut_ptr() as usize
    }

    pub fn map(&self, addr: usize, len: usize, prot: Prot) {
        // SAFETY: test regions only ever cover leaked host allocations.
        unsafe { self.regions.map(Region::new(addr, len, prot)) }.unwrap();
    }

    pub fn unmap(&self, addr: usize) {
        self.regions.unmap(VirtAddr::new(addr)).unwrap();
    }

    pub fn protect(&self, addr: usize, prot: Prot) {
        // SAFETY: as for `map`.
        unsafe { self.regions.protect(VirtAddr::new(addr), prot) }.unwrap();
    }

    pub fn alloc(&self, len: usize, prot: Prot) -> usize {
        let addr = self.alloc_unmapped(len);
        self.map(addr, len, prot);
        addr
    }

    pub fn alloc_bytes(&self, data: &[u8], prot: Prot) -> usize {
        let addr = self.alloc_unmapped(data.len());
        self.write_bytes(addr, data);
        self.map(addr, data.len(), prot);
        addr
    }

    pub fn alloc_value<T: Plain>(&self, value: T, prot: Prot) -> usize {
        let len = core::mem::size_of::<T>();
        let addr = self.alloc_unmapped(len);
        // SAFETY: fresh allocation of at least `len` bytes.
        unsafe { core::ptr::write_unaligned(addr as *mut T, value) };
        self.map(addr, len, prot);
        addr
    }

    pub fn write_bytes(&self, addr: usize, data: &[u8]) {
        // SAFETY: callers pass addresses from `alloc*`.
        unsafe { core::ptr::copy_nonoverlapping(data.as_ptr(), addr as *mut u8, data.len()) };
    }

    pub fn read_bytes(&self, addr: usize, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        // SAFETY: callers pass addresses from `alloc*`.
        unsafe { core::ptr::copy_nonoverlapping(addr as *const u8, out.as_mut_ptr(), len) };
        out
    }

    pub fn read_value<T: Plain>(&self, addr: usize) -> T {
        // SAFETY: callers pass addresses from `alloc*`.
        unsafe { core::ptr::read_unaligned(addr as *const T) }
    }
}

impl Task for FakeTask {
    fn address_space(&self) -> &dyn AddressSpace {
        &self.regions
    }

    fn access_lock(&self) -> &AccessLock {
        &self.lock
    }

    fn fault_flag(&self) -> &FaultFlag {
        &self.fault
    }

    fn signal_pending(&self) -> bool {
        self.signal.load(Ordering::SeqCst)
    }

    fn has_capability(&self, cap: Capability) -> bool {
        self.caps.contains(cap)
    }

    fn pid(&self) -> i32 {
        42
    }

    fn ppid(&self) -> i32 {
        1
    }

    fn tid(&self) -> i32 {
        43
    }

    fn set_tls(&self, tls: VirtAddr) {
        self.tls.store(tls.as_usize(), Ordering::SeqCst);
    }
}

/// Filesystem double that records every call and serves one in-memory file.
pub struct FakeFs {
    calls: Mutex<Vec<String>>,
    file: Mutex<Vec<u8>>,
    cursor: AtomicUsize,
}

impl FakeFs {
    pub fn new() -> Self {
        Self::with_file(b"")
    }

    pub fn with_file(contents: &[u8]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            file: Mutex::new(contents.to_vec()),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.file.lock().unwrap().clone()
    }

    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn start(&self, pos: FilePos) -> usize {
        match pos {
            FilePos::Current => self.cursor(),
            FilePos::At(off) => off as usize,
        }
    }

    fn finish(&self, pos: FilePos, start: usize, n: usize) {
        if pos == FilePos::Current {
            self.cursor.store(start + n, Ordering::SeqCst);
        }
    }

    /// Up to `len` bytes of the file from `start`; empty past the end.
    fn read_at(&self, start: usize, len: usize) -> Vec<u8> {
        let file = self.file.lock().unwrap();
        let tail = file.get(start..).unwrap_or(&[]);
        tail[..tail.len().min(len)].to_vec()
    }

    /// Copy a whole user buffer into the kernel.
    fn copy_in(buf: &UserBuffer<'_>) -> Vec<u8> {
        let mut data = vec![0u8; buf.len()];
        buf.read_at(0, &mut data);
        data
    }

    fn write_at(&self, start: usize, data: &[u8]) {
        let mut file = self.file.lock().unwrap();
        if file.len() < start + data.len() {
            file.resize(start + data.len(), 0);
        }
        file[start..start + data.len()].copy_from_slice(data);
    }
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl FileSystem for FakeFs {
    fn open_at(&self, dirfd: Fd, path: &[u8], flags: u32, mode: u32) -> KResult<usize> {
        self.record(format!("openat {} {} {:#x} {:o}", dirfd, text(path), flags, mode));
        Ok(3)
    }

    fn close(&self, fd: Fd) -> KResult<usize> {
        self.record(format!("close {}", fd));
        if fd < 0 {
            return Err(Errno::EBADF);
        }
        Ok(0)
    }

    fn dup2(&self, fd: Fd, newfd: Fd) -> KResult<usize> {
        self.record(format!("dup2 {} {}", fd, newfd));
        Ok(newfd as usize)
    }

    fn umask(&self, mask: u32) -> KResult<usize> {
        self.record(format!("umask {:o}", mask));
        Ok(0o22)
    }

    fn lseek(&self, fd: Fd, offset: i64, whence: u32) -> KResult<i64> {
        let (origin, name) = match whence {
            SEEK_SET => (0, "SET"),
            SEEK_CUR => (self.cursor() as i64, "CUR"),
            SEEK_END => (self.file.lock().unwrap().len() as i64, "END"),
            _ => panic!("unvalidated whence {}", whence),
        };
        self.record(format!("lseek {} {} {}", fd, offset, name));
        let pos = origin + offset;
        if pos >= 0 {
            self.cursor.store(pos as usize, Ordering::SeqCst);
        }
        Ok(pos)
    }

    fn access_at(&self, dirfd: Fd, path: &[u8], mode: u32, flags: AtFlags) -> KResult<usize> {
        self.record(format!("faccessat {} {} {} {:#x}", dirfd, text(path), mode, flags.bits()));
        Ok(0)
    }

    fn chown_at(
        &self,
        dirfd: Fd,
        path: &[u8],
        uid: u32,
        gid: u32,
        flags: AtFlags,
    ) -> KResult<usize> {
        self.record(format!(
            "fchownat {} {} {} {} {:#x}",
            dirfd,
            text(path),
            uid,
            gid,
            flags.bits()
        ));
        Ok(0)
    }

    fn mkdir_at(&self, dirfd: Fd, path: &[u8], mode: u32) -> KResult<usize> {
        self.record(format!("mkdirat {} {} {:o}", dirfd, text(path), mode));
        Ok(0)
    }

    fn rename_at(&self, from_dir: Fd, from: &[u8], to_dir: Fd, to: &[u8]) -> KResult<usize> {
        self.record(format!("renameat {} {} {} {}", from_dir, text(from), to_dir, text(to)));
        Ok(0)
    }

    fn symlink_at(&self, target: &[u8], dirfd: Fd, path: &[u8]) -> KResult<usize> {
        self.record(format!("symlinkat {} {} {}", text(target), dirfd, text(path)));
        Ok(0)
    }

    fn unlink_at(&self, dirfd: Fd, path: &[u8], flags: AtFlags) -> KResult<usize> {
        self.record(format!("unlinkat {} {} {:#x}", dirfd, text(path), flags.bits()));
        Ok(0)
    }

    fn utimens_at(
        &self,
        dirfd: Fd,
        path: &[u8],
        times: Option<[Timespec; 2]>,
        _flags: AtFlags,
    ) -> KResult<usize> {
        let times = match times {
            Some(t) => format!("{}.{} {}.{}", t[0].tv_sec, t[0].tv_nsec, t[1].tv_sec, t[1].tv_nsec),
            None => String::from("now"),
        };
        self.record(format!("utimensat {} {} {}", dirfd, text(path), times));
        Ok(0)
    }

    fn readlink_at(
        &self,
        dirfd: Fd,
        path: &[u8],
        buf: &mut UserBufferMut<'_>,
    ) -> KResult<usize> {
        self.record(format!("readlinkat {} {}", dirfd, text(path)));
        Ok(buf.write_at(0, b"target"))
    }

    fn stat_at(&self, dirfd: Fd, path: &[u8], flags: AtFlags) -> KResult<Stat> {
        self.record(format!("fstatat {} {} {:#x}", dirfd, text(path), flags.bits()));
        if path == b"/missing" {
            return Err(Errno::ENOENT);
        }
        Ok(Stat {
            st_ino: path.len() as u64,
            st_size: 1234,
            ..Stat::default()
        })
    }

    fn fstat(&self, fd: Fd) -> KResult<Stat> {
        self.record(format!("fstat {}", fd));
        Ok(Stat {
            st_size: self.file.lock().unwrap().len() as i64,
            ..Stat::default()
        })
    }

    fn statfs(&self, path: &[u8]) -> KResult<StatFs> {
        self.record(format!("statfs {}", text(path)));
        Ok(StatFs {
            f_bsize: 512,
            ..StatFs::default()
        })
    }

    fn getcwd(&self, buf: &mut UserBufferMut<'_>) -> KResult<usize> {
        self.record(String::from("getcwd"));
        if buf.len() < 2 {
            return Err(Errno::ERANGE);
        }
        Ok(buf.write_at(0, b"/\0"))
    }

    fn pipe2(&self, flags: u32) -> KResult<[Fd; 2]> {
        self.record(format!("pipe2 {:#x}", flags));
        Ok([3, 4])
    }

    fn mount(
        &self,
        dev: &[u8],
        dir: &[u8],
        fstype: &[u8],
        flags: u64,
        data: usize,
    ) -> KResult<usize> {
        self.record(format!(
            "mount {} {} {} {:#x} {:#x}",
            text(dev),
            text(dir),
            text(fstype),
            flags,
            data
        ));
        Ok(0)
    }

    fn umount2(&self, dir: &[u8], flags: u32) -> KResult<usize> {
        self.record(format!("umount2 {} {:#x}", text(dir), flags));
        Ok(0)
    }

    fn read(&self, fd: Fd, buf: &mut UserBufferMut<'_>, pos: FilePos) -> KResult<usize> {
        self.record(format!("read {} {} {:?}", fd, buf.len(), pos));
        let start = self.start(pos);
        let n = buf.write_at(0, &self.read_at(start, buf.len()));
        self.finish(pos, start, n);
        Ok(n)
    }

    fn write(&self, fd: Fd, buf: &UserBuffer<'_>, pos: FilePos) -> KResult<usize> {
        self.record(format!("write {} {} {:?}", fd, buf.len(), pos));
        let start = self.start(pos);
        self.write_at(start, &Self::copy_in(buf));
        self.finish(pos, start, buf.len());
        Ok(buf.len())
    }

    fn preadv(&self, fd: Fd, bufs: &mut [UserBufferMut<'_>], pos: FilePos) -> KResult<usize> {
        self.record(format!("preadv {} {} {:?}", fd, bufs.len(), pos));
        let start = self.start(pos);
        let mut done = 0;
        for buf in bufs.iter_mut() {
            let want = buf.len();
            let n = buf.write_at(0, &self.read_at(start + done, want));
            done += n;
            if n < want {
                break;
            }
        }
        self.finish(pos, start, done);
        Ok(done)
    }

    fn pwritev(&self, fd: Fd, bufs: &[UserBuffer<'_>], pos: FilePos) -> KResult<usize> {
        self.record(format!("pwritev {} {} {:?}", fd, bufs.len(), pos));
        let start = self.start(pos);
        let mut done = 0;
        for buf in bufs {
            self.write_at(start + done, &Self::copy_in(buf));
            done += buf.len();
        }
        self.finish(pos, start, done);
        Ok(done)
    }

    fn fcntl(&self, fd: Fd, cmd: u32, arg: FcntlArg<'_>) -> KResult<usize> {
        match arg {
            FcntlArg::Value(v) => {
                self.record(format!("fcntl {} {} {:#x}", fd, cmd, v));
                Ok(0)
            }
            FcntlArg::Lock(lock) => {
                self.record(format!("fcntl {} {} lock {}", fd, cmd, lock.l_type));
                if cmd == F_GETLK {
                    *lock = Flock {
                        l_type: lock.l_type,
                        l_whence: lock.l_whence,
                        l_start: lock.l_start,
                        l_len: lock.l_len,
                        l_pid: 7,
                        ..Flock::default()
                    };
                }
                Ok(0)
            }
        }
    }

    fn ioctl(&self, fd: Fd, request: u32, arg: IoctlArg<'_>) -> KResult<usize> {
        match arg {
            IoctlArg::None(raw) => {
                self.record(format!("ioctl {} {:#x} none {:#x}", fd, request, raw));
            }
            IoctlArg::In(buf) => {
                let data = Self::copy_in(&buf);
                self.record(format!("ioctl {} {:#x} in {:?}", fd, request, data));
            }
            IoctlArg::Out(mut buf) => {
                self.record(format!("ioctl {} {:#x} out {}", fd, request, buf.len()));
                let fill = vec![0xab; buf.len()];
                buf.write_at(0, &fill);
            }
            IoctlArg::InOut(mut buf) => {
                self.record(format!("ioctl {} {:#x} inout {}", fd, request, buf.len()));
                let mut data = vec![0u8; buf.len()];
                buf.read_at(0, &mut data);
                for b in data.iter_mut() {
                    *b = b.wrapping_add(1);
                }
                buf.write_at(0, &data);
            }
        }
        Ok(0)
    }
}
