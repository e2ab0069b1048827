//! User memory copy primitives
//!
//! Every kernel load from or store to user memory goes through the byte
//! helpers here. On bare-metal AArch64 each helper performs its access with a
//! single `ldrb`/`strb` and registers that instruction in the
//! `ocelot_extable` section together with a fixup address. When the access
//! faults, the trap path finds the faulting PC in the table, records the
//! fault and resumes at the fixup: a faulting load yields zero, a faulting
//! store is dropped. Which instruction the compiler would have picked for a
//! plain slice copy (LDP, SIMD, ...) no longer matters.
//!
//! User memory is never turned into a Rust reference. Other threads may
//! write it at any time and iovecs may alias, so the views in
//! `syscall::validate` copy through raw pointers only.
//!
//! Host builds have no exception table; the helpers fall back to volatile
//! byte accesses.

use core::mem::{size_of, MaybeUninit};

use crate::abi::Plain;

/// One exception table entry: a user access instruction and where to resume
/// if it faults.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtableEntry {
    pub insn: usize,
    pub fixup: usize,
}

/// Fixup address for a fault at `pc`, if `pc` is a registered user access.
pub fn search_extable(table: &[ExtableEntry], pc: usize) -> Option<usize> {
    table.iter().find(|e| e.insn == pc).map(|e| e.fixup)
}

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
mod arch {
    use super::ExtableEntry;

    // x0 = user address, w1 = value for put. get returns the byte in w0.
    core::arch::global_asm!(
        r#"
    .pushsection .text.ocelot_uaccess, "ax"

    .global __ocelot_get_user_u8
    .type __ocelot_get_user_u8, %function
__ocelot_get_user_u8:
.Lget_u8_access:
    ldrb w0, [x0]
    ret
.Lget_u8_fixup:
    mov w0, #0
    ret
    .size __ocelot_get_user_u8, . - __ocelot_get_user_u8

    .pushsection ocelot_extable, "a"
    .balign 8
    .quad .Lget_u8_access, .Lget_u8_fixup
    .popsection

    .global __ocelot_put_user_u8
    .type __ocelot_put_user_u8, %function
__ocelot_put_user_u8:
.Lput_u8_access:
    strb w1, [x0]
.Lput_u8_fixup:
    ret
    .size __ocelot_put_user_u8, . - __ocelot_put_user_u8

    .pushsection ocelot_extable, "a"
    .balign 8
    .quad .Lput_u8_access, .Lput_u8_fixup
    .popsection

    .popsection
"#
    );

    extern "C" {
        fn __ocelot_get_user_u8(src: *const u8) -> u8;
        fn __ocelot_put_user_u8(dst: *mut u8, val: u8);

        // Section bounds provided by the linker.
        static __start_ocelot_extable: ExtableEntry;
        static __stop_ocelot_extable: ExtableEntry;
    }

    #[inline(always)]
    pub unsafe fn get_u8(src: *const u8) -> u8 {
        // SAFETY: the caller validated `src`; a late fault is fixed up.
        unsafe { __ocelot_get_user_u8(src) }
    }

    #[inline(always)]
    pub unsafe fn put_u8(dst: *mut u8, val: u8) {
        // SAFETY: as for `get_u8`.
        unsafe { __ocelot_put_user_u8(dst, val) }
    }

    pub fn extable() -> &'static [ExtableEntry] {
        // SAFETY: the linker places every `ocelot_extable` entry between the
        // two bounds, and nothing writes the section.
        unsafe {
            let start = core::ptr::addr_of!(__start_ocelot_extable);
            let stop = core::ptr::addr_of!(__stop_ocelot_extable);
            let len = (stop as usize - start as usize) / core::mem::size_of::<ExtableEntry>();
            core::slice::from_raw_parts(start, len)
        }
    }
}

#[cfg(not(all(target_arch = "aarch64", target_os = "none")))]
mod arch {
    use super::ExtableEntry;

    #[inline(always)]
    pub unsafe fn get_u8(src: *const u8) -> u8 {
        // SAFETY: the caller validated `src`.
        unsafe { core::ptr::read_volatile(src) }
    }

    #[inline(always)]
    pub unsafe fn put_u8(dst: *mut u8, val: u8) {
        // SAFETY: the caller validated `dst`.
        unsafe { core::ptr::write_volatile(dst, val) }
    }

    pub fn extable() -> &'static [ExtableEntry] {
        &[]
    }
}

/// Registered user access instructions of this kernel image.
pub use arch::extable;

/// Load one user byte.
///
/// # Safety
/// `src` must have been validated readable inside the access window that is
/// still held.
#[inline]
pub unsafe fn get_user_u8(src: *const u8) -> u8 {
    // SAFETY: forwarded caller contract.
    unsafe { arch::get_u8(src) }
}

/// Copy `dst.len()` bytes in from user address `src`.
///
/// # Safety
/// The whole source range must have been validated readable inside the
/// access window that is still held.
pub unsafe fn copy_from_user(dst: &mut [u8], src: *const u8) {
    for (i, byte) in dst.iter_mut().enumerate() {
        // SAFETY: `src + i` lies in the validated range.
        *byte = unsafe { arch::get_u8(src.wrapping_add(i)) };
    }
}

/// Copy `src` out to user address `dst`.
///
/// # Safety
/// The whole destination range must have been validated writable inside
/// the access window that is still held.
pub unsafe fn copy_to_user(dst: *mut u8, src: &[u8]) {
    for (i, &byte) in src.iter().enumerate() {
        // SAFETY: `dst + i` lies in the validated range.
        unsafe { arch::put_u8(dst.wrapping_add(i), byte) };
    }
}

/// Read one `T` from user memory. No alignment is required.
///
/// # Safety
/// As for `copy_from_user`, over `size_of::<T>()` bytes.
pub unsafe fn read_user<T: Plain>(src: *const T) -> T {
    let mut value = MaybeUninit::<T>::zeroed();
    // SAFETY: the zeroed storage is initialized and `size_of::<T>()` long.
    let bytes =
        unsafe { core::slice::from_raw_parts_mut(value.as_mut_ptr() as *mut u8, size_of::<T>()) };
    // SAFETY: forwarded caller contract.
    unsafe { copy_from_user(bytes, src as *const u8) };
    // SAFETY: `T: Plain` is valid for every bit pattern.
    unsafe { value.assume_init() }
}

/// Write one `T` to user memory. No alignment is required.
///
/// # Safety
/// As for `copy_to_user`, over `size_of::<T>()` bytes.
pub unsafe fn write_user<T: Plain>(dst: *mut T, value: &T) {
    // SAFETY: `T: Plain` has no padding, so every byte is initialized.
    let bytes =
        unsafe { core::slice::from_raw_parts(value as *const T as *const u8, size_of::<T>()) };
    // SAFETY: forwarded caller contract.
    unsafe { copy_to_user(dst as *mut u8, bytes) };
}
