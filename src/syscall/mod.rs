//! System Call Interface
//!
//! The user/kernel trust boundary for syscall arguments.
//!
//! # Security Model
//! - Table approach: only numbers with an entry are dispatched, everything
//!   else returns ENOSYS
//! - Pointer arguments are validated inside an access window before use
//! - Invalid inputs return errors, never panic
//!
//! # Layout
//! - `handler`: number table and dispatch
//! - `fs`: validating wrappers for filesystem syscalls
//! - `iov`: scatter/gather engine
//! - `validate`: pointer, buffer and string checks

mod fs;
mod handler;
pub mod iov;
pub mod validate;

pub use handler::{
    dispatch, lookup, numbers, syscall_name, Handler, Policy, SyscallArgs, SyscallEntry,
    SyscallEnv,
};
pub use validate::{
    UserAccess, UserBuffer, UserBufferMut, UserIn, UserOut, UserSlice, UserStr,
};
