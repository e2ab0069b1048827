//! Scatter/gather I/O
//!
//! readv/writev/preadv/pwritev share one engine. The user descriptor array is
//! validated as a whole, then walked in fixed batches of `IOV_BATCH`: each
//! batch is validated, stripped of null entries and handed to the transfer
//! primitive in a single call.
//!
//! # Partial transfers
//! - A zero result is end of file and ends the call
//! - A short result ends the call; it is never retried
//! - A validation or transfer error after earlier batches moved data is
//!   reported as success with the bytes moved so far
//! - The same error before any data moved is returned as is

use crate::abi::IoVec;
use crate::config::{IOV_BATCH, IOV_MAX};
use crate::error::{Errno, KResult};
use crate::fs::FilePos;

use super::validate::{UserAccess, UserBuffer, UserBufferMut};

/// A validated batch element, one type per transfer direction.
///
/// Reads land in writable buffers, writes come from readable ones.
pub trait IoBuf<'g>: Sized {
    fn empty() -> Self;

    fn validate(ua: &UserAccess<'g>, base: usize, len: usize) -> KResult<Self>;

    fn len(&self) -> usize;
}

impl<'g> IoBuf<'g> for UserBuffer<'g> {
    fn empty() -> Self {
        UserBuffer::empty()
    }

    fn validate(ua: &UserAccess<'g>, base: usize, len: usize) -> KResult<Self> {
        ua.buf(base, len)
    }

    fn len(&self) -> usize {
        UserBuffer::len(self)
    }
}

impl<'g> IoBuf<'g> for UserBufferMut<'g> {
    fn empty() -> Self {
        UserBufferMut::empty()
    }

    fn validate(ua: &UserAccess<'g>, base: usize, len: usize) -> KResult<Self> {
        ua.buf_mut(base, len)
    }

    fn len(&self) -> usize {
        UserBufferMut::len(self)
    }
}

/// Check a raw descriptor count against `[0, IOV_MAX]`.
pub fn descriptor_count(count: i32) -> KResult<usize> {
    match usize::try_from(count) {
        Ok(n) if n <= IOV_MAX => Ok(n),
        _ => Err(Errno::EINVAL),
    }
}

/// Result of a failure once `total` bytes have already moved.
fn settle(total: usize, err: Errno) -> KResult<usize> {
    if total > 0 {
        log::debug!(target: "iov", "{} after {} bytes, reporting partial transfer", err, total);
        Ok(total)
    } else {
        Err(err)
    }
}

/// Run a vectored transfer over `count` user descriptors at `uiov`.
///
/// `transfer` is called once per non-empty batch with the validated buffers
/// and the batch's file position. It must not report more bytes than the
/// batch holds.
pub fn do_iov<'g, B, F>(
    ua: &UserAccess<'g>,
    uiov: usize,
    count: usize,
    mut pos: FilePos,
    mut transfer: F,
) -> KResult<usize>
where
    B: IoBuf<'g>,
    F: FnMut(&mut [B], FilePos) -> KResult<usize>,
{
    if count > IOV_MAX {
        return Err(Errno::EINVAL);
    }
    let descs = ua.slice::<IoVec>(uiov, count)?;

    let mut batch: [B; IOV_BATCH] = core::array::from_fn(|_| B::empty());
    let mut total = 0usize;
    let mut next = 0usize;

    while next < count {
        let end = core::cmp::min(next + IOV_BATCH, count);
        let mut filled = 0;
        let mut requested = 0usize;

        for index in next..end {
            let iov = match descs.get(index) {
                Some(iov) => iov,
                None => break,
            };
            if iov.iov_base == 0 {
                continue;
            }
            match B::validate(ua, iov.iov_base, iov.iov_len) {
                Ok(buf) => {
                    requested = requested.saturating_add(buf.len());
                    batch[filled] = buf;
                    filled += 1;
                }
                Err(err) => return settle(total, err),
            }
        }
        next = end;

        if requested == 0 {
            continue;
        }

        let moved = match transfer(&mut batch[..filled], pos) {
            Ok(n) => n,
            Err(err) => return settle(total, err),
        };
        if moved == 0 {
            return Ok(total);
        }
        assert!(
            moved <= requested,
            "transfer reported {} bytes for a {} byte batch",
            moved,
            requested
        );
        total += moved;
        if moved < requested {
            return Ok(total);
        }
        pos = pos.advance(moved);
    }
    Ok(total)
}
