//! select(2) and its descriptor set.

use std::fmt;
use std::mem;
use std::os::unix::io::RawFd;

use sysdefs::{Error, ErrorKind, Result};

use crate::interface::misc::{handle_errno, ms_to_timeval};

/// A `libc::fd_set`.  Descriptors outside `0..FD_SETSIZE` are silently
/// ignored by every method, since the C macros have undefined behavior for
/// them.
#[derive(Clone, Copy)]
pub struct FdSet(libc::fd_set);

fn in_range(fd: RawFd) -> bool {
    fd >= 0 && (fd as usize) < libc::FD_SETSIZE as usize
}

impl FdSet {
    /// An empty set.
    pub fn new() -> Self {
        let raw = unsafe {
            let mut raw = mem::MaybeUninit::<libc::fd_set>::uninit();
            libc::FD_ZERO(raw.as_mut_ptr());
            raw.assume_init()
        };
        FdSet(raw)
    }

    pub fn zero(&mut self) {
        unsafe { libc::FD_ZERO(&mut self.0) };
    }

    pub fn set(&mut self, fd: RawFd) {
        if in_range(fd) {
            unsafe { libc::FD_SET(fd, &mut self.0) };
        }
    }

    pub fn clear(&mut self, fd: RawFd) {
        if in_range(fd) {
            unsafe { libc::FD_CLR(fd, &mut self.0) };
        }
    }

    pub fn is_set(&self, fd: RawFd) -> bool {
        in_range(fd) && unsafe { libc::FD_ISSET(fd, &self.0) }
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = RawFd> + '_ {
        (0..libc::FD_SETSIZE as RawFd).filter(move |fd| self.is_set(*fd))
    }

    fn as_raw(set: Option<&mut FdSet>) -> *mut libc::fd_set {
        match set {
            Some(s) => &mut s.0 as *mut libc::fd_set,
            None => std::ptr::null_mut(),
        }
    }
}

impl Default for FdSet {
    fn default() -> Self {
        FdSet::new()
    }
}

impl fmt::Debug for FdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Reference to Linux: https://man7.org/linux/man-pages/man2/select.2.html
///
/// Waits until a descriptor in one of the sets is ready.  On return the
/// sets hold only the ready descriptors.
///
/// Input:
///     - nfds: highest descriptor in any set, plus one; at most
///       `FD_SETSIZE`, since that is all an [`FdSet`] holds
///     - readfds / writefds / exceptfds: any may be `None`
///     - timeout_ms: a positive value bounds the wait; zero or negative
///       waits indefinitely
///
/// Return:
///     - On success: number of ready descriptors, 0 on timeout
///     - On failure: `ArgsInvalid` for an `nfds` outside `0..=FD_SETSIZE`,
///       otherwise `BadDescriptor`, `Interrupted`, `OutOfMemory`, or
///       `ArgsInvalid` for everything else
pub fn select(
    nfds: i32,
    readfds: Option<&mut FdSet>,
    writefds: Option<&mut FdSet>,
    exceptfds: Option<&mut FdSet>,
    timeout_ms: i32,
) -> Result<usize> {
    // the kernel reads and writes nfds bits of each set
    if nfds < 0 || nfds as usize > libc::FD_SETSIZE as usize {
        return Err(Error::new(ErrorKind::ArgsInvalid));
    }
    let mut tv = ms_to_timeval(timeout_ms.max(0));
    let tvp = if timeout_ms > 0 {
        &mut tv as *mut libc::timeval
    } else {
        std::ptr::null_mut()
    };
    let ret = unsafe {
        libc::select(
            nfds,
            FdSet::as_raw(readfds),
            FdSet::as_raw(writefds),
            FdSet::as_raw(exceptfds),
            tvp,
        )
    };
    if ret < 0 {
        return Err(handle_errno("select"));
    }
    Ok(ret as usize)
}
