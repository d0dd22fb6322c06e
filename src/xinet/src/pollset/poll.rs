//! poll(2) backend: a `pollfd` array rebuilt in place on every change.

use std::os::unix::io::RawFd;

use sysdefs::constants::poll_const::{Interest, PollEvents};
use sysdefs::{Error, ErrorKind, Result};

use super::{Demux, WaitRequest};
use crate::interface::misc::handle_errno;

#[derive(Default)]
pub(crate) struct PollList {
    fds: Vec<libc::pollfd>,
}

impl PollList {
    pub(crate) fn new(capacity: usize) -> Self {
        PollList {
            fds: Vec::with_capacity(capacity),
        }
    }

    fn slot(&mut self, fd: RawFd) -> Result<&mut libc::pollfd> {
        self.fds
            .iter_mut()
            .find(|p| p.fd == fd)
            .ok_or_else(|| Error::new(ErrorKind::NotRegistered))
    }
}

impl Demux for PollList {
    fn add(&mut self, fd: RawFd, interest: Interest) -> Result<()> {
        self.fds.push(libc::pollfd {
            fd,
            events: interest.events().to_poll_bits(),
            revents: 0,
        });
        Ok(())
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> Result<()> {
        self.slot(fd)?.events = interest.events().to_poll_bits();
        Ok(())
    }

    fn delete(&mut self, fd: RawFd) -> Result<()> {
        self.fds.retain(|p| p.fd != fd);
        Ok(())
    }

    fn prepare(&self, limit: usize) -> WaitRequest {
        WaitRequest::Poll {
            fds: self.fds.clone(),
            limit,
        }
    }

    fn close(&mut self) -> Result<()> {
        self.fds.clear();
        Ok(())
    }
}

/// Reference to Linux: https://man7.org/linux/man-pages/man2/poll.2.html
pub(crate) fn wait(
    mut fds: Vec<libc::pollfd>,
    limit: usize,
    timeout_ms: i32,
) -> Result<Vec<(RawFd, PollEvents)>> {
    let n = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if n < 0 {
        return Err(handle_errno("poll"));
    }
    Ok(fds
        .iter()
        .filter(|p| p.revents != 0)
        .take(limit)
        .map(|p| (p.fd, PollEvents::from_poll_bits(p.revents)))
        .collect())
}
