//! epoll(7) backend.

use std::os::unix::io::RawFd;

use log::{debug, trace};

use sysdefs::constants::poll_const::{Interest, PollEvents};
use sysdefs::Result;

use super::{Demux, WaitRequest};
use crate::interface::misc::{get_errno, handle_errno};

/// An epoll instance.  The registered fd is stored in the event's data word
/// so readiness maps straight back to the registration.
#[derive(Debug)]
pub(crate) struct Epoll {
    epfd: RawFd,
    edge_triggered: bool,
}

impl Epoll {
    pub(crate) fn new(edge_triggered: bool) -> Result<Self> {
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(handle_errno("epoll_create1"));
        }
        debug!("epoll instance {} (edge triggered: {})", epfd, edge_triggered);
        Ok(Epoll {
            epfd,
            edge_triggered,
        })
    }

    fn ctl(&self, op: i32, fd: RawFd, interest: Interest) -> i32 {
        let mut ev = libc::epoll_event {
            events: interest.to_epoll_bits(self.edge_triggered),
            u64: fd as u64,
        };
        unsafe { libc::epoll_ctl(self.epfd, op, fd, &mut ev) }
    }
}

impl Demux for Epoll {
    fn add(&mut self, fd: RawFd, interest: Interest) -> Result<()> {
        if self.ctl(libc::EPOLL_CTL_ADD, fd, interest) < 0 {
            return Err(handle_errno("epoll_ctl add"));
        }
        Ok(())
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> Result<()> {
        if self.ctl(libc::EPOLL_CTL_MOD, fd, interest) < 0 {
            return Err(handle_errno("epoll_ctl mod"));
        }
        Ok(())
    }

    fn delete(&mut self, fd: RawFd) -> Result<()> {
        let ret =
            unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if ret < 0 {
            let errno = get_errno();
            // the kernel drops closed fds from the interest list on its own
            if errno == libc::EBADF || errno == libc::ENOENT {
                trace!("epoll_ctl del {}: already gone (errno {})", fd, errno);
                return Ok(());
            }
            return Err(handle_errno("epoll_ctl del"));
        }
        Ok(())
    }

    fn prepare(&self, limit: usize) -> WaitRequest {
        WaitRequest::Epoll {
            epfd: self.epfd,
            limit,
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.epfd < 0 {
            return Ok(());
        }
        let epfd = std::mem::replace(&mut self.epfd, -1);
        if unsafe { libc::close(epfd) } < 0 {
            return Err(handle_errno("close epoll"));
        }
        debug!("closed epoll instance {}", epfd);
        Ok(())
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Reference to Linux: https://man7.org/linux/man-pages/man2/epoll_wait.2.html
pub(crate) fn wait(epfd: RawFd, limit: usize, timeout_ms: i32) -> Result<Vec<(RawFd, PollEvents)>> {
    let mut raw = vec![libc::epoll_event { events: 0, u64: 0 }; limit];
    let n = unsafe { libc::epoll_wait(epfd, raw.as_mut_ptr(), limit as i32, timeout_ms) };
    if n < 0 {
        return Err(handle_errno("epoll_wait"));
    }
    Ok(raw
        .iter()
        .take(n as usize)
        .map(|ev| {
            // epoll_event is packed on x86_64; copy the fields out
            let bits = ev.events;
            let data = ev.u64;
            (data as RawFd, PollEvents::from_epoll_bits(bits))
        })
        .collect())
}
