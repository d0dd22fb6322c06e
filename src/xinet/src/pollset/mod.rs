//! Readiness notification over a bounded set of descriptors.
//!
//! A [`Pollset`] holds `(fd, interest, context)` registrations and reports
//! which of them are ready.  Readiness is level-triggered unless the epoll
//! backend is created with `edge_triggered`: a readable socket keeps being
//! reported until it is drained.
//!
//! Every method takes `&self`.  Registrations live behind a mutex.  With
//! `use_lock` that mutex is held for the whole wait, so `add`/`remove` from
//! another thread block until `poll` returns.  Without it the wait runs
//! unlocked on a snapshot, and events for descriptors removed in the
//! meantime are dropped before they reach the caller.
//!
//! Dropping (or [`Pollset::destroy`]ing) a pollset never closes the
//! descriptors registered in it.

mod epoll;
mod poll;

use std::fmt;
use std::os::unix::io::RawFd;

use log::{debug, trace};
use parking_lot::Mutex;

use sysdefs::constants::poll_const::{Interest, PollBackend, PollEvents, PollsetOptions};
use sysdefs::{Error, ErrorKind, Result};

use self::epoll::Epoll;
use self::poll::PollList;

/// A registration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollFd<T> {
    pub fd: RawFd,
    pub interest: Interest,
    /// Handed back verbatim with every event for `fd`.
    pub context: T,
}

impl<T> PollFd<T> {
    pub fn new(fd: RawFd, interest: Interest, context: T) -> Self {
        PollFd {
            fd,
            interest,
            context,
        }
    }
}

/// One ready descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyEvent<T> {
    pub fd: RawFd,
    /// What actually triggered: IN/PRI/OUT/ERR/HUP/NVAL.
    pub events: PollEvents,
    pub context: T,
}

/// The platform primitive underneath a pollset.
pub(crate) trait Demux: Send {
    fn add(&mut self, fd: RawFd, interest: Interest) -> Result<()>;
    fn modify(&mut self, fd: RawFd, interest: Interest) -> Result<()>;
    fn delete(&mut self, fd: RawFd) -> Result<()>;
    /// Everything a wait needs, detached from `self` so it can run with
    /// the pollset lock released.
    fn prepare(&self, limit: usize) -> WaitRequest;
    fn close(&mut self) -> Result<()>;
}

pub(crate) enum WaitRequest {
    Epoll { epfd: RawFd, limit: usize },
    Poll { fds: Vec<libc::pollfd>, limit: usize },
}

impl WaitRequest {
    fn wait(self, timeout_ms: i32) -> Result<Vec<(RawFd, PollEvents)>> {
        match self {
            WaitRequest::Epoll { epfd, limit } => epoll::wait(epfd, limit, timeout_ms),
            WaitRequest::Poll { fds, limit } => poll::wait(fds, limit, timeout_ms),
        }
    }
}

struct Registration<T> {
    fd: RawFd,
    interest: Interest,
    context: T,
}

struct Inner<T> {
    regs: Vec<Registration<T>>,
    demux: Box<dyn Demux>,
}

impl<T> Inner<T> {
    fn position(&self, fd: RawFd) -> Option<usize> {
        self.regs.iter().position(|r| r.fd == fd)
    }
}

/// See the module docs.
pub struct Pollset<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    options: PollsetOptions,
}

impl<T: Clone + Send> Pollset<T> {
    /// Creates a pollset for at most `max` descriptors.
    ///
    /// `max == 0` is `ArgsInvalid`.  Failure to create the epoll instance
    /// maps through errno.
    pub fn create(max: usize, options: PollsetOptions) -> Result<Self> {
        if max == 0 {
            return Err(Error::new(ErrorKind::ArgsInvalid));
        }
        let demux: Box<dyn Demux> = match options.backend {
            PollBackend::Epoll => Box::new(Epoll::new(options.edge_triggered)?),
            PollBackend::Poll => Box::new(PollList::new(max)),
        };
        debug!("pollset created: max {}, {:?}", max, options);
        Ok(Pollset {
            inner: Mutex::new(Inner {
                regs: Vec::with_capacity(max),
                demux,
            }),
            capacity: max,
            options,
        })
    }

    /// [`Pollset::create`] from the portable `POLLSET_OPT_*` bits.
    pub fn create_with_bits(max: usize, bits: i32) -> Result<Self> {
        Self::create(max, PollsetOptions::from_bits(bits))
    }

    /// Registers a descriptor.
    ///
    /// An fd already present is `AlreadyRegistered`; a full set is
    /// `CapacityExceeded`.
    pub fn add(&self, pfd: PollFd<T>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.position(pfd.fd).is_some() {
            return Err(Error::new(ErrorKind::AlreadyRegistered));
        }
        if inner.regs.len() >= self.capacity {
            return Err(Error::new(ErrorKind::CapacityExceeded));
        }
        inner.demux.add(pfd.fd, pfd.interest)?;
        trace!("pollset add {} {:?}", pfd.fd, pfd.interest);
        inner.regs.push(Registration {
            fd: pfd.fd,
            interest: pfd.interest,
            context: pfd.context,
        });
        Ok(())
    }

    /// Deregisters `fd` and hands back its context.  The descriptor itself
    /// is left open.
    pub fn remove(&self, fd: RawFd) -> Result<T> {
        let mut inner = self.inner.lock();
        let idx = inner
            .position(fd)
            .ok_or_else(|| Error::new(ErrorKind::NotRegistered))?;
        inner.demux.delete(fd)?;
        trace!("pollset remove {}", fd);
        Ok(inner.regs.swap_remove(idx).context)
    }

    /// Switches the interest of a registered descriptor in place.
    pub fn modify(&self, fd: RawFd, interest: Interest) -> Result<()> {
        let mut inner = self.inner.lock();
        let idx = inner
            .position(fd)
            .ok_or_else(|| Error::new(ErrorKind::NotRegistered))?;
        inner.demux.modify(fd, interest)?;
        inner.regs[idx].interest = interest;
        Ok(())
    }

    /// Waits for readiness.
    ///
    /// `ready` is cleared and then filled with at most
    /// `min(max_events, capacity)` events.  `timeout_ms` of -1 waits
    /// indefinitely and 0 only checks.
    ///
    /// Return:
    ///     - the number of events, 0 on timeout
    ///     - `ArgsInvalid` when `max_events` is 0, `Interrupted` on EINTR
    pub fn poll(&self, ready: &mut Vec<ReadyEvent<T>>, max_events: usize, timeout_ms: i32) -> Result<usize> {
        ready.clear();
        if max_events == 0 {
            return Err(Error::new(ErrorKind::ArgsInvalid));
        }
        let limit = max_events.min(self.capacity);

        let held = self.inner.lock();
        let request = held.demux.prepare(limit);
        let held = if self.options.use_lock {
            Some(held)
        } else {
            drop(held);
            None
        };

        let raw = request.wait(timeout_ms)?;

        let inner = match held {
            Some(guard) => guard,
            None => self.inner.lock(),
        };
        for (fd, events) in raw {
            // removed while we were waiting
            let Some(idx) = inner.position(fd) else {
                continue;
            };
            ready.push(ReadyEvent {
                fd,
                events,
                context: inner.regs[idx].context.clone(),
            });
        }
        Ok(ready.len())
    }

    /// Closes the platform handle.  Registered descriptors stay open.
    pub fn destroy(self) -> Result<()> {
        let mut inner = self.inner.into_inner();
        debug!("pollset destroyed with {} registrations", inner.regs.len());
        inner.demux.close()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn options(&self) -> PollsetOptions {
        self.options
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        self.inner.lock().position(fd).is_some()
    }

    /// Current interest for `fd`, if registered.
    pub fn interest(&self, fd: RawFd) -> Option<Interest> {
        let inner = self.inner.lock();
        inner.position(fd).map(|idx| inner.regs[idx].interest)
    }
}

impl<T> fmt::Debug for Pollset<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pollset")
            .field("capacity", &self.capacity)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
