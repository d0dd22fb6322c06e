//! Poll event bits, registration interest and pollset options.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Portable readiness bits reported by a pollset.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PollEvents(u16);

impl PollEvents {
    /// There is data to read.
    pub const IN: PollEvents = PollEvents(0x001);
    /// There is urgent data to read.
    pub const PRI: PollEvents = PollEvents(0x002);
    /// Writing now will not block.
    pub const OUT: PollEvents = PollEvents(0x004);
    /// Error condition (output only).
    pub const ERR: PollEvents = PollEvents(0x010);
    /// Hang up (output only).
    pub const HUP: PollEvents = PollEvents(0x020);
    /// Invalid request, fd not open (output only).
    pub const NVAL: PollEvents = PollEvents(0x040);

    const TABLE: [(PollEvents, i16); 6] = [
        (PollEvents::IN, libc::POLLIN),
        (PollEvents::PRI, libc::POLLPRI),
        (PollEvents::OUT, libc::POLLOUT),
        (PollEvents::ERR, libc::POLLERR),
        (PollEvents::HUP, libc::POLLHUP),
        (PollEvents::NVAL, libc::POLLNVAL),
    ];

    /// No bits set.
    pub const fn empty() -> Self {
        PollEvents(0)
    }

    /// Keeps only the known bits of `bits`.
    pub const fn from_bits_truncate(bits: u16) -> Self {
        PollEvents(bits & 0x077)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set in `self`.
    pub const fn contains(self, other: PollEvents) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when any bit of `other` is set in `self`.
    pub const fn intersects(self, other: PollEvents) -> bool {
        self.0 & other.0 != 0
    }

    /// Readable, or the peer hung up / errored (a read will not block).
    pub const fn is_readable(self) -> bool {
        self.intersects(PollEvents(0x001 | 0x002 | 0x010 | 0x020))
    }

    pub const fn is_writable(self) -> bool {
        self.intersects(PollEvents(0x004 | 0x010))
    }

    /// Translates to `pollfd.events` bits.
    pub fn to_poll_bits(self) -> i16 {
        Self::TABLE
            .iter()
            .filter(|(ev, _)| self.contains(*ev))
            .fold(0, |acc, (_, native)| acc | native)
    }

    /// Translates from `pollfd.revents` bits.
    pub fn from_poll_bits(native: i16) -> Self {
        Self::TABLE
            .iter()
            .filter(|(_, n)| native & n != 0)
            .fold(PollEvents::empty(), |acc, (ev, _)| acc | *ev)
    }

    /// Translates from `epoll_event.events` bits.
    pub fn from_epoll_bits(native: u32) -> Self {
        let table = [
            (PollEvents::IN, libc::EPOLLIN),
            (PollEvents::PRI, libc::EPOLLPRI),
            (PollEvents::OUT, libc::EPOLLOUT),
            (PollEvents::ERR, libc::EPOLLERR),
            (PollEvents::HUP, libc::EPOLLHUP | libc::EPOLLRDHUP),
        ];
        table
            .iter()
            .filter(|(_, n)| native & (*n as u32) != 0)
            .fold(PollEvents::empty(), |acc, (ev, _)| acc | *ev)
    }
}

impl BitOr for PollEvents {
    type Output = PollEvents;
    fn bitor(self, rhs: PollEvents) -> PollEvents {
        PollEvents(self.0 | rhs.0)
    }
}

impl BitOrAssign for PollEvents {
    fn bitor_assign(&mut self, rhs: PollEvents) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for PollEvents {
    type Output = PollEvents;
    fn bitand(self, rhs: PollEvents) -> PollEvents {
        PollEvents(self.0 & rhs.0)
    }
}

impl fmt::Debug for PollEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (PollEvents::IN, "IN"),
            (PollEvents::PRI, "PRI"),
            (PollEvents::OUT, "OUT"),
            (PollEvents::ERR, "ERR"),
            (PollEvents::HUP, "HUP"),
            (PollEvents::NVAL, "NVAL"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(ev, _)| self.contains(*ev))
            .map(|(_, n)| *n)
            .collect();
        write!(f, "PollEvents({})", set.join("|"))
    }
}

/// The single direction a registration waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interest {
    Readable,
    Writable,
}

impl Interest {
    /// The request bits this interest registers for.
    pub fn events(self) -> PollEvents {
        match self {
            Interest::Readable => PollEvents::IN,
            Interest::Writable => PollEvents::OUT,
        }
    }

    /// `epoll_event.events` bits for this interest.
    pub fn to_epoll_bits(self, edge_triggered: bool) -> u32 {
        let base = match self {
            Interest::Readable => libc::EPOLLIN | libc::EPOLLRDHUP,
            Interest::Writable => libc::EPOLLOUT,
        } as u32;
        if edge_triggered {
            base | libc::EPOLLET as u32
        } else {
            base
        }
    }

    /// The other direction.
    pub fn flipped(self) -> Interest {
        match self {
            Interest::Readable => Interest::Writable,
            Interest::Writable => Interest::Readable,
        }
    }
}

/// Portable option bit: serialize every pollset call behind its lock.
pub const POLLSET_OPT_USELOCK: i32 = 0x0000_0001;
/// Portable option bit: use epoll instead of plain poll(2).
pub const POLLSET_OPT_EPOLL: i32 = 0x0000_0002;

/// The demultiplexing primitive behind a pollset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PollBackend {
    /// `epoll_create1`/`epoll_ctl`/`epoll_wait`.
    #[default]
    Epoll,
    /// A `pollfd` array handed to poll(2) on each call.
    Poll,
}

/// Creation options for a pollset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PollsetOptions {
    /// Hold the registration lock across the whole wait in `poll`.
    pub use_lock: bool,
    pub backend: PollBackend,
    /// Add `EPOLLET`.  Ignored by the poll(2) backend.
    pub edge_triggered: bool,
}

impl PollsetOptions {
    /// Decodes the portable `POLLSET_OPT_*` bits.  Unknown bits are ignored.
    pub fn from_bits(bits: i32) -> Self {
        PollsetOptions {
            use_lock: bits & POLLSET_OPT_USELOCK != 0,
            backend: if bits & POLLSET_OPT_EPOLL != 0 {
                PollBackend::Epoll
            } else {
                PollBackend::Poll
            },
            edge_triggered: false,
        }
    }

    /// Encodes back to the portable bits.
    pub fn bits(&self) -> i32 {
        let mut bits = 0;
        if self.use_lock {
            bits |= POLLSET_OPT_USELOCK;
        }
        if self.backend == PollBackend::Epoll {
            bits |= POLLSET_OPT_EPOLL;
        }
        bits
    }
}
