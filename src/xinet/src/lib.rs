//! xinet: a portable socket layer and a pollset, both sitting on the
//! descriptor registry from `fdregistry`.
//!
//! * [`SocketLayer`] wraps socket creation, addressing, data transfer,
//!   options, multicast and close.  It records every descriptor it creates
//!   in the registry it was given.
//! * [`Pollset`] reports readiness for a bounded set of descriptors, over
//!   epoll or poll(2).
//! * [`select`] and [`FdSet`] cover the classic select(2) interface.
//!
//! Failures come back as [`sysdefs::Error`], one [`sysdefs::ErrorKind`]
//! per failure class with the raw errno attached when there was one.

#![allow(clippy::missing_safety_doc)]
#![allow(clippy::not_unsafe_ptr_arg_deref)]

pub mod interface;
pub mod pollset;
pub mod syscalls;

#[cfg(test)]
mod tests;

pub use interface::{init_logging, XiConfig};
pub use pollset::{PollFd, Pollset, ReadyEvent};
pub use syscalls::{select, FdSet, SocketLayer};

pub use sysdefs::constants::net_const::{SockFamily, SockOpt, SockProto, SockShutdown, SockType};
pub use sysdefs::constants::poll_const::{Interest, PollBackend, PollEvents, PollsetOptions};
pub use sysdefs::data::net_struct::SockAddr;
pub use sysdefs::{Error, ErrorKind, Result};

impl XiConfig {
    /// A pollset sized and configured per this config.
    pub fn new_pollset<T: Clone + Send>(&self) -> Result<Pollset<T>> {
        Pollset::create(self.pollset_capacity, self.pollset)
    }
}
