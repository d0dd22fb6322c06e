//! This crate provides the descriptor registry, a table which records what
//! each open native descriptor is: a file (with its mode, permissions and
//! path), a socket (with the family/type/protocol it was created with) or a
//! pipe.  The socket layer needs this because a bare fd does not say which
//! `sockaddr_*` structure `accept`, `recvfrom` or `getpeername` will fill.
//!
//! The table is indexed directly by the native descriptor value, so the
//! handle the kernel gave you is also the key you look it up with.
//!
//! There is no process-wide instance.  Whoever owns the sockets creates an
//! [`FdTable`], and hands it (usually as a [`SharedFdTable`]) to every layer
//! that needs it.

// Lints for the whole crate.  We want the pedantic feedback as warnings
// during development; CI is where they become errors.
#![warn(clippy::all, missing_docs, clippy::pedantic)]
// Descriptor values are i32 and table indices are usize, so there is a fair
// amount of casting between the two.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

mod entry;
mod fdtable;

pub use entry::FdKind;
pub use fdtable::{FdTable, SharedFdTable};

pub use sysdefs::constants::fd_const::FD_MAX;
