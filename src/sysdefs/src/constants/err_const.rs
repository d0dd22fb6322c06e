//! Error taxonomy shared by the socket layer, the pollset and the registry.
//!
//! Every native failure is mapped at the boundary into exactly one
//! [`ErrorKind`].  The raw errno is kept alongside so that the generic
//! `ArgsInvalid` fallback does not throw away what the platform said.

// Let's not have clippy warn for EAGAIN, etc.
#![allow(clippy::upper_case_acronyms)]

use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Result alias used throughout the xinet crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Closed set of failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ThisError)]
#[non_exhaustive]
pub enum ErrorKind {
    #[error("invalid arguments")]
    ArgsInvalid,
    #[error("permission denied")]
    PermissionDenied,
    #[error("bad file descriptor")]
    BadDescriptor,
    #[error("not a socket")]
    NotASocket,
    #[error("address is invalid")]
    AddressInvalid,
    #[error("address already in use")]
    AddressInUse,
    #[error("connection refused")]
    ConnectionRefused,
    #[error("already connected")]
    AlreadyConnected,
    #[error("not connected")]
    NotConnected,
    #[error("timed out")]
    Timeout,
    /// Non-blocking operation would block, or a connect is in progress.
    #[error("try again later")]
    TryAgain,
    /// Send buffer is full.
    #[error("buffer overflow")]
    BufferOverflow,
    #[error("not supported")]
    NotSupported,
    #[error("out of memory")]
    OutOfMemory,
    #[error("interrupted")]
    Interrupted,
    /// Local socket path does not exist.
    #[error("not found")]
    NotFound,
    #[error("network unreachable")]
    Unreachable,
    #[error("host not found")]
    HostNotFound,
    #[error("no address available")]
    NoAddress,
    #[error("descriptor already registered")]
    AlreadyRegistered,
    #[error("descriptor not registered")]
    NotRegistered,
    #[error("capacity exceeded")]
    CapacityExceeded,
}

/// An [`ErrorKind`] plus the raw platform code it came from, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
#[error("{kind}")]
pub struct Error {
    kind: ErrorKind,
    errno: Option<i32>,
}

impl Error {
    /// An error raised by argument checking, with no native code behind it.
    pub const fn new(kind: ErrorKind) -> Self {
        Error { kind, errno: None }
    }

    /// An error with an explicit kind that still remembers the native code.
    /// Used at call sites whose mapping differs from [`Error::from_errno`].
    pub const fn with_errno(kind: ErrorKind, errno: i32) -> Self {
        Error {
            kind,
            errno: Some(errno),
        }
    }

    /// Maps a native errno into the taxonomy.  Unknown codes fall back to
    /// `ArgsInvalid` but keep the code.
    pub fn from_errno(errno: i32) -> Self {
        let kind = match errno {
            libc::EACCES | libc::EROFS | libc::EPERM => ErrorKind::PermissionDenied,
            libc::EBADF => ErrorKind::BadDescriptor,
            libc::ENOTSOCK => ErrorKind::NotASocket,
            libc::EAFNOSUPPORT | libc::EFAULT | libc::EDESTADDRREQ | libc::EADDRNOTAVAIL => {
                ErrorKind::AddressInvalid
            }
            libc::EADDRINUSE => ErrorKind::AddressInUse,
            libc::ECONNREFUSED => ErrorKind::ConnectionRefused,
            libc::EISCONN => ErrorKind::AlreadyConnected,
            libc::ENOTCONN | libc::EPIPE | libc::ECONNRESET => ErrorKind::NotConnected,
            libc::ETIMEDOUT => ErrorKind::Timeout,
            libc::EINPROGRESS | libc::EAGAIN | libc::EALREADY => ErrorKind::TryAgain,
            libc::ENOBUFS => ErrorKind::BufferOverflow,
            libc::EOPNOTSUPP | libc::ENOPROTOOPT | libc::EPROTONOSUPPORT => ErrorKind::NotSupported,
            libc::ENOMEM => ErrorKind::OutOfMemory,
            libc::EINTR => ErrorKind::Interrupted,
            libc::ENOENT => ErrorKind::NotFound,
            libc::ENETUNREACH | libc::EHOSTUNREACH => ErrorKind::Unreachable,
            _ => ErrorKind::ArgsInvalid,
        };
        Error::with_errno(kind, errno)
    }

    /// The failure class.
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The native errno, when the error came from a platform call.
    pub const fn raw_os_error(&self) -> Option<i32> {
        self.errno
    }

    /// Shorthand for `self.kind() == ErrorKind::TryAgain`.
    pub fn is_would_block(&self) -> bool {
        self.kind == ErrorKind::TryAgain
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}
