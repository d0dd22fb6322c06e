//! Portable socket enums and their translation tables.
//!
//! The discriminants are the portable values callers pass around (and may
//! persist); `to_native` / `from_native` translate to and from the libc
//! constants of the running platform.  Each table must round-trip: every
//! portable value maps to exactly one native constant and back.

use serde::{Deserialize, Serialize};

#[doc(hidden)]
macro_rules! portable_enum {
    ($(#[$settings: meta])* $visibility: vis enum $enumname: ident {
        $($(#[$vsettings: meta])* $valuename: ident = $value: literal => $native: expr,)*
    }) => {
        $(#[$settings])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(i32)]
        $visibility enum $enumname {
            $($(#[$vsettings])* $valuename = $value,)*
        }

        impl $enumname {
            /// Every value of this enum, in declaration order.
            pub const ALL: &'static [$enumname] = &[$($enumname::$valuename,)*];

            /// Looks up a portable value.  `None` for anything not in the table.
            pub fn from_raw(v: i32) -> Option<Self> {
                match v {
                    $($value => Some($enumname::$valuename),)*
                    _ => None,
                }
            }

            /// The portable value.
            pub fn raw(self) -> i32 {
                self as i32
            }

            /// The libc constant for this value.
            pub fn to_native(self) -> i32 {
                match self {
                    $($enumname::$valuename => $native,)*
                }
            }

            /// Reverse of [`Self::to_native`].
            pub fn from_native(v: i32) -> Option<Self> {
                $(
                    if v == $native {
                        return Some($enumname::$valuename);
                    }
                )*
                None
            }
        }
    }
}

portable_enum! {
    /// Socket address family.
    pub enum SockFamily {
        /// Only meaningful for `connect`, where it dissolves a datagram association.
        Unspec = 0 => libc::AF_UNSPEC,
        Local = 1 => libc::AF_UNIX,
        Inet = 4 => libc::AF_INET,
        Inet6 = 6 => libc::AF_INET6,
    }
}

portable_enum! {
    /// Socket type.
    pub enum SockType {
        Stream = 1 => libc::SOCK_STREAM,
        Datagram = 2 => libc::SOCK_DGRAM,
        Raw = 3 => libc::SOCK_RAW,
    }
}

portable_enum! {
    /// Socket protocol.  `Ip` lets the kernel pick the default for the type.
    pub enum SockProto {
        Ip = 0 => libc::IPPROTO_IP,
        Tcp = 1 => libc::IPPROTO_TCP,
        Udp = 2 => libc::IPPROTO_UDP,
        Raw = 3 => libc::IPPROTO_RAW,
    }
}

portable_enum! {
    /// Which half of a connection `shutdown` disables.
    pub enum SockShutdown {
        Read = 0 => libc::SHUT_RD,
        Write = 1 => libc::SHUT_WR,
        ReadWrite = 2 => libc::SHUT_RDWR,
    }
}

portable_enum! {
    /// Socket options.  `Nonblock` is not a socket option at all, it is the
    /// file status flag toggled through `fcntl`.
    pub enum SockOpt {
        Linger = 1 => libc::SO_LINGER,
        KeepAlive = 2 => libc::SO_KEEPALIVE,
        Debug = 4 => libc::SO_DEBUG,
        Nonblock = 8 => libc::O_NONBLOCK,
        ReuseAddr = 16 => libc::SO_REUSEADDR,
        SendBuf = 64 => libc::SO_SNDBUF,
        RecvBuf = 128 => libc::SO_RCVBUF,
        /// Milliseconds.
        SendTimeout = 140 => libc::SO_SNDTIMEO,
        /// Milliseconds.
        RecvTimeout = 141 => libc::SO_RCVTIMEO,
        Ipv6Only = 256 => libc::IPV6_V6ONLY,
    }
}

/// Where a socket option lives on the native side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptLevel {
    /// `setsockopt` at the given protocol level.
    Socket(i32),
    /// `fcntl(F_GETFL/F_SETFL)`.
    FileStatus,
}

impl SockOpt {
    /// Native level for `setsockopt`/`getsockopt`.
    pub fn level(self) -> OptLevel {
        match self {
            SockOpt::Nonblock => OptLevel::FileStatus,
            SockOpt::Ipv6Only => OptLevel::Socket(libc::IPPROTO_IPV6),
            _ => OptLevel::Socket(libc::SOL_SOCKET),
        }
    }

    /// Options whose value is a millisecond count carried as a `timeval`.
    pub fn is_timeout(self) -> bool {
        matches!(self, SockOpt::SendTimeout | SockOpt::RecvTimeout)
    }
}

/// Largest path a LOCAL socket address can carry, without the trailing NUL.
pub const LOCAL_PATH_MAX: usize = 107;

/// Longest textual host we hand back (matches `NI_MAXHOST`).
pub const HOSTNAME_MAX: usize = 1025;

/// Default `listen` backlog.
pub const DEFAULT_BACKLOG: i32 = 128;

#[cfg(test)]
mod tests {
    use super::*;

    // portable -> native -> portable must be the identity for every table
    #[test]
    fn all_tables_round_trip() {
        for v in SockFamily::ALL {
            assert_eq!(SockFamily::from_native(v.to_native()), Some(*v));
            assert_eq!(SockFamily::from_raw(v.raw()), Some(*v));
        }
        for v in SockType::ALL {
            assert_eq!(SockType::from_native(v.to_native()), Some(*v));
            assert_eq!(SockType::from_raw(v.raw()), Some(*v));
        }
        for v in SockProto::ALL {
            assert_eq!(SockProto::from_native(v.to_native()), Some(*v));
            assert_eq!(SockProto::from_raw(v.raw()), Some(*v));
        }
        for v in SockShutdown::ALL {
            assert_eq!(SockShutdown::from_native(v.to_native()), Some(*v));
        }
        for v in SockOpt::ALL {
            assert_eq!(SockOpt::from_native(v.to_native()), Some(*v));
            assert_eq!(SockOpt::from_raw(v.raw()), Some(*v));
        }
    }

    #[test]
    fn portable_values_are_stable() {
        assert_eq!(SockFamily::Inet6.raw(), 6);
        assert_eq!(SockOpt::RecvTimeout.raw(), 141);
        assert_eq!(SockOpt::Ipv6Only.raw(), 256);
        assert_eq!(SockShutdown::ReadWrite.raw(), 2);
    }

    #[test]
    fn unknown_values_are_rejected() {
        assert_eq!(SockFamily::from_raw(2), None);
        assert_eq!(SockType::from_raw(0), None);
        assert_eq!(SockProto::from_raw(17), None);
        assert_eq!(SockOpt::from_raw(32), None);
    }

    #[test]
    fn option_levels() {
        assert_eq!(SockOpt::Nonblock.level(), OptLevel::FileStatus);
        assert_eq!(SockOpt::Ipv6Only.level(), OptLevel::Socket(libc::IPPROTO_IPV6));
        assert_eq!(SockOpt::KeepAlive.level(), OptLevel::Socket(libc::SOL_SOCKET));
        assert!(SockOpt::SendTimeout.is_timeout());
        assert!(!SockOpt::SendBuf.is_timeout());
    }
}
