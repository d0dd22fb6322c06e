//! Portable socket address and its native counterpart.
//!
//! A [`SockAddr`] is what callers pass around: a family, a textual host (or
//! filesystem path for LOCAL sockets) and a port.  [`NativeSockAddr`] is a
//! `sockaddr_storage` plus length, the shape every libc socket call wants.

use std::fmt;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::constants::err_const::{Error, ErrorKind, Result};
use crate::constants::net_const::{SockFamily, LOCAL_PATH_MAX};

/// Family, textual host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SockAddr {
    pub family: SockFamily,
    /// Dotted/colon IP text, or the socket path for `Local`.
    pub host: String,
    /// Host byte order.  Unused for `Local` and `Unspec`.
    pub port: u16,
}

impl SockAddr {
    pub fn inet(host: &str, port: u16) -> Self {
        SockAddr {
            family: SockFamily::Inet,
            host: host.to_string(),
            port,
        }
    }

    pub fn inet6(host: &str, port: u16) -> Self {
        SockAddr {
            family: SockFamily::Inet6,
            host: host.to_string(),
            port,
        }
    }

    pub fn local(path: &str) -> Self {
        SockAddr {
            family: SockFamily::Local,
            host: path.to_string(),
            port: 0,
        }
    }

    /// The zero address used to dissolve a connected datagram socket.
    pub fn unspec() -> Self {
        SockAddr {
            family: SockFamily::Unspec,
            host: String::new(),
            port: 0,
        }
    }

    /// Builds the native structure for this address.
    ///
    /// Text that does not parse as an address of the declared family, or a
    /// LOCAL path that does not fit `sun_path`, is `AddressInvalid`.
    pub fn to_native(&self) -> Result<NativeSockAddr> {
        let mut native = NativeSockAddr::empty();
        match self.family {
            SockFamily::Unspec => {
                native.len = mem::size_of::<libc::sockaddr>() as libc::socklen_t;
                native.storage.ss_family = libc::AF_UNSPEC as libc::sa_family_t;
            }
            SockFamily::Local => {
                let path = self.host.as_bytes();
                if path.len() > LOCAL_PATH_MAX || path.contains(&0) {
                    return Err(Error::new(ErrorKind::AddressInvalid));
                }
                // SAFETY: sockaddr_storage is large and aligned enough for sockaddr_un
                let un = unsafe { &mut *(native.as_mut_ptr() as *mut libc::sockaddr_un) };
                un.sun_family = libc::AF_UNIX as libc::sa_family_t;
                for (dst, src) in un.sun_path.iter_mut().zip(path) {
                    *dst = *src as libc::c_char;
                }
                native.len = mem::size_of::<libc::sockaddr_un>() as libc::socklen_t;
            }
            SockFamily::Inet => {
                let ip: Ipv4Addr = self
                    .host
                    .parse()
                    .map_err(|_| Error::new(ErrorKind::AddressInvalid))?;
                // SAFETY: as above, for sockaddr_in
                let sin = unsafe { &mut *(native.as_mut_ptr() as *mut libc::sockaddr_in) };
                sin.sin_family = libc::AF_INET as libc::sa_family_t;
                sin.sin_port = self.port.to_be();
                sin.sin_addr.s_addr = u32::from_ne_bytes(ip.octets());
                native.len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
            }
            SockFamily::Inet6 => {
                let ip: Ipv6Addr = self
                    .host
                    .parse()
                    .map_err(|_| Error::new(ErrorKind::AddressInvalid))?;
                // SAFETY: as above, for sockaddr_in6
                let sin6 = unsafe { &mut *(native.as_mut_ptr() as *mut libc::sockaddr_in6) };
                sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
                sin6.sin6_port = self.port.to_be();
                sin6.sin6_addr.s6_addr = ip.octets();
                native.len = mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t;
            }
        }
        Ok(native)
    }

    /// Reads a native address back as `family`.  `family` is the socket's
    /// registered family, not whatever the kernel left in `ss_family`; an
    /// unnamed LOCAL peer therefore comes back with an empty path.
    pub fn from_native(native: &NativeSockAddr, family: SockFamily) -> Result<SockAddr> {
        match family {
            SockFamily::Unspec => Err(Error::new(ErrorKind::ArgsInvalid)),
            SockFamily::Local => {
                // SAFETY: storage outlives the borrow and is big enough
                let un = unsafe { &*(native.as_ptr() as *const libc::sockaddr_un) };
                let offset = mem::size_of::<libc::sa_family_t>();
                let avail = (native.len as usize).saturating_sub(offset).min(un.sun_path.len());
                let bytes: Vec<u8> = un.sun_path[..avail]
                    .iter()
                    .take_while(|c| **c != 0)
                    .map(|c| *c as u8)
                    .collect();
                Ok(SockAddr::local(&String::from_utf8_lossy(&bytes)))
            }
            SockFamily::Inet => {
                if native.family() != libc::AF_INET {
                    return Err(Error::new(ErrorKind::AddressInvalid));
                }
                // SAFETY: family checked above
                let sin = unsafe { &*(native.as_ptr() as *const libc::sockaddr_in) };
                let ip = Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes());
                Ok(SockAddr::inet(&ip.to_string(), u16::from_be(sin.sin_port)))
            }
            SockFamily::Inet6 => {
                if native.family() != libc::AF_INET6 {
                    return Err(Error::new(ErrorKind::AddressInvalid));
                }
                // SAFETY: family checked above
                let sin6 = unsafe { &*(native.as_ptr() as *const libc::sockaddr_in6) };
                let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
                Ok(SockAddr::inet6(&ip.to_string(), u16::from_be(sin6.sin6_port)))
            }
        }
    }
}

impl fmt::Display for SockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.family {
            SockFamily::Unspec => write!(f, "<unspec>"),
            SockFamily::Local => write!(f, "{}", self.host),
            SockFamily::Inet => write!(f, "{}:{}", self.host, self.port),
            SockFamily::Inet6 => write!(f, "[{}]:{}", self.host, self.port),
        }
    }
}

/// `sockaddr_storage` and the length the kernel should read (or did write).
#[derive(Debug)]
pub struct NativeSockAddr {
    storage: libc::sockaddr_storage,
    len: libc::socklen_t,
}

impl NativeSockAddr {
    /// A zeroed buffer whose length is the full storage size, ready to be
    /// filled by `accept`, `recvfrom`, `getsockname` or `getpeername`.
    pub fn empty() -> Self {
        NativeSockAddr {
            // SAFETY: all-zero is a valid sockaddr_storage
            storage: unsafe { mem::zeroed() },
            len: mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t,
        }
    }

    pub fn as_ptr(&self) -> *const libc::sockaddr {
        &self.storage as *const libc::sockaddr_storage as *const libc::sockaddr
    }

    pub fn as_mut_ptr(&mut self) -> *mut libc::sockaddr {
        &mut self.storage as *mut libc::sockaddr_storage as *mut libc::sockaddr
    }

    pub fn len(&self) -> libc::socklen_t {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// For out-parameters: the kernel writes back the real length here.
    pub fn len_mut(&mut self) -> &mut libc::socklen_t {
        &mut self.len
    }

    /// The native family tag currently in the buffer.
    pub fn family(&self) -> i32 {
        i32::from(self.storage.ss_family)
    }
}
