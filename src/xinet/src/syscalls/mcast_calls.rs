//! Multicast group membership for datagram sockets.
//!
//! Reference to Linux: https://man7.org/linux/man-pages/man7/ip.7.html and
//! https://man7.org/linux/man-pages/man7/ipv6.7.html
//!
//! Source-specific membership is not offered; passing a source address is
//! `NotSupported`.

use std::ffi::{CStr, CString};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::os::unix::io::RawFd;

use log::{debug, trace};

use sysdefs::constants::net_const::{SockFamily, SockType};
use sysdefs::data::net_struct::SockAddr;
use sysdefs::{Error, ErrorKind, Result};

use super::net_calls::{setsockopt_raw, SocketLayer};
use crate::interface::misc::handle_errno;

impl SocketLayer {
    /// Joins `group` on the interface named by `iface`.
    ///
    /// Input:
    ///     - fd: a datagram socket known to the registry
    ///     - iface: the local interface address, same family as `group`.
    ///       An empty host (or `0.0.0.0` / `::`) lets the kernel choose.
    ///       For IPv6 an interface name such as `lo` is accepted too.
    ///     - group: the multicast group
    ///     - source: must be `None`
    ///
    /// Return:
    ///     - `ArgsInvalid` for mismatched or non-IP families or a
    ///       non-datagram socket, `NotSupported` when a source is given,
    ///       `AddressInvalid` for text that does not parse or an IPv6
    ///       interface that does not exist
    pub fn mcast_join(
        &self,
        fd: RawFd,
        iface: &SockAddr,
        group: &SockAddr,
        source: Option<&SockAddr>,
    ) -> Result<()> {
        self.mcast_membership(fd, iface, group, source, true)
    }

    /// Leaves a group joined with [`SocketLayer::mcast_join`].  Same
    /// argument rules.
    pub fn mcast_leave(
        &self,
        fd: RawFd,
        iface: &SockAddr,
        group: &SockAddr,
        source: Option<&SockAddr>,
    ) -> Result<()> {
        self.mcast_membership(fd, iface, group, source, false)
    }

    fn mcast_membership(
        &self,
        fd: RawFd,
        iface: &SockAddr,
        group: &SockAddr,
        source: Option<&SockAddr>,
        join: bool,
    ) -> Result<()> {
        if !matches!(iface.family, SockFamily::Inet | SockFamily::Inet6)
            || iface.family != group.family
        {
            return Err(Error::new(ErrorKind::ArgsInvalid));
        }
        if let Some(src) = source {
            if src.family != iface.family {
                return Err(Error::new(ErrorKind::ArgsInvalid));
            }
            return Err(Error::new(ErrorKind::NotSupported));
        }
        let (family, sock_type, _) = self.socket_info(fd)?;
        if sock_type != SockType::Datagram || family != iface.family {
            return Err(Error::new(ErrorKind::ArgsInvalid));
        }

        trace!(
            "{} {} on {} (fd {})",
            if join { "join" } else { "leave" },
            group,
            iface,
            fd
        );
        let ret = match iface.family {
            SockFamily::Inet => {
                let mreq = libc::ip_mreq {
                    imr_multiaddr: in_addr(parse_v4(&group.host)?),
                    imr_interface: in_addr(parse_v4_or_any(&iface.host)?),
                };
                let name = if join {
                    libc::IP_ADD_MEMBERSHIP
                } else {
                    libc::IP_DROP_MEMBERSHIP
                };
                setsockopt_raw(fd, libc::IPPROTO_IP, name, &mreq)
            }
            _ => {
                let mreq = libc::ipv6_mreq {
                    ipv6mr_multiaddr: libc::in6_addr {
                        s6_addr: parse_v6(&group.host)?.octets(),
                    },
                    ipv6mr_interface: ipv6_iface_index(&iface.host)?,
                };
                let name = if join {
                    libc::IPV6_ADD_MEMBERSHIP
                } else {
                    libc::IPV6_DROP_MEMBERSHIP
                };
                setsockopt_raw(fd, libc::IPPROTO_IPV6, name, &mreq)
            }
        };
        if ret < 0 {
            return Err(handle_errno(if join { "mcast join" } else { "mcast leave" }));
        }
        Ok(())
    }
}

fn in_addr(ip: Ipv4Addr) -> libc::in_addr {
    libc::in_addr {
        s_addr: u32::from_ne_bytes(ip.octets()),
    }
}

fn parse_v4(text: &str) -> Result<Ipv4Addr> {
    text.parse()
        .map_err(|_| Error::new(ErrorKind::AddressInvalid))
}

fn parse_v4_or_any(text: &str) -> Result<Ipv4Addr> {
    if text.is_empty() {
        return Ok(Ipv4Addr::UNSPECIFIED);
    }
    parse_v4(text)
}

fn parse_v6(text: &str) -> Result<Ipv6Addr> {
    text.parse()
        .map_err(|_| Error::new(ErrorKind::AddressInvalid))
}

/// Resolves the textual IPv6 interface to an index.
///
/// Empty and `::` are index 0 (kernel's choice).  An address is matched
/// against `getifaddrs`; anything else is tried as an interface name.
fn ipv6_iface_index(text: &str) -> Result<u32> {
    if text.is_empty() {
        return Ok(0);
    }
    match text.parse::<Ipv6Addr>() {
        Ok(ip) if ip.is_unspecified() => Ok(0),
        Ok(ip) => find_iface_by_addr(&ip)?.ok_or_else(|| {
            debug!("no interface carries {}", ip);
            Error::new(ErrorKind::AddressInvalid)
        }),
        Err(_) => {
            let name = CString::new(text).map_err(|_| Error::new(ErrorKind::AddressInvalid))?;
            match unsafe { libc::if_nametoindex(name.as_ptr()) } {
                0 => Err(Error::new(ErrorKind::AddressInvalid)),
                idx => Ok(idx),
            }
        }
    }
}

fn find_iface_by_addr(ip: &Ipv6Addr) -> Result<Option<u32>> {
    let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
    if unsafe { libc::getifaddrs(&mut head) } < 0 {
        return Err(handle_errno("getifaddrs"));
    }
    let mut found = None;
    let mut cur = head;
    while !cur.is_null() {
        let ifa = unsafe { &*cur };
        cur = ifa.ifa_next;
        if ifa.ifa_addr.is_null() {
            continue;
        }
        if i32::from(unsafe { (*ifa.ifa_addr).sa_family }) != libc::AF_INET6 {
            continue;
        }
        let sin6 = unsafe { &*(ifa.ifa_addr as *const libc::sockaddr_in6) };
        if Ipv6Addr::from(sin6.sin6_addr.s6_addr) != *ip {
            continue;
        }
        let idx = unsafe { libc::if_nametoindex(ifa.ifa_name) };
        if idx != 0 {
            let name = unsafe { CStr::from_ptr(ifa.ifa_name) };
            trace!("{} is on {} (index {})", ip, name.to_string_lossy(), idx);
            found = Some(idx);
            break;
        }
    }
    unsafe { libc::freeifaddrs(head) };
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iface_index_defaults() {
        assert_eq!(ipv6_iface_index("").unwrap(), 0);
        assert_eq!(ipv6_iface_index("::").unwrap(), 0);
    }

    #[test]
    // loopback always exists and always has index 1 or more
    fn iface_index_by_name() {
        assert!(ipv6_iface_index("lo").unwrap() > 0);
        assert_eq!(
            ipv6_iface_index("no-such-iface0").unwrap_err().kind(),
            ErrorKind::AddressInvalid
        );
    }

    #[test]
    fn unknown_v6_address_is_invalid() {
        // documentation prefix, never assigned to a real interface
        assert_eq!(
            ipv6_iface_index("2001:db8::dead:beef").unwrap_err().kind(),
            ErrorKind::AddressInvalid
        );
    }

    #[test]
    fn v4_parsing() {
        assert_eq!(parse_v4_or_any("").unwrap(), Ipv4Addr::UNSPECIFIED);
        assert_eq!(
            parse_v4("239.1.2.300").unwrap_err().kind(),
            ErrorKind::AddressInvalid
        );
        let a = in_addr(Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(u32::from_be(a.s_addr), 0x7f00_0001);
    }
}
