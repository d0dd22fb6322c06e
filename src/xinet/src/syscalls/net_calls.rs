//! Socket wrappers.
//!
//! Every call takes the native descriptor value, translates the portable
//! arguments, makes the libc call and maps failure into a [`sysdefs::Error`].
//! Sockets, pipes and files the caller hands in are tracked in the shared
//! descriptor registry so that later calls (accept, recvfrom, getsockname)
//! know which family to decode addresses as.

use std::ffi::{CStr, CString};
use std::mem;
use std::os::unix::io::RawFd;

use log::{debug, error, trace};

use fdregistry::{FdKind, FdTable, SharedFdTable};
use sysdefs::constants::net_const::{
    OptLevel, SockFamily, SockOpt, SockProto, SockShutdown, SockType, HOSTNAME_MAX,
};
use sysdefs::data::net_struct::{NativeSockAddr, SockAddr};
use sysdefs::{Error, ErrorKind, Result};

use crate::interface::misc::{
    get_errno, handle_errno, handle_errno_or, ms_to_timeval, timeval_to_ms,
};
use crate::interface::XiConfig;

// glibc's value; the libc crate does not export it on every Linux target.
const EAI_NODATA: i32 = -5;

/// Portable socket layer bound to one descriptor registry.
#[derive(Debug, Clone)]
pub struct SocketLayer {
    fdtable: SharedFdTable,
}

impl SocketLayer {
    /// Uses `fdtable` for every registration this layer makes.
    pub fn new(fdtable: SharedFdTable) -> Self {
        SocketLayer { fdtable }
    }

    /// A layer over a fresh registry sized per `config`.
    pub fn from_config(config: &XiConfig) -> Self {
        SocketLayer::new(config.new_fdtable().into_shared())
    }

    /// The registry this layer records into.
    pub fn fdtable(&self) -> &SharedFdTable {
        &self.fdtable
    }

    /// Looks up the socket triple recorded for `fd`.
    ///
    /// Unregistered (or out of range) is `BadDescriptor`; a live entry that
    /// is not a socket is `NotASocket`.
    pub fn socket_info(&self, fd: RawFd) -> Result<(SockFamily, SockType, SockProto)> {
        let table = self.fdtable.lock();
        match table.get(fd) {
            None => Err(Error::new(ErrorKind::BadDescriptor)),
            Some(kind) => kind
                .socket_info()
                .ok_or_else(|| Error::new(ErrorKind::NotASocket)),
        }
    }

    // Records `fd` in the registry.  On failure the native descriptor is
    // closed so that nothing leaks.
    fn register(&self, fd: RawFd, kind: FdKind) -> Result<RawFd> {
        let res = self.fdtable.lock().open(fd, kind);
        if let Err(e) = res {
            error!("registry refused fd {}: {}", fd, e);
            unsafe { libc::close(fd) };
            return Err(e);
        }
        Ok(fd)
    }

    /// Reference to Linux: https://man7.org/linux/man-pages/man2/socket.2.html
    ///
    /// Creates a socket and records it in the registry.
    ///
    /// Input:
    ///     - family: `Local`, `Inet` or `Inet6`; `Unspec` is rejected
    ///     - sock_type: stream, datagram or raw
    ///     - proto: `Ip` lets the platform pick
    ///
    /// Return:
    ///     - On success: the new descriptor
    ///     - On failure: `PermissionDenied` for EACCES/EPERM, `NoAddress` for
    ///       ENOBUFS/ENOMEM, `ArgsInvalid` for every other code
    pub fn open(&self, family: SockFamily, sock_type: SockType, proto: SockProto) -> Result<RawFd> {
        if family == SockFamily::Unspec {
            return Err(Error::new(ErrorKind::ArgsInvalid));
        }
        let fd = unsafe { libc::socket(family.to_native(), sock_type.to_native(), proto.to_native()) };
        if fd < 0 {
            return Err(handle_errno_or(
                "socket",
                &[
                    (libc::EACCES, ErrorKind::PermissionDenied),
                    (libc::EPERM, ErrorKind::PermissionDenied),
                    (libc::ENOBUFS, ErrorKind::NoAddress),
                    (libc::ENOMEM, ErrorKind::NoAddress),
                ],
                ErrorKind::ArgsInvalid,
            ));
        }
        trace!("socket({:?}, {:?}, {:?}) = {}", family, sock_type, proto, fd);
        self.register(fd, FdKind::socket(family, sock_type, proto))
    }

    /// [`SocketLayer::open`] with portable integer values, as they arrive
    /// from a config file or a foreign caller.  Any value outside the
    /// tables is `ArgsInvalid`.
    pub fn open_raw(&self, family: i32, sock_type: i32, proto: i32) -> Result<RawFd> {
        match (
            SockFamily::from_raw(family),
            SockType::from_raw(sock_type),
            SockProto::from_raw(proto),
        ) {
            (Some(f), Some(t), Some(p)) => self.open(f, t, p),
            _ => Err(Error::new(ErrorKind::ArgsInvalid)),
        }
    }

    /// Reference to Linux: https://man7.org/linux/man-pages/man2/bind.2.html
    ///
    /// Input:
    ///     - fd: a socket from [`SocketLayer::open`]
    ///     - addr: local address; the family picks the native structure
    ///
    /// Return:
    ///     - On failure: `AddressInvalid` when the text does not parse or the
    ///       path is too long, otherwise the errno mapping
    pub fn bind(&self, fd: RawFd, addr: &SockAddr) -> Result<()> {
        if fd < 0 || addr.family == SockFamily::Unspec {
            return Err(Error::new(ErrorKind::ArgsInvalid));
        }
        let native = addr.to_native()?;
        let ret = unsafe { libc::bind(fd, native.as_ptr(), native.len()) };
        if ret < 0 {
            return Err(handle_errno("bind"));
        }
        Ok(())
    }

    /// Reference to Linux: https://man7.org/linux/man-pages/man2/listen.2.html
    pub fn listen(&self, fd: RawFd, backlog: i32) -> Result<()> {
        if fd < 0 {
            return Err(Error::new(ErrorKind::ArgsInvalid));
        }
        if unsafe { libc::listen(fd, backlog) } < 0 {
            return Err(handle_errno("listen"));
        }
        Ok(())
    }

    /// Reference to Linux: https://man7.org/linux/man-pages/man2/accept.2.html
    ///
    /// Accepts one pending connection.  The child is registered with the
    /// listener's family, type and protocol.
    ///
    /// Input:
    ///     - fd: a listening socket known to the registry
    ///
    /// Return:
    ///     - On success: the child descriptor and the peer address
    ///     - On failure: `BadDescriptor` if `fd` is unregistered,
    ///       `NotASocket` if it is registered as something else, `TryAgain`
    ///       when non-blocking and nothing is pending
    pub fn accept(&self, fd: RawFd) -> Result<(RawFd, SockAddr)> {
        let (family, sock_type, proto) = self.socket_info(fd)?;
        let mut native = NativeSockAddr::empty();
        let newfd = unsafe { libc::accept(fd, native.as_mut_ptr(), native.len_mut()) };
        if newfd < 0 {
            return Err(handle_errno("accept"));
        }
        let peer = match address_from_native(&native, family) {
            Ok(peer) => peer,
            Err(e) => {
                unsafe { libc::close(newfd) };
                return Err(e);
            }
        };
        trace!("accept({}) = {} from {}", fd, newfd, peer);
        let newfd = self.register(newfd, FdKind::socket(family, sock_type, proto))?;
        Ok((newfd, peer))
    }

    /// Reference to Linux: https://man7.org/linux/man-pages/man2/connect.2.html
    ///
    /// An `Unspec` address dissolves the association of a connected
    /// datagram socket.  A non-blocking stream connect that has not finished
    /// yet is `TryAgain`.
    pub fn connect(&self, fd: RawFd, addr: &SockAddr) -> Result<()> {
        if fd < 0 {
            return Err(Error::new(ErrorKind::ArgsInvalid));
        }
        let native = addr.to_native()?;
        let ret = unsafe { libc::connect(fd, native.as_ptr(), native.len()) };
        if ret < 0 {
            return Err(handle_errno("connect"));
        }
        Ok(())
    }

    /// Reference to Linux: https://man7.org/linux/man-pages/man2/send.2.html
    ///
    /// Sends on a connected socket.  `MSG_NOSIGNAL` is always passed, so a
    /// closed peer shows up as `NotConnected` instead of SIGPIPE.
    pub fn send(&self, fd: RawFd, buf: &[u8]) -> Result<usize> {
        if fd < 0 || buf.is_empty() {
            return Err(Error::new(ErrorKind::ArgsInvalid));
        }
        let ret = unsafe {
            libc::send(
                fd,
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                libc::MSG_NOSIGNAL,
            )
        };
        if ret < 0 {
            return Err(handle_errno("send"));
        }
        Ok(ret as usize)
    }

    /// Reference to Linux: https://man7.org/linux/man-pages/man2/recv.2.html
    ///
    /// `Ok(0)` is end of stream.
    pub fn recv(&self, fd: RawFd, buf: &mut [u8]) -> Result<usize> {
        if fd < 0 || buf.is_empty() {
            return Err(Error::new(ErrorKind::ArgsInvalid));
        }
        let ret = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
        if ret < 0 {
            return Err(handle_errno("recv"));
        }
        Ok(ret as usize)
    }

    /// Reference to Linux: https://man7.org/linux/man-pages/man2/sendto.2.html
    ///
    /// `addr` must be of the family the socket was opened with.
    pub fn sendto(&self, fd: RawFd, buf: &[u8], addr: &SockAddr) -> Result<usize> {
        if buf.is_empty() {
            return Err(Error::new(ErrorKind::ArgsInvalid));
        }
        let (family, _, _) = self.socket_info(fd)?;
        if addr.family != family {
            return Err(Error::new(ErrorKind::AddressInvalid));
        }
        let native = addr.to_native()?;
        let ret = unsafe {
            libc::sendto(
                fd,
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                libc::MSG_NOSIGNAL,
                native.as_ptr(),
                native.len(),
            )
        };
        if ret < 0 {
            return Err(handle_errno("sendto"));
        }
        Ok(ret as usize)
    }

    /// Reference to Linux: https://man7.org/linux/man-pages/man2/recvfrom.2.html
    ///
    /// Return:
    ///     - On success: the byte count and the sender, decoded with the
    ///       family recorded for `fd`.  An unnamed LOCAL sender has an
    ///       empty path.
    pub fn recvfrom(&self, fd: RawFd, buf: &mut [u8]) -> Result<(usize, SockAddr)> {
        if buf.is_empty() {
            return Err(Error::new(ErrorKind::ArgsInvalid));
        }
        let (family, _, _) = self.socket_info(fd)?;
        let mut native = NativeSockAddr::empty();
        let ret = unsafe {
            libc::recvfrom(
                fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
                native.as_mut_ptr(),
                native.len_mut(),
            )
        };
        if ret < 0 {
            return Err(handle_errno("recvfrom"));
        }
        Ok((ret as usize, address_from_native(&native, family)?))
    }

    /// Sets one option.  See [`SockOpt`] for the table.
    ///
    /// `Nonblock` toggles `O_NONBLOCK` through fcntl, the two timeouts take
    /// milliseconds and `Linger` takes the linger time in seconds with 0
    /// meaning off.  A negative timeout or linger time is `ArgsInvalid`.
    pub fn opt_set(&self, fd: RawFd, opt: SockOpt, value: i32) -> Result<()> {
        if fd < 0 || (value < 0 && (opt.is_timeout() || opt == SockOpt::Linger)) {
            return Err(Error::new(ErrorKind::ArgsInvalid));
        }
        let level = match opt.level() {
            OptLevel::FileStatus => return set_nonblocking(fd, value != 0),
            OptLevel::Socket(level) => level,
        };
        let ret = if opt.is_timeout() {
            let tv = ms_to_timeval(value);
            setsockopt_raw(fd, level, opt.to_native(), &tv)
        } else if opt == SockOpt::Linger {
            let lg = libc::linger {
                l_onoff: (value != 0) as libc::c_int,
                l_linger: value,
            };
            setsockopt_raw(fd, level, opt.to_native(), &lg)
        } else {
            setsockopt_raw(fd, level, opt.to_native(), &value)
        };
        if ret < 0 {
            return Err(handle_errno("setsockopt"));
        }
        Ok(())
    }

    /// [`SocketLayer::opt_set`] with a portable integer option.  An option
    /// outside the table is `NotSupported`.
    pub fn opt_set_raw(&self, fd: RawFd, opt: i32, value: i32) -> Result<()> {
        let opt = SockOpt::from_raw(opt).ok_or_else(|| Error::new(ErrorKind::NotSupported))?;
        self.opt_set(fd, opt, value)
    }

    /// Reads one option back in the units [`SocketLayer::opt_set`] takes.
    ///
    /// Note the kernel doubles `SendBuf`/`RecvBuf` on set, so reading back
    /// gives at least the value written, not the value itself.
    pub fn opt_get(&self, fd: RawFd, opt: SockOpt) -> Result<i32> {
        if fd < 0 {
            return Err(Error::new(ErrorKind::ArgsInvalid));
        }
        let level = match opt.level() {
            OptLevel::FileStatus => {
                let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
                if flags < 0 {
                    return Err(handle_errno("fcntl"));
                }
                return Ok((flags & libc::O_NONBLOCK != 0) as i32);
            }
            OptLevel::Socket(level) => level,
        };
        if opt.is_timeout() {
            let mut tv = libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            };
            getsockopt_raw(fd, level, opt.to_native(), &mut tv)?;
            Ok(timeval_to_ms(&tv))
        } else if opt == SockOpt::Linger {
            let mut lg = libc::linger {
                l_onoff: 0,
                l_linger: 0,
            };
            getsockopt_raw(fd, level, opt.to_native(), &mut lg)?;
            Ok(if lg.l_onoff != 0 { lg.l_linger } else { 0 })
        } else {
            let mut value: libc::c_int = 0;
            getsockopt_raw(fd, level, opt.to_native(), &mut value)?;
            Ok(value)
        }
    }

    /// [`SocketLayer::opt_get`] with a portable integer option.
    pub fn opt_get_raw(&self, fd: RawFd, opt: i32) -> Result<i32> {
        let opt = SockOpt::from_raw(opt).ok_or_else(|| Error::new(ErrorKind::NotSupported))?;
        self.opt_get(fd, opt)
    }

    /// Reference to Linux: https://man7.org/linux/man-pages/man2/sendfile.2.html
    ///
    /// Copies up to `count` bytes of `file` starting at `*offset` into
    /// `sock` and advances `*offset` by what was sent.
    ///
    /// Return:
    ///     - On success: bytes sent
    ///     - On failure: the negated errno
    pub fn sendfile(
        &self,
        sock: RawFd,
        file: RawFd,
        offset: &mut i64,
        count: usize,
    ) -> std::result::Result<usize, i32> {
        let mut off = *offset as libc::off_t;
        let ret = unsafe { libc::sendfile(sock, file, &mut off, count) };
        if ret < 0 {
            let errno = get_errno();
            debug!("sendfile({}, {}) failed: errno {}", sock, file, errno);
            return Err(-errno);
        }
        *offset = off as i64;
        Ok(ret as usize)
    }

    /// Reference to Linux: https://man7.org/linux/man-pages/man2/getsockname.2.html
    pub fn get_local(&self, fd: RawFd) -> Result<SockAddr> {
        let (family, _, _) = self.socket_info(fd)?;
        let mut native = NativeSockAddr::empty();
        if unsafe { libc::getsockname(fd, native.as_mut_ptr(), native.len_mut()) } < 0 {
            return Err(handle_errno("getsockname"));
        }
        address_from_native(&native, family)
    }

    /// Reference to Linux: https://man7.org/linux/man-pages/man2/getpeername.2.html
    pub fn get_peer(&self, fd: RawFd) -> Result<SockAddr> {
        let (family, _, _) = self.socket_info(fd)?;
        let mut native = NativeSockAddr::empty();
        if unsafe { libc::getpeername(fd, native.as_mut_ptr(), native.len_mut()) } < 0 {
            return Err(handle_errno("getpeername"));
        }
        address_from_native(&native, family)
    }

    /// Reference to Linux: https://man7.org/linux/man-pages/man2/shutdown.2.html
    pub fn shutdown(&self, fd: RawFd, how: SockShutdown) -> Result<()> {
        if fd < 0 {
            return Err(Error::new(ErrorKind::ArgsInvalid));
        }
        if unsafe { libc::shutdown(fd, how.to_native()) } < 0 {
            return Err(handle_errno("shutdown"));
        }
        Ok(())
    }

    /// Closes `fd` and releases its registry slot.  Works for every kind the
    /// registry knows.  The slot is released even when the native close
    /// reports an error, since the descriptor is gone either way.
    pub fn close(&self, fd: RawFd) -> Result<()> {
        if fd < 0 {
            return Err(Error::new(ErrorKind::ArgsInvalid));
        }
        let ret = unsafe { libc::close(fd) };
        let native = if ret < 0 {
            Err(handle_errno("close"))
        } else {
            Ok(())
        };
        let mut table = self.fdtable.lock();
        if table.get(fd).is_some() {
            table.close(fd)?;
        }
        trace!("close({})", fd);
        native
    }

    /// Reference to Linux: https://man7.org/linux/man-pages/man2/pipe.2.html
    ///
    /// Both ends are registered as pipes.  Useful for waking a pollset from
    /// another thread.
    pub fn pipe(&self) -> Result<(RawFd, RawFd)> {
        let mut fds: [libc::c_int; 2] = [-1; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
            return Err(handle_errno("pipe"));
        }
        let [rd, wr] = fds;
        if let Err(e) = self.register(rd, FdKind::Pipe { path: None }) {
            unsafe { libc::close(wr) };
            return Err(e);
        }
        if let Err(e) = self.register(wr, FdKind::Pipe { path: None }) {
            let _ = self.close(rd);
            return Err(e);
        }
        Ok((rd, wr))
    }

    /// Records a file descriptor opened outside this layer.
    pub fn register_file(&self, fd: RawFd, mode: u32, perm: u32, path: Option<&str>) -> Result<RawFd> {
        if fd < 0 {
            return Err(Error::new(ErrorKind::ArgsInvalid));
        }
        let kind = FdKind::File {
            mode,
            perm,
            path: path.map(str::to_string),
        };
        self.fdtable.lock().open(fd, kind)
    }

    /// Reference to Linux: https://man7.org/linux/man-pages/man2/gethostname.2.html
    pub fn get_hostname(&self) -> Result<String> {
        let mut buf = vec![0 as libc::c_char; HOSTNAME_MAX];
        if unsafe { libc::gethostname(buf.as_mut_ptr(), buf.len()) } < 0 {
            return Err(handle_errno("gethostname"));
        }
        // gethostname may truncate without a terminator
        if let Some(last) = buf.last_mut() {
            *last = 0;
        }
        let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
        Ok(name.to_string_lossy().into_owned())
    }

    /// Reference to Linux: https://man7.org/linux/man-pages/man3/getaddrinfo.3.html
    ///
    /// Resolves `hostname` to at most `max` distinct addresses, IPv4 and
    /// IPv6 mixed in resolver order.  Ports are 0.
    ///
    /// Return:
    ///     - On failure: `HostNotFound` for an unknown name, `NoAddress` for
    ///       a name without addresses, `TryAgain` for a temporary resolver
    ///       failure, otherwise `ArgsInvalid`
    pub fn get_addr(&self, hostname: &str, max: usize) -> Result<Vec<SockAddr>> {
        if hostname.is_empty() || max == 0 {
            return Err(Error::new(ErrorKind::ArgsInvalid));
        }
        let c_host = CString::new(hostname).map_err(|_| Error::new(ErrorKind::ArgsInvalid))?;
        let mut hints: libc::addrinfo = unsafe { mem::zeroed() };
        hints.ai_family = libc::AF_UNSPEC;
        hints.ai_socktype = libc::SOCK_STREAM;
        let mut res: *mut libc::addrinfo = std::ptr::null_mut();
        let rc = unsafe { libc::getaddrinfo(c_host.as_ptr(), std::ptr::null(), &hints, &mut res) };
        if rc != 0 {
            let kind = match rc {
                libc::EAI_NONAME => ErrorKind::HostNotFound,
                EAI_NODATA => ErrorKind::NoAddress,
                libc::EAI_AGAIN => ErrorKind::TryAgain,
                libc::EAI_MEMORY => ErrorKind::OutOfMemory,
                _ => ErrorKind::ArgsInvalid,
            };
            debug!("getaddrinfo({}) failed: {} ({})", hostname, rc, kind);
            return Err(Error::new(kind));
        }

        let mut found: Vec<SockAddr> = Vec::new();
        let mut cur = res;
        while !cur.is_null() && found.len() < max {
            let ai = unsafe { &*cur };
            cur = ai.ai_next;
            let family = match SockFamily::from_native(ai.ai_family) {
                Some(f @ (SockFamily::Inet | SockFamily::Inet6)) => f,
                _ => continue,
            };
            let len = (ai.ai_addrlen as usize).min(mem::size_of::<libc::sockaddr_storage>());
            if ai.ai_addr.is_null() || len == 0 {
                continue;
            }
            let mut native = NativeSockAddr::empty();
            unsafe {
                std::ptr::copy_nonoverlapping(
                    ai.ai_addr as *const u8,
                    native.as_mut_ptr() as *mut u8,
                    len,
                );
            }
            *native.len_mut() = len as libc::socklen_t;
            if let Ok(addr) = SockAddr::from_native(&native, family) {
                if !found.contains(&addr) {
                    found.push(addr);
                }
            }
        }
        unsafe { libc::freeaddrinfo(res) };

        if found.is_empty() {
            return Err(Error::new(ErrorKind::NoAddress));
        }
        Ok(found)
    }

    /// Number of live registry entries.  Handy for leak checks.
    pub fn open_count(&self) -> usize {
        self.fdtable.lock().count()
    }
}

impl Default for SocketLayer {
    fn default() -> Self {
        SocketLayer::from_config(&XiConfig::default())
    }
}

impl From<FdTable> for SocketLayer {
    fn from(table: FdTable) -> Self {
        SocketLayer::new(table.into_shared())
    }
}

// Decodes a kernel-filled address.  An empty result (an unnamed peer, or a
// stream recvfrom that did not fill it) becomes a blank address of the
// expected family.
fn address_from_native(native: &NativeSockAddr, family: SockFamily) -> Result<SockAddr> {
    if native.is_empty() || native.family() == libc::AF_UNSPEC {
        return Ok(SockAddr {
            family,
            host: String::new(),
            port: 0,
        });
    }
    SockAddr::from_native(native, family)
}

fn set_nonblocking(fd: RawFd, on: bool) -> Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(handle_errno("fcntl"));
    }
    let flags = if on {
        flags | libc::O_NONBLOCK
    } else {
        flags & !libc::O_NONBLOCK
    };
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags) } < 0 {
        return Err(handle_errno("fcntl"));
    }
    Ok(())
}

pub(crate) fn setsockopt_raw<V>(fd: RawFd, level: i32, name: i32, value: &V) -> i32 {
    unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            value as *const V as *const libc::c_void,
            mem::size_of::<V>() as libc::socklen_t,
        )
    }
}

fn getsockopt_raw<V>(fd: RawFd, level: i32, name: i32, value: &mut V) -> Result<()> {
    let mut len = mem::size_of::<V>() as libc::socklen_t;
    let ret = unsafe {
        libc::getsockopt(
            fd,
            level,
            name,
            value as *mut V as *mut libc::c_void,
            &mut len,
        )
    };
    if ret < 0 {
        return Err(handle_errno("getsockopt"));
    }
    Ok(())
}
