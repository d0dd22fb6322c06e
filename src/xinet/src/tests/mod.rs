// Unit tests that need real sockets.  Every test builds its own registry, so
// they run in parallel without sharing state; the kernel hands out distinct
// descriptor values across threads anyway.

mod net_tests;

use std::os::unix::io::RawFd;

use sysdefs::constants::net_const::{SockFamily, SockProto, SockType};
use sysdefs::data::net_struct::SockAddr;

use crate::interface::XiConfig;
use crate::syscalls::SocketLayer;

/// A layer over a fresh default-sized registry.
pub fn test_layer() -> SocketLayer {
    SocketLayer::from_config(&XiConfig::default())
}

/// A TCP listener on an ephemeral loopback port, and the address it got.
pub fn tcp_listener(layer: &SocketLayer) -> (RawFd, SockAddr) {
    let fd = layer
        .open(SockFamily::Inet, SockType::Stream, SockProto::Tcp)
        .unwrap();
    layer.bind(fd, &SockAddr::inet("127.0.0.1", 0)).unwrap();
    layer.listen(fd, 16).unwrap();
    let addr = layer.get_local(fd).unwrap();
    assert_ne!(addr.port, 0);
    (fd, addr)
}

/// Returns (client, server-side child, listener), all blocking.
pub fn connected_pair(layer: &SocketLayer) -> (RawFd, RawFd, RawFd) {
    let (listener, addr) = tcp_listener(layer);
    let client = layer
        .open(SockFamily::Inet, SockType::Stream, SockProto::Tcp)
        .unwrap();
    layer.connect(client, &addr).unwrap();
    let (server, _) = layer.accept(listener).unwrap();
    (client, server, listener)
}

/// Closes everything in `fds` through the layer.
pub fn close_all(layer: &SocketLayer, fds: &[RawFd]) {
    for fd in fds {
        layer.close(*fd).unwrap();
    }
}
