use super::*;

use fdregistry::FdKind;
use sysdefs::constants::fd_const::FILE_MODE_READ;
use sysdefs::constants::net_const::{SockOpt, SockShutdown};
use sysdefs::ErrorKind;

#[test]
// open records the triple, close releases the slot
fn open_close_tracks_registry() {
    let layer = test_layer();
    let before = layer.open_count();
    let fd = layer
        .open(SockFamily::Inet, SockType::Datagram, SockProto::Udp)
        .unwrap();
    assert_eq!(layer.open_count(), before + 1);
    assert_eq!(
        layer.socket_info(fd).unwrap(),
        (SockFamily::Inet, SockType::Datagram, SockProto::Udp)
    );
    layer.close(fd).unwrap();
    assert_eq!(layer.open_count(), before);
    assert_eq!(
        layer.socket_info(fd).unwrap_err().kind(),
        ErrorKind::BadDescriptor
    );
}

#[test]
fn open_rejects_bad_enums() {
    let layer = test_layer();
    assert_eq!(
        layer
            .open(SockFamily::Unspec, SockType::Stream, SockProto::Ip)
            .unwrap_err()
            .kind(),
        ErrorKind::ArgsInvalid
    );
    assert_eq!(
        layer.open_raw(99, 1, 0).unwrap_err().kind(),
        ErrorKind::ArgsInvalid
    );
    assert_eq!(
        layer.open_raw(4, 7, 0).unwrap_err().kind(),
        ErrorKind::ArgsInvalid
    );
    let fd = layer.open_raw(4, 1, 1).unwrap();
    layer.close(fd).unwrap();
}

#[test]
// socket() failures outside the permission and buffer codes are all
// ArgsInvalid, keeping the native errno
fn open_native_failure_is_args_invalid() {
    let layer = test_layer();
    let before = layer.open_count();
    let err = layer
        .open(SockFamily::Inet, SockType::Stream, SockProto::Udp)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgsInvalid);
    assert_eq!(err.raw_os_error(), Some(libc::EPROTONOSUPPORT));
    assert_eq!(layer.open_count(), before);
}

#[test]
fn bind_rejects_bad_addresses() {
    let layer = test_layer();
    let fd = layer
        .open(SockFamily::Inet, SockType::Stream, SockProto::Tcp)
        .unwrap();
    assert_eq!(
        layer
            .bind(fd, &SockAddr::inet("127.0.0.256", 0))
            .unwrap_err()
            .kind(),
        ErrorKind::AddressInvalid
    );
    assert_eq!(
        layer.bind(fd, &SockAddr::unspec()).unwrap_err().kind(),
        ErrorKind::ArgsInvalid
    );
    layer.close(fd).unwrap();

    let fd = layer
        .open(SockFamily::Local, SockType::Stream, SockProto::Ip)
        .unwrap();
    let long_path = "/tmp/".to_string() + &"x".repeat(200);
    assert_eq!(
        layer
            .bind(fd, &SockAddr::local(&long_path))
            .unwrap_err()
            .kind(),
        ErrorKind::AddressInvalid
    );
    layer.close(fd).unwrap();
}

#[test]
// a second bind to a listening port is refused by the kernel
fn bind_in_use() {
    let layer = test_layer();
    let (listener, addr) = tcp_listener(&layer);
    let fd = layer
        .open(SockFamily::Inet, SockType::Stream, SockProto::Tcp)
        .unwrap();
    assert_eq!(
        layer.bind(fd, &addr).unwrap_err().kind(),
        ErrorKind::AddressInUse
    );
    close_all(&layer, &[fd, listener]);
}

#[test]
fn accept_inherits_triple_and_reports_peer() {
    let layer = test_layer();
    let (listener, addr) = tcp_listener(&layer);
    let client = layer
        .open(SockFamily::Inet, SockType::Stream, SockProto::Tcp)
        .unwrap();
    layer.connect(client, &addr).unwrap();
    let (child, peer) = layer.accept(listener).unwrap();

    assert_eq!(
        layer.socket_info(child).unwrap(),
        (SockFamily::Inet, SockType::Stream, SockProto::Tcp)
    );
    assert_eq!(peer.host, "127.0.0.1");
    assert_eq!(peer, layer.get_local(client).unwrap());
    assert_eq!(layer.get_peer(client).unwrap(), addr);
    close_all(&layer, &[client, child, listener]);
}

#[test]
fn accept_checks_registry() {
    let layer = test_layer();
    let (rd, wr) = layer.pipe().unwrap();
    assert_eq!(layer.accept(rd).unwrap_err().kind(), ErrorKind::NotASocket);
    assert_eq!(
        layer.accept(4000).unwrap_err().kind(),
        ErrorKind::BadDescriptor
    );
    assert_eq!(
        layer.accept(1_000_000).unwrap_err().kind(),
        ErrorKind::BadDescriptor
    );
    close_all(&layer, &[rd, wr]);
}

#[test]
fn stream_round_trip_and_eof() {
    let layer = test_layer();
    let (client, server, listener) = connected_pair(&layer);

    assert_eq!(layer.send(client, b"hello").unwrap(), 5);
    let mut buf = [0u8; 16];
    let n = layer.recv(server, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello");

    layer.close(client).unwrap();
    assert_eq!(layer.recv(server, &mut buf).unwrap(), 0);
    close_all(&layer, &[server, listener]);
}

#[test]
// no syscall is made for an empty buffer, so even a bogus fd gets ArgsInvalid
fn empty_buffers_are_rejected() {
    let layer = test_layer();
    let mut empty: [u8; 0] = [];
    assert_eq!(layer.send(3000, &[]).unwrap_err().kind(), ErrorKind::ArgsInvalid);
    assert_eq!(
        layer.recv(3000, &mut empty).unwrap_err().kind(),
        ErrorKind::ArgsInvalid
    );
    assert_eq!(
        layer
            .sendto(3000, &[], &SockAddr::inet("127.0.0.1", 9))
            .unwrap_err()
            .kind(),
        ErrorKind::ArgsInvalid
    );
    assert_eq!(
        layer.recvfrom(3000, &mut empty).unwrap_err().kind(),
        ErrorKind::ArgsInvalid
    );
}

#[test]
fn nonblocking_recv_would_block() {
    let layer = test_layer();
    let (client, server, listener) = connected_pair(&layer);
    assert_eq!(layer.opt_get(server, SockOpt::Nonblock).unwrap(), 0);
    layer.opt_set(server, SockOpt::Nonblock, 1).unwrap();
    assert_eq!(layer.opt_get(server, SockOpt::Nonblock).unwrap(), 1);

    let mut buf = [0u8; 8];
    let err = layer.recv(server, &mut buf).unwrap_err();
    assert!(err.is_would_block());
    assert_eq!(err.raw_os_error(), Some(libc::EAGAIN));

    layer.opt_set(server, SockOpt::Nonblock, 0).unwrap();
    assert_eq!(layer.opt_get(server, SockOpt::Nonblock).unwrap(), 0);
    close_all(&layer, &[client, server, listener]);
}

#[test]
fn socket_options() {
    let layer = test_layer();
    let fd = layer
        .open(SockFamily::Inet, SockType::Stream, SockProto::Tcp)
        .unwrap();

    layer.opt_set(fd, SockOpt::ReuseAddr, 1).unwrap();
    assert_ne!(layer.opt_get(fd, SockOpt::ReuseAddr).unwrap(), 0);
    layer.opt_set(fd, SockOpt::KeepAlive, 1).unwrap();
    assert_ne!(layer.opt_get(fd, SockOpt::KeepAlive).unwrap(), 0);

    // the kernel doubles the buffer sizes it stores
    layer.opt_set(fd, SockOpt::SendBuf, 16384).unwrap();
    assert!(layer.opt_get(fd, SockOpt::SendBuf).unwrap() >= 16384);

    layer.opt_set(fd, SockOpt::RecvTimeout, 2000).unwrap();
    assert_eq!(layer.opt_get(fd, SockOpt::RecvTimeout).unwrap(), 2000);
    layer.opt_set(fd, SockOpt::SendTimeout, 0).unwrap();
    assert_eq!(layer.opt_get(fd, SockOpt::SendTimeout).unwrap(), 0);

    layer.opt_set(fd, SockOpt::Linger, 5).unwrap();
    assert_eq!(layer.opt_get(fd, SockOpt::Linger).unwrap(), 5);
    layer.opt_set(fd, SockOpt::Linger, 0).unwrap();
    assert_eq!(layer.opt_get(fd, SockOpt::Linger).unwrap(), 0);

    for opt in [SockOpt::RecvTimeout, SockOpt::SendTimeout, SockOpt::Linger] {
        let err = layer.opt_set(fd, opt, -1500).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgsInvalid);
        assert_eq!(err.raw_os_error(), None);
    }
    assert_eq!(layer.opt_get(fd, SockOpt::RecvTimeout).unwrap(), 2000);

    assert_eq!(
        layer.opt_set_raw(fd, 999, 1).unwrap_err().kind(),
        ErrorKind::NotSupported
    );
    assert_eq!(
        layer.opt_get_raw(fd, 3).unwrap_err().kind(),
        ErrorKind::NotSupported
    );
    assert_eq!(layer.opt_get_raw(fd, 16).unwrap(), 1);
    layer.close(fd).unwrap();
}

#[test]
fn ipv6_only_option() {
    let layer = test_layer();
    // IPv6 can be compiled out or disabled in the test environment
    let fd = match layer.open(SockFamily::Inet6, SockType::Stream, SockProto::Tcp) {
        Ok(fd) => fd,
        Err(_) => return,
    };
    layer.opt_set(fd, SockOpt::Ipv6Only, 1).unwrap();
    assert_eq!(layer.opt_get(fd, SockOpt::Ipv6Only).unwrap(), 1);
    layer.opt_set(fd, SockOpt::Ipv6Only, 0).unwrap();
    assert_eq!(layer.opt_get(fd, SockOpt::Ipv6Only).unwrap(), 0);
    layer.close(fd).unwrap();
}

#[test]
fn shutdown_write_gives_peer_eof() {
    let layer = test_layer();
    let (client, server, listener) = connected_pair(&layer);
    layer.shutdown(client, SockShutdown::Write).unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(layer.recv(server, &mut buf).unwrap(), 0);

    // the other direction still works
    layer.send(server, b"ok").unwrap();
    assert_eq!(layer.recv(client, &mut buf).unwrap(), 2);
    close_all(&layer, &[client, server, listener]);
}

#[test]
fn send_after_peer_close_is_not_connected() {
    let layer = test_layer();
    let (client, server, listener) = connected_pair(&layer);
    layer.close(server).unwrap();
    // the first send may still be buffered before the RST comes back
    let mut last = Ok(0);
    for _ in 0..50 {
        last = layer.send(client, b"x");
        if last.is_err() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    assert_eq!(last.unwrap_err().kind(), ErrorKind::NotConnected);
    close_all(&layer, &[client, listener]);
}

#[test]
fn pipe_ends_are_registered() {
    let layer = test_layer();
    let (rd, wr) = layer.pipe().unwrap();
    {
        let table = layer.fdtable().lock();
        assert_eq!(table.get(rd), Some(&FdKind::Pipe { path: None }));
        assert_eq!(table.get(wr), Some(&FdKind::Pipe { path: None }));
    }
    let n = unsafe { libc::write(wr, b"z".as_ptr() as *const libc::c_void, 1) };
    assert_eq!(n, 1);
    let mut b = [0u8; 1];
    let n = unsafe { libc::read(rd, b.as_mut_ptr() as *mut libc::c_void, 1) };
    assert_eq!((n, b[0]), (1, b'z'));
    close_all(&layer, &[rd, wr]);
    assert!(layer.fdtable().lock().get(rd).is_none());
}

#[test]
fn register_file_records_metadata() {
    let layer = test_layer();
    let file = tempfile::tempfile().unwrap();
    let fd = std::os::unix::io::AsRawFd::as_raw_fd(&file);
    layer
        .register_file(fd, FILE_MODE_READ, 0o600, Some("/tmp/data"))
        .unwrap();
    assert_eq!(
        layer.fdtable().lock().get(fd).and_then(|k| k.path().map(str::to_string)),
        Some("/tmp/data".to_string())
    );
    assert_eq!(
        layer.register_file(-1, 0, 0, None).unwrap_err().kind(),
        ErrorKind::ArgsInvalid
    );
    // the File still owns the descriptor; only drop the registry slot
    layer.fdtable().lock().close(fd).unwrap();
}

#[test]
fn close_rejects_negative() {
    let layer = test_layer();
    assert_eq!(layer.close(-1).unwrap_err().kind(), ErrorKind::ArgsInvalid);
}

#[test]
fn hostname_and_lookup() {
    let layer = test_layer();
    assert!(!layer.get_hostname().unwrap().is_empty());

    let addrs = layer.get_addr("localhost", 8).unwrap();
    assert!(!addrs.is_empty() && addrs.len() <= 8);
    assert!(addrs
        .iter()
        .any(|a| a.host == "127.0.0.1" || a.host == "::1"));

    let one = layer.get_addr("127.0.0.1", 1).unwrap();
    assert_eq!(one, vec![SockAddr::inet("127.0.0.1", 0)]);

    assert_eq!(
        layer.get_addr("", 1).unwrap_err().kind(),
        ErrorKind::ArgsInvalid
    );
    assert_eq!(
        layer.get_addr("localhost", 0).unwrap_err().kind(),
        ErrorKind::ArgsInvalid
    );
}
