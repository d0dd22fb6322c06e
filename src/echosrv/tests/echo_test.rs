//! Echo server tests over real loopback connections.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use echosrv::{EchoServer, ServerConfig};
use xinet::{PollBackend, SockFamily, SocketLayer};

fn config(backend: PollBackend) -> ServerConfig {
    let mut cfg = ServerConfig {
        timeout_ms: 20,
        ..ServerConfig::default()
    };
    cfg.xinet.pollset.backend = backend;
    cfg
}

/// Starts `server` on its own thread; stopping returns it for inspection.
struct Running {
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<EchoServer>,
}

impl Running {
    fn start(mut server: EchoServer) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            server.run(&flag).unwrap();
            server
        });
        Running { stop, handle }
    }

    fn stop(self) -> EchoServer {
        self.stop.store(true, Ordering::Relaxed);
        self.handle.join().unwrap()
    }
}

fn connect(port: u16) -> TcpStream {
    let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
}

fn echo(stream: &mut impl ReadWrite, payload: &[u8]) -> Vec<u8> {
    stream.write_all(payload).unwrap();
    let mut got = vec![0u8; payload.len()];
    stream.read_exact(&mut got).unwrap();
    got
}

trait ReadWrite: Read + Write {}
impl<T: Read + Write> ReadWrite for T {}

#[test]
fn ping_round_trip() {
    for backend in [PollBackend::Epoll, PollBackend::Poll] {
        let server = EchoServer::new(SocketLayer::default(), config(backend)).unwrap();
        let port = server.local_addr().unwrap().port;
        let running = Running::start(server);

        let mut client = connect(port);
        assert_eq!(echo(&mut client, b"ping"), b"ping");
        assert_eq!(echo(&mut client, b"second line\n"), b"second line\n");

        drop(client);
        running.stop().shutdown().unwrap();
    }
}

#[test]
fn several_clients_at_once() {
    for backend in [PollBackend::Epoll, PollBackend::Poll] {
        let server = EchoServer::new(SocketLayer::default(), config(backend)).unwrap();
        let port = server.local_addr().unwrap().port;
        let running = Running::start(server);

        let mut clients: Vec<TcpStream> = (0..4).map(|_| connect(port)).collect();
        for (i, client) in clients.iter_mut().enumerate() {
            client.write_all(format!("client {}", i).as_bytes()).unwrap();
        }
        for (i, client) in clients.iter_mut().enumerate() {
            let want = format!("client {}", i);
            let mut got = vec![0u8; want.len()];
            client.read_exact(&mut got).unwrap();
            assert_eq!(got, want.as_bytes());
        }

        let server = running.stop();
        assert_eq!(server.connections(), 4);
        server.shutdown().unwrap();
    }
}

#[test]
// more than one recv worth, so the connection flips direction many times
fn large_payload() {
    let server = EchoServer::new(SocketLayer::default(), config(PollBackend::Epoll)).unwrap();
    let port = server.local_addr().unwrap().port;
    let running = Running::start(server);

    let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
    let mut client = connect(port);
    let writer = {
        let mut w = client.try_clone().unwrap();
        let data = payload.clone();
        thread::spawn(move || w.write_all(&data).unwrap())
    };
    let mut got = vec![0u8; payload.len()];
    client.read_exact(&mut got).unwrap();
    writer.join().unwrap();
    assert_eq!(got, payload);

    drop(client);
    running.stop().shutdown().unwrap();
}

#[test]
// driven by hand: a client that goes away is deregistered and closed
fn disconnect_is_cleaned_up() {
    let layer = SocketLayer::default();
    let base = layer.open_count();
    let mut server = EchoServer::new(layer.clone(), config(PollBackend::Poll)).unwrap();
    let port = server.local_addr().unwrap().port;

    let client = connect(port);
    pump(&mut server, |s| s.connections() == 1);
    assert_eq!(layer.open_count(), base + 2);

    drop(client);
    pump(&mut server, |s| s.connections() == 0);
    assert_eq!(layer.open_count(), base + 1);

    server.shutdown().unwrap();
    assert_eq!(layer.open_count(), base);
}

#[test]
fn local_socket_echo() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("echo.sock");
    let cfg = ServerConfig {
        family: SockFamily::Local,
        host: path.to_str().unwrap().to_string(),
        ..config(PollBackend::Epoll)
    };
    let server = EchoServer::new(SocketLayer::default(), cfg).unwrap();
    let running = Running::start(server);

    let mut client = UnixStream::connect(&path).unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    assert_eq!(echo(&mut client, b"over a path"), b"over a path");

    drop(client);
    running.stop().shutdown().unwrap();
}

#[test]
fn locked_edge_triggered_pollset() {
    let mut cfg = config(PollBackend::Epoll);
    cfg.xinet.pollset.use_lock = true;
    cfg.xinet.pollset.edge_triggered = true;
    let server = EchoServer::new(SocketLayer::default(), cfg).unwrap();
    let port = server.local_addr().unwrap().port;
    let running = Running::start(server);

    let mut client = connect(port);
    for round in 0..10 {
        let msg = format!("round {}", round);
        assert_eq!(echo(&mut client, msg.as_bytes()), msg.as_bytes());
    }
    drop(client);
    running.stop().shutdown().unwrap();
}

fn pump(server: &mut EchoServer, done: impl Fn(&EchoServer) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(server) {
        assert!(Instant::now() < deadline, "server made no progress");
        server.run_once(20).unwrap();
    }
}
