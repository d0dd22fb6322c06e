//! An echo server on top of the xinet pollset and socket layer.
//!
//! Each connection alternates between two interests.  While Readable it
//! waits for data; one `recv` worth of bytes is stored and the connection
//! switches to Writable.  While Writable it sends the stored bytes back,
//! staying Writable until they have all gone out, then switches back to
//! Readable.  EOF or any hard error deregisters and closes the connection.

use std::collections::BTreeMap;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

use xinet::{
    ErrorKind, Interest, PollFd, Pollset, ReadyEvent, Result, SockAddr, SockFamily, SockOpt,
    SockProto, SockType, SocketLayer, XiConfig,
};

/// What a registration in the server's pollset stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conn {
    Listener,
    Client(RawFd),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub family: SockFamily,
    /// IP text, or the socket path for `Local`.
    pub host: String,
    /// 0 picks an ephemeral port.
    pub port: u16,
    /// Events taken per poll call.
    pub max_events: usize,
    /// Poll timeout used by [`EchoServer::run`].
    pub timeout_ms: i32,
    /// Bytes read per `recv`.
    pub recv_size: usize,
    pub xinet: XiConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            family: SockFamily::Inet,
            host: "127.0.0.1".to_string(),
            port: 0,
            max_events: 64,
            timeout_ms: 1000,
            recv_size: 4096,
            xinet: XiConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> SockAddr {
        SockAddr {
            family: self.family,
            host: self.host.clone(),
            port: self.port,
        }
    }
}

pub struct EchoServer {
    layer: SocketLayer,
    pollset: Pollset<Conn>,
    listener: RawFd,
    /// Every client, with the bytes still to be echoed back.
    conns: BTreeMap<RawFd, Vec<u8>>,
    ready: Vec<ReadyEvent<Conn>>,
    max_events: usize,
    timeout_ms: i32,
    recv_size: usize,
}

impl EchoServer {
    /// Opens, binds and registers the listening socket.
    pub fn new(layer: SocketLayer, config: ServerConfig) -> Result<Self> {
        let pollset = config.xinet.new_pollset()?;
        let listener = open_listener(&layer, &config)?;
        if let Err(e) = pollset.add(PollFd::new(listener, Interest::Readable, Conn::Listener)) {
            let _ = layer.close(listener);
            return Err(e);
        }
        info!("listening on {}", config.listen_addr());
        Ok(EchoServer {
            layer,
            pollset,
            listener,
            conns: BTreeMap::new(),
            ready: Vec::with_capacity(config.max_events),
            max_events: config.max_events.max(1),
            timeout_ms: config.timeout_ms,
            recv_size: config.recv_size.max(1),
        })
    }

    /// The bound listening address, with the real port when 0 was asked for.
    pub fn local_addr(&self) -> Result<SockAddr> {
        self.layer.get_local(self.listener)
    }

    /// Open client connections.
    pub fn connections(&self) -> usize {
        self.conns.len()
    }

    pub fn layer(&self) -> &SocketLayer {
        &self.layer
    }

    /// One poll followed by dispatch of every ready event.  Returns the
    /// number of events handled.
    pub fn run_once(&mut self, timeout_ms: i32) -> Result<usize> {
        let mut ready = std::mem::take(&mut self.ready);
        let res = self.pollset.poll(&mut ready, self.max_events, timeout_ms);
        if let Ok(n) = res {
            trace!("{} ready", n);
            for ev in &ready {
                match ev.context {
                    Conn::Listener => self.on_accept(),
                    Conn::Client(fd) => match self.pollset.interest(fd) {
                        Some(Interest::Readable) => self.on_readable(fd),
                        Some(Interest::Writable) => self.on_writable(fd),
                        // dropped earlier in this batch
                        None => {}
                    },
                }
            }
        }
        self.ready = ready;
        res
    }

    /// Loops [`EchoServer::run_once`] until `stop` is set.  An interrupted
    /// wait just goes round again.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        while !stop.load(Ordering::Relaxed) {
            match self.run_once(self.timeout_ms) {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Deregisters and closes every client and the listener.
    pub fn shutdown(mut self) -> Result<()> {
        let fds: Vec<RawFd> = self.conns.keys().copied().collect();
        for fd in fds {
            self.drop_client(fd);
        }
        let _ = self.pollset.remove(self.listener);
        self.layer.close(self.listener)?;
        self.pollset.destroy()
    }

    fn on_accept(&mut self) {
        loop {
            let (fd, peer) = match self.layer.accept(self.listener) {
                Ok(accepted) => accepted,
                Err(e) if e.is_would_block() => return,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    return;
                }
            };
            if let Err(e) = self.layer.opt_set(fd, SockOpt::Nonblock, 1) {
                warn!("cannot make {} non-blocking: {}", fd, e);
                let _ = self.layer.close(fd);
                continue;
            }
            if let Err(e) = self.pollset.add(PollFd::new(fd, Interest::Readable, Conn::Client(fd))) {
                warn!("refusing {} from {}: {}", fd, peer, e);
                let _ = self.layer.close(fd);
                continue;
            }
            debug!("client {} connected from {}", fd, peer);
            self.conns.insert(fd, Vec::new());
        }
    }

    fn on_readable(&mut self, fd: RawFd) {
        let mut buf = vec![0u8; self.recv_size];
        match self.layer.recv(fd, &mut buf) {
            Ok(0) => {
                debug!("client {} closed", fd);
                self.drop_client(fd);
            }
            Ok(n) => {
                buf.truncate(n);
                self.conns.insert(fd, buf);
                self.switch(fd, Interest::Writable);
            }
            Err(e) if e.is_would_block() => {}
            Err(e) => {
                debug!("recv on {}: {}", fd, e);
                self.drop_client(fd);
            }
        }
    }

    fn on_writable(&mut self, fd: RawFd) {
        let Some(pending) = self.conns.get_mut(&fd) else {
            return;
        };
        if pending.is_empty() {
            self.switch(fd, Interest::Readable);
            return;
        }
        match self.layer.send(fd, pending) {
            Ok(n) => {
                pending.drain(..n);
                if pending.is_empty() {
                    self.switch(fd, Interest::Readable);
                }
            }
            Err(e) if e.is_would_block() => {}
            Err(e) => {
                debug!("send on {}: {}", fd, e);
                self.drop_client(fd);
            }
        }
    }

    // remove+add rather than modify, so both backends go through the same
    // registration path
    fn switch(&mut self, fd: RawFd, interest: Interest) {
        let res = self
            .pollset
            .remove(fd)
            .and_then(|_| self.pollset.add(PollFd::new(fd, interest, Conn::Client(fd))));
        if let Err(e) = res {
            warn!("re-registering {} as {:?}: {}", fd, interest, e);
            self.drop_client(fd);
        }
    }

    fn drop_client(&mut self, fd: RawFd) {
        let _ = self.pollset.remove(fd);
        self.conns.remove(&fd);
        if let Err(e) = self.layer.close(fd) {
            warn!("close {}: {}", fd, e);
        }
    }
}

fn open_listener(layer: &SocketLayer, config: &ServerConfig) -> Result<RawFd> {
    let proto = match config.family {
        SockFamily::Local => SockProto::Ip,
        _ => SockProto::Tcp,
    };
    let fd = layer.open(config.family, SockType::Stream, proto)?;
    let setup = || -> Result<()> {
        layer.opt_set(fd, SockOpt::ReuseAddr, 1)?;
        layer.opt_set(fd, SockOpt::Nonblock, 1)?;
        layer.bind(fd, &config.listen_addr())?;
        layer.listen(fd, config.xinet.listen_backlog)
    };
    if let Err(e) = setup() {
        let _ = layer.close(fd);
        return Err(e);
    }
    Ok(fd)
}

#[cfg(test)]
mod tests {
    use super::*;

    use xinet::PollBackend;

    #[test]
    fn config_defaults_from_json() {
        let cfg: ServerConfig =
            serde_json::from_str(r#"{ "port": 7007, "xinet": { "pollset": { "backend": "poll" } } }"#)
                .unwrap();
        assert_eq!(cfg.port, 7007);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.family, SockFamily::Inet);
        assert_eq!(cfg.xinet.pollset.backend, PollBackend::Poll);
        assert_eq!(cfg.listen_addr(), SockAddr::inet("127.0.0.1", 7007));
    }

    #[test]
    // a bad listen address fails cleanly and leaves nothing registered
    fn bad_address_leaks_nothing() {
        let layer = SocketLayer::default();
        let before = layer.open_count();
        let cfg = ServerConfig {
            host: "300.1.1.1".to_string(),
            ..ServerConfig::default()
        };
        let err = EchoServer::new(layer.clone(), cfg).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::AddressInvalid);
        assert_eq!(layer.open_count(), before);
    }
}
