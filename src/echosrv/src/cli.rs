use clap::*;

use xinet::{PollBackend, SockFamily};

use echosrv::ServerConfig;

#[derive(Debug, Parser, Clone)]
#[command(name = "echosrv", about = "Echo every byte back to the sender")]
pub struct CliOptions {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// JSON config file; flags given on the command line override it
    #[arg(long, value_name = "FILE")]
    pub config: Option<String>,

    /// Address to listen on, or the socket path with `--family local`
    #[arg(long)]
    pub host: Option<String>,

    #[arg(short, long)]
    pub port: Option<u16>,

    /// inet, inet6 or local
    #[arg(long, value_parser = parse_family)]
    pub family: Option<SockFamily>,

    /// epoll or poll
    #[arg(long, value_parser = parse_backend)]
    pub backend: Option<PollBackend>,

    /// Events taken per poll call
    #[arg(long)]
    pub max_events: Option<usize>,

    /// Poll timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<i32>,

    /// Hold the pollset lock across each wait
    #[arg(long)]
    pub use_lock: bool,

    /// Edge-triggered epoll
    #[arg(long)]
    pub edge: bool,
}

pub fn parse_family(s: &str) -> Result<SockFamily, String> {
    match s.to_ascii_lowercase().as_str() {
        "inet" | "ipv4" => Ok(SockFamily::Inet),
        "inet6" | "ipv6" => Ok(SockFamily::Inet6),
        "local" | "unix" => Ok(SockFamily::Local),
        other => Err(format!("unknown family `{}`", other)),
    }
}

pub fn parse_backend(s: &str) -> Result<PollBackend, String> {
    match s.to_ascii_lowercase().as_str() {
        "epoll" => Ok(PollBackend::Epoll),
        "poll" => Ok(PollBackend::Poll),
        other => Err(format!("unknown backend `{}`", other)),
    }
}

impl CliOptions {
    /// The config file (or defaults) with the flags applied on top.
    pub fn server_config(&self) -> anyhow::Result<ServerConfig> {
        let mut cfg = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("reading {}: {}", path, e))?;
                serde_json::from_str(&text)
                    .map_err(|e| anyhow::anyhow!("parsing {}: {}", path, e))?
            }
            None => ServerConfig::default(),
        };
        if let Some(host) = &self.host {
            cfg.host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(family) = self.family {
            cfg.family = family;
            if self.host.is_none() && family == SockFamily::Inet6 {
                cfg.host = "::1".to_string();
            }
        }
        if let Some(backend) = self.backend {
            cfg.xinet.pollset.backend = backend;
        }
        if let Some(max_events) = self.max_events {
            cfg.max_events = max_events;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            cfg.timeout_ms = timeout_ms;
        }
        cfg.xinet.pollset.use_lock |= self.use_lock;
        cfg.xinet.pollset.edge_triggered |= self.edge;
        if cfg.family == SockFamily::Local && cfg.host.is_empty() {
            anyhow::bail!("--family local needs a socket path in --host");
        }
        Ok(cfg)
    }
}
