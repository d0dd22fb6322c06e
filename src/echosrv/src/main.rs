mod cli;

use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use log::info;

use crate::cli::CliOptions;
use echosrv::EchoServer;
use xinet::{init_logging, SocketLayer};

static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_sig: libc::c_int) {
    STOP.store(true, Ordering::Relaxed);
}

/// Entry point of the echosrv executable.
///
///     echosrv [-v...] [--config FILE] [--host H] [--port P] [--family F] [--backend B]
///
/// Runs until SIGINT or SIGTERM, then closes every connection.
fn main() -> anyhow::Result<()> {
    let cli = CliOptions::parse();
    init_logging(cli.verbose);
    let config = cli.server_config()?;

    let layer = SocketLayer::from_config(&config.xinet);
    let mut server = EchoServer::new(layer, config)?;
    info!("echo server on {}", server.local_addr()?);

    unsafe {
        libc::signal(libc::SIGINT, on_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_signal as libc::sighandler_t);
    }

    server.run(&STOP)?;
    info!("stopping with {} open connections", server.connections());
    server.shutdown()?;
    Ok(())
}
