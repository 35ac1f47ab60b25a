//! rtl-split: share one rtl_tcp server between many SDR clients.
//!
//! rtl_tcp serves exactly one client at a time.  This binary connects to it
//! once and re-serves the stream on its own port, so gqrx, SDR++ and friends
//! can all listen to the same dongle.  Any client may retune it; every
//! client hears the result.
//!
//! # Usage
//!
//! ```text
//! rtl-split [OPTIONS]
//!
//! Options:
//!   -t, --target <HOST>            rtl_tcp server host [default: localhost]
//!   -p, --port <PORT>              rtl_tcp server port [default: 1234]
//!   -l, --listen <PORT>            Port clients connect to [default: 1234]
//!       --bind <IP>                Address to listen on [default: 0.0.0.0]
//!       --chunk-size <BYTES>       Upstream read size [default: 1024]
//!       --write-timeout-ms <MS>    Drop clients slower than this, 0 = never [default: 5000]
//!       --no-nodelay               Leave Nagle's algorithm on for client sockets
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence when both are present.
//!
//! | Variable                  | Default     |
//! |---------------------------|-------------|
//! | `RTL_SPLIT_TARGET`        | `localhost` |
//! | `RTL_SPLIT_PORT`          | `1234`      |
//! | `RTL_SPLIT_LISTEN`        | `1234`      |
//! | `RTL_SPLIT_BIND`          | `0.0.0.0`   |
//! | `RTL_SPLIT_CHUNK_SIZE`    | `1024`      |
//! | `RTL_SPLIT_WRITE_TIMEOUT` | `5000`      |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).
//!
//! # Exit status
//!
//! Zero when upstream closes the stream or on Ctrl+C.  Non-zero when the
//! upstream server cannot be reached, the listener cannot be bound, or the
//! sample stream fails.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{ensure, Context};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rtl_split::domain::{SplitterConfig, DEFAULT_CHUNK_SIZE, DEFAULT_PORT};
use rtl_split::infrastructure::{Splitter, StopReason};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Fan-out proxy for rtl_tcp.
///
/// Connects to one rtl_tcp server and lets any number of clients share it.
#[derive(Debug, Parser)]
#[command(
    name = "rtl-split",
    about = "Share one rtl_tcp server between many SDR clients",
    version
)]
struct Cli {
    /// Hostname or IP of the rtl_tcp server.
    #[arg(short = 't', long, default_value = "localhost", env = "RTL_SPLIT_TARGET")]
    target: String,

    /// Port of the rtl_tcp server.
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT, env = "RTL_SPLIT_PORT")]
    port: u16,

    /// Port that clients connect to.
    #[arg(short = 'l', long, default_value_t = DEFAULT_PORT, env = "RTL_SPLIT_LISTEN")]
    listen: u16,

    /// IP address to listen on.
    ///
    /// `0.0.0.0` accepts clients on every interface; `127.0.0.1` only local
    /// ones.
    #[arg(long, default_value = "0.0.0.0", env = "RTL_SPLIT_BIND")]
    bind: String,

    /// Bytes per upstream read.  Each read is broadcast as one chunk.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, env = "RTL_SPLIT_CHUNK_SIZE")]
    chunk_size: usize,

    /// Milliseconds a client may take to accept one chunk before it is
    /// dropped.  `0` waits forever, letting one stuck client stall everyone.
    #[arg(long, default_value_t = 5000, env = "RTL_SPLIT_WRITE_TIMEOUT")]
    write_timeout_ms: u64,

    /// Do not set TCP_NODELAY on client sockets.
    #[arg(long)]
    no_nodelay: bool,
}

impl Cli {
    /// Converts the parsed arguments into a [`SplitterConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not an IP address or `--chunk-size`
    /// is zero.
    fn into_splitter_config(self) -> anyhow::Result<SplitterConfig> {
        let bind_ip: IpAddr = self
            .bind
            .parse()
            .with_context(|| format!("invalid bind address: '{}'", self.bind))?;

        ensure!(self.chunk_size > 0, "--chunk-size must be at least 1");

        let client_write_timeout =
            (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms));

        Ok(SplitterConfig {
            upstream_host: self.target,
            upstream_port: self.port,
            listen_addr: SocketAddr::new(bind_ip, self.listen),
            chunk_size: self.chunk_size,
            client_write_timeout,
            tcp_nodelay: !self.no_nodelay,
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_splitter_config()?;

    info!(
        "rtl-split starting: upstream={}, listen={}",
        config.upstream_target(),
        config.listen_addr
    );

    let splitter = Splitter::connect(config)
        .await
        .context("could not start the splitter")?;
    info!(
        "replaying {}-byte upstream header to every client",
        splitter.header().len()
    );

    let reason = splitter.run_until(shutdown_signal()).await?;
    match reason {
        StopReason::UpstreamClosed => warn!("rtl-split stopping: {reason}"),
        StopReason::Shutdown => info!("rtl-split stopping: {reason}"),
    }
    Ok(())
}

/// Resolves on Ctrl+C.  If the handler cannot be installed, never resolves,
/// so the splitter keeps running until upstream closes.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C; shutting down"),
        Err(e) => {
            error!("failed to listen for Ctrl+C signal: {e}");
            std::future::pending::<()>().await;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
