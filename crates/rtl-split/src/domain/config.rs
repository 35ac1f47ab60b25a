//! Splitter configuration types.
//!
//! [`SplitterConfig`] holds every runtime setting.  `main.rs` fills it from
//! CLI arguments and environment variables; tests build it directly.

use std::net::SocketAddr;
use std::time::Duration;

/// Default rtl_tcp port, used for both the upstream server and the listener.
pub const DEFAULT_PORT: u16 = 1234;

/// Default size of one upstream read, and so of one broadcast chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// All runtime configuration for the splitter.
///
/// # Example
///
/// ```rust
/// use rtl_split::domain::SplitterConfig;
///
/// let cfg = SplitterConfig::default();
/// assert_eq!(cfg.upstream_target(), "localhost:1234");
/// assert_eq!(cfg.listen_addr.port(), 1234);
/// ```
#[derive(Debug, Clone)]
pub struct SplitterConfig {
    /// Hostname or IP of the rtl_tcp server.  A name is resolved at connect
    /// time, so this is not a `SocketAddr`.
    pub upstream_host: String,

    /// TCP port of the rtl_tcp server.
    pub upstream_port: u16,

    /// Address the downstream listener binds to.
    pub listen_addr: SocketAddr,

    /// Maximum bytes per upstream read.
    pub chunk_size: usize,

    /// How long one chunk write to a client may take before that client is
    /// pruned.  `None` waits indefinitely.
    pub client_write_timeout: Option<Duration>,

    /// Set `TCP_NODELAY` on accepted client sockets.
    pub tcp_nodelay: bool,
}

impl SplitterConfig {
    /// `host:port` string handed to the resolver.
    pub fn upstream_target(&self) -> String {
        format!("{}:{}", self.upstream_host, self.upstream_port)
    }
}

impl Default for SplitterConfig {
    /// | Field                | Default          |
    /// |----------------------|------------------|
    /// | upstream_host        | `localhost`      |
    /// | upstream_port        | `1234`           |
    /// | listen_addr          | `0.0.0.0:1234`   |
    /// | chunk_size           | `1024`           |
    /// | client_write_timeout | 5 seconds        |
    /// | tcp_nodelay          | `true`           |
    fn default() -> Self {
        Self {
            upstream_host: "localhost".to_string(),
            upstream_port: DEFAULT_PORT,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            chunk_size: DEFAULT_CHUNK_SIZE,
            client_write_timeout: Some(Duration::from_secs(5)),
            tcp_nodelay: true,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
