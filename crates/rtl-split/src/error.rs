//! Error type shared by the splitter's library layers.

use std::net::SocketAddr;

use thiserror::Error;

/// Failures the splitter can report.
///
/// Only the upstream variants and [`SplitterError::Bind`] ever leave the
/// library.  Per-client I/O errors are handled inside the client task and
/// never become a `SplitterError`.
#[derive(Debug, Error)]
pub enum SplitterError {
    /// The upstream rtl_tcp server could not be reached, or closed before
    /// sending its header.
    #[error("failed to connect to upstream at {target}: {source}")]
    UpstreamConnect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading the sample stream failed mid-run.
    #[error("upstream read failed: {0}")]
    UpstreamRead(#[source] std::io::Error),

    /// A command could not be written upstream.
    #[error("upstream write failed: {0}")]
    UpstreamWrite(#[source] std::io::Error),

    /// The downstream listener could not be bound.
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
