//! Command routing from downstream clients to the upstream device.
//!
//! Client tasks never touch the upstream socket directly.  They hand each
//! frame to a [`CommandSink`]; in production that is the upstream link's
//! serialized writer, in tests a recording double or a mock.

use std::net::SocketAddr;

use async_trait::async_trait;
use rtl_core::CommandFrame;
use tracing::info;

use crate::application::registry::ClientId;
use crate::error::SplitterError;

/// Destination for client command frames.
///
/// Implementations must accept calls from many client tasks at once and put
/// each frame on the wire whole, never interleaved with another.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Sends one 5-byte frame upstream, unmodified.
    async fn send_command(&self, frame: CommandFrame) -> Result<(), SplitterError>;
}

/// Logs `frame` and forwards it to `sink`.
///
/// The log line shows the decoded meaning for the operator's benefit; the
/// frame itself is passed through untouched, known opcode or not.
///
/// # Errors
///
/// Returns the sink's error (the upstream write failed).
pub async fn forward_command(
    sink: &dyn CommandSink,
    client: ClientId,
    peer: SocketAddr,
    frame: CommandFrame,
) -> Result<(), SplitterError> {
    info!(
        "client {client} ({peer}): command {} [{}]",
        frame.interpret(),
        frame.hex()
    );
    sink.send_command(frame).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
