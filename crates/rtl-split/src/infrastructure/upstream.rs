//! The single TCP connection to the upstream rtl_tcp server.
//!
//! rtl_tcp sends a 12-byte dongle header as soon as a client connects, then
//! streams raw I/Q samples until the connection closes.  Commands flow the
//! other way as 5-byte frames.
//!
//! After [`UpstreamLink::connect`] the stream is split:
//!
//! - [`UpstreamReader`] is owned by the relay loop and yields sample chunks.
//! - [`UpstreamCommander`] is shared by every client task.  Its writer sits
//!   behind a `tokio::sync::Mutex`, so each frame is written and flushed
//!   while no other task can touch the socket.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info};

use rtl_core::{CommandFrame, StreamHeader, HEADER_SIZE};

use crate::application::commands::CommandSink;
use crate::error::SplitterError;

/// An open upstream connection whose header has already been read.
pub struct UpstreamLink {
    /// The header exactly as received.  Usually 12 bytes; shorter if the
    /// server's first segment was short.
    pub header: StreamHeader,
    pub reader: UpstreamReader,
    pub commander: UpstreamCommander,
}

impl UpstreamLink {
    /// Connects to `host:port` and captures the dongle header.
    ///
    /// The header is taken from a single read of at most [`HEADER_SIZE`]
    /// bytes.  Whatever that read returns is what every client will be sent.
    ///
    /// # Errors
    ///
    /// Returns [`SplitterError::UpstreamConnect`] if the name does not
    /// resolve, the connection is refused, or the server closes before
    /// sending any header bytes.
    pub async fn connect(host: &str, port: u16, chunk_size: usize) -> Result<Self, SplitterError> {
        let target = format!("{host}:{port}");
        let connect_failed = |source| SplitterError::UpstreamConnect {
            target: target.clone(),
            source,
        };

        let stream = TcpStream::connect((host, port))
            .await
            .map_err(connect_failed)?;
        let (mut read_half, write_half) = stream.into_split();

        let mut buf = [0u8; HEADER_SIZE];
        let n = read_half.read(&mut buf).await.map_err(connect_failed)?;
        if n == 0 {
            return Err(connect_failed(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "upstream closed before sending its header",
            )));
        }

        let header = StreamHeader::new(&buf[..n]);
        info!("connected to upstream {target}; header is {n} bytes");

        Ok(Self {
            header,
            reader: UpstreamReader::new(read_half, chunk_size),
            commander: UpstreamCommander::new(write_half),
        })
    }
}

// ── UpstreamReader ────────────────────────────────────────────────────────────

/// Read side of the upstream connection.
pub struct UpstreamReader<R = OwnedReadHalf> {
    inner: R,
    buf: Vec<u8>,
}

impl<R> UpstreamReader<R>
where
    R: AsyncRead + Unpin,
{
    /// `chunk_size` caps each read; zero is treated as one.
    pub fn new(inner: R, chunk_size: usize) -> Self {
        Self {
            inner,
            buf: vec![0; chunk_size.max(1)],
        }
    }

    /// Reads the next chunk of sample data.
    ///
    /// Returns `Ok(None)` once the server has closed the connection.  The
    /// returned slice is only valid until the next call.
    ///
    /// # Errors
    ///
    /// Returns the socket error unchanged.
    pub async fn read_chunk(&mut self) -> io::Result<Option<&[u8]>> {
        let n = self.inner.read(&mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(&self.buf[..n]))
    }
}

// ── UpstreamCommander ─────────────────────────────────────────────────────────

/// Serialized write side of the upstream connection.
pub struct UpstreamCommander<W = OwnedWriteHalf> {
    writer: Mutex<W>,
}

impl<W> UpstreamCommander<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Writes `frame` and flushes it while holding the writer lock.
    ///
    /// # Errors
    ///
    /// Returns [`SplitterError::UpstreamWrite`] if the write or flush fails.
    pub async fn send_command(&self, frame: CommandFrame) -> Result<(), SplitterError> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(frame.as_bytes())
            .await
            .map_err(SplitterError::UpstreamWrite)?;
        writer.flush().await.map_err(SplitterError::UpstreamWrite)
    }

    /// Shuts down the write direction.  Errors are logged and ignored; the
    /// connection is going away either way.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("upstream shutdown: {e}");
        }
    }
}

#[async_trait]
impl<W> CommandSink for UpstreamCommander<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send_command(&self, frame: CommandFrame) -> Result<(), SplitterError> {
        UpstreamCommander::send_command(self, frame).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
