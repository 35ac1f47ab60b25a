//! The splitter: upstream relay, downstream accept loop, and per-client
//! sessions.
//!
//! Three kinds of work run concurrently once the splitter is serving:
//!
//! - **Relay** – one loop reads chunks from upstream and broadcasts each one
//!   to every registered client.
//! - **Accept** – one loop accepts downstream connections and spawns a
//!   session task per client into a `JoinSet`.
//! - **Sessions** – each client task sends the cached header, then forwards
//!   the client's 5-byte commands upstream until the client goes away.
//!
//! [`Splitter::serve`] races the relay, the accept loop, and the caller's
//! shutdown future.  Whichever finishes first ends the run; dropping the
//! accept loop drops its `JoinSet`, which aborts every session task and
//! closes every client socket.
//!
//! # Client lifecycle
//!
//! ```text
//! Accepted ──admit──▶ Streaming ──EOF / error / upstream write failure / pruned──▶ Closing
//!     │                                                                              ▲
//!     └─────────────────────────── header write failed ──────────────────────────────┘
//! ```
//!
//! Closing is a drop guard, so it also runs when the task is aborted.  It
//! removes the handle from the registry and then drops its writer.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use rtl_core::{decode_command, StreamHeader, COMMAND_SIZE};

use crate::application::commands::{forward_command, CommandSink};
use crate::application::registry::{ClientHandle, ClientRegistry};
use crate::domain::config::SplitterConfig;
use crate::error::SplitterError;
use crate::infrastructure::upstream::{UpstreamCommander, UpstreamLink, UpstreamReader};

/// Pause after a failed `accept` so a persistent error (fd exhaustion) does
/// not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Bytes requested per client read; room for several queued commands.
const CLIENT_READ_SIZE: usize = COMMAND_SIZE * 16;

// ── Public API ────────────────────────────────────────────────────────────────

/// Why [`Splitter::serve`] returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The upstream server closed the sample stream.
    UpstreamClosed,
    /// The caller's shutdown future completed.
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::UpstreamClosed => f.write_str("upstream closed the connection"),
            StopReason::Shutdown => f.write_str("shutdown requested"),
        }
    }
}

/// A connected splitter, ready to accept clients.
pub struct Splitter {
    config: SplitterConfig,
    header: StreamHeader,
    registry: Arc<ClientRegistry>,
    reader: UpstreamReader,
    commander: Arc<UpstreamCommander>,
}

impl Splitter {
    /// Connects upstream and captures its header.
    ///
    /// Nothing is listening yet when this returns; call [`Splitter::run_until`]
    /// or [`Splitter::serve`].
    ///
    /// # Errors
    ///
    /// Returns [`SplitterError::UpstreamConnect`] if the upstream server is
    /// unreachable or closes before sending a header.
    pub async fn connect(config: SplitterConfig) -> Result<Self, SplitterError> {
        let link =
            UpstreamLink::connect(&config.upstream_host, config.upstream_port, config.chunk_size)
                .await?;

        match link.header.dongle_info() {
            Ok(info) => info!(
                "upstream tuner {} with {} gain steps",
                info.tuner, info.gain_count
            ),
            Err(e) => debug!("upstream header not decodable ({e}); replaying it verbatim"),
        }

        Ok(Self {
            registry: Arc::new(ClientRegistry::with_write_timeout(
                config.client_write_timeout,
            )),
            header: link.header,
            reader: link.reader,
            commander: Arc::new(link.commander),
            config,
        })
    }

    /// The header every client receives first.
    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// The live client registry.
    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    /// Binds the downstream listener on `config.listen_addr`.
    ///
    /// # Errors
    ///
    /// Returns [`SplitterError::Bind`] if the address is in use or not
    /// permitted.
    pub async fn bind(&self) -> Result<TcpListener, SplitterError> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| SplitterError::Bind { addr, source })?;
        match listener.local_addr() {
            Ok(local) => info!("listening for clients on {local}"),
            Err(_) => info!("listening for clients on {addr}"),
        }
        Ok(listener)
    }

    /// Binds the listener and serves until upstream closes or `shutdown`
    /// completes.
    ///
    /// # Errors
    ///
    /// Returns [`SplitterError::Bind`] or [`SplitterError::UpstreamRead`].
    pub async fn run_until<F>(self, shutdown: F) -> Result<StopReason, SplitterError>
    where
        F: Future<Output = ()>,
    {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Serves clients on an already-bound `listener`.
    ///
    /// Clients that connect before the first chunk arrives are still sent the
    /// header immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SplitterError::UpstreamRead`] if the sample stream fails.
    pub async fn serve<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<StopReason, SplitterError>
    where
        F: Future<Output = ()>,
    {
        let Splitter {
            config,
            header,
            registry,
            mut reader,
            commander,
        } = self;
        let header = Arc::new(header);
        let sink: Arc<dyn CommandSink> = commander.clone();

        let outcome = tokio::select! {
            relayed = relay_upstream(&mut reader, &registry) => {
                relayed.map(|()| StopReason::UpstreamClosed)
            }
            never = accept_loop(&listener, &config, &registry, &header, &sink) => match never {},
            () = shutdown => Ok(StopReason::Shutdown),
        };

        commander.close().await;
        outcome
    }
}

// ── Upstream relay ────────────────────────────────────────────────────────────

/// Broadcasts every upstream chunk until EOF.
///
/// Returns `Ok(())` when upstream closes cleanly.
pub(crate) async fn relay_upstream<R, W>(
    reader: &mut UpstreamReader<R>,
    registry: &ClientRegistry<W>,
) -> Result<(), SplitterError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send,
{
    let mut chunks: u64 = 0;
    loop {
        let chunk = match reader.read_chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                warn!("upstream closed the connection after {chunks} chunks");
                return Ok(());
            }
            Err(e) => return Err(SplitterError::UpstreamRead(e)),
        };
        chunks += 1;

        let report = registry.broadcast(chunk).await;
        if report.pruned > 0 {
            info!(
                "dropped {} client(s) that stopped accepting data; {} remain",
                report.pruned,
                registry.len()
            );
        }
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

async fn accept_loop(
    listener: &TcpListener,
    config: &SplitterConfig,
    registry: &Arc<ClientRegistry>,
    header: &Arc<StreamHeader>,
    sink: &Arc<dyn CommandSink>,
) -> Infallible {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if config.tcp_nodelay {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("client {peer}: could not set TCP_NODELAY: {e}");
                        }
                    }
                    let id = registry.next_id();
                    info!("client {id} connected from {peer}");

                    let (reader, writer) = stream.into_split();
                    let handle = Arc::new(ClientHandle::new(id, peer, writer));
                    sessions.spawn(serve_client(
                        reader,
                        handle,
                        Arc::clone(registry),
                        Arc::clone(header),
                        Arc::clone(sink),
                    ));
                }
                Err(e) => {
                    error!("accept error: {e}");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!("client session panicked: {e}");
                    }
                }
            }
        }
    }
}

// ── Per-client session ────────────────────────────────────────────────────────

/// How a client session ended.
#[derive(Debug)]
pub(crate) enum SessionEnd {
    /// The client closed its side, possibly mid-frame.
    Disconnected,
    HeaderWrite(io::Error),
    Read(io::Error),
    /// Forwarding a command upstream failed.
    Upstream(SplitterError),
    /// A broadcast dropped the client after a failed or stalled write.
    Pruned,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::Disconnected => f.write_str("disconnected"),
            SessionEnd::HeaderWrite(e) => write!(f, "header write failed: {e}"),
            SessionEnd::Read(e) => write!(f, "read failed: {e}"),
            SessionEnd::Upstream(e) => write!(f, "command not forwarded: {e}"),
            SessionEnd::Pruned => f.write_str("dropped after a failed or stalled write"),
        }
    }
}

/// Spawned once per accepted client.  Runs [`run_client`] and logs the end.
pub(crate) async fn serve_client<R, W>(
    reader: R,
    handle: Arc<ClientHandle<W>>,
    registry: Arc<ClientRegistry<W>>,
    header: Arc<StreamHeader>,
    sink: Arc<dyn CommandSink>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send,
{
    let id = handle.id();
    let peer = handle.peer();
    let end = run_client(reader, &handle, &registry, &header, sink.as_ref()).await;
    match end {
        SessionEnd::Disconnected => {
            info!("client {id} ({peer}) disconnected; {} remain", registry.len());
        }
        SessionEnd::Upstream(_) | SessionEnd::Pruned => {
            warn!("client {id} ({peer}) closed: {end}");
        }
        SessionEnd::HeaderWrite(_) | SessionEnd::Read(_) => {
            info!("client {id} ({peer}) closed: {end}; {} remain", registry.len());
        }
    }
}

/// Admits the client, then forwards its commands until it goes away or a
/// broadcast prunes it.
///
/// Reads are buffered and split into frames with [`decode_command`].  Bytes
/// past the last whole frame wait for the next read; a partial frame left at
/// EOF is never forwarded.
///
/// The handle is out of the registry and its writer dropped by the time
/// this returns, or if the future is dropped early.
pub(crate) async fn run_client<R, W>(
    mut reader: R,
    handle: &Arc<ClientHandle<W>>,
    registry: &ClientRegistry<W>,
    header: &StreamHeader,
    sink: &dyn CommandSink,
) -> SessionEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send,
{
    let _registration = Registration { registry, handle };

    if let Err(e) = registry.admit(handle, header.as_bytes()).await {
        return SessionEnd::HeaderWrite(e);
    }

    let pruned = handle.pruned();
    tokio::pin!(pruned);

    let mut pending: Vec<u8> = Vec::with_capacity(CLIENT_READ_SIZE);
    let mut buf = [0u8; CLIENT_READ_SIZE];
    loop {
        let n = tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => return SessionEnd::Disconnected,
                Ok(n) => n,
                Err(e) => return SessionEnd::Read(e),
            },
            () = &mut pruned => return SessionEnd::Pruned,
        };
        pending.extend_from_slice(&buf[..n]);

        let mut consumed = 0;
        while let Ok((command, used)) = decode_command(&pending[consumed..]) {
            consumed += used;
            if let Err(e) = forward_command(sink, handle.id(), handle.peer(), command).await {
                return SessionEnd::Upstream(e);
            }
        }
        pending.drain(..consumed);
    }
}

/// Unregisters and retires a client when dropped.
struct Registration<'a, W> {
    registry: &'a ClientRegistry<W>,
    handle: &'a Arc<ClientHandle<W>>,
}

impl<W> Drop for Registration<'_, W> {
    fn drop(&mut self) {
        self.registry.remove(self.handle.id());
        self.handle.retire();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
