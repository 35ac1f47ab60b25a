//! ClientRegistry: the set of downstream clients that receive the sample stream.
//!
//! Three kinds of task touch the registry concurrently:
//!
//! - the accept path adds a handle when a client connects,
//! - the upstream loop broadcasts every chunk to all handles,
//! - each client task removes its own handle when it ends.
//!
//! The handle list sits behind a `std::sync::Mutex` that is only ever held for
//! a push, a search, or a clone.  [`ClientRegistry::broadcast`] clones the
//! list, drops the lock, and then writes, so adds and removes never wait on a
//! slow socket and a removal during a broadcast cannot skip or repeat anyone.
//!
//! Each handle guards its writer with its own async mutex.  The writer is an
//! `Option`: once the owning task retires it, the slot is empty and any late
//! write fails instead of reaching the socket.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Notify;
use tracing::debug;

/// Identifies one accepted downstream connection.
pub type ClientId = u64;

// ── ClientHandle ──────────────────────────────────────────────────────────────

/// The writable side of one downstream connection.
pub struct ClientHandle<W = OwnedWriteHalf> {
    id: ClientId,
    peer: SocketAddr,
    writer: tokio::sync::Mutex<Option<W>>,
    pruned: Notify,
}

impl<W> ClientHandle<W> {
    pub fn new(id: ClientId, peer: SocketAddr, writer: W) -> Self {
        Self {
            id,
            peer,
            writer: tokio::sync::Mutex::new(Some(writer)),
            pruned: Notify::new(),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Completes once a broadcast has dropped this handle from the registry.
    ///
    /// The owning session waits on this next to its reads, since a client
    /// pruned for a stalled write may still be connected and would otherwise
    /// sit open with no data.  A prune that happens before the wait starts is
    /// not lost.
    pub async fn pruned(&self) {
        self.pruned.notified().await;
    }

    /// Drops the writer so nothing more can be written through this handle.
    ///
    /// Called from synchronous teardown, so it cannot wait for the lock.  If a
    /// broadcast write is in flight the writer is left in place; that write is
    /// the last one, because the handle has already left the registry, and the
    /// writer is dropped with the final `Arc`.
    ///
    /// Returns `true` if the writer was dropped here.
    pub fn retire(&self) -> bool {
        match self.writer.try_lock() {
            Ok(mut writer) => writer.take().is_some(),
            Err(_) => false,
        }
    }
}

impl<W> ClientHandle<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Writes all of `bytes` and flushes.
    ///
    /// # Errors
    ///
    /// Returns the socket error, or `NotConnected` if the handle was retired.
    pub async fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        write_to(writer.as_mut(), bytes).await
    }
}

async fn write_to<W>(writer: Option<&mut W>, bytes: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let Some(writer) = writer else {
        return Err(io::Error::new(
            io::ErrorKind::NotConnected,
            "client handle retired",
        ));
    };
    writer.write_all(bytes).await?;
    writer.flush().await
}

// ── ClientRegistry ────────────────────────────────────────────────────────────

/// Outcome of one [`ClientRegistry::broadcast`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Handles that received the whole chunk.
    pub delivered: usize,
    /// Handles removed because their write failed or timed out.
    pub pruned: usize,
}

/// Concurrency-safe set of active downstream handles.
pub struct ClientRegistry<W = OwnedWriteHalf> {
    clients: Mutex<Vec<Arc<ClientHandle<W>>>>,
    next_id: AtomicU64,
    write_timeout: Option<Duration>,
}

impl<W> ClientRegistry<W> {
    /// Creates an empty registry whose writes never time out.
    pub fn new() -> Self {
        Self::with_write_timeout(None)
    }

    /// Creates an empty registry that prunes any client whose chunk write
    /// takes longer than `write_timeout`.
    pub fn with_write_timeout(write_timeout: Option<Duration>) -> Self {
        Self {
            clients: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            write_timeout,
        }
    }

    /// Allocates a fresh client id.  Ids start at 1 and are never reused.
    pub fn next_id(&self) -> ClientId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // A panic while the lock is held cannot leave the Vec half-updated, so a
    // poisoned lock is still safe to use.
    fn clients(&self) -> MutexGuard<'_, Vec<Arc<ClientHandle<W>>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a handle.  Ids are unique per connection, so no de-duplication.
    pub fn add(&self, handle: Arc<ClientHandle<W>>) {
        self.clients().push(handle);
    }

    /// Removes the handle with `id`.
    ///
    /// Removing an absent id is a no-op, since both a client's own teardown
    /// and a failed broadcast may try.  Returns whether a handle was removed.
    pub fn remove(&self, id: ClientId) -> bool {
        let mut clients = self.clients();
        match clients.iter().position(|h| h.id() == id) {
            Some(index) => {
                clients.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients().iter().any(|h| h.id() == id)
    }

    pub fn len(&self) -> usize {
        self.clients().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients().is_empty()
    }

    /// Clones the current handle list.
    pub fn snapshot(&self) -> Vec<Arc<ClientHandle<W>>> {
        self.clients().clone()
    }
}

impl<W> ClientRegistry<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Adds `handle` and writes `header` to it as one step.
    ///
    /// The handle's writer lock is held across both, so a broadcast that
    /// picks the handle up immediately still has to wait until the header is
    /// on the wire.  The client never sees sample data before the header.
    ///
    /// # Errors
    ///
    /// Returns the header write error.  The handle stays registered; removing
    /// it is the caller's teardown job.
    pub async fn admit(&self, handle: &Arc<ClientHandle<W>>, header: &[u8]) -> io::Result<()> {
        let mut writer = handle.writer.lock().await;
        self.add(Arc::clone(handle));
        write_to(writer.as_mut(), header).await
    }

    /// Writes `chunk` to every registered handle.
    ///
    /// Writes run concurrently, so one slow client delays the others by at
    /// most the write timeout.  A handle whose write fails is removed, its
    /// [`ClientHandle::pruned`] signal fires, and the error is swallowed; the
    /// remaining handles still get the chunk.
    pub async fn broadcast(&self, chunk: &[u8]) -> BroadcastReport {
        let targets = self.snapshot();
        let mut report = BroadcastReport::default();
        if targets.is_empty() {
            return report;
        }

        let results = join_all(targets.iter().map(|handle| self.deliver(handle, chunk))).await;

        for (handle, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    if self.remove(handle.id()) {
                        handle.pruned.notify_one();
                        report.pruned += 1;
                        debug!(
                            "client {} ({}): dropped from broadcast: {e}",
                            handle.id(),
                            handle.peer()
                        );
                    }
                }
            }
        }

        report
    }

    async fn deliver(&self, handle: &ClientHandle<W>, chunk: &[u8]) -> io::Result<()> {
        match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, handle.write_all(chunk))
                .await
                .unwrap_or_else(|_| {
                    Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("chunk write exceeded {limit:?}"),
                    ))
                }),
            None => handle.write_all(chunk).await,
        }
    }
}

impl<W> Default for ClientRegistry<W> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
