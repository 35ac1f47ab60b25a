//! Test doubles shared by the unit tests of this crate.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use rtl_core::CommandFrame;
use tokio::io::AsyncWrite;

use crate::application::commands::CommandSink;
use crate::error::SplitterError;

/// Writer that records every `poll_write` call, or fails with `BrokenPipe`
/// while `failing` is set.
#[derive(Clone, Default)]
pub(crate) struct RecordingWriter {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingWriter {
    pub(crate) fn failing() -> Self {
        let writer = Self::default();
        writer.set_failing(true);
        writer
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every write call in order.
    pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    /// All written bytes concatenated.
    pub(crate) fn written(&self) -> Vec<u8> {
        self.writes().concat()
    }
}

impl AsyncWrite for RecordingWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.failing.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "recording writer closed",
            )));
        }
        self.writes.lock().unwrap().push(buf.to_vec());
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Writer that accepts its first `budget` bytes and then never makes
/// progress again.
#[derive(Default)]
pub(crate) struct StalledWriter {
    budget: usize,
}

impl StalledWriter {
    /// Stalls only after `budget` bytes, e.g. after a header.
    pub(crate) fn after(budget: usize) -> Self {
        Self { budget }
    }
}

impl AsyncWrite for StalledWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.budget == 0 {
            return Poll::Pending;
        }
        let n = buf.len().min(self.budget);
        self.budget -= n;
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Writer that accepts one byte per call and yields between calls, so
/// concurrent unsynchronised writers would interleave.
#[derive(Clone, Default)]
pub(crate) struct TrickleWriter {
    out: Arc<Mutex<Vec<u8>>>,
    yield_next: bool,
}

impl TrickleWriter {
    pub(crate) fn written(&self) -> Vec<u8> {
        self.out.lock().unwrap().clone()
    }
}

impl AsyncWrite for TrickleWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        if self.yield_next {
            self.yield_next = false;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        self.yield_next = true;
        self.out.lock().unwrap().push(buf[0]);
        Poll::Ready(Ok(1))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Command sink that records forwarded frames.
#[derive(Default)]
pub(crate) struct RecordingSink {
    frames: Mutex<Vec<CommandFrame>>,
    should_fail: bool,
}

impl RecordingSink {
    /// A sink whose every send fails with `UpstreamWrite`.
    pub(crate) fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn frames(&self) -> Vec<CommandFrame> {
        self.frames.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandSink for RecordingSink {
    async fn send_command(&self, frame: CommandFrame) -> Result<(), SplitterError> {
        if self.should_fail {
            return Err(SplitterError::UpstreamWrite(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "injected failure",
            )));
        }
        self.frames.lock().unwrap().push(frame);
        Ok(())
    }
}
