//! Test doubles shared by the unit tests.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;

/// An in-memory connection that records every `poll_write` call separately.
///
/// Each recorded entry is one write call, which lets tests tell a single
/// batched transmission apart from one write per frame.
#[derive(Debug, Default)]
pub(crate) struct RecordingWriter {
    writes: Vec<Vec<u8>>,
    attempts: usize,
    fail_after: Option<usize>,
}

impl RecordingWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Accepts `n` writes, then fails every later one with `BrokenPipe`.
    pub(crate) fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    pub(crate) fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// Number of write calls made, including failed ones.
    pub(crate) fn attempts(&self) -> usize {
        self.attempts
    }

    /// Every successfully written byte, in order.
    pub(crate) fn concat(&self) -> Vec<u8> {
        self.writes.concat()
    }
}

impl AsyncWrite for RecordingWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.attempts += 1;

        if this.fail_after.is_some_and(|n| this.writes.len() >= n) {
            return Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)));
        }

        this.writes.push(buf.to_vec());
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
