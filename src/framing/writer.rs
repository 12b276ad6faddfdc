//! Connection writer. Puts planned frames on the wire.
//!
//! Every call to [`write`] is one transmission: the bytes are written in full
//! and flushed before returning. The first failure ends the response; nothing
//! is retried and the caller decides what to log and when to drop the
//! connection.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::{FramingPlan, Transmission};

/// A write to the peer failed.
#[derive(Debug, Error)]
#[error("failed to write {len} bytes to the connection: {source}")]
pub struct WriteError {
    len: usize,
    #[source]
    source: io::Error,
}

impl WriteError {
    /// Number of bytes the failed transmission tried to send.
    pub fn attempted_len(&self) -> usize {
        self.len
    }

    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }
}

/// Renders `bytes` for the debug log with CR and LF made visible.
pub fn visible(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .replace('\r', "<cr>")
        .replace('\n', "<lf>")
}

/// Writes `bytes` to `conn` as a single transmission and flushes.
///
/// # Errors
///
/// Returns [`WriteError`] if the peer has gone away or the socket fails.
pub async fn write<W>(conn: &mut W, bytes: &[u8]) -> Result<(), WriteError>
where
    W: AsyncWrite + Unpin,
{
    debug!(len = bytes.len(), "sent: '{}'", visible(bytes));

    let io = async {
        conn.write_all(bytes).await?;
        conn.flush().await
    };
    io.await.map_err(|source| WriteError {
        len: bytes.len(),
        source,
    })
}

/// Writes every frame of `plan` to `conn`, in order.
///
/// Batched plans are concatenated and written once, so `delay` has no
/// observable effect. Streamed plans get one write per frame, and after each
/// data chunk the task sleeps for `delay` when it is non-zero. The sleep only
/// holds up this connection.
///
/// # Errors
///
/// Returns the first [`WriteError`]; later frames are not attempted.
pub async fn write_frames<W>(
    conn: &mut W,
    plan: &FramingPlan,
    delay: Duration,
) -> Result<(), WriteError>
where
    W: AsyncWrite + Unpin,
{
    match plan.transmission() {
        Transmission::Batched => {
            let buf: Bytes = plan.concat();
            write(conn, &buf).await
        }
        Transmission::Streamed => {
            for frame in plan.frames() {
                write(conn, &frame.encode()).await?;

                if frame.is_data_chunk() && !delay.is_zero() {
                    debug!(
                        wait_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "waiting before next chunk"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            Ok(())
        }
    }
}
