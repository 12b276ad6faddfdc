//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and serves every request on them with the
//! configured response. Each connection runs on its own task, so an
//! inter-chunk wait on one connection never holds up another, while requests
//! on the same connection are answered strictly one after the other.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::framing::writer::{self, WriteError};
use crate::handler::{self, HandlerError, Outcome, Phase, RequestKind};
use crate::http::{
    ResponseHead, StatusCode,
    request::{Request, RequestError},
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single connection ended early.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad request: {0}")]
    Request(#[from] RequestError),

    #[error("interim response failed: {0}")]
    Interim(#[from] WriteError),

    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// State of the request at the front of a connection's read buffer.
#[derive(Debug)]
enum Buffered {
    /// Head and body are both in; the bytes have been consumed.
    Complete(Request),
    /// The head parsed but the body is still arriving.
    AwaitingBody { expects_continue: bool },
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// How long in-flight connections may keep running after shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The chunkserv HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use chunkserv::config::ServerConfig;
/// use chunkserv::server::Server;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Arc::new(ServerConfig::default());
///     let server = Server::bind(config.socket_addr()).await?;
///     server.run_until(config, async {
///         let _ = tokio::signal::ctrl_c().await;
///     }).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: SocketAddr) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves connections until the process is terminated.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run(self, config: Arc<ServerConfig>) -> Result<(), ServerError> {
        self.run_until(config, std::future::pending()).await
    }

    /// Serves connections until `shutdown` completes.
    ///
    /// On shutdown the listener is closed first, so no new connection is
    /// accepted. Connections waiting for their next request are closed;
    /// connections in the middle of a response get [`SHUTDOWN_GRACE`] to
    /// finish writing it before they are aborted.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run_until<F>(
        self,
        config: Arc<ServerConfig>,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let Self {
            listener,
            local_addr,
        } = self;
        info!(address = %local_addr, "chunkserv listening");

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown requested — no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                            continue;
                        }
                    };

                    debug!(peer = %peer_addr, "connection accepted");
                    let config = Arc::clone(&config);
                    let stop = stop_rx.clone();

                    connections.spawn(async move {
                        if let Err(e) = handle_connection(stream, peer_addr, config, stop).await {
                            warn!(peer = %peer_addr, error = %e, "connection closed with error");
                        }
                    });
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "connection task failed");
                    }
                }
            }
        }

        drop(listener);
        let _ = stop_tx.send(true);

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = connections.len(),
                "grace period elapsed — aborting open connections"
            );
            connections.shutdown().await;
        }

        info!(address = %local_addr, "stopped");
        Ok(())
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, reading one
/// request per iteration, until the peer closes the connection, signals
/// `Connection: close`, or the server shuts down between requests.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<ServerConfig>,
    mut stop: watch::Receiver<bool>,
) -> Result<(), ConnectionError> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let request = match read_request(&mut stream, &mut buf, &mut stop).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!(peer = %peer_addr, "connection closed");
                break;
            }
            Err(ConnectionError::Request(e)) => {
                reject(&mut stream, &e).await;
                return Err(e.into());
            }
            Err(e) => return Err(e),
        };

        let keep_alive = request.is_keep_alive();
        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let outcome = handler::respond(&mut stream, &request, &config).await?;

        if outcome == Outcome::Close || !keep_alive {
            debug!(peer = %peer_addr, "Connection: close — shutting down");
            let _ = stream.shutdown().await;
            break;
        }
    }

    Ok(())
}

/// Reads the next complete request (head and body) from the connection.
///
/// Bytes beyond the request stay in `buf` for the next call. A client that
/// sent `Expect: 100-continue` gets `HTTP/1.1 100 Continue` once, before the
/// body is read. Returns `Ok(None)` when the peer closes the connection or the
/// server stops while no request is in progress.
async fn read_request(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    stop: &mut watch::Receiver<bool>,
) -> Result<Option<Request>, ConnectionError> {
    let mut continue_sent = false;

    loop {
        if !buf.is_empty() {
            match parse_buffered(buf) {
                Ok(Buffered::Complete(request)) => return Ok(Some(request)),
                Ok(Buffered::AwaitingBody { expects_continue }) => {
                    if expects_continue && !continue_sent {
                        let interim = ResponseHead::new(StatusCode::CONTINUE).into_bytes();
                        writer::write(stream, &interim).await?;
                        continue_sent = true;
                    }
                }
                Err(RequestError::Incomplete) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if buf.len() > MAX_REQUEST_SIZE {
            return Err(RequestError::BodyTooLarge {
                max_bytes: MAX_REQUEST_SIZE,
            }
            .into());
        }

        let bytes_read = tokio::select! {
            read = stream.read_buf(buf) => read?,
            _ = stop.changed() => {
                debug!(phase = %Phase::ReceivingRequest, "server stopping — closing idle connection");
                return Ok(None);
            }
        };

        if bytes_read == 0 {
            if !buf.is_empty() {
                debug!(buffered = buf.len(), "peer closed mid-request");
            }
            return Ok(None);
        }
    }
}

fn parse_buffered(buf: &mut BytesMut) -> Result<Buffered, RequestError> {
    let (request, body_offset) = Request::parse(buf)?;

    let content_length = match request.content_length()? {
        Some(n) => n,
        None if RequestKind::of(request.method()).requires_content_length() => {
            return Err(RequestError::MissingContentLength);
        }
        None => 0,
    };

    if content_length > MAX_REQUEST_SIZE {
        return Err(RequestError::BodyTooLarge {
            max_bytes: MAX_REQUEST_SIZE,
        });
    }

    let total_needed = body_offset + content_length;
    if buf.len() < total_needed {
        debug!(
            phase = %Phase::ReadingBody,
            have = buf.len() - body_offset,
            want = content_length,
            "waiting for request body"
        );
        return Ok(Buffered::AwaitingBody {
            expects_continue: request.expects_continue(),
        });
    }

    let mut raw = buf.split_to(total_needed);
    let body = raw.split_off(body_offset).freeze();
    Ok(Buffered::Complete(request.with_body(body)))
}

// Malformed framing headers get no response at all; the connection is just
// dropped. Anything unparseable gets a 400, oversized requests a 413.
async fn reject(stream: &mut TcpStream, err: &RequestError) {
    let status = match err {
        RequestError::Parse(_) | RequestError::MissingField { .. } => StatusCode::BAD_REQUEST,
        RequestError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        RequestError::Incomplete
        | RequestError::MissingContentLength
        | RequestError::InvalidContentLength { .. } => return,
    };

    let body = format!("{status}: {err}");
    let head = ResponseHead::new(status)
        .header("Content-Type", "text/plain; charset=utf-8")
        .header("Content-Length", body.len().to_string())
        .header("Connection", "close");

    let mut out = BytesMut::new();
    out.put(head.into_bytes());
    out.put_slice(body.as_bytes());

    if let Err(e) = writer::write(stream, &out).await {
        debug!(error = %e, "could not deliver error response");
    }
}
