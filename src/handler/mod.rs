//! Request handler. Turns one complete request into one response.
//!
//! A request moves through
//! `ReceivingRequest → ReadingBody → WritingHeaders → WritingBody → Done`.
//! The connection loop in [`crate::server`] owns the first two phases, since
//! they depend on buffered socket reads; [`respond`] owns the rest. An I/O
//! error in any phase ends the response on the spot.
//!
//! The request body never influences the response. It is read so the
//! connection stays in sync and so it can be logged.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, trace};

use crate::config::ServerConfig;
use crate::framing::{self, writer, writer::WriteError};
use crate::http::{Method, Request, ResponseHead, StatusCode};

/// Value of the `Allow` header on every full response.
pub const ALLOW: &str = "POST, OPTIONS";

/// Value of the `Content-Type` header on every response.
pub const CONTENT_TYPE: &str = "application/json";

/// How a request is handled, decided once from its method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// GET, POST and PUT: read the body, send the configured response.
    Post,
    /// HEAD: header fields only, no status line and no body.
    Head,
    /// Everything else: `501 Not Implemented`.
    Unsupported,
}

impl RequestKind {
    pub fn of(method: &Method) -> Self {
        match method {
            Method::Get | Method::Post | Method::Put => Self::Post,
            Method::Head => Self::Head,
            _ => Self::Unsupported,
        }
    }

    /// Whether a `Content-Length` header is mandatory for this kind.
    pub fn requires_content_length(self) -> bool {
        matches!(self, Self::Post)
    }
}

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ReceivingRequest,
    ReadingBody,
    WritingHeaders,
    WritingBody,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReceivingRequest => "receiving request",
            Self::ReadingBody => "reading body",
            Self::WritingHeaders => "writing headers",
            Self::WritingBody => "writing body",
            Self::Done => "done",
        })
    }
}

/// What the connection should do once the response has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The connection may carry another request.
    KeepAlive,
    /// The response promised `Connection: close`.
    Close,
}

/// A response could not be written to completion.
#[derive(Debug, Error)]
#[error("{phase} failed: {source}")]
pub struct HandlerError {
    phase: Phase,
    #[source]
    source: WriteError,
}

impl HandlerError {
    /// The phase the write failure happened in.
    pub fn phase(&self) -> Phase {
        self.phase
    }
}

/// Builds the status line and headers for a full response under `config`.
///
/// `Content-Length` is the length of the configured body, never of the
/// request body.
pub fn response_head(config: &ServerConfig) -> ResponseHead {
    let head = ResponseHead::new(config.response_code)
        .header("Allow", ALLOW)
        .header("Content-Type", CONTENT_TYPE);

    if config.chunked {
        head.header("Transfer-Encoding", "chunked")
    } else {
        head.header("Content-Length", config.body.len().to_string())
    }
}

/// Writes the response to `request` onto `conn`.
///
/// # Errors
///
/// Returns [`HandlerError`] on the first failed write. Nothing further is
/// written and the caller should drop the connection.
pub async fn respond<W>(
    conn: &mut W,
    request: &Request,
    config: &ServerConfig,
) -> Result<Outcome, HandlerError>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let kind = RequestKind::of(request.method());
    info!(method = %request.method(), "{} received", request.method());

    match kind {
        RequestKind::Post => {
            log_request(request);
            respond_full(conn, config).await?;
            Ok(Outcome::KeepAlive)
        }
        RequestKind::Head => {
            let head = ResponseHead::headers_only().header("Content-Type", CONTENT_TYPE);
            send_head(conn, head).await?;
            trace!(phase = %Phase::Done, "head response complete");
            Ok(Outcome::KeepAlive)
        }
        RequestKind::Unsupported => {
            respond_unsupported(conn, request.method()).await?;
            Ok(Outcome::Close)
        }
    }
}

fn log_request(request: &Request) {
    info!(
        method = %request.method(),
        path = request.path(),
        "{} request,\nPath: {}\nHeaders:\n{}\nBody:\n{}",
        request.method(),
        request.path(),
        request.headers().to_string().trim_end(),
        String::from_utf8_lossy(request.body()),
    );
}

async fn respond_full<W>(conn: &mut W, config: &ServerConfig) -> Result<(), HandlerError>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    send_head(conn, response_head(config)).await?;
    debug!(status = config.response_code.as_u16(), "sent response");

    let plan = framing::plan(&config.body, config);
    if plan.is_chunked() {
        debug!(frames = plan.frames().len(), transmission = ?plan.transmission(), "sending chunked");
    }

    trace!(phase = %Phase::WritingBody);
    writer::write_frames(conn, &plan, config.wait)
        .await
        .map_err(|source| HandlerError {
            phase: Phase::WritingBody,
            source,
        })?;

    trace!(phase = %Phase::Done, "response complete");
    Ok(())
}

async fn respond_unsupported<W>(conn: &mut W, method: &Method) -> Result<(), HandlerError>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let body = format!("Unsupported method ('{method}')");
    let head = ResponseHead::new(StatusCode::NOT_IMPLEMENTED)
        .header("Content-Type", "text/plain; charset=utf-8")
        .header("Content-Length", body.len().to_string())
        .header("Connection", "close");

    send_head(conn, head).await?;
    writer::write(conn, body.as_bytes())
        .await
        .map_err(|source| HandlerError {
            phase: Phase::WritingBody,
            source,
        })
}

async fn send_head<W>(conn: &mut W, head: ResponseHead) -> Result<(), HandlerError>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    trace!(phase = %Phase::WritingHeaders);
    writer::write(conn, &head.into_bytes())
        .await
        .map_err(|source| HandlerError {
            phase: Phase::WritingHeaders,
            source,
        })
}
