//! Server configuration: the command-line surface and the immutable settings
//! every connection reads.
//!
//! [`Args`] is what the user types; [`ServerConfig`] is what the server runs
//! with. Conversion validates everything up front, so a server that starts
//! never meets a bad chunk size or status code at request time.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::http::StatusCode;

/// Body served when no content file is available.
pub const DEFAULT_BODY: &str = "dummy content";

/// Content file looked up when `--content-file` is not given.
pub const DEFAULT_CONTENT_FILE: &str = "content.txt";

pub const DEFAULT_PORT: u16 = 8000;

pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Errors that stop the server from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("chunk size must be at least 1, got {0}")]
    InvalidChunkSize(i64),

    #[error("response code must be between 100 and 999, got {0}")]
    InvalidResponseCode(u16),

    #[error("failed to read content file {path}: {source}")]
    ContentFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Simple HTTP server for testing Transfer-Encoding: chunked.
#[derive(Debug, Clone, Parser)]
#[command(name = "chunkserv", version, about, long_about = None)]
pub struct Args {
    /// Use Transfer-Encoding: chunked for responses
    #[arg(short = 'c', long)]
    pub chunked: bool,

    /// Chunk size in bytes for chunked transfers
    #[arg(
        short = 's',
        long,
        default_value_t = DEFAULT_CHUNK_SIZE as i64,
        allow_negative_numbers = true
    )]
    pub chunk_size: i64,

    /// Send the chunked response in a single transmission
    #[arg(long)]
    pub single_chunk: bool,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to listen on
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Status code sent with every response
    #[arg(short, long, default_value_t = 200)]
    pub response_code: u16,

    /// Wait time in milliseconds after each chunk
    #[arg(short, long, visible_alias = "waitms", default_value_t = 0)]
    pub wait_ms: u64,

    /// File holding the response body [default: content.txt]
    #[arg(short = 'f', long)]
    pub content_file: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    pub print_config: bool,
}

/// Settings shared read-only by every connection for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Send bodies with `Transfer-Encoding: chunked` instead of `Content-Length`.
    pub chunked: bool,
    pub chunk_size: NonZeroUsize,
    /// Concatenate all chunks into one transmission.
    pub single_chunk: bool,
    pub bind_address: IpAddr,
    pub port: u16,
    pub response_code: StatusCode,
    /// Pause after each data chunk in streamed mode.
    pub wait: Duration,
    pub body: Bytes,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            chunked: false,
            chunk_size: NonZeroUsize::new(DEFAULT_CHUNK_SIZE).unwrap_or(NonZeroUsize::MIN),
            single_chunk: false,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            response_code: StatusCode::OK,
            wait: Duration::ZERO,
            body: Bytes::from_static(DEFAULT_BODY.as_bytes()),
        }
    }
}

impl ServerConfig {
    /// Validates `args` and loads the response body.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidChunkSize`] for a chunk size below 1.
    /// - [`ConfigError::InvalidResponseCode`] for a code outside `100..=999`.
    /// - [`ConfigError::ContentFile`] if `--content-file` was given and
    ///   cannot be read.
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        Self::from_args_with_fallback(args, Path::new(DEFAULT_CONTENT_FILE))
    }

    /// Like [`from_args`](Self::from_args), with `fallback` tried in place of
    /// `content.txt` when no content file is given.
    pub fn from_args_with_fallback(args: &Args, fallback: &Path) -> Result<Self, ConfigError> {
        let chunk_size = usize::try_from(args.chunk_size)
            .ok()
            .and_then(NonZeroUsize::new)
            .ok_or(ConfigError::InvalidChunkSize(args.chunk_size))?;

        let response_code = StatusCode::from_u16(args.response_code)
            .ok_or(ConfigError::InvalidResponseCode(args.response_code))?;

        let body = load_body(args.content_file.as_deref(), fallback)?;

        Ok(Self {
            chunked: args.chunked,
            chunk_size,
            single_chunk: args.single_chunk,
            bind_address: args.bind,
            port: args.port,
            response_code,
            wait: Duration::from_millis(args.wait_ms),
            body,
        })
    }

    /// The address the listener binds to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// A serializable view of the settings, with the body reduced to its length.
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            chunked: self.chunked,
            chunk_size: self.chunk_size.get(),
            single_chunk: self.single_chunk,
            bind_address: self.bind_address,
            port: self.port,
            response_code: self.response_code.into(),
            wait_ms: u64::try_from(self.wait.as_millis()).unwrap_or(u64::MAX),
            body_len: self.body.len(),
        }
    }
}

/// Flat, serializable form of [`ServerConfig`] for `--print-config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSummary {
    pub chunked: bool,
    pub chunk_size: usize,
    pub single_chunk: bool,
    pub bind_address: IpAddr,
    pub port: u16,
    pub response_code: u16,
    pub wait_ms: u64,
    pub body_len: usize,
}

// An explicitly named file must be readable. The implicit fallback may be
// missing, in which case the placeholder body is served.
fn load_body(explicit: Option<&Path>, fallback: &Path) -> Result<Bytes, ConfigError> {
    if let Some(path) = explicit {
        let content = std::fs::read(path).map_err(|source| ConfigError::ContentFile {
            path: path.to_owned(),
            source,
        })?;
        info!(path = %path.display(), len = content.len(), "reading content from file");
        return Ok(Bytes::from(content));
    }

    match std::fs::read(fallback) {
        Ok(content) => {
            info!(path = %fallback.display(), len = content.len(), "reading content from file");
            Ok(Bytes::from(content))
        }
        Err(e) => {
            warn!(
                path = %fallback.display(),
                error = %e,
                "content file not available, reply content will be '{DEFAULT_BODY}'"
            );
            Ok(Bytes::from_static(DEFAULT_BODY.as_bytes()))
        }
    }
}
