//! # chunkserv
//!
//! A configurable HTTP/1.1 test server for exercising client behavior against
//! specific response framings: fixed-length bodies, chunked transfer coding
//! with any chunk size, the whole chunked body in one transmission or one
//! transmission per chunk, a delay between chunks, and arbitrary status codes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::num::NonZeroUsize;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use bytes::Bytes;
//! use chunkserv::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(ServerConfig {
//!         chunked: true,
//!         chunk_size: NonZeroUsize::new(4).unwrap(),
//!         wait: Duration::from_millis(200),
//!         body: Bytes::from_static(br#"{"status":"ok"}"#),
//!         ..ServerConfig::default()
//!     });
//!     let server = Server::bind("127.0.0.1:8000".parse()?).await?;
//!     server.run(config).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod framing;
pub mod handler;
pub mod http;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use config::{Args, ConfigError, ServerConfig};
pub use framing::{ChunkFrame, Frame, FramingPlan, Transmission, encode_chunk, plan};
pub use http::{Headers, Method, Request, ResponseHead, StatusCode};
pub use server::{Server, ServerError};
