//! Response framing: how a body is cut up and put on the wire.
//!
//! [`plan`] turns the configured body into a [`FramingPlan`]: the ordered
//! frames to send and whether they go out as one transmission or one per
//! frame. [`writer`] then performs the writes. Planning is pure so every
//! framing decision can be checked without a socket.
//!
//! | mode                   | frames                        | transmission |
//! |------------------------|-------------------------------|--------------|
//! | fixed length           | the body, unframed            | batched      |
//! | chunked                | data chunks, then terminator  | streamed     |
//! | chunked + single chunk | data chunks, then terminator  | batched      |

use bytes::{Bytes, BytesMut};

use crate::config::ServerConfig;

pub mod chunk;
pub mod writer;

pub use chunk::{ChunkFrame, encode_chunk};

/// A unit of response body output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Bytes written as-is, for `Content-Length` framed bodies.
    Raw(Bytes),
    /// A chunked transfer-coding frame.
    Chunk(ChunkFrame),
}

impl Frame {
    /// Returns `true` for chunks that carry body data.
    ///
    /// Only these are followed by the inter-chunk wait; the terminator is not.
    pub fn is_data_chunk(&self) -> bool {
        matches!(self, Self::Chunk(chunk) if !chunk.is_terminator())
    }

    /// The body bytes carried by this frame, without any chunk envelope.
    pub fn payload(&self) -> &Bytes {
        match self {
            Self::Raw(bytes) => bytes,
            Self::Chunk(chunk) => chunk.payload(),
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Raw(bytes) => bytes.len(),
            Self::Chunk(chunk) => chunk.encoded_len(),
        }
    }

    /// Appends the wire form of this frame to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Self::Raw(bytes) => buf.extend_from_slice(bytes),
            Self::Chunk(chunk) => chunk.encode_into(buf),
        }
    }

    /// Returns the wire form of this frame.
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Raw(bytes) => bytes.clone(),
            Self::Chunk(chunk) => chunk.encode(),
        }
    }
}

/// Whether a plan's frames share one write call or get one each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transmission {
    /// All frames concatenated into a single buffer and written once.
    Batched,
    /// Each frame written and flushed on its own.
    Streamed,
}

/// The ordered frames of one response body and how to transmit them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramingPlan {
    frames: Vec<Frame>,
    transmission: Transmission,
}

impl FramingPlan {
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn transmission(&self) -> Transmission {
        self.transmission
    }

    /// Returns `true` if the body is sent with chunked transfer coding.
    pub fn is_chunked(&self) -> bool {
        self.frames.iter().any(|f| matches!(f, Frame::Chunk(_)))
    }

    /// Total number of bytes the plan puts on the wire.
    pub fn encoded_len(&self) -> usize {
        self.frames.iter().map(Frame::encoded_len).sum()
    }

    /// Concatenates the wire form of every frame, in order.
    pub fn concat(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        for frame in &self.frames {
            frame.encode_into(&mut buf);
        }
        buf.freeze()
    }
}

/// Plans how `body` is framed under `config`.
///
/// - Fixed length: a single raw frame holding `body`, to be announced with
///   `Content-Length: body.len()`.
/// - Chunked: `chunk_size` slices of `body` (the last one possibly shorter,
///   never empty) followed by the terminator. Batched when
///   `config.single_chunk` is set, streamed otherwise.
///
/// Slices share `body`'s allocation; no payload bytes are copied.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use chunkserv::config::ServerConfig;
/// use chunkserv::framing::{plan, Transmission};
/// use std::num::NonZeroUsize;
///
/// let config = ServerConfig {
///     chunked: true,
///     chunk_size: NonZeroUsize::new(5).unwrap(),
///     ..ServerConfig::default()
/// };
/// let plan = plan(&Bytes::from_static(b"hello world"), &config);
///
/// assert_eq!(plan.transmission(), Transmission::Streamed);
/// assert_eq!(&plan.concat()[..], b"5\r\nhello\r\n5\r\n worl\r\n1\r\nd\r\n0\r\n\r\n");
/// ```
pub fn plan(body: &Bytes, config: &ServerConfig) -> FramingPlan {
    if !config.chunked {
        return FramingPlan {
            frames: vec![Frame::Raw(body.clone())],
            transmission: Transmission::Batched,
        };
    }

    let size = config.chunk_size.get();
    let mut frames = Vec::with_capacity(body.len().div_ceil(size) + 1);

    let mut index = 0;
    while index < body.len() {
        let end = usize::min(index + size, body.len());
        frames.push(Frame::Chunk(ChunkFrame::new(body.slice(index..end))));
        index = end;
    }
    frames.push(Frame::Chunk(ChunkFrame::terminator()));

    let transmission = if config.single_chunk {
        Transmission::Batched
    } else {
        Transmission::Streamed
    };

    FramingPlan {
        frames,
        transmission,
    }
}
