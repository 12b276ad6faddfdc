//! Chunked transfer-coding frames (RFC 9112 §7.1).

use bytes::{BufMut, Bytes, BytesMut};

/// One unit of a chunked body: `<HEX-LEN>\r\n<payload>\r\n`.
///
/// A frame with an empty payload is the terminator, `0\r\n\r\n`. No trailer
/// fields are ever attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFrame {
    length_hex: String,
    payload: Bytes,
}

impl ChunkFrame {
    /// Wraps `payload` in a chunk frame.
    pub fn new(payload: Bytes) -> Self {
        Self {
            length_hex: format!("{:X}", payload.len()),
            payload,
        }
    }

    /// The zero-length chunk that ends a chunked body.
    pub fn terminator() -> Self {
        Self::new(Bytes::new())
    }

    /// Uppercase hexadecimal payload length, without prefix or padding.
    pub fn length_hex(&self) -> &str {
        &self.length_hex
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn is_terminator(&self) -> bool {
        self.payload.is_empty()
    }

    /// Number of bytes this frame occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        self.length_hex.len() + self.payload.len() + 4
    }

    /// Appends the wire form of this frame to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_slice(self.length_hex.as_bytes());
        buf.put_slice(b"\r\n");
        buf.put_slice(&self.payload);
        buf.put_slice(b"\r\n");
    }

    /// Returns the wire form of this frame.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }
}

/// Encodes `payload` as a single chunk.
///
/// The length field depends only on `payload.len()`, so arbitrary binary
/// data is framed correctly. An empty payload yields the terminator.
///
/// # Examples
///
/// ```
/// use chunkserv::framing::encode_chunk;
///
/// assert_eq!(&encode_chunk(b"hello")[..], b"5\r\nhello\r\n");
/// assert_eq!(&encode_chunk(b"")[..], b"0\r\n\r\n");
/// ```
pub fn encode_chunk(payload: &[u8]) -> Bytes {
    ChunkFrame::new(Bytes::copy_from_slice(payload)).encode()
}
