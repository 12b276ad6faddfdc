//! HTTP/1.1 response head builder.
//!
//! The server writes response bodies itself (fixed-length or chunked, in one
//! or many transmissions), so this type only covers the part in front of the
//! body: the status line and the header block. Nothing is added implicitly;
//! every header on the wire is one the caller asked for.

use bytes::{BufMut, Bytes, BytesMut};

use super::{Headers, StatusCode};

/// The status line and header block of a response.
///
/// # Examples
///
/// ```
/// use chunkserv::http::{ResponseHead, StatusCode};
///
/// let head = ResponseHead::new(StatusCode::OK)
///     .header("Content-Type", "application/json")
///     .header("Content-Length", "2");
///
/// let bytes = head.into_bytes();
/// assert_eq!(
///     &bytes[..],
///     b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\n\r\n"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct ResponseHead {
    /// `None` emits the header block without a status line.
    status: Option<StatusCode>,
    headers: Headers,
}

impl ResponseHead {
    /// Creates a response head with the given status and no headers.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status: Some(status),
            headers: Headers::new(),
        }
    }

    /// Creates a head that consists of header fields only, with no status line.
    pub fn headers_only() -> Self {
        Self {
            status: None,
            headers: Headers::new(),
        }
    }

    /// Appends a header field.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serializes the head, including the blank line that ends it.
    ///
    /// Codes without a registered reason phrase keep the separating space,
    /// giving `HTTP/1.1 299 \r\n`.
    pub fn into_bytes(self) -> Bytes {
        let mut buf = BytesMut::with_capacity(32 + self.headers.len() * 32);

        if let Some(status) = self.status {
            buf.put_slice(
                format!(
                    "HTTP/1.1 {} {}\r\n",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("")
                )
                .as_bytes(),
            );
        }

        self.headers.write_to(&mut buf);
        buf.put_slice(b"\r\n");

        buf.freeze()
    }
}
