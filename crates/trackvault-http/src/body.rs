//! Response body types supporting buffered, streaming, and empty modes.
//!
//! [`TrackResponseBody`] is the HTTP response body used by the service:
//!
//! - **Buffered**: JSON messages and other small payloads.
//! - **Streaming**: track downloads, pulled chunk by chunk from storage.
//! - **Empty**: 404s, preflight responses.
//!
//! A streaming body that hits an error yields it as a body error, which makes
//! hyper abort the connection instead of terminating the chunked transfer
//! cleanly. Clients therefore see a broken download, never a short one.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use http_body::Frame;
use http_body_util::Full;

/// A boxed stream of body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Response body supporting buffered, streaming, and empty modes.
#[derive(Default)]
pub enum TrackResponseBody {
    /// Small in-memory payload.
    Buffered(Full<Bytes>),
    /// Chunked payload of unknown length.
    Streaming(ByteStream),
    /// No content.
    #[default]
    Empty,
}

impl std::fmt::Debug for TrackResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffered(full) => f.debug_tuple("Buffered").field(full).finish(),
            Self::Streaming(_) => f.write_str("Streaming"),
            Self::Empty => f.write_str("Empty"),
        }
    }
}

impl TrackResponseBody {
    /// Create a buffered body from bytes.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Buffered(Full::new(data.into()))
    }

    /// Create a buffered body from a UTF-8 string.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self::Buffered(Full::new(Bytes::from(s.into())))
    }

    /// Create a buffered JSON body.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        Self::from_string(value.to_string())
    }

    /// Create a streaming body.
    #[must_use]
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
    {
        Self::Streaming(Box::pin(stream))
    }

    /// Create an empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }
}

impl http_body::Body for TrackResponseBody {
    type Data = Bytes;
    type Error = std::io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Buffered(full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Self::Streaming(stream) => stream
                .poll_next_unpin(cx)
                .map(|item| item.map(|chunk| chunk.map(Frame::data))),
            Self::Empty => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Buffered(full) => full.is_end_stream(),
            Self::Streaming(_) => false,
            Self::Empty => true,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            Self::Buffered(full) => full.size_hint(),
            Self::Streaming(_) => http_body::SizeHint::default(),
            Self::Empty => http_body::SizeHint::with_exact(0),
        }
    }
}
