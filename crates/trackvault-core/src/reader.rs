//! Lazy, ordered object reads.
//!
//! [`ObjectReader::open`] resolves a complete record and returns a
//! [`ChunkStream`]. The stream fetches chunk `i` only when polled, one fetch
//! at a time, and checks each chunk's length against the record. A missing
//! or wrong-sized chunk ends the stream with
//! [`StoreError::StreamCorruption`]; nothing is yielded after an error.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use tracing::{trace, warn};

use crate::error::{StoreError, StoreResult};
use crate::id::ObjectId;
use crate::storage::{ChunkStore, ObjectMetadata, StorageBackend};

/// Opens stored objects for streaming.
#[derive(Debug, Clone)]
pub struct ObjectReader {
    backend: StorageBackend,
}

impl ObjectReader {
    /// Create a reader over `backend`.
    #[must_use]
    pub fn new(backend: StorageBackend) -> Self {
        Self { backend }
    }

    /// Resolve `id` and return a lazy stream over its chunks.
    ///
    /// # Errors
    ///
    /// [`StoreError::ObjectNotFound`] if no complete object exists, or the
    /// catalog's error.
    pub async fn open(&self, id: &ObjectId) -> StoreResult<ChunkStream> {
        let meta = self.backend.catalog.lookup(id).await?;
        trace!(%id, length = meta.length, chunk_count = meta.chunk_count, "opened object");
        Ok(ChunkStream::new(self.backend.chunks.clone(), meta))
    }
}

struct Cursor {
    chunks: Arc<dyn ChunkStore>,
    meta: Arc<ObjectMetadata>,
    index: u32,
}

async fn next_chunk(cursor: Cursor) -> StoreResult<Option<(Bytes, Cursor)>> {
    let Some(expected) = cursor.meta.expected_chunk_len(cursor.index) else {
        return Ok(None);
    };
    let id = &cursor.meta.id;
    let index = cursor.index;

    let chunk = match cursor.chunks.get_chunk(id, index).await {
        Ok(chunk) => chunk,
        Err(StoreError::ChunkNotFound { .. }) => {
            warn!(%id, index, "chunk missing from complete object");
            return Err(StoreError::StreamCorruption {
                id: id.to_hex(),
                index,
                reason: "chunk missing".to_owned(),
            });
        }
        Err(e) => return Err(e),
    };

    if chunk.len() != expected {
        warn!(%id, index, expected, actual = chunk.len(), "chunk has wrong length");
        return Err(StoreError::StreamCorruption {
            id: id.to_hex(),
            index,
            reason: format!("expected {expected} bytes, found {}", chunk.len()),
        });
    }

    trace!(%id, index, len = chunk.len(), "fetched chunk");
    Ok(Some((
        chunk,
        Cursor {
            index: index + 1,
            ..cursor
        },
    )))
}

/// Ordered, finite, non-restartable stream of one object's chunks.
pub struct ChunkStream {
    meta: Arc<ObjectMetadata>,
    inner: BoxStream<'static, StoreResult<Bytes>>,
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream")
            .field("id", &self.meta.id)
            .field("length", &self.meta.length)
            .field("chunk_count", &self.meta.chunk_count)
            .finish_non_exhaustive()
    }
}

impl ChunkStream {
    fn new(chunks: Arc<dyn ChunkStore>, meta: ObjectMetadata) -> Self {
        let meta = Arc::new(meta);
        let cursor = Cursor {
            chunks,
            meta: meta.clone(),
            index: 0,
        };
        Self {
            meta,
            inner: stream::try_unfold(cursor, next_chunk).boxed(),
        }
    }

    /// The record this stream was opened from.
    #[must_use]
    pub fn metadata(&self) -> &ObjectMetadata {
        &self.meta
    }
}

impl Stream for ChunkStream {
    type Item = StoreResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
