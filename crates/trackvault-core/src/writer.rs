//! Chunked object writer.
//!
//! An [`ObjectWriter`] turns a sequence of byte segments into fixed-size
//! chunks, stores them one at a time, and finally flips the object's catalog
//! record from pending to complete. At most one chunk buffer is held and at
//! most one chunk write is in flight, whatever the object size.
//!
//! ```text
//! Created -> Writing -> Finalizing -> Complete
//!    \          \           \
//!     +----------+-----------+-> Failed
//! ```
//!
//! On failure, or when dropped before completion, the writer removes the
//! chunks it stored and the pending record, so nothing of a broken upload
//! ever becomes visible.

use std::fmt;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use md5::{Digest, Md5};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::id::ObjectId;
use crate::storage::{ObjectMetadata, StorageBackend};

/// Lifecycle of an [`ObjectWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Pending record exists; no bytes accepted yet.
    Created,
    /// Accepting bytes.
    Writing,
    /// Flushing the last chunk and completing the record.
    Finalizing,
    /// The object is visible to readers.
    Complete,
    /// The upload failed and its data was discarded.
    Failed,
}

impl WriterState {
    /// Whether the writer can no longer change state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// Streams one object into a [`StorageBackend`].
pub struct ObjectWriter {
    id: ObjectId,
    backend: StorageBackend,
    chunk_size: usize,
    buffer: BytesMut,
    next_index: u32,
    length: u64,
    hasher: Md5,
    state: WriterState,
}

impl fmt::Debug for ObjectWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectWriter")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("chunk_size", &self.chunk_size)
            .field("next_index", &self.next_index)
            .field("length", &self.length)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl ObjectWriter {
    /// Allocate a fresh identifier and create its pending record.
    pub async fn start(
        backend: StorageBackend,
        name: &str,
        chunk_size: usize,
    ) -> StoreResult<Self> {
        if chunk_size == 0 {
            return Err(StoreError::Config("chunk size must be positive".into()));
        }
        let id = ObjectId::new();
        backend.catalog.create_pending(id, name, chunk_size).await?;
        debug!(%id, name, chunk_size, "upload started");

        Ok(Self {
            id,
            backend,
            chunk_size,
            buffer: BytesMut::new(),
            next_index: 0,
            length: 0,
            hasher: Md5::new(),
            state: WriterState::Created,
        })
    }

    /// The identifier the object will be stored under.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Bytes accepted so far.
    #[must_use]
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Bytes held in the chunk buffer, always below the chunk size.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append one segment of the object's bytes.
    ///
    /// Full chunks are stored before this returns. Segments larger than the
    /// chunk size are sliced without copying.
    ///
    /// # Errors
    ///
    /// [`StoreError::WriterClosed`] if the writer already failed or finished;
    /// otherwise the chunk store's error, after which the writer is
    /// [`WriterState::Failed`].
    pub async fn write(&mut self, mut data: Bytes) -> StoreResult<()> {
        self.ensure_open()?;
        self.state = WriterState::Writing;
        if data.is_empty() {
            return Ok(());
        }
        self.hasher.update(&data);
        self.length += data.len() as u64;

        while !data.is_empty() {
            if self.buffer.is_empty() && data.len() >= self.chunk_size {
                let chunk = data.split_to(self.chunk_size);
                self.store_chunk(chunk).await?;
                continue;
            }
            let take = (self.chunk_size - self.buffer.len()).min(data.len());
            self.buffer.extend_from_slice(&data.split_to(take));
            if self.buffer.len() == self.chunk_size {
                let chunk = self.buffer.split().freeze();
                self.store_chunk(chunk).await?;
            }
        }
        Ok(())
    }

    /// Flush the final partial chunk and make the object visible.
    ///
    /// # Errors
    ///
    /// Any storage failure; the upload is cleaned up before returning.
    pub async fn finish(mut self) -> StoreResult<ObjectMetadata> {
        self.ensure_open()?;
        self.state = WriterState::Finalizing;

        if !self.buffer.is_empty() {
            let chunk = self.buffer.split().freeze();
            self.store_chunk(chunk).await?;
        }

        let md5 = hex::encode(std::mem::take(&mut self.hasher).finalize());
        match self
            .backend
            .catalog
            .finalize(&self.id, self.length, self.next_index, md5)
            .await
        {
            Ok(meta) => {
                self.state = WriterState::Complete;
                info!(
                    id = %self.id,
                    length = self.length,
                    chunk_count = self.next_index,
                    "upload complete"
                );
                Ok(meta)
            }
            Err(e) => {
                self.fail(&e).await;
                Err(e)
            }
        }
    }

    /// Give up on the upload and discard everything written so far.
    pub async fn abort(mut self, reason: &str) {
        if self.state.is_terminal() {
            return;
        }
        let err = StoreError::UploadAborted {
            message: reason.to_owned(),
        };
        self.fail(&err).await;
    }

    /// Drain `input` into the writer and finish it.
    ///
    /// An item error stops consumption immediately and is reported as
    /// [`StoreError::UploadAborted`].
    pub async fn write_stream<S, E>(mut self, input: S) -> StoreResult<ObjectMetadata>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: fmt::Display,
    {
        let mut input = std::pin::pin!(input);
        while let Some(item) = input.next().await {
            match item {
                Ok(segment) => self.write(segment).await?,
                Err(e) => {
                    let err = StoreError::UploadAborted {
                        message: e.to_string(),
                    };
                    self.fail(&err).await;
                    return Err(err);
                }
            }
        }
        self.finish().await
    }

    fn ensure_open(&self) -> StoreResult<()> {
        match self.state {
            WriterState::Created | WriterState::Writing => Ok(()),
            _ => Err(StoreError::WriterClosed {
                id: self.id.to_hex(),
            }),
        }
    }

    async fn store_chunk(&mut self, chunk: Bytes) -> StoreResult<()> {
        let index = self.next_index;
        let Some(next) = index.checked_add(1) else {
            let err = StoreError::validation("object has too many chunks");
            self.fail(&err).await;
            return Err(err);
        };
        if let Err(e) = self
            .backend
            .chunks
            .put_chunk(&self.id, index, chunk)
            .await
        {
            self.fail(&e).await;
            return Err(e);
        }
        self.next_index = next;
        Ok(())
    }

    async fn fail(&mut self, cause: &StoreError) {
        self.state = WriterState::Failed;
        self.buffer = BytesMut::new();
        warn!(id = %self.id, error = %cause, "upload failed, discarding");
        cleanup(&self.backend, self.id).await;
    }
}

impl Drop for ObjectWriter {
    fn drop(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = WriterState::Failed;
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(%id, "writer dropped mid-upload, scheduling cleanup");
                let backend = self.backend.clone();
                handle.spawn(async move { cleanup(&backend, id).await });
            }
            Err(_) => warn!(%id, "writer dropped outside a runtime, upload left pending"),
        }
    }
}

/// Best-effort removal of an unfinished upload.
async fn cleanup(backend: &StorageBackend, id: ObjectId) {
    if backend.catalog.lookup(&id).await.is_ok() {
        return;
    }
    if let Err(e) = backend.catalog.discard_pending(&id).await {
        warn!(%id, error = %e, "failed to discard pending record");
    }
    if let Err(e) = backend.chunks.delete_all(&id).await {
        warn!(%id, error = %e, "failed to delete chunks");
    }
}
