//! Storage abstractions and backends.
//!
//! Objects are persisted through two traits:
//!
//! - [`ChunkStore`] holds the raw chunk bytes, keyed by `(id, index)`.
//! - [`ObjectCatalog`] holds one [`ObjectMetadata`] record per object and
//!   controls visibility: records start [`ObjectStatus::Pending`] and become
//!   [`ObjectStatus::Complete`] exactly once, after every chunk is durable.
//!
//! A [`StorageBackend`] bundles one implementation of each and is built once
//! at startup from a connection string (see [`StorageBackend::connect`]).

mod filesystem;
mod memory;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

pub use self::filesystem::{FsChunkStore, FsObjectCatalog};
pub use self::memory::{MemoryChunkStore, MemoryObjectCatalog};
use crate::error::{StoreError, StoreResult};
use crate::id::ObjectId;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Visibility state of an object record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStatus {
    /// Chunks are still being written; invisible to readers.
    Pending,
    /// Every chunk is durable; visible to readers.
    Complete,
}

/// Catalog record describing one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    /// Object identifier.
    pub id: ObjectId,
    /// Caller-supplied display name.
    pub name: String,
    /// Total length in bytes (zero while pending).
    pub length: u64,
    /// Size of every chunk except possibly the last.
    pub chunk_size: usize,
    /// Number of chunks (zero while pending and for empty objects).
    pub chunk_count: u32,
    /// Lowercase hex MD5 of the full content, set on completion.
    pub md5: Option<String>,
    /// Visibility state.
    pub status: ObjectStatus,
    /// When the upload started.
    pub upload_date: DateTime<Utc>,
}

impl ObjectMetadata {
    /// A fresh pending record.
    #[must_use]
    pub fn pending(id: ObjectId, name: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            id,
            name: name.into(),
            length: 0,
            chunk_size,
            chunk_count: 0,
            md5: None,
            status: ObjectStatus::Pending,
            upload_date: Utc::now(),
        }
    }

    /// Whether readers may see this record.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == ObjectStatus::Complete
    }

    /// Flip a pending record to complete.
    pub(crate) fn complete(&mut self, length: u64, chunk_count: u32, md5: String) {
        self.length = length;
        self.chunk_count = chunk_count;
        self.md5 = Some(md5);
        self.status = ObjectStatus::Complete;
    }

    /// The exact byte length chunk `index` must have, or `None` past the end.
    #[must_use]
    pub fn expected_chunk_len(&self, index: u32) -> Option<usize> {
        if index >= self.chunk_count {
            return None;
        }
        if index + 1 < self.chunk_count {
            return Some(self.chunk_size);
        }
        let full = u64::from(self.chunk_count - 1) * self.chunk_size as u64;
        usize::try_from(self.length.saturating_sub(full)).ok()
    }
}

/// Number of chunks an object of `length` bytes occupies.
#[must_use]
pub fn chunk_count_for(length: u64, chunk_size: usize) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    length.div_ceil(chunk_size as u64)
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Durable storage for object chunks.
///
/// Chunks are write-once: rewriting a chunk with identical bytes succeeds,
/// rewriting it with different bytes fails with
/// [`StoreError::ChunkConflict`].
#[async_trait]
pub trait ChunkStore: Send + Sync + fmt::Debug {
    /// Persist chunk `index` of object `id`.
    async fn put_chunk(&self, id: &ObjectId, index: u32, data: Bytes) -> StoreResult<()>;

    /// Fetch chunk `index` of object `id`.
    ///
    /// Returns [`StoreError::ChunkNotFound`] if the chunk does not exist.
    async fn get_chunk(&self, id: &ObjectId, index: u32) -> StoreResult<Bytes>;

    /// Remove every chunk of object `id`. Unknown ids are a no-op.
    async fn delete_all(&self, id: &ObjectId) -> StoreResult<()>;
}

/// Metadata records and the pending to complete visibility switch.
#[async_trait]
pub trait ObjectCatalog: Send + Sync + fmt::Debug {
    /// Insert a pending record for a new upload.
    async fn create_pending(
        &self,
        id: ObjectId,
        name: &str,
        chunk_size: usize,
    ) -> StoreResult<ObjectMetadata>;

    /// Atomically flip a pending record to complete.
    ///
    /// Unknown or already complete ids yield [`StoreError::ObjectNotFound`].
    async fn finalize(
        &self,
        id: &ObjectId,
        length: u64,
        chunk_count: u32,
        md5: String,
    ) -> StoreResult<ObjectMetadata>;

    /// Fetch a complete record. Pending records are reported as not found.
    async fn lookup(&self, id: &ObjectId) -> StoreResult<ObjectMetadata>;

    /// Remove a pending record. Complete records are left untouched.
    async fn discard_pending(&self, id: &ObjectId) -> StoreResult<()>;
}

// ---------------------------------------------------------------------------
// StorageBackend
// ---------------------------------------------------------------------------

/// A connected pair of chunk store and catalog.
#[derive(Debug, Clone)]
pub struct StorageBackend {
    /// Chunk bytes.
    pub chunks: Arc<dyn ChunkStore>,
    /// Object records.
    pub catalog: Arc<dyn ObjectCatalog>,
}

impl StorageBackend {
    /// Bundle an arbitrary chunk store and catalog.
    #[must_use]
    pub fn new(chunks: Arc<dyn ChunkStore>, catalog: Arc<dyn ObjectCatalog>) -> Self {
        Self { chunks, catalog }
    }

    /// A fresh in-process backend.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryChunkStore::new()),
            Arc::new(MemoryObjectCatalog::new()),
        )
    }

    /// An on-disk backend rooted at `root`.
    ///
    /// Creates `<root>/<database>/<bucket>.files` and
    /// `<root>/<database>/<bucket>.chunks` and checks they are writable.
    pub async fn filesystem(root: &Path, database: &str, bucket: &str) -> StoreResult<Self> {
        let base = root.join(database);
        let chunks = FsChunkStore::open(base.join(format!("{bucket}.chunks"))).await?;
        let catalog = FsObjectCatalog::open(base.join(format!("{bucket}.files"))).await?;
        Ok(Self::new(Arc::new(chunks), Arc::new(catalog)))
    }

    /// Connect to the backend named by `url`.
    ///
    /// | Connection string | Backend |
    /// |---|---|
    /// | `memory://` | in-process maps |
    /// | `file:///abs/path`, `file://rel/path` | on-disk store |
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] for an unknown scheme or a root
    /// that cannot be created or written.
    pub async fn connect(url: &str, database: &str, bucket: &str) -> StoreResult<Self> {
        let connection_error = |reason: String| StoreError::Connection {
            url: url.to_owned(),
            reason,
        };

        if let Some(rest) = url.strip_prefix("memory://") {
            if !rest.is_empty() {
                return Err(connection_error(
                    "memory:// takes no path".to_owned(),
                ));
            }
            info!(database, bucket, "using in-memory storage");
            return Ok(Self::in_memory());
        }

        if let Some(path) = url.strip_prefix("file://") {
            if path.is_empty() {
                return Err(connection_error("missing path".to_owned()));
            }
            let backend = Self::filesystem(Path::new(path), database, bucket)
                .await
                .map_err(|e| connection_error(format!("{e}")))?;
            info!(root = path, database, bucket, "using filesystem storage");
            return Ok(backend);
        }

        let scheme = url.split_once("://").map_or(url, |(s, _)| s);
        Err(connection_error(format!(
            "unsupported storage scheme {scheme:?}"
        )))
    }
}
