//! In-process backend.
//!
//! Both halves are thread-safe and use [`DashMap`] so uploads and downloads
//! of different objects never contend on a global lock.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, trace};

use super::{ChunkStore, ObjectCatalog, ObjectMetadata, ObjectStatus};
use crate::error::{StoreError, StoreResult};
use crate::id::ObjectId;

// ---------------------------------------------------------------------------
// MemoryChunkStore
// ---------------------------------------------------------------------------

/// Chunk bytes held in memory, grouped by object.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use trackvault_core::ObjectId;
/// use trackvault_core::storage::{ChunkStore, MemoryChunkStore};
///
/// # tokio_test::block_on(async {
/// let store = MemoryChunkStore::new();
/// let id = ObjectId::new();
/// store.put_chunk(&id, 0, Bytes::from_static(b"abc")).await.unwrap();
/// assert_eq!(store.get_chunk(&id, 0).await.unwrap().as_ref(), b"abc");
/// # });
/// ```
#[derive(Default)]
pub struct MemoryChunkStore {
    objects: DashMap<ObjectId, HashMap<u32, Bytes>>,
}

impl std::fmt::Debug for MemoryChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChunkStore")
            .field("objects_count", &self.objects.len())
            .finish()
    }
}

impl MemoryChunkStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks stored for `id`.
    #[must_use]
    pub fn chunk_count(&self, id: &ObjectId) -> usize {
        self.objects.get(id).map_or(0, |chunks| chunks.len())
    }

    /// Remove a single chunk, returning whether it existed.
    pub fn remove_chunk(&self, id: &ObjectId, index: u32) -> bool {
        self.objects
            .get_mut(id)
            .is_some_and(|mut chunks| chunks.remove(&index).is_some())
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn put_chunk(&self, id: &ObjectId, index: u32, data: Bytes) -> StoreResult<()> {
        let mut chunks = self.objects.entry(*id).or_default();
        match chunks.get(&index) {
            Some(existing) if *existing == data => {
                trace!(%id, index, "identical chunk rewrite ignored");
                Ok(())
            }
            Some(_) => Err(StoreError::ChunkConflict {
                id: id.to_hex(),
                index,
            }),
            None => {
                trace!(%id, index, len = data.len(), "stored chunk");
                chunks.insert(index, data);
                Ok(())
            }
        }
    }

    async fn get_chunk(&self, id: &ObjectId, index: u32) -> StoreResult<Bytes> {
        self.objects
            .get(id)
            .and_then(|chunks| chunks.get(&index).cloned())
            .ok_or_else(|| StoreError::ChunkNotFound {
                id: id.to_hex(),
                index,
            })
    }

    async fn delete_all(&self, id: &ObjectId) -> StoreResult<()> {
        if let Some((_, chunks)) = self.objects.remove(id) {
            debug!(%id, count = chunks.len(), "deleted chunks");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryObjectCatalog
// ---------------------------------------------------------------------------

/// Object records held in memory.
#[derive(Default)]
pub struct MemoryObjectCatalog {
    records: DashMap<ObjectId, ObjectMetadata>,
}

impl std::fmt::Debug for MemoryObjectCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryObjectCatalog")
            .field("records_count", &self.records.len())
            .finish()
    }
}

impl MemoryObjectCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Status of the record for `id`, pending or not.
    #[must_use]
    pub fn status(&self, id: &ObjectId) -> Option<ObjectStatus> {
        self.records.get(id).map(|r| r.status)
    }
}

#[async_trait]
impl ObjectCatalog for MemoryObjectCatalog {
    async fn create_pending(
        &self,
        id: ObjectId,
        name: &str,
        chunk_size: usize,
    ) -> StoreResult<ObjectMetadata> {
        match self.records.entry(id) {
            Entry::Occupied(_) => Err(StoreError::storage(anyhow::anyhow!(
                "object record {id} already exists"
            ))),
            Entry::Vacant(slot) => {
                let meta = ObjectMetadata::pending(id, name, chunk_size);
                slot.insert(meta.clone());
                debug!(%id, name, chunk_size, "created pending record");
                Ok(meta)
            }
        }
    }

    async fn finalize(
        &self,
        id: &ObjectId,
        length: u64,
        chunk_count: u32,
        md5: String,
    ) -> StoreResult<ObjectMetadata> {
        let not_found = || StoreError::ObjectNotFound { id: id.to_hex() };
        let mut record = self.records.get_mut(id).ok_or_else(not_found)?;
        if record.is_complete() {
            return Err(not_found());
        }
        record.complete(length, chunk_count, md5);
        debug!(%id, length, chunk_count, "finalized record");
        Ok(record.clone())
    }

    async fn lookup(&self, id: &ObjectId) -> StoreResult<ObjectMetadata> {
        self.records
            .get(id)
            .filter(|r| r.is_complete())
            .map(|r| r.clone())
            .ok_or_else(|| StoreError::ObjectNotFound { id: id.to_hex() })
    }

    async fn discard_pending(&self, id: &ObjectId) -> StoreResult<()> {
        if self
            .records
            .remove_if(id, |_, r| r.status == ObjectStatus::Pending)
            .is_some()
        {
            debug!(%id, "discarded pending record");
        }
        Ok(())
    }
}
