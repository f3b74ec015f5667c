//! Instrumented chunk store for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use super::{ChunkStore, MemoryChunkStore, MemoryObjectCatalog, StorageBackend};
use crate::error::{StoreError, StoreResult};
use crate::id::ObjectId;

/// Wraps a [`MemoryChunkStore`], counting calls and injecting failures.
#[derive(Debug, Default)]
pub(crate) struct InstrumentedChunkStore {
    pub(crate) inner: MemoryChunkStore,
    /// Fail `put_chunk` for this index (`u32::MAX` disables).
    pub(crate) fail_put_at: AtomicU32,
    /// Fail every `get_chunk` with a storage error.
    pub(crate) fail_gets: AtomicBool,
    pub(crate) puts: AtomicUsize,
    pub(crate) gets: AtomicUsize,
    pub(crate) deletes: AtomicUsize,
    in_flight: AtomicUsize,
    pub(crate) max_in_flight: AtomicUsize,
    pub(crate) max_chunk_len: AtomicUsize,
}

impl InstrumentedChunkStore {
    pub(crate) fn new() -> Arc<Self> {
        let store = Self::default();
        store.fail_put_at.store(u32::MAX, Ordering::SeqCst);
        Arc::new(store)
    }

    pub(crate) fn failing_at(index: u32) -> Arc<Self> {
        let store = Self::new();
        store.fail_put_at.store(index, Ordering::SeqCst);
        store
    }

    pub(crate) fn backend(self: &Arc<Self>) -> (StorageBackend, Arc<MemoryObjectCatalog>) {
        let catalog = Arc::new(MemoryObjectCatalog::new());
        let backend = StorageBackend::new(self.clone(), catalog.clone());
        (backend, catalog)
    }
}

#[async_trait]
impl ChunkStore for InstrumentedChunkStore {
    async fn put_chunk(&self, id: &ObjectId, index: u32, data: Bytes) -> StoreResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.max_chunk_len.fetch_max(data.len(), Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;

        let result = if index == self.fail_put_at.load(Ordering::SeqCst) {
            Err(StoreError::storage(anyhow::anyhow!("injected write failure")))
        } else {
            self.inner.put_chunk(id, index, data).await
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn get_chunk(&self, id: &ObjectId, index: u32) -> StoreResult<Bytes> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(StoreError::storage(anyhow::anyhow!("injected read failure")));
        }
        self.inner.get_chunk(id, index).await
    }

    async fn delete_all(&self, id: &ObjectId) -> StoreResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_all(id).await
    }
}
