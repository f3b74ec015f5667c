//! On-disk backend.
//!
//! Layout under the database directory:
//!
//! ```text
//! <bucket>.files/<id>.json        metadata record
//! <bucket>.chunks/<id>/<index>    chunk bytes
//! ```
//!
//! Every record and chunk is written to a temporary sibling, synced, and
//! renamed into place, so readers never observe a partially written file.
//! Record updates are serialized per object; different objects never wait
//! on each other.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace};

use super::{ChunkStore, ObjectCatalog, ObjectMetadata, ObjectStatus};
use crate::error::{StoreError, StoreResult};
use crate::id::ObjectId;

/// Write `data` to `path` atomically.
///
/// The bytes land in a named temporary file in the target directory, which
/// is synced and then persisted over `path`. A failed write drops the
/// temporary file, which removes it.
async fn write_atomic(path: &Path, data: Bytes) -> std::io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| std::io::Error::other(format!("{} has no parent", path.display())))?
        .to_path_buf();
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        temp.write_all(&data)?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| e.error)?;
        Ok::<_, std::io::Error>(())
    })
    .await
    .map_err(std::io::Error::other)?
}

/// Create `dir` and prove it is writable.
async fn prepare_dir(dir: &Path) -> StoreResult<()> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        StoreError::storage(anyhow::anyhow!("cannot create {}: {e}", dir.display()))
    })?;
    let marker = dir.join(".writable");
    write_atomic(&marker, Bytes::from_static(b"ok")).await.map_err(|e| {
        StoreError::storage(anyhow::anyhow!("{} is not writable: {e}", dir.display()))
    })?;
    tokio::fs::remove_file(&marker).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// FsChunkStore
// ---------------------------------------------------------------------------

/// Chunk files under one directory per object.
#[derive(Debug)]
pub struct FsChunkStore {
    root: PathBuf,
}

impl FsChunkStore {
    /// Open (creating if needed) a chunk directory.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        prepare_dir(&root).await?;
        Ok(Self { root })
    }

    fn object_dir(&self, id: &ObjectId) -> PathBuf {
        self.root.join(id.to_hex())
    }

    fn chunk_path(&self, id: &ObjectId, index: u32) -> PathBuf {
        self.object_dir(id).join(index.to_string())
    }
}

#[async_trait]
impl ChunkStore for FsChunkStore {
    async fn put_chunk(&self, id: &ObjectId, index: u32, data: Bytes) -> StoreResult<()> {
        let path = self.chunk_path(id, index);
        match tokio::fs::read(&path).await {
            Ok(existing) if existing == data.as_ref() => {
                trace!(%id, index, "identical chunk rewrite ignored");
                return Ok(());
            }
            Ok(_) => {
                return Err(StoreError::ChunkConflict {
                    id: id.to_hex(),
                    index,
                });
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        tokio::fs::create_dir_all(self.object_dir(id)).await?;
        write_atomic(&path, data.clone()).await?;
        trace!(%id, index, len = data.len(), "stored chunk");
        Ok(())
    }

    async fn get_chunk(&self, id: &ObjectId, index: u32) -> StoreResult<Bytes> {
        match tokio::fs::read(self.chunk_path(id, index)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::ChunkNotFound {
                id: id.to_hex(),
                index,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_all(&self, id: &ObjectId) -> StoreResult<()> {
        match tokio::fs::remove_dir_all(self.object_dir(id)).await {
            Ok(()) => {
                debug!(%id, "deleted chunks");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// FsObjectCatalog
// ---------------------------------------------------------------------------

/// One JSON record per object.
#[derive(Debug)]
pub struct FsObjectCatalog {
    root: PathBuf,
    /// Per-object locks for read-modify-write cycles on records. An entry
    /// lives only while some task holds or waits for it.
    record_locks: DashMap<ObjectId, Arc<Mutex<()>>>,
}

/// Exclusive access to one object's record.
struct RecordLock<'a> {
    locks: &'a DashMap<ObjectId, Arc<Mutex<()>>>,
    id: ObjectId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RecordLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl FsObjectCatalog {
    /// Open (creating if needed) a record directory.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        prepare_dir(&root).await?;
        Ok(Self {
            root,
            record_locks: DashMap::new(),
        })
    }

    async fn lock_record(&self, id: &ObjectId) -> RecordLock<'_> {
        let lock = Arc::clone(self.record_locks.entry(*id).or_default().value());
        RecordLock {
            locks: &self.record_locks,
            id: *id,
            guard: Some(lock.lock_owned().await),
        }
    }

    fn record_path(&self, id: &ObjectId) -> PathBuf {
        self.root.join(format!("{}.json", id.to_hex()))
    }

    async fn read_record(&self, id: &ObjectId) -> StoreResult<Option<ObjectMetadata>> {
        let raw = match tokio::fs::read(self.record_path(id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta = serde_json::from_slice(&raw).map_err(|e| {
            StoreError::storage(anyhow::anyhow!("malformed record for {id}: {e}"))
        })?;
        Ok(Some(meta))
    }

    async fn write_record(&self, meta: &ObjectMetadata) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(meta).map_err(StoreError::storage)?;
        write_atomic(&self.record_path(&meta.id), Bytes::from(json)).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectCatalog for FsObjectCatalog {
    async fn create_pending(
        &self,
        id: ObjectId,
        name: &str,
        chunk_size: usize,
    ) -> StoreResult<ObjectMetadata> {
        let _lock = self.lock_record(&id).await;
        if self.read_record(&id).await?.is_some() {
            return Err(StoreError::storage(anyhow::anyhow!(
                "object record {id} already exists"
            )));
        }
        let meta = ObjectMetadata::pending(id, name, chunk_size);
        self.write_record(&meta).await?;
        debug!(%id, name, chunk_size, "created pending record");
        Ok(meta)
    }

    async fn finalize(
        &self,
        id: &ObjectId,
        length: u64,
        chunk_count: u32,
        md5: String,
    ) -> StoreResult<ObjectMetadata> {
        let _lock = self.lock_record(id).await;
        let mut meta = match self.read_record(id).await? {
            Some(meta) if meta.status == ObjectStatus::Pending => meta,
            _ => return Err(StoreError::ObjectNotFound { id: id.to_hex() }),
        };
        meta.complete(length, chunk_count, md5);
        self.write_record(&meta).await?;
        debug!(%id, length, chunk_count, "finalized record");
        Ok(meta)
    }

    async fn lookup(&self, id: &ObjectId) -> StoreResult<ObjectMetadata> {
        match self.read_record(id).await? {
            Some(meta) if meta.is_complete() => Ok(meta),
            _ => Err(StoreError::ObjectNotFound { id: id.to_hex() }),
        }
    }

    async fn discard_pending(&self, id: &ObjectId) -> StoreResult<()> {
        let _lock = self.lock_record(id).await;
        if let Some(meta) = self.read_record(id).await? {
            if meta.status == ObjectStatus::Pending {
                match tokio::fs::remove_file(self.record_path(id)).await {
                    Ok(()) => debug!(%id, "discarded pending record"),
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }
}
