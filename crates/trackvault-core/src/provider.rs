//! Track store facade.
//!
//! [`TrackStore`] owns the connected [`StorageBackend`] and the engine
//! configuration and hands out writers and chunk streams. It is cheap to
//! clone and is shared by every request handler.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;

use crate::config::TrackStoreConfig;
use crate::error::StoreResult;
use crate::id::ObjectId;
use crate::reader::{ChunkStream, ObjectReader};
use crate::storage::{ObjectMetadata, StorageBackend};
use crate::writer::ObjectWriter;

/// Entry point for storing and streaming tracks.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use futures::TryStreamExt;
/// use trackvault_core::{StorageBackend, TrackStore, TrackStoreConfig};
///
/// # tokio_test::block_on(async {
/// let store = TrackStore::new(StorageBackend::in_memory(), TrackStoreConfig::default());
/// let meta = store.upload_bytes("demo", Bytes::from("abc")).await.unwrap();
///
/// let chunks: Vec<Bytes> = store.open(&meta.id).await.unwrap().try_collect().await.unwrap();
/// assert_eq!(chunks.concat(), b"abc");
/// # });
/// ```
#[derive(Clone)]
pub struct TrackStore {
    backend: StorageBackend,
    reader: ObjectReader,
    config: Arc<TrackStoreConfig>,
}

impl fmt::Debug for TrackStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackStore")
            .field("backend", &self.backend)
            .field("chunk_size", &self.config.chunk_size)
            .finish_non_exhaustive()
    }
}

impl TrackStore {
    /// Wrap an already connected backend.
    #[must_use]
    pub fn new(backend: StorageBackend, config: TrackStoreConfig) -> Self {
        Self {
            reader: ObjectReader::new(backend.clone()),
            backend,
            config: Arc::new(config),
        }
    }

    /// Validate `config` and connect to the backend it names.
    pub async fn connect(config: TrackStoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let backend =
            StorageBackend::connect(&config.database_url, &config.database_name, &config.bucket)
                .await?;
        Ok(Self::new(backend, config))
    }

    /// Returns the storage backend.
    #[must_use]
    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &TrackStoreConfig {
        &self.config
    }

    /// Start a new upload named `name`.
    pub async fn begin_upload(&self, name: &str) -> StoreResult<ObjectWriter> {
        ObjectWriter::start(self.backend.clone(), name, self.config.chunk_size).await
    }

    /// Store a fully buffered object.
    ///
    /// The buffer is sliced into chunks without copying.
    pub async fn upload_bytes(&self, name: &str, data: Bytes) -> StoreResult<ObjectMetadata> {
        let mut writer = self.begin_upload(name).await?;
        writer.write(data).await?;
        writer.finish().await
    }

    /// Store an object read from a stream of segments.
    pub async fn upload_stream<S, E>(&self, name: &str, input: S) -> StoreResult<ObjectMetadata>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: fmt::Display,
    {
        self.begin_upload(name).await?.write_stream(input).await
    }

    /// Open a complete object for streaming.
    pub async fn open(&self, id: &ObjectId) -> StoreResult<ChunkStream> {
        self.reader.open(id).await
    }

    /// Fetch the record of a complete object.
    pub async fn metadata(&self, id: &ObjectId) -> StoreResult<ObjectMetadata> {
        self.backend.catalog.lookup(id).await
    }
}
