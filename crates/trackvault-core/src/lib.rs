//! Chunked object storage and streaming transfer engine for TrackVault.
//!
//! This crate stores arbitrarily large binary objects (audio tracks) as a
//! sequence of fixed-size chunks and streams them back in order, one chunk
//! at a time, without ever holding a whole object in memory. Objects become
//! visible to readers only after every chunk has been written.
//!
//! # Architecture
//!
//! ```text
//!  TrackStore (facade)
//!     |                 \
//!     v                  v
//!  ObjectWriter       ObjectReader -> ChunkStream (lazy, ordered)
//!     |       \          |       \
//!     v        v         v        v
//!  ChunkStore  ObjectCatalog (pending -> complete)
//!     |              |
//!     v              v
//!  StorageBackend (memory:// or file://)
//! ```

pub mod config;
pub mod error;
pub mod id;
pub mod provider;
pub mod reader;
pub mod storage;
pub mod writer;

pub use config::TrackStoreConfig;
pub use error::StoreError;
pub use id::ObjectId;
pub use provider::TrackStore;
pub use reader::{ChunkStream, ObjectReader};
pub use storage::{ChunkStore, ObjectCatalog, ObjectMetadata, ObjectStatus, StorageBackend};
pub use writer::{ObjectWriter, WriterState};
