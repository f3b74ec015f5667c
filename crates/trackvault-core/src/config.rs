//! Storage engine configuration.
//!
//! Provides [`TrackStoreConfig`] for configuring the TrackVault server and
//! its storage engine. Values are loaded from environment variables; the
//! server binary loads a `.env` file first so local overrides work without
//! exporting anything.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::StoreError;

/// Default chunk size: 255 KiB, the conventional GridFS chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 261_120;

/// Largest chunk size accepted by [`TrackStoreConfig::validate`] (16 MiB).
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Default upper bound on an uploaded file, in bytes.
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 100_000_000;

/// TrackVault configuration.
///
/// # Examples
///
/// ```
/// use trackvault_core::config::TrackStoreConfig;
///
/// let config = TrackStoreConfig::default();
/// assert_eq!(config.listen, "0.0.0.0:4343");
/// assert_eq!(config.bucket, "tracks");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct TrackStoreConfig {
    /// Bind address for the HTTP server.
    #[builder(default = String::from("0.0.0.0:4343"))]
    pub listen: String,

    /// Storage connection string (`memory://` or `file://<path>`).
    #[builder(default = String::from("memory://"))]
    pub database_url: String,

    /// Database name; a directory under the root for file storage.
    #[builder(default = String::from("qb_track_db"))]
    pub database_name: String,

    /// Bucket holding the track objects.
    #[builder(default = String::from("tracks"))]
    pub bucket: String,

    /// Size of every chunk except possibly the last one.
    #[builder(default = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Maximum accepted size of an uploaded file.
    #[builder(default = DEFAULT_MAX_UPLOAD_SIZE)]
    pub max_upload_size: u64,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for TrackStoreConfig {
    fn default() -> Self {
        Self {
            listen: String::from("0.0.0.0:4343"),
            database_url: String::from("memory://"),
            database_name: String::from("qb_track_db"),
            bucket: String::from("tracks"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            log_level: String::from("info"),
        }
    }
}

impl TrackStoreConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `TRACKS_LISTEN` | `0.0.0.0:4343` |
    /// | `DATABASE` | `memory://` |
    /// | `DATABASE_NAME` | `qb_track_db` |
    /// | `TRACKS_BUCKET` | `tracks` |
    /// | `TRACKS_CHUNK_SIZE` | `261120` |
    /// | `TRACKS_MAX_UPLOAD_SIZE` | `100000000` |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// Numbers that fail to parse keep their default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// [`from_env`](Self::from_env) delegates here; tests pass a map.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("TRACKS_LISTEN") {
            config.listen = v;
        }
        if let Some(v) = lookup("DATABASE") {
            config.database_url = v;
        }
        if let Some(v) = lookup("DATABASE_NAME") {
            config.database_name = v;
        }
        if let Some(v) = lookup("TRACKS_BUCKET") {
            config.bucket = v;
        }
        if let Some(v) = lookup("TRACKS_CHUNK_SIZE") {
            if let Ok(n) = v.trim().parse::<usize>() {
                config.chunk_size = n;
            }
        }
        if let Some(v) = lookup("TRACKS_MAX_UPLOAD_SIZE") {
            if let Ok(n) = v.trim().parse::<u64>() {
                config.max_upload_size = n;
            }
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// Check the configuration for values the engine cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.chunk_size == 0 {
            return Err(StoreError::Config("chunk size must be positive".into()));
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(StoreError::Config(format!(
                "chunk size {} exceeds the {MAX_CHUNK_SIZE} byte maximum",
                self.chunk_size
            )));
        }
        if self.max_upload_size == 0 {
            return Err(StoreError::Config(
                "max upload size must be positive".into(),
            ));
        }
        if !is_valid_name(&self.database_name) {
            return Err(StoreError::Config(format!(
                "invalid database name {:?}",
                self.database_name
            )));
        }
        if !is_valid_name(&self.bucket) {
            return Err(StoreError::Config(format!(
                "invalid bucket name {:?}",
                self.bucket
            )));
        }
        Ok(())
    }
}

/// Names become directory components, so path separators and dot-only names
/// are rejected.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
