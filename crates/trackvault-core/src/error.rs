//! Error types for the TrackVault storage engine.
//!
//! [`StoreError`] covers every failure the engine can report, from
//! client-side input problems (malformed identifiers, invalid uploads) to
//! backend failures and consistency violations detected while streaming.
//! The HTTP layer maps each variant onto a status code; the classification
//! helpers on [`StoreError`] keep that mapping in one place.
//!
//! # Usage
//!
//! ```
//! use trackvault_core::error::StoreError;
//!
//! let err = StoreError::InvalidIdentifier {
//!     value: "not-an-id".to_owned(),
//! };
//! assert!(err.is_client_error());
//! ```

/// Storage engine error type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    // -----------------------------------------------------------------------
    // Client input errors
    // -----------------------------------------------------------------------
    /// The identifier is not a 24-character hex string.
    #[error("invalid object identifier: {value:?} (must be a string of 24 hex characters)")]
    InvalidIdentifier {
        /// The rejected input.
        value: String,
    },

    /// The upload request is missing a field, is malformed, or is too large.
    #[error("upload validation failed: {message}")]
    UploadValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// The upload's input stream failed before it ended.
    #[error("upload aborted: {message}")]
    UploadAborted {
        /// Description of the input failure.
        message: String,
    },

    // -----------------------------------------------------------------------
    // Lookup errors
    // -----------------------------------------------------------------------
    /// No complete object exists under this identifier.
    #[error("object not found: {id}")]
    ObjectNotFound {
        /// The identifier that was looked up.
        id: String,
    },

    /// The chunk store has no chunk at this position.
    #[error("chunk not found: {id}[{index}]")]
    ChunkNotFound {
        /// The object identifier.
        id: String,
        /// The chunk index.
        index: u32,
    },

    // -----------------------------------------------------------------------
    // Consistency errors
    // -----------------------------------------------------------------------
    /// A chunk was rewritten with different bytes.
    #[error("chunk {id}[{index}] already exists with different content")]
    ChunkConflict {
        /// The object identifier.
        id: String,
        /// The chunk index.
        index: u32,
    },

    /// A complete object is missing a chunk or a chunk has the wrong size.
    #[error("object {id} is corrupt at chunk {index}: {reason}")]
    StreamCorruption {
        /// The object identifier.
        id: String,
        /// The chunk index at which the stream failed.
        index: u32,
        /// What was wrong with the chunk.
        reason: String,
    },

    /// The writer was used after it failed or completed.
    #[error("object writer for {id} is closed")]
    WriterClosed {
        /// The object identifier.
        id: String,
    },

    // -----------------------------------------------------------------------
    // Backend / setup errors
    // -----------------------------------------------------------------------
    /// The storage backend failed (unavailable, I/O error, bad record).
    #[error("storage backend failure: {0:#}")]
    Storage(#[source] anyhow::Error),

    /// The connection string is invalid or the backend is unreachable.
    #[error("cannot connect to storage {url:?}: {reason}")]
    Connection {
        /// The connection string.
        url: String,
        /// Why the connection failed.
        reason: String,
    },

    /// The configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Create an [`UploadValidation`](Self::UploadValidation) error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::UploadValidation {
            message: message.into(),
        }
    }

    /// Create a [`Storage`](Self::Storage) error from any displayable cause.
    #[must_use]
    pub fn storage(cause: impl Into<anyhow::Error>) -> Self {
        Self::Storage(cause.into())
    }

    /// Whether this error was caused by the client's input.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentifier { .. } | Self::UploadValidation { .. } | Self::UploadAborted { .. }
        )
    }

    /// Whether this error means "no such object" to a reader.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound { .. })
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.into())
    }
}

/// Convenience result type for storage engine operations.
pub type StoreResult<T> = Result<T, StoreError>;
