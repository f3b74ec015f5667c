//! Track routing, streaming multipart uploads, streaming responses, and the hyper service.
//!
//! This crate provides the HTTP layer of TrackVault. It handles:
//!
//! - **Routing** ([`router`]): Maps a method and path to a [`TrackRoute`].
//!
//! - **Multipart** ([`multipart`]): Reads `multipart/form-data` upload forms
//!   incrementally as the body arrives.
//!
//! - **Session** ([`session`]): Runs one download or upload against the
//!   [`TrackStore`](trackvault_core::TrackStore).
//!
//! - **Response** ([`response`]): Status codes and JSON message bodies.
//!
//! - **Service** ([`service`]): The [`TrackHttpService`] implementing hyper's
//!   `Service` trait.
//!
//! - **Body** ([`body`]): The [`TrackResponseBody`] type supporting buffered,
//!   streaming, and empty response modes.
//!
//! # Architecture
//!
//! ```text
//! HTTP Request
//!   -> TrackHttpService (hyper Service)
//!     -> TrackRouter (health / preflight / download / upload)
//!     -> Size-limited body stream (uploads only)
//!     -> TransferSession
//!        -> MultipartReader -> ObjectWriter::write -> ObjectWriter::finish
//!        -> TrackStore::open -> ChunkStream -> TrackResponseBody::Streaming
//!     -> Common response headers (x-request-id, Server, CORS)
//!   <- HTTP Response
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use trackvault_core::{StorageBackend, TrackStore, TrackStoreConfig};
//! use trackvault_http::service::{TrackHttpConfig, TrackHttpService};
//!
//! let config = TrackStoreConfig::default();
//! let http_config = TrackHttpConfig::from_store_config(&config);
//! let store = TrackStore::new(StorageBackend::in_memory(), config);
//! let service = TrackHttpService::new(store, http_config);
//! // Use `service` with hyper server.
//! ```

pub mod body;
pub mod multipart;
pub mod response;
pub mod router;
pub mod service;
pub mod session;

pub use body::TrackResponseBody;
pub use multipart::{MultipartError, MultipartReader, PartHeaders, UploadLimits};
pub use router::{RouteError, TrackRoute, TrackRouter};
pub use service::{TrackHttpConfig, TrackHttpService};
pub use session::TransferSession;
