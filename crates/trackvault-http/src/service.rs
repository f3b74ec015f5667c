//! The TrackVault HTTP service implementing hyper's `Service` trait.
//!
//! [`TrackHttpService`] handles, in order:
//!
//! 1. CORS preflight requests (`OPTIONS`)
//! 2. Health checks (`GET /health`, `GET /_health`)
//! 3. Routing via [`TrackRouter`]
//! 4. Track downloads and uploads through a [`TransferSession`]; upload
//!    bodies are streamed under a size limit, never collected whole
//! 5. Common response headers (`x-request-id`, `Server`, CORS)

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use http::StatusCode;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::service::Service;
use tracing::{debug, info, warn};
use trackvault_core::{StoreError, TrackStore, TrackStoreConfig};
use uuid::Uuid;

use crate::body::TrackResponseBody;
use crate::multipart::{MultipartError, UploadLimits};
use crate::response;
use crate::router::{TrackRoute, TrackRouter};
use crate::session::TransferSession;

/// Room left in a request body for multipart framing around the file.
pub const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Configuration for the HTTP service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackHttpConfig {
    /// Limits applied to upload forms.
    pub limits: UploadLimits,
    /// Largest request body accepted for an upload.
    pub max_body_size: usize,
}

impl TrackHttpConfig {
    /// Derive HTTP limits from the store configuration.
    #[must_use]
    pub fn from_store_config(config: &TrackStoreConfig) -> Self {
        let body = config.max_upload_size.saturating_add(MULTIPART_OVERHEAD);
        Self {
            limits: UploadLimits::with_file_size(config.max_upload_size),
            max_body_size: usize::try_from(body).unwrap_or(usize::MAX),
        }
    }
}

impl Default for TrackHttpConfig {
    fn default() -> Self {
        Self::from_store_config(&TrackStoreConfig::default())
    }
}

/// The TrackVault HTTP service.
#[derive(Debug, Clone)]
pub struct TrackHttpService {
    store: TrackStore,
    router: TrackRouter,
    config: Arc<TrackHttpConfig>,
}

impl TrackHttpService {
    /// Create a service over `store`.
    #[must_use]
    pub fn new(store: TrackStore, config: TrackHttpConfig) -> Self {
        Self {
            store,
            router: TrackRouter::new(),
            config: Arc::new(config),
        }
    }

    /// Returns the track store.
    #[must_use]
    pub fn store(&self) -> &TrackStore {
        &self.store
    }
}

impl<B> Service<http::Request<B>> for TrackHttpService
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Response = http::Response<TrackResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<B>) -> Self::Future {
        let service = self.clone();

        Box::pin(async move {
            let request_id = Uuid::new_v4().to_string();
            let method = req.method().clone();
            let path = req.uri().path().to_owned();

            let response = service.process_request(req, &request_id).await;
            info!(
                %method,
                path = %path,
                status = response.status().as_u16(),
                request_id,
                "handled request"
            );

            Ok(add_common_headers(response, &request_id))
        })
    }
}

impl TrackHttpService {
    async fn process_request<B>(
        &self,
        req: http::Request<B>,
        request_id: &str,
    ) -> http::Response<TrackResponseBody>
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        debug!(%method, path = %path, request_id, "processing request");

        let route = match self.router.resolve(&method, &path) {
            Ok(route) => route,
            Err(err) => {
                debug!(error = %err, request_id, "unrouted request");
                return response::route_error(&err);
            }
        };

        let session = TransferSession::new(&self.store, request_id);
        match route {
            TrackRoute::Preflight => cors_preflight_response(),
            TrackRoute::Health => health_check_response(),
            TrackRoute::Download { id } => session.download(&id).await,
            TrackRoute::Upload => {
                let content_type = req
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(ToOwned::to_owned);
                let body = match self.upload_body(req, request_id) {
                    Ok(body) => body,
                    Err(err) => return response::upload_error(&err),
                };
                session
                    .upload(content_type.as_deref(), body, &self.config.limits)
                    .await
            }
        }
    }

    /// Turn an upload body into a size-limited stream of frames, refusing
    /// a declared length over the limit up front.
    fn upload_body<B>(
        &self,
        req: http::Request<B>,
        request_id: &str,
    ) -> Result<BoxStream<'static, Result<Bytes, MultipartError>>, StoreError>
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let limit = self.config.max_body_size;
        let declared = req
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > limit) {
            warn!(request_id, declared, limit, "upload body too large");
            return Err(StoreError::validation("request body too large"));
        }

        let frames = Limited::new(req.into_body(), limit).into_data_stream();
        Ok(StreamExt::boxed(TryStreamExt::map_err(frames, body_error)))
    }
}

fn body_error(err: Box<dyn std::error::Error + Send + Sync>) -> MultipartError {
    if err.is::<LengthLimitError>() {
        MultipartError::BodyTooLarge
    } else {
        MultipartError::Interrupted(err.to_string())
    }
}

/// Produce a health check response.
fn health_check_response() -> http::Response<TrackResponseBody> {
    response::json_response(
        StatusCode::OK,
        &serde_json::json!({ "status": "running", "service": "tracks" }),
    )
}

/// Produce a CORS preflight response.
fn cors_preflight_response() -> http::Response<TrackResponseBody> {
    http::Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "*, Content-Type")
        .header("Access-Control-Max-Age", "86400")
        .body(TrackResponseBody::empty())
        .expect("static CORS response should be valid")
}

/// Add common response headers to every response.
fn add_common_headers(
    mut response: http::Response<TrackResponseBody>,
    request_id: &str,
) -> http::Response<TrackResponseBody> {
    let headers = response.headers_mut();

    if let Ok(hv) = HeaderValue::from_str(request_id) {
        headers.insert("x-request-id", hv);
    }
    headers.insert("Server", HeaderValue::from_static("TrackVault"));
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    headers.insert(
        "Access-Control-Expose-Headers",
        HeaderValue::from_static("x-request-id, ETag"),
    );

    response
}
