//! Request routing.
//!
//! [`TrackRouter`] maps a method and path onto a [`TrackRoute`]:
//!
//! | Method | Path | Route |
//! |---|---|---|
//! | `GET` | `/health`, `/_health` | [`TrackRoute::Health`] |
//! | `OPTIONS` | any | [`TrackRoute::Preflight`] |
//! | `GET` | `/api/track/{id}` | [`TrackRoute::Download`] |
//! | `POST` | `/api/track`, `/api/track/` | [`TrackRoute::Upload`] |
//!
//! The `{id}` segment is percent-decoded and may carry one trailing slash.
//! It is not validated here; a malformed identifier must still reach the
//! download handler so it can be answered with a 400.

use http::Method;
use percent_encoding::percent_decode_str;

/// The identified endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackRoute {
    /// Liveness check.
    Health,
    /// CORS preflight.
    Preflight,
    /// Stream a stored track.
    Download {
        /// Decoded, unvalidated identifier segment.
        id: String,
    },
    /// Store a new track.
    Upload,
}

/// Routing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// No endpoint lives at this path.
    #[error("no route for {0}")]
    NotFound(String),

    /// The path exists but not for this method.
    #[error("method {method} not allowed for {path}")]
    MethodNotAllowed {
        /// The request method.
        method: Method,
        /// The request path.
        path: String,
        /// Value for the `Allow` header.
        allow: &'static str,
    },
}

const TRACK_PREFIX: &str = "/api/track";

/// Stateless request router.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackRouter;

impl TrackRouter {
    /// Create a router.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Resolve `method` and `path` to a route.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<TrackRoute, RouteError> {
        if *method == Method::OPTIONS {
            return Ok(TrackRoute::Preflight);
        }

        if path == "/health" || path == "/_health" {
            return match *method {
                Method::GET => Ok(TrackRoute::Health),
                _ => Err(not_allowed(method, path, "GET, OPTIONS")),
            };
        }

        let Some(rest) = path.strip_prefix(TRACK_PREFIX) else {
            return Err(RouteError::NotFound(path.to_owned()));
        };

        if rest.is_empty() || rest == "/" {
            return match *method {
                Method::POST => Ok(TrackRoute::Upload),
                _ => Err(not_allowed(method, path, "POST, OPTIONS")),
            };
        }

        let Some(segment) = rest.strip_prefix('/') else {
            // e.g. `/api/tracks`
            return Err(RouteError::NotFound(path.to_owned()));
        };
        let segment = segment.strip_suffix('/').unwrap_or(segment);
        if segment.is_empty() || segment.contains('/') {
            return Err(RouteError::NotFound(path.to_owned()));
        }

        match *method {
            Method::GET => Ok(TrackRoute::Download {
                id: percent_decode_str(segment).decode_utf8_lossy().into_owned(),
            }),
            _ => Err(not_allowed(method, path, "GET, OPTIONS")),
        }
    }
}

fn not_allowed(method: &Method, path: &str, allow: &'static str) -> RouteError {
    RouteError::MethodNotAllowed {
        method: method.clone(),
        path: path.to_owned(),
        allow,
    }
}
