//! Response construction.
//!
//! Every error response body is a JSON object with a single `message` key,
//! except not-found responses, which have an empty body.

use http::StatusCode;
use http::header::{CONTENT_TYPE, HeaderValue};
use serde_json::json;
use trackvault_core::{ObjectId, StoreError};

use crate::body::TrackResponseBody;
use crate::router::RouteError;

/// 400 for an identifier that is not 24 hex characters.
pub const INVALID_ID_MESSAGE: &str =
    "Invalid trackID in URL parameter. Must be a string of 24 hex characters";
/// 400 for a malformed or over-limit upload form.
pub const VALIDATION_FAILED_MESSAGE: &str = "Upload Request Validation Failed";
/// 400 for a form without a track name.
pub const MISSING_NAME_MESSAGE: &str = "No track name in request body";
/// 400 for a form without a track file.
pub const MISSING_TRACK_MESSAGE: &str = "No track file in request body";
/// 500 when storing the upload failed.
pub const UPLOAD_FAILED_MESSAGE: &str = "Error uploading file";
/// 500 when the catalog could not be read.
pub const DOWNLOAD_FAILED_MESSAGE: &str = "Error retrieving track";

/// Content type of streamed tracks.
pub const TRACK_CONTENT_TYPE: &str = "audio/mp3";

/// A JSON `{"message": ...}` response.
#[must_use]
pub fn json_message(status: StatusCode, message: &str) -> http::Response<TrackResponseBody> {
    json_response(status, &json!({ "message": message }))
}

/// A JSON response with an arbitrary body.
#[must_use]
pub fn json_response(
    status: StatusCode,
    value: &serde_json::Value,
) -> http::Response<TrackResponseBody> {
    let mut response = http::Response::new(TrackResponseBody::from_json(value));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// An empty-bodied response.
#[must_use]
pub fn empty(status: StatusCode) -> http::Response<TrackResponseBody> {
    let mut response = http::Response::new(TrackResponseBody::empty());
    *response.status_mut() = status;
    response
}

/// 201 for a stored upload.
#[must_use]
pub fn upload_created(id: &ObjectId) -> http::Response<TrackResponseBody> {
    json_response(
        StatusCode::CREATED,
        &json!({
            "message": format!("File uploaded successfully, stored under ObjectID: {id}"),
            "identifier": id.to_hex(),
        }),
    )
}

/// Map an upload failure to its response.
#[must_use]
pub fn upload_error(err: &StoreError) -> http::Response<TrackResponseBody> {
    if err.is_client_error() {
        json_message(StatusCode::BAD_REQUEST, VALIDATION_FAILED_MESSAGE)
    } else {
        json_message(StatusCode::INTERNAL_SERVER_ERROR, UPLOAD_FAILED_MESSAGE)
    }
}

/// Map a download failure that happened before any bytes were sent.
#[must_use]
pub fn download_error(err: &StoreError) -> http::Response<TrackResponseBody> {
    match err {
        StoreError::InvalidIdentifier { .. } => {
            json_message(StatusCode::BAD_REQUEST, INVALID_ID_MESSAGE)
        }
        StoreError::ObjectNotFound { .. }
        | StoreError::ChunkNotFound { .. }
        | StoreError::StreamCorruption { .. } => empty(StatusCode::NOT_FOUND),
        _ => json_message(StatusCode::INTERNAL_SERVER_ERROR, DOWNLOAD_FAILED_MESSAGE),
    }
}

/// Map a routing failure to its response.
#[must_use]
pub fn route_error(err: &RouteError) -> http::Response<TrackResponseBody> {
    match err {
        RouteError::NotFound(_) => empty(StatusCode::NOT_FOUND),
        RouteError::MethodNotAllowed { allow, .. } => {
            let mut response = empty(StatusCode::METHOD_NOT_ALLOWED);
            response
                .headers_mut()
                .insert(http::header::ALLOW, HeaderValue::from_static(*allow));
            response
        }
    }
}
