//! Integration tests for the TrackVault server.
//!
//! These tests require a running TrackVault server at `localhost:4343`.
//! They are marked `#[ignore]` so they don't run during normal `cargo test`.
//!
//! Run them with:
//! ```text
//! cargo test -p trackvault-integration -- --ignored
//! ```

use std::sync::Once;

use anyhow::{Context, Result};
use md5::{Digest, Md5};
use tracing::debug;

static INIT: Once = Once::new();

/// Boundary used by [`multipart_body`].
pub const BOUNDARY: &str = "----trackvault-integration";

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Endpoint URL for the server.
#[must_use]
pub fn endpoint_url() -> String {
    std::env::var("TRACKVAULT_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:4343".to_owned())
}

/// URL of a track resource.
#[must_use]
pub fn track_url(id: &str) -> String {
    format!("{}/api/track/{id}", endpoint_url())
}

/// Create an HTTP client for the local server.
#[must_use]
pub fn client() -> reqwest::Client {
    init_tracing();
    reqwest::Client::new()
}

/// Content type header value matching [`multipart_body`].
#[must_use]
pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// Build a multipart upload form.
///
/// `None` leaves the corresponding part out.
#[must_use]
pub fn multipart_body(name: Option<&str>, track: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(name) = name {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\n{name}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(track) = track {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"track\"; \
                 filename=\"track.mp3\"\r\nContent-Type: audio/mpeg\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(track);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Post a multipart form to the upload endpoint.
pub async fn post_form(
    client: &reqwest::Client,
    name: Option<&str>,
    track: Option<&[u8]>,
) -> Result<reqwest::Response> {
    client
        .post(format!("{}/api/track", endpoint_url()))
        .header(reqwest::header::CONTENT_TYPE, multipart_content_type())
        .body(multipart_body(name, track))
        .send()
        .await
        .context("upload request failed")
}

/// Upload a track and return its identifier.
pub async fn upload_track(client: &reqwest::Client, name: &str, track: &[u8]) -> Result<String> {
    let resp = post_form(client, Some(name), Some(track)).await?;
    anyhow::ensure!(
        resp.status() == reqwest::StatusCode::CREATED,
        "unexpected upload status {}",
        resp.status()
    );
    let json: serde_json::Value = resp.json().await?;
    let id = json["identifier"]
        .as_str()
        .context("upload response has no identifier")?
        .to_owned();
    debug!(id = %id, len = track.len(), "uploaded track");
    Ok(id)
}

/// Deterministic pseudo-random payload of `len` bytes.
#[must_use]
pub fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| {
            let i = i as u64;
            (i.wrapping_mul(31).wrapping_add(u64::from(seed)) % 251) as u8
        })
        .collect()
}

/// Hex MD5 digest of `data`.
#[must_use]
pub fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

mod test_download;
mod test_health;
mod test_upload;
