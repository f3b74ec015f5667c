//! Per-request transfer handling.
//!
//! A [`TransferSession`] binds one request to the shared [`TrackStore`] and
//! turns storage outcomes into HTTP responses. Downloads prime the first
//! chunk before committing to a 200, so a broken object that fails
//! immediately is still reported as a 404; a failure after that aborts the
//! chunked body.

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, stream};
use http::StatusCode;
use http::header::{ACCEPT_RANGES, CONTENT_TYPE, ETAG, HeaderValue};
use tracing::{debug, error, info, warn};
use trackvault_core::{ObjectId, ObjectWriter, StoreError, TrackStore};

use crate::body::TrackResponseBody;
use crate::multipart::{
    self, MAX_FIELD_SIZE, MultipartError, MultipartReader, NAME_FIELD, TRACK_FIELD, UploadLimits,
};
use crate::response::{self, MISSING_NAME_MESSAGE, MISSING_TRACK_MESSAGE, TRACK_CONTENT_TYPE};

/// One request's view of the track store.
#[derive(Debug, Clone, Copy)]
pub struct TransferSession<'a> {
    store: &'a TrackStore,
    request_id: &'a str,
}

impl<'a> TransferSession<'a> {
    /// Bind a request to the store.
    #[must_use]
    pub fn new(store: &'a TrackStore, request_id: &'a str) -> Self {
        Self { store, request_id }
    }

    /// Stream the object named by the raw path segment `raw_id`.
    pub async fn download(&self, raw_id: &str) -> http::Response<TrackResponseBody> {
        let request_id = self.request_id;
        let id = match ObjectId::parse_str(raw_id) {
            Ok(id) => id,
            Err(e) => {
                debug!(request_id, error = %e, "rejected track id");
                return response::download_error(&e);
            }
        };

        let mut chunks = match self.store.open(&id).await {
            Ok(chunks) => chunks,
            Err(e) if e.is_not_found() => {
                debug!(request_id, %id, "track not found");
                return response::download_error(&e);
            }
            Err(e) => {
                error!(request_id, %id, error = %e, "failed to look up track");
                return response::download_error(&e);
            }
        };

        let length = chunks.metadata().length;
        let etag = chunks
            .metadata()
            .md5
            .as_ref()
            .and_then(|md5| HeaderValue::from_str(&format!("\"{md5}\"")).ok());

        let first = match chunks.next().await {
            None => None,
            Some(Ok(chunk)) => Some(Ok(chunk)),
            Some(Err(e)) => {
                warn!(request_id, %id, error = %e, "track unreadable before first byte");
                return response::empty(StatusCode::NOT_FOUND);
            }
        };

        let owned_request_id = request_id.to_owned();
        let body = stream::iter(first).chain(chunks).map(move |item| {
            item.map_err(|e: StoreError| {
                warn!(request_id = %owned_request_id, %id, error = %e, "aborting track download");
                std::io::Error::other(e)
            })
        });

        info!(request_id, %id, length, "streaming track");
        let mut response = http::Response::new(TrackResponseBody::from_stream(body));
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(TRACK_CONTENT_TYPE));
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        if let Some(etag) = etag {
            headers.insert(ETAG, etag);
        }
        response
    }

    /// Store the track carried by a multipart body as it arrives.
    ///
    /// When the `name` field precedes the `track` file, the file is handed
    /// to the storage engine piece by piece and never held whole. A file
    /// sent before its name is buffered up to the file size limit. The
    /// object only becomes visible once the whole form has been read.
    pub async fn upload<S>(
        &self,
        content_type: Option<&str>,
        body: S,
        limits: &UploadLimits,
    ) -> http::Response<TrackResponseBody>
    where
        S: Stream<Item = Result<Bytes, MultipartError>> + Unpin,
    {
        let request_id = self.request_id;
        let boundary = match content_type.map(multipart::extract_boundary) {
            Some(Ok(boundary)) => boundary,
            // Not multipart at all: a form without fields.
            None | Some(Err(MultipartError::NotMultipart(_))) => {
                return response::json_message(StatusCode::BAD_REQUEST, MISSING_NAME_MESSAGE);
            }
            Some(Err(e)) => {
                debug!(request_id, error = %e, "upload form rejected");
                return response::upload_error(&form_error(e));
            }
        };

        let mut reader = MultipartReader::new(body, &boundary);
        let mut form = UploadForm::default();
        if let Err(e) = self.read_form(&mut reader, limits, &mut form).await {
            if let Some(ReceivedTrack::Streamed(writer)) = form.track {
                writer.abort(&e.to_string()).await;
            }
            if e.is_client_error() {
                debug!(request_id, error = %e, "upload form rejected");
            } else {
                error!(request_id, error = %e, "failed to store track");
            }
            return response::upload_error(&e);
        }

        let name = match form.name {
            Some(name) if !name.is_empty() => name,
            _ => return response::json_message(StatusCode::BAD_REQUEST, MISSING_NAME_MESSAGE),
        };
        let result = match form.track {
            None => return response::json_message(StatusCode::BAD_REQUEST, MISSING_TRACK_MESSAGE),
            Some(ReceivedTrack::Streamed(writer)) => writer.finish().await,
            Some(ReceivedTrack::Buffered(data)) => self.store.upload_bytes(&name, data).await,
        };

        match result {
            Ok(meta) => {
                info!(request_id, id = %meta.id, name = %name, length = meta.length, "track stored");
                response::upload_created(&meta.id)
            }
            Err(e) => {
                error!(request_id, name = %name, error = %e, "failed to store track");
                response::upload_error(&e)
            }
        }
    }

    /// Walk the form, enforcing `limits` part by part.
    async fn read_form<S>(
        &self,
        reader: &mut MultipartReader<S>,
        limits: &UploadLimits,
        form: &mut UploadForm,
    ) -> Result<(), StoreError>
    where
        S: Stream<Item = Result<Bytes, MultipartError>> + Unpin,
    {
        let (mut parts, mut fields, mut files) = (0, 0, 0);
        while let Some(part) = reader.next_part().await.map_err(form_error)? {
            parts += 1;
            if parts > limits.parts {
                return Err(form_error(MultipartError::TooManyParts(limits.parts)));
            }

            let Some(filename) = part.filename else {
                fields += 1;
                if fields > limits.fields {
                    return Err(form_error(MultipartError::TooManyFields(limits.fields)));
                }
                if part.name == NAME_FIELD {
                    let value = reader.read_field(MAX_FIELD_SIZE).await.map_err(form_error)?;
                    form.name = Some(String::from_utf8_lossy(&value).into_owned());
                }
                continue;
            };

            if part.name != TRACK_FIELD {
                return Err(form_error(MultipartError::UnexpectedFile(part.name)));
            }
            files += 1;
            if files > limits.files {
                return Err(form_error(MultipartError::TooManyFiles(limits.files)));
            }

            form.track = Some(match form.name.as_deref() {
                Some(name) if !name.is_empty() => {
                    debug!(request_id = self.request_id, name, filename = %filename, "streaming track");
                    let mut writer = self.store.begin_upload(name).await?;
                    if let Err(e) = stream_track(reader, &mut writer, limits.file_size).await {
                        writer.abort(&e.to_string()).await;
                        return Err(e);
                    }
                    ReceivedTrack::Streamed(writer)
                }
                _ => {
                    debug!(request_id = self.request_id, filename = %filename, "buffering track sent before its name");
                    ReceivedTrack::Buffered(buffer_track(reader, limits.file_size).await?)
                }
            });
        }
        Ok(())
    }
}

/// Fields gathered from an upload form.
#[derive(Debug, Default)]
struct UploadForm {
    name: Option<String>,
    track: Option<ReceivedTrack>,
}

#[derive(Debug)]
enum ReceivedTrack {
    /// Written to storage, waiting to be finished.
    Streamed(ObjectWriter),
    Buffered(Bytes),
}

async fn stream_track<S>(
    reader: &mut MultipartReader<S>,
    writer: &mut ObjectWriter,
    limit: u64,
) -> Result<(), StoreError>
where
    S: Stream<Item = Result<Bytes, MultipartError>> + Unpin,
{
    while let Some(piece) = reader.next_chunk().await.map_err(form_error)? {
        if writer.length() + piece.len() as u64 > limit {
            return Err(form_error(MultipartError::FileTooLarge(limit)));
        }
        writer.write(piece).await?;
    }
    Ok(())
}

async fn buffer_track<S>(reader: &mut MultipartReader<S>, limit: u64) -> Result<Bytes, StoreError>
where
    S: Stream<Item = Result<Bytes, MultipartError>> + Unpin,
{
    let mut data = BytesMut::new();
    while let Some(piece) = reader.next_chunk().await.map_err(form_error)? {
        if (data.len() + piece.len()) as u64 > limit {
            return Err(form_error(MultipartError::FileTooLarge(limit)));
        }
        data.extend_from_slice(&piece);
    }
    Ok(data.freeze())
}

/// A body that stopped arriving is an aborted upload; anything else wrong
/// with the form is a validation failure.
fn form_error(err: MultipartError) -> StoreError {
    match err {
        MultipartError::Interrupted(message) => StoreError::UploadAborted { message },
        other => StoreError::validation(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use trackvault_core::storage::{
        ChunkStore, MemoryChunkStore, MemoryObjectCatalog, ObjectCatalog, ObjectMetadata,
    };
    use trackvault_core::{StorageBackend, TrackStoreConfig};

    use super::*;
    use crate::response::{INVALID_ID_MESSAGE, UPLOAD_FAILED_MESSAGE, VALIDATION_FAILED_MESSAGE};

    const BOUNDARY: &str = "trackvault-test";

    #[derive(Debug)]
    struct BrokenCatalog;

    #[async_trait]
    impl ObjectCatalog for BrokenCatalog {
        async fn create_pending(
            &self,
            _id: ObjectId,
            _name: &str,
            _chunk_size: usize,
        ) -> Result<ObjectMetadata, StoreError> {
            Err(StoreError::storage(std::io::Error::other("catalog down")))
        }

        async fn finalize(
            &self,
            _id: &ObjectId,
            _length: u64,
            _chunk_count: u32,
            _md5: String,
        ) -> Result<ObjectMetadata, StoreError> {
            Err(StoreError::storage(std::io::Error::other("catalog down")))
        }

        async fn lookup(&self, _id: &ObjectId) -> Result<ObjectMetadata, StoreError> {
            Err(StoreError::storage(std::io::Error::other("catalog down")))
        }

        async fn discard_pending(&self, _id: &ObjectId) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FullDisk;

    #[async_trait]
    impl ChunkStore for FullDisk {
        async fn put_chunk(&self, _id: &ObjectId, _index: u32, _data: Bytes) -> Result<(), StoreError> {
            Err(StoreError::storage(std::io::Error::other("no space left")))
        }

        async fn get_chunk(&self, id: &ObjectId, index: u32) -> Result<Bytes, StoreError> {
            Err(StoreError::ChunkNotFound {
                id: id.to_hex(),
                index,
            })
        }

        async fn delete_all(&self, _id: &ObjectId) -> Result<(), StoreError> {
            Ok(())
        }
    }

    /// Chunk store whose reads can be switched to fail after an upload.
    #[derive(Debug, Default)]
    struct FlakyReads {
        inner: MemoryChunkStore,
        failing: AtomicBool,
    }

    #[async_trait]
    impl ChunkStore for FlakyReads {
        async fn put_chunk(&self, id: &ObjectId, index: u32, data: Bytes) -> Result<(), StoreError> {
            self.inner.put_chunk(id, index, data).await
        }

        async fn get_chunk(&self, id: &ObjectId, index: u32) -> Result<Bytes, StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::storage(std::io::Error::other("read timed out")));
            }
            self.inner.get_chunk(id, index).await
        }

        async fn delete_all(&self, id: &ObjectId) -> Result<(), StoreError> {
            self.inner.delete_all(id).await
        }
    }

    /// Chunk store counting the cleanups it is asked to run.
    #[derive(Debug, Default)]
    struct CountingDeletes {
        inner: MemoryChunkStore,
        deletes: AtomicUsize,
    }

    #[async_trait]
    impl ChunkStore for CountingDeletes {
        async fn put_chunk(&self, id: &ObjectId, index: u32, data: Bytes) -> Result<(), StoreError> {
            self.inner.put_chunk(id, index, data).await
        }

        async fn get_chunk(&self, id: &ObjectId, index: u32) -> Result<Bytes, StoreError> {
            self.inner.get_chunk(id, index).await
        }

        async fn delete_all(&self, id: &ObjectId) -> Result<(), StoreError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.inner.delete_all(id).await
        }
    }

    type Frames = stream::Iter<std::vec::IntoIter<Result<Bytes, MultipartError>>>;

    /// The whole body as a single frame.
    fn one_frame(body: &Bytes) -> Frames {
        stream::iter(vec![Ok(body.clone())])
    }

    fn frames(body: &[u8], size: usize) -> Frames {
        let frames: Vec<_> = body
            .chunks(size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        stream::iter(frames)
    }

    fn store_with(backend: StorageBackend) -> TrackStore {
        TrackStore::new(backend, TrackStoreConfig::builder().chunk_size(4).build())
    }

    fn upload_body(name: Option<&str>, track: Option<&[u8]>) -> Bytes {
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
                     filename=\"t.mp3\"\r\nContent-Type: audio/mpeg\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(track);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Bytes::from(body)
    }

    fn content_type() -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }

    async fn message(response: http::Response<TrackResponseBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        json["message"].as_str().unwrap().to_owned()
    }

    async fn upload(store: &TrackStore, body: &Bytes) -> http::Response<TrackResponseBody> {
        TransferSession::new(store, "req-1")
            .upload(Some(&content_type()), one_frame(body), &UploadLimits::default())
            .await
    }

    async fn identifier(response: http::Response<TrackResponseBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        json["identifier"].as_str().unwrap().to_owned()
    }

    async fn download_bytes(store: &TrackStore, id: &str) -> Bytes {
        let response = TransferSession::new(store, "r").download(id).await;
        assert_eq!(response.status(), StatusCode::OK);
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_should_upload_and_download_track() {
        let store = store_with(StorageBackend::in_memory());
        let response = upload(&store, &upload_body(Some("Song"), Some(b"0123456789"))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let id = json["identifier"].as_str().unwrap().to_owned();

        let response = TransferSession::new(&store, "req-2").download(&id).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "audio/mp3");
        assert_eq!(response.headers().get(ACCEPT_RANGES).unwrap(), "bytes");
        assert_eq!(
            response.headers().get(ETAG).unwrap(),
            "\"781e5e245d69b566979b86e28d23f2c7\""
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), b"0123456789");
    }

    #[tokio::test]
    async fn test_should_download_empty_track() {
        let store = store_with(StorageBackend::in_memory());
        let meta = store.upload_bytes("silence", Bytes::new()).await.unwrap();
        let response = TransferSession::new(&store, "r").download(&meta.id.to_hex()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_should_reject_invalid_id_without_touching_storage() {
        let store = store_with(StorageBackend::new(
            Arc::new(MemoryChunkStore::new()),
            Arc::new(BrokenCatalog),
        ));
        for raw in ["xyz", "507f1f77bcf86cd79943901", "507f1f77bcf86cd79943901z"] {
            let response = TransferSession::new(&store, "r").download(raw).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(message(response).await, INVALID_ID_MESSAGE);
        }
    }

    #[tokio::test]
    async fn test_should_return_404_for_unknown_track() {
        let store = store_with(StorageBackend::in_memory());
        let response = TransferSession::new(&store, "r")
            .download("507f1f77bcf86cd799439011")
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_should_return_500_when_catalog_fails() {
        let store = store_with(StorageBackend::new(
            Arc::new(MemoryChunkStore::new()),
            Arc::new(BrokenCatalog),
        ));
        let response = TransferSession::new(&store, "r")
            .download("507f1f77bcf86cd799439011")
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_should_return_404_when_first_chunk_is_missing() {
        let chunks = Arc::new(MemoryChunkStore::new());
        let store = store_with(StorageBackend::new(
            chunks.clone(),
            Arc::new(MemoryObjectCatalog::new()),
        ));
        let meta = store.upload_bytes("s", Bytes::from("abcdefgh")).await.unwrap();
        assert!(chunks.remove_chunk(&meta.id, 0));

        let response = TransferSession::new(&store, "r").download(&meta.id.to_hex()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_should_return_404_when_first_chunk_read_fails() {
        let chunks = Arc::new(FlakyReads::default());
        let store = store_with(StorageBackend::new(
            chunks.clone(),
            Arc::new(MemoryObjectCatalog::new()),
        ));
        let meta = store.upload_bytes("s", Bytes::from("abcdefgh")).await.unwrap();
        chunks.failing.store(true, Ordering::SeqCst);

        let response = TransferSession::new(&store, "r").download(&meta.id.to_hex()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_should_download_tracks_around_chunk_boundaries() {
        let store = store_with(StorageBackend::in_memory());
        for len in [0_usize, 1, 3, 4, 5, 17] {
            let track: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
            let response = upload(&store, &upload_body(Some("Song"), Some(&track))).await;
            assert_eq!(response.status(), StatusCode::CREATED, "len {len}");
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            let id = json["identifier"].as_str().unwrap().to_owned();

            let response = TransferSession::new(&store, "r").download(&id).await;
            assert_eq!(response.status(), StatusCode::OK, "len {len}");
            let body = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(body.as_ref(), track.as_slice(), "len {len}");
        }
    }

    #[tokio::test]
    async fn test_should_abort_body_when_later_chunk_is_missing() {
        let chunks = Arc::new(MemoryChunkStore::new());
        let store = store_with(StorageBackend::new(
            chunks.clone(),
            Arc::new(MemoryObjectCatalog::new()),
        ));
        let meta = store.upload_bytes("s", Bytes::from("abcdefghij")).await.unwrap();
        assert!(chunks.remove_chunk(&meta.id, 2));

        let response = TransferSession::new(&store, "r").download(&meta.id.to_hex()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.into_body().collect().await.is_err());
    }

    #[tokio::test]
    async fn test_should_require_name() {
        let store = store_with(StorageBackend::in_memory());
        let response = upload(&store, &upload_body(None, Some(b"abc"))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(message(response).await, MISSING_NAME_MESSAGE);

        let response = upload(&store, &upload_body(Some(""), Some(b"abc"))).await;
        assert_eq!(message(response).await, MISSING_NAME_MESSAGE);
    }

    #[tokio::test]
    async fn test_should_require_track() {
        let store = store_with(StorageBackend::in_memory());
        let response = upload(&store, &upload_body(Some("Song"), None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(message(response).await, MISSING_TRACK_MESSAGE);
    }

    #[tokio::test]
    async fn test_should_treat_non_multipart_as_missing_name() {
        let store = store_with(StorageBackend::in_memory());
        let response = TransferSession::new(&store, "r")
            .upload(
                Some("application/json"),
                one_frame(&Bytes::from("{}")),
                &UploadLimits::default(),
            )
            .await;
        assert_eq!(message(response).await, MISSING_NAME_MESSAGE);
    }

    #[tokio::test]
    async fn test_should_reject_oversized_track() {
        let store = store_with(StorageBackend::in_memory());
        let response = TransferSession::new(&store, "r")
            .upload(
                Some(&content_type()),
                one_frame(&upload_body(Some("Song"), Some(b"0123456789"))),
                &UploadLimits::with_file_size(5),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(message(response).await, VALIDATION_FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn test_should_return_500_when_storage_fails() {
        let store = store_with(StorageBackend::new(
            Arc::new(FullDisk),
            Arc::new(MemoryObjectCatalog::new()),
        ));
        let response = upload(&store, &upload_body(Some("Song"), Some(b"0123456789"))).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message(response).await, UPLOAD_FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn test_should_upload_from_small_frames() {
        let store = store_with(StorageBackend::in_memory());
        let track: Vec<u8> = (0..101_u8).collect();
        let body = upload_body(Some("Song"), Some(&track));
        for size in [1, 3, 64] {
            let response = TransferSession::new(&store, "r")
                .upload(Some(&content_type()), frames(&body, size), &UploadLimits::default())
                .await;
            assert_eq!(response.status(), StatusCode::CREATED, "frame {size}");
            let id = identifier(response).await;
            assert_eq!(download_bytes(&store, &id).await.as_ref(), track.as_slice());
        }
    }

    #[tokio::test]
    async fn test_should_accept_track_before_name() {
        let store = store_with(StorageBackend::in_memory());
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"track\"; filename=\"t.mp3\"\r\n\r\n\
             late name\r\n\
             --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nSong\r\n\
             --{BOUNDARY}--\r\n"
        );
        let response = upload(&store, &Bytes::from(body)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = identifier(response).await;
        assert_eq!(download_bytes(&store, &id).await.as_ref(), b"late name");
    }

    #[tokio::test]
    async fn test_should_discard_upload_when_body_is_interrupted() {
        let chunks = Arc::new(CountingDeletes::default());
        let store = store_with(StorageBackend::new(
            chunks.clone(),
            Arc::new(MemoryObjectCatalog::new()),
        ));
        let body = upload_body(Some("Song"), Some(&[9u8; 64]));
        let mut items: Vec<_> = body[..body.len() - 30]
            .chunks(16)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        items.push(Err(MultipartError::Interrupted("connection reset".into())));

        let response = TransferSession::new(&store, "r")
            .upload(Some(&content_type()), stream::iter(items), &UploadLimits::default())
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(message(response).await, VALIDATION_FAILED_MESSAGE);
        assert_eq!(chunks.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_should_discard_streamed_track_over_limit() {
        let chunks = Arc::new(CountingDeletes::default());
        let store = store_with(StorageBackend::new(
            chunks.clone(),
            Arc::new(MemoryObjectCatalog::new()),
        ));
        let body = upload_body(Some("Song"), Some(&[1u8; 40]));
        let response = TransferSession::new(&store, "r")
            .upload(Some(&content_type()), frames(&body, 8), &UploadLimits::with_file_size(20))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(chunks.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_should_discard_streamed_track_when_form_breaks_later() {
        let chunks = Arc::new(CountingDeletes::default());
        let store = store_with(StorageBackend::new(
            chunks.clone(),
            Arc::new(MemoryObjectCatalog::new()),
        ));
        let mut body = upload_body(Some("Song"), Some(b"abcdefgh")).to_vec();
        body.truncate(body.len() - format!("--{BOUNDARY}--\r\n").len());
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"extra\"\r\n\r\nx\r\n--{BOUNDARY}--\r\n")
                .as_bytes(),
        );

        let response = upload(&store, &Bytes::from(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(message(response).await, VALIDATION_FAILED_MESSAGE);
        assert_eq!(chunks.deletes.load(Ordering::SeqCst), 1);
    }
}
