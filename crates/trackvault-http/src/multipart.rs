//! Streaming multipart form data reader for track uploads.
//!
//! Upload forms are `multipart/form-data` bodies holding one text field
//! (`name`) and one file field (`track`). [`MultipartReader`] walks such a
//! body as it arrives: [`next_part`](MultipartReader::next_part) yields each
//! part's headers and [`next_chunk`](MultipartReader::next_chunk) yields the
//! part's content piece by piece. The reader holds at most one incoming
//! frame plus a boundary-sized tail, so a file part can be handed to the
//! storage engine without ever being assembled in memory.
//!
//! Limit checks on part counts and sizes are made by the caller against
//! [`UploadLimits`]; framing violations are [`MultipartError::Malformed`].

use bytes::{Buf, Bytes, BytesMut};
use futures::{Stream, StreamExt};

/// Name of the text field carrying the track name.
pub const NAME_FIELD: &str = "name";

/// Name of the file field carrying the track bytes.
pub const TRACK_FIELD: &str = "track";

/// Largest accepted header section of a single part.
const MAX_HEADER_SIZE: usize = 8 * 1024;

/// Largest accepted text field value.
pub const MAX_FIELD_SIZE: usize = 64 * 1024;

/// Multipart parsing and limit errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MultipartError {
    /// The request is not `multipart/form-data`.
    #[error("expected multipart/form-data, got {0:?}")]
    NotMultipart(String),

    /// The content type has no usable boundary parameter.
    #[error("missing boundary in Content-Type")]
    MissingBoundary,

    /// The body does not follow the multipart framing.
    #[error("malformed multipart body: {0}")]
    Malformed(&'static str),

    /// More text fields than allowed.
    #[error("too many fields (limit {0})")]
    TooManyFields(usize),

    /// More file fields than allowed.
    #[error("too many files (limit {0})")]
    TooManyFiles(usize),

    /// More parts than allowed.
    #[error("too many parts (limit {0})")]
    TooManyParts(usize),

    /// A file was sent under a field other than `track`.
    #[error("unexpected file field {0:?}")]
    UnexpectedFile(String),

    /// The file is larger than allowed.
    #[error("file too large (limit {0} bytes)")]
    FileTooLarge(u64),

    /// A text field is larger than allowed.
    #[error("field too large (limit {0} bytes)")]
    FieldTooLarge(usize),

    /// The request body exceeded the server's size limit.
    #[error("request body too large")]
    BodyTooLarge,

    /// Reading the request body failed.
    #[error("request body interrupted: {0}")]
    Interrupted(String),
}

/// Upper bounds enforced on an upload form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    /// Maximum number of non-file fields.
    pub fields: usize,
    /// Maximum number of file fields.
    pub files: usize,
    /// Maximum number of parts of either kind.
    pub parts: usize,
    /// Maximum file size in bytes.
    pub file_size: u64,
}

impl UploadLimits {
    /// One name field, one file, at most `file_size` bytes.
    #[must_use]
    pub fn with_file_size(file_size: u64) -> Self {
        Self {
            fields: 1,
            files: 1,
            parts: 2,
            file_size,
        }
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self::with_file_size(trackvault_core::config::DEFAULT_MAX_UPLOAD_SIZE)
    }
}

/// Extract the boundary from a `multipart/form-data; boundary=...` content type.
pub fn extract_boundary(content_type: &str) -> Result<String, MultipartError> {
    let parsed: mime::Mime = content_type
        .parse()
        .map_err(|_| MultipartError::NotMultipart(content_type.to_owned()))?;
    if parsed.type_() != mime::MULTIPART || parsed.subtype() != mime::FORM_DATA {
        return Err(MultipartError::NotMultipart(content_type.to_owned()));
    }
    match parsed.get_param(mime::BOUNDARY) {
        Some(b) if !b.as_str().is_empty() => Ok(b.as_str().to_owned()),
        _ => Err(MultipartError::MissingBoundary),
    }
}

/// Headers of one form part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartHeaders {
    /// Form field name.
    pub name: String,
    /// Client-side file name; present only for file parts.
    pub filename: Option<String>,
    /// Declared content type of the part.
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    /// Before the opening boundary.
    Preamble,
    /// Just past a boundary; a part or the closing marker follows.
    Boundary,
    /// Inside a part's content.
    Content,
    /// Past the closing boundary.
    Done,
}

/// Incremental reader over a multipart body stream.
#[derive(Debug)]
pub struct MultipartReader<S> {
    stream: S,
    buffer: BytesMut,
    /// `--boundary`, which opens the body.
    delimiter: Bytes,
    /// `\r\n--boundary`, which ends every part.
    marker: Bytes,
    state: ReaderState,
}

impl<S> MultipartReader<S>
where
    S: Stream<Item = Result<Bytes, MultipartError>> + Unpin,
{
    /// Read the form in `stream`, delimited by `boundary`.
    pub fn new(stream: S, boundary: &str) -> Self {
        let delimiter = Bytes::from(format!("--{boundary}"));
        let marker = Bytes::from(format!("\r\n--{boundary}"));
        Self {
            stream,
            buffer: BytesMut::new(),
            delimiter,
            marker,
            state: ReaderState::Preamble,
        }
    }

    /// Advance to the next part, skipping whatever is left of the current
    /// one. Returns `None` after the closing boundary.
    pub async fn next_part(&mut self) -> Result<Option<PartHeaders>, MultipartError> {
        loop {
            match self.state {
                ReaderState::Done => return Ok(None),
                ReaderState::Content => while self.next_chunk().await?.is_some() {},
                ReaderState::Preamble => self.skip_preamble().await?,
                ReaderState::Boundary => {
                    self.fill_to(2).await?;
                    if self.buffer.starts_with(b"--") {
                        self.state = ReaderState::Done;
                        return Ok(None);
                    }
                    if !self.buffer.starts_with(b"\r\n") {
                        return Err(MultipartError::Malformed("boundary not followed by CRLF"));
                    }
                    self.buffer.advance(2);
                    let headers = self.read_headers().await?;
                    self.state = ReaderState::Content;
                    return Ok(Some(headers));
                }
            }
        }
    }

    /// The next piece of the current part's content, or `None` at its end.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, MultipartError> {
        if self.state != ReaderState::Content {
            return Ok(None);
        }
        loop {
            if let Some(pos) = find_bytes(&self.buffer, &self.marker) {
                if pos > 0 {
                    return Ok(Some(self.buffer.split_to(pos).freeze()));
                }
                self.buffer.advance(self.marker.len());
                self.state = ReaderState::Boundary;
                return Ok(None);
            }
            // Anything before the last `marker.len() - 1` bytes cannot be
            // the start of the closing marker.
            let safe = self.buffer.len().saturating_sub(self.marker.len() - 1);
            if safe > 0 {
                return Ok(Some(self.buffer.split_to(safe).freeze()));
            }
            if !self.fill().await? {
                return Err(MultipartError::Malformed("unexpected end of form"));
            }
        }
    }

    /// Collect the current part's content, failing past `limit` bytes.
    pub async fn read_field(&mut self, limit: usize) -> Result<Bytes, MultipartError> {
        let mut value = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await? {
            if value.len() + chunk.len() > limit {
                return Err(MultipartError::FieldTooLarge(limit));
            }
            value.extend_from_slice(&chunk);
        }
        Ok(value.freeze())
    }

    async fn skip_preamble(&mut self) -> Result<(), MultipartError> {
        loop {
            if let Some(pos) = find_bytes(&self.buffer, &self.delimiter) {
                self.buffer.advance(pos + self.delimiter.len());
                self.state = ReaderState::Boundary;
                return Ok(());
            }
            let keep = self.delimiter.len() - 1;
            if self.buffer.len() > keep {
                let drop_len = self.buffer.len() - keep;
                self.buffer.advance(drop_len);
            }
            if !self.fill().await? {
                return Err(MultipartError::Malformed("no opening boundary"));
            }
        }
    }

    async fn read_headers(&mut self) -> Result<PartHeaders, MultipartError> {
        self.fill_to(2).await?;
        let raw = if self.buffer.starts_with(b"\r\n") {
            self.buffer.advance(2);
            Bytes::new()
        } else {
            loop {
                if let Some(pos) = find_bytes(&self.buffer, b"\r\n\r\n") {
                    let raw = self.buffer.split_to(pos).freeze();
                    self.buffer.advance(4);
                    break raw;
                }
                if self.buffer.len() > MAX_HEADER_SIZE {
                    return Err(MultipartError::Malformed("part headers too large"));
                }
                if !self.fill().await? {
                    return Err(MultipartError::Malformed("unexpected end of form"));
                }
            }
        };

        let disposition = parse_content_disposition(&raw)?;
        Ok(PartHeaders {
            name: disposition.name,
            filename: disposition.filename,
            content_type: parse_part_content_type(&raw),
        })
    }

    /// Pull frames until at least `len` bytes are buffered.
    async fn fill_to(&mut self, len: usize) -> Result<(), MultipartError> {
        while self.buffer.len() < len {
            if !self.fill().await? {
                return Err(MultipartError::Malformed("unexpected end of form"));
            }
        }
        Ok(())
    }

    /// Append the next non-empty frame; `false` at end of body.
    async fn fill(&mut self) -> Result<bool, MultipartError> {
        while let Some(frame) = self.stream.next().await {
            let frame = frame?;
            if !frame.is_empty() {
                self.buffer.extend_from_slice(&frame);
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Parsed Content-Disposition header fields.
struct ContentDisposition {
    name: String,
    filename: Option<String>,
}

/// Parse the Content-Disposition header of a part; `name` is mandatory.
fn parse_content_disposition(headers: &[u8]) -> Result<ContentDisposition, MultipartError> {
    let headers_str = String::from_utf8_lossy(headers);
    for line in headers_str.split("\r\n") {
        let lower = line.to_ascii_lowercase();
        if !lower.starts_with("content-disposition:") {
            continue;
        }
        let name = extract_quoted_param(line, "name")
            .ok_or(MultipartError::Malformed("part without a field name"))?;
        let filename = extract_quoted_param(line, "filename");
        return Ok(ContentDisposition { name, filename });
    }
    Err(MultipartError::Malformed("part without Content-Disposition"))
}

/// Extract the Content-Type from a part's headers section.
fn parse_part_content_type(headers: &[u8]) -> Option<String> {
    let headers_str = String::from_utf8_lossy(headers);
    headers_str.split("\r\n").find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case("content-type")
            .then(|| value.trim().to_owned())
    })
}

/// Extract a parameter value from a header line, quoted or not.
///
/// Parameters are matched by exact name, so `name` does not match inside
/// `filename`.
fn extract_quoted_param(header_line: &str, param_name: &str) -> Option<String> {
    let (_, params) = header_line.split_once(';')?;
    let mut rest = params;
    while !rest.is_empty() {
        rest = rest.trim_start_matches([';', ' ', '\t']);
        let eq = rest.find('=')?;
        let key = rest[..eq].trim();
        let after = &rest[eq + 1..];

        let (value, next) = if let Some(quoted) = after.strip_prefix('"') {
            let end = quoted.find('"')?;
            (&quoted[..end], &quoted[end + 1..])
        } else {
            let end = after.find(';').unwrap_or(after.len());
            (after[..end].trim(), &after[end..])
        };

        if key.eq_ignore_ascii_case(param_name) {
            return Some(value.to_owned());
        }
        rest = next;
    }
    None
}

/// Find the position of a needle in a haystack.
fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
