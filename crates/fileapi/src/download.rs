//! HTTP byte-range downloads.
//!
//! [`FileApi::download`] answers one request: it parses the `Range` header,
//! sends the caching and disposition headers, and streams the selected
//! window in fixed-size chunks to a [`DownloadResponse`]. A client
//! disconnect is signalled through a [`CancellationToken`] or a broken pipe
//! and ends the transfer with [`DownloadOutcome::Aborted`].

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use http::header::{
    HeaderName, HeaderValue, ACCEPT_RANGES, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH,
    CONTENT_RANGE, CONTENT_TYPE, EXPIRES, PRAGMA, RANGE,
};
use http::{HeaderMap, StatusCode};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::FileApi;
use crate::error::{FileApiError, Result};
use crate::messages::{Label, MessageKey};

/// Default streaming chunk size (8KB).
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

const CACHE_POLICY: &str = "public, must-revalidate, post-check=0, pre-check=0";

/// Errors from parsing a `Range` header.
#[derive(Debug, Error, PartialEq)]
pub enum RangeError {
    /// Unit other than `bytes`.
    #[error("unsupported range unit: {0}")]
    UnsupportedUnit(String),

    /// Header has no `unit=ranges` form.
    #[error("malformed range: {0}")]
    Malformed(String),
}

/// First range of a `Range: bytes=...` header.
///
/// `start: None` with an end is a suffix range selecting the last `end`
/// bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Inclusive window within a non-empty file of `size` bytes.
    ///
    /// The end is capped at the last byte. The start only moves forward when
    /// it is below the end.
    pub fn window(&self, size: u64) -> (u64, u64) {
        let last = size.saturating_sub(1);
        match (self.start, self.end) {
            (None, Some(suffix)) if suffix > 0 => (size - suffix.min(size), last),
            (start, end) => {
                let seek_end = end.map_or(last, |end| end.min(last));
                let seek_start = match start {
                    Some(start) if start < seek_end => start,
                    _ => 0,
                };
                (seek_start, seek_end)
            }
        }
    }
}

/// Parse a `Range` header value.
///
/// Only the first of several comma-separated ranges is kept. Unparsable
/// bounds are treated as absent.
pub fn parse_range(value: &str) -> std::result::Result<ByteRange, RangeError> {
    let (unit, ranges) = value
        .split_once('=')
        .ok_or_else(|| RangeError::Malformed(value.to_string()))?;
    if unit.trim() != "bytes" {
        return Err(RangeError::UnsupportedUnit(unit.trim().to_string()));
    }

    let first = ranges.split(',').next().unwrap_or_default().trim();
    let (start, end) = first.split_once('-').unwrap_or((first, ""));
    let bound = |s: &str| s.trim().parse::<u64>().ok();
    Ok(ByteRange {
        start: bound(start),
        end: bound(end),
    })
}

/// How a download ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Whole window was sent.
    Completed,
    /// Client went away mid-stream.
    Aborted,
}

/// Sink for the status, headers and body of a download.
pub trait DownloadResponse {
    fn set_status(&mut self, status: StatusCode);

    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Write one body chunk. A `BrokenPipe` or `ConnectionReset` error means
    /// the client disconnected.
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Ask the transport not to compress the body. Failures are ignored.
    fn disable_compression(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Response collected in memory.
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Default for BufferedResponse {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header value as text, if present and visible ASCII.
    pub fn header(&self, name: HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl DownloadResponse for BufferedResponse {
    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.body.extend_from_slice(chunk);
        Ok(())
    }
}

/// Response whose body goes straight to a writer.
pub struct StreamResponse<W: Write> {
    pub status: StatusCode,
    pub headers: HeaderMap,
    writer: W,
}

impl<W: Write> StreamResponse<W> {
    pub fn new(writer: W) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            writer,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> DownloadResponse for StreamResponse<W> {
    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.writer.write_all(chunk)?;
        self.writer.flush()
    }
}

fn disposition(file: &str, inline: bool) -> HeaderValue {
    let kind = if inline { "inline" } else { "attachment" };
    let value = format!("{}; filename=\"{}\"", kind, file.replace('"', "\\\""));
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static(if inline { "inline" } else { "attachment" }))
}

fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
    )
}

impl FileApi {
    /// Stream a file to an HTTP client, honouring a single byte range.
    ///
    /// Nothing is sent when the file is missing or cannot be opened. An
    /// unsupported range unit sets status 416 and records "HTTP error: 416".
    pub fn download(
        &mut self,
        dir: &str,
        file: &str,
        inline: bool,
        request: &HeaderMap,
        response: &mut dyn DownloadResponse,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome> {
        if !self.exists(dir, Some(file), false) {
            return Err(self.not_found(file, Label::File));
        }

        let range = match request.get(RANGE) {
            None => None,
            Some(value) => match value.to_str().map(parse_range) {
                Ok(Ok(range)) => Some(range),
                Ok(Err(e)) => {
                    debug!(error = %e, "Rejecting range request");
                    return Err(self.range_not_satisfiable(response));
                }
                Err(_) => return Err(self.range_not_satisfiable(response)),
            },
        };

        if let Err(e) = response.disable_compression() {
            debug!(error = %e, "Could not disable response compression");
        }

        let path = match self.sandbox.resolve_entry(dir, file) {
            Ok(path) => path,
            Err(_) => return Err(self.not_found(file, Label::File)),
        };
        let (mut handle, size) = match File::open(&path).and_then(|f| f.metadata().map(|m| (f, m.len()))) {
            Ok(opened) => opened,
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to open file for download");
                return Err(self.fail(FileApiError::Io(e)));
            }
        };

        response.set_header(PRAGMA, HeaderValue::from_static("public"));
        response.set_header(EXPIRES, HeaderValue::from_static("-1"));
        response.set_header(CACHE_CONTROL, HeaderValue::from_static(CACHE_POLICY));
        response.set_header(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
        response.set_header(CONTENT_DISPOSITION, disposition(file, inline));
        response.set_header(ACCEPT_RANGES, HeaderValue::from_static("bytes"));

        if size == 0 {
            response.set_status(StatusCode::OK);
            response.set_header(CONTENT_LENGTH, HeaderValue::from(0u64));
            return Ok(DownloadOutcome::Completed);
        }

        let (start, end) = range.map_or((0, size - 1), |range| range.window(size));
        let length = end - start + 1;
        if length < size {
            response.set_status(StatusCode::PARTIAL_CONTENT);
            let content_range = format!("bytes {}-{}/{}", start, end, size);
            if let Ok(value) = HeaderValue::from_str(&content_range) {
                response.set_header(CONTENT_RANGE, value);
            }
        } else {
            response.set_status(StatusCode::OK);
        }
        response.set_header(CONTENT_LENGTH, HeaderValue::from(length));

        if let Err(e) = handle.seek(SeekFrom::Start(start)) {
            return Err(self.fail(FileApiError::Io(e)));
        }

        let mut buffer = vec![0u8; self.chunk_size];
        let mut remaining = length;
        while remaining > 0 {
            let want = remaining.min(buffer.len() as u64) as usize;
            let read = match handle.read(&mut buffer[..want]) {
                Ok(0) => {
                    warn!(file, missing = remaining, "File shrank during download");
                    let e = io::Error::new(io::ErrorKind::UnexpectedEof, "file shrank during download");
                    return Err(self.fail(FileApiError::Io(e)));
                }
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail(FileApiError::Io(e))),
            };

            if let Err(e) = response.write_chunk(&buffer[..read]) {
                if is_disconnect(&e) {
                    info!(file, sent = length - remaining, "Client disconnected, download aborted");
                    return Ok(DownloadOutcome::Aborted);
                }
                return Err(self.fail(FileApiError::Io(e)));
            }
            remaining -= read as u64;

            if cancel.is_cancelled() {
                info!(file, sent = length - remaining, "Download cancelled");
                return Ok(DownloadOutcome::Aborted);
            }
        }

        debug!(file, start, end, size, "Download completed");
        Ok(DownloadOutcome::Completed)
    }

    fn range_not_satisfiable(&mut self, response: &mut dyn DownloadResponse) -> FileApiError {
        response.set_status(StatusCode::RANGE_NOT_SATISFIABLE);
        let message = self.messages.render_code(MessageKey::HttpError, "", 416, None);
        self.fail(FileApiError::RangeNotSatisfiable(message))
    }
}
