//! Content-type detection from file signatures.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Bytes inspected when sniffing a file.
const SNIFF_LEN: usize = 8192;

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const TEXT_PLAIN: &str = "text/plain";
pub const EMPTY: &str = "application/x-empty";

/// Detect the content type of a file.
///
/// Known binary signatures win; otherwise UTF-8 content is `text/plain` and
/// anything else is `application/octet-stream`.
pub fn detect(path: impl AsRef<Path>) -> io::Result<String> {
    let mut file = File::open(path.as_ref())?;
    let mut buffer = Vec::with_capacity(SNIFF_LEN);
    file.by_ref().take(SNIFF_LEN as u64).read_to_end(&mut buffer)?;
    Ok(detect_bytes(&buffer).to_string())
}

/// Detect the content type of an in-memory prefix.
pub fn detect_bytes(buffer: &[u8]) -> &'static str {
    if buffer.is_empty() {
        return EMPTY;
    }
    if let Some(kind) = infer::get(buffer) {
        return kind.mime_type();
    }
    match std::str::from_utf8(buffer) {
        Ok(_) => TEXT_PLAIN,
        // cut in the middle of a multi-byte sequence at the sniff boundary
        Err(e) if e.error_len().is_none() => TEXT_PLAIN,
        Err(_) => OCTET_STREAM,
    }
}
