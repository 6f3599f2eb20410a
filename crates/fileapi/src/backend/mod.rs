//! Storage backends executing primitive file operations.
//!
//! A backend performs exactly one action per call and checks no
//! preconditions; existence, emptiness and rights checks live in
//! [`FileApi`](crate::FileApi). Paths are virtual and resolved through the
//! [`PathSandbox`] passed with every call.
//!
//! - [`LocalBackend`]: the local filesystem below the root
//! - [`RemoteBackend`]: an FTP server whose remote directory mirrors the root

pub mod local;
pub mod remote;

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::sandbox::{PathSandbox, SandboxError};

pub use local::LocalBackend;
pub use remote::{FtpConnector, FtpSession, RemoteBackend, RemoteSession, SessionConnector};

/// Errors raised by backend primitives.
#[derive(Debug, Error)]
pub enum BackendError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Remote server rejected a command.
    #[error("remote error: {0}")]
    Remote(String),

    /// Backend cannot be used at all (connect or login failure).
    #[error("{0}")]
    Configuration(String),

    /// Path resolution rejected a name.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

/// Source of a single-file copy.
#[derive(Debug, Clone, Copy)]
pub enum CopySource<'a> {
    /// A file inside the sandbox.
    Sandboxed { dir: &'a str, file: &'a str },
    /// An opaque path outside the sandbox, such as an upload's temp file.
    External(&'a Path),
}

/// Remote transfer representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Ascii,
    Binary,
}

impl TransferMode {
    /// ASCII for `text/*` content, binary for everything else.
    pub fn for_content_type(content_type: &str) -> Self {
        if content_type.starts_with("text") {
            TransferMode::Ascii
        } else {
            TransferMode::Binary
        }
    }
}

/// Primitive operations shared by all storage backends.
pub trait StorageBackend: Send {
    /// Short backend name for logging.
    fn name(&self) -> &'static str;

    /// Whether new entries can be created in `dir`.
    fn writable(&mut self, sandbox: &PathSandbox, dir: &str) -> bool;

    /// Create a single directory.
    fn make_directory(&mut self, sandbox: &PathSandbox, dir: &str) -> Result<(), BackendError>;

    /// Remove an empty directory.
    fn remove_directory(&mut self, sandbox: &PathSandbox, dir: &str) -> Result<(), BackendError>;

    /// Copy one file to `dest_dir/dest_file`.
    fn copy_one(
        &mut self,
        sandbox: &PathSandbox,
        source: CopySource<'_>,
        dest_dir: &str,
        dest_file: &str,
    ) -> Result<(), BackendError>;

    /// Remove one file.
    fn remove_file(&mut self, sandbox: &PathSandbox, dir: &str, file: &str) -> Result<(), BackendError>;

    /// Rename or move a file, or a directory when both names are empty.
    fn rename_or_move(
        &mut self,
        sandbox: &PathSandbox,
        src_dir: &str,
        dst_dir: &str,
        src_file: &str,
        dst_file: &str,
    ) -> Result<(), BackendError>;

    /// Write a whole file; readers never observe a partial write.
    fn write_file(
        &mut self,
        sandbox: &PathSandbox,
        dir: &str,
        file: &str,
        data: &[u8],
    ) -> Result<(), BackendError>;

    /// Move an upload's temporary file into the sandbox, consuming it.
    fn relocate_upload(
        &mut self,
        sandbox: &PathSandbox,
        tmp: &Path,
        dest_dir: &str,
        dest_file: &str,
        content_type: &str,
    ) -> Result<(), BackendError>;
}

/// Full local path of a file, or of a directory when `file` is empty.
pub(crate) fn entry_path(sandbox: &PathSandbox, dir: &str, file: &str) -> Result<String, SandboxError> {
    if file.is_empty() {
        let resolved = sandbox.resolve(dir, true);
        Ok(resolved.trim_end_matches('/').to_string())
    } else {
        sandbox.resolve_entry(dir, file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_mode() {
        assert_eq!(TransferMode::for_content_type("text/plain"), TransferMode::Ascii);
        assert_eq!(TransferMode::for_content_type("text/html"), TransferMode::Ascii);
        assert_eq!(TransferMode::for_content_type("image/gif"), TransferMode::Binary);
        assert_eq!(TransferMode::for_content_type(""), TransferMode::Binary);
    }

    #[test]
    fn test_entry_path() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let sandbox = PathSandbox::new(temp_dir.path()).unwrap();
        let root = sandbox.root().to_string();

        assert_eq!(entry_path(&sandbox, "a", "").unwrap(), format!("{}a", root));
        assert_eq!(entry_path(&sandbox, "a/", "b.txt").unwrap(), format!("{}a/b.txt", root));
        assert!(entry_path(&sandbox, "a", "../b").is_err());
    }
}
