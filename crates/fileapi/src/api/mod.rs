//! Sandboxed file operations over a pluggable storage backend.

mod fetch;
mod ops;
mod upload;

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use serde::Serialize;
use tracing::warn;

use crate::backend::{BackendError, LocalBackend, RemoteBackend, StorageBackend};
use crate::config::{BackendKind, Config};
use crate::error::{FileApiError, Result};
use crate::messages::{escape, Label, MessageCatalog, MessageKey};
use crate::mime;
use crate::sandbox::{PathSandbox, SandboxError};

pub use fetch::USER_AGENT;

/// A file in a directory listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    pub name: String,
    /// Change time, seconds since the epoch.
    pub changed: i64,
    pub size: u64,
    pub mime: String,
}

/// File manager confined to one root directory.
///
/// Every failing call records its message, readable through
/// [`last_error`](FileApi::last_error), and also returns it as an error.
pub struct FileApi {
    backend: Box<dyn StorageBackend>,
    pub(crate) sandbox: PathSandbox,
    pub(crate) messages: MessageCatalog,
    last_error: String,
    pub(crate) chunk_size: usize,
}

impl FileApi {
    /// Create an instance on the local filesystem.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        Self::with_backend(root, Box::new(LocalBackend::new()))
    }

    /// Create an instance with an explicit backend.
    pub fn with_backend(root: impl AsRef<Path>, backend: Box<dyn StorageBackend>) -> Result<Self> {
        let messages = MessageCatalog::default();
        let sandbox = PathSandbox::new(root).map_err(|e| match e {
            SandboxError::RootNotFound(root) => FileApiError::Configuration(messages.render(
                MessageKey::NotFound,
                &escape(&root),
                Some(Label::Directory),
            )),
            other => FileApiError::Configuration(other.to_string()),
        })?;

        Ok(Self {
            backend,
            sandbox,
            messages,
            last_error: String::new(),
            chunk_size: crate::download::DEFAULT_CHUNK_SIZE,
        })
    }

    /// Create an instance from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend: Box<dyn StorageBackend> = match config.storage.backend {
            BackendKind::Local => Box::new(LocalBackend::new()),
            BackendKind::Remote => Box::new(RemoteBackend::new(config.remote.clone())),
        };
        let mut api = Self::with_backend(&config.storage.root, backend)?;
        api.messages = MessageCatalog::with_overrides(&config.messages);
        api.chunk_size = config.download.chunk_size.max(1);
        Ok(api)
    }

    /// Replace the message catalog.
    pub fn set_messages(&mut self, messages: MessageCatalog) {
        self.messages = messages;
    }

    /// Message recorded by the last failing call.
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Current working directory.
    pub fn path(&self) -> &str {
        self.sandbox.current()
    }

    /// Root directory.
    pub fn root(&self) -> &str {
        self.sandbox.root()
    }

    /// Path resolver, for callers that need resolved paths.
    pub fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    /// Name of the active backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Change the working directory, relative to the root.
    ///
    /// On failure the working directory is unchanged.
    pub fn change_directory(&mut self, dir: &str) -> Result<()> {
        if self.sandbox.change_directory(dir).is_err() {
            return Err(self.not_found(dir, Label::Directory));
        }
        Ok(())
    }

    /// Whether a directory (`file` is `None`) or a file exists.
    ///
    /// With `ignore_case`, a failed exact lookup falls back to comparing the
    /// lowercased names of the parent directory's entries.
    pub fn exists(&self, dir: &str, file: Option<&str>, ignore_case: bool) -> bool {
        if self.exists_exact(dir, file) {
            return true;
        }
        if !ignore_case {
            return false;
        }

        let (parent, target, want_dir) = match file {
            Some(file) => (dir.to_string(), file.to_string(), false),
            None => {
                let trimmed = dir.trim_end_matches('/');
                match trimmed.rfind('/') {
                    Some(pos) => (trimmed[..=pos].to_string(), trimmed[pos + 1..].to_string(), true),
                    None => (String::new(), trimmed.to_string(), true),
                }
            }
        };
        if target.is_empty() {
            return false;
        }

        let target = target.to_lowercase();
        let parent = self.sandbox.resolve(&parent, true);
        let Ok(entries) = fs::read_dir(&parent) else {
            return false;
        };
        entries.flatten().any(|entry| {
            let Ok(file_type) = entry.file_type() else {
                return false;
            };
            let is_dir = if file_type.is_symlink() {
                entry.path().is_dir()
            } else {
                file_type.is_dir()
            };
            is_dir == want_dir && entry.file_name().to_string_lossy().to_lowercase() == target
        })
    }

    fn exists_exact(&self, dir: &str, file: Option<&str>) -> bool {
        match file {
            None => Path::new(&self.sandbox.resolve(dir, true)).is_dir(),
            Some(file) => match self.sandbox.resolve_entry(dir, file) {
                Ok(path) => Path::new(&path).is_file(),
                Err(_) => false,
            },
        }
    }

    /// Files (not directories) of a directory, sorted by name.
    pub fn list_files(&mut self, dir: &str) -> Result<Vec<FileEntry>> {
        let path = self.sandbox.resolve(dir, true);
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(_) => {
                let message = self.messages.render(MessageKey::NotReadable, &escape(dir), Some(Label::Directory));
                return Err(self.fail(FileApiError::NotReadable(message)));
            }
        };

        let mut files = Vec::new();
        for entry in entries.flatten() {
            let entry_path = entry.path();
            let Ok(metadata) = fs::metadata(&entry_path) else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            files.push(FileEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                changed: metadata.ctime(),
                size: metadata.len(),
                mime: mime::detect(&entry_path).unwrap_or_else(|_| mime::OCTET_STREAM.to_string()),
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Size of a file in bytes.
    pub fn size(&mut self, path: &str) -> Result<u64> {
        let resolved = self.sandbox.resolve(path, false);
        match fs::metadata(&resolved) {
            Ok(metadata) if metadata.is_file() => Ok(metadata.len()),
            _ => Err(self.not_found(path, Label::File)),
        }
    }

    /// Content type of a file.
    pub fn mime(&mut self, path: &str) -> Result<String> {
        let resolved = self.sandbox.resolve(path, false);
        if !Path::new(&resolved).is_file() {
            return Err(self.not_found(path, Label::File));
        }
        Ok(mime::detect(&resolved)?)
    }

    /// Record an error as the last error and hand it back.
    ///
    /// Configuration errors are passed through unrecorded.
    pub(crate) fn fail(&mut self, err: FileApiError) -> FileApiError {
        if !err.is_configuration() {
            self.last_error = err.to_string();
        }
        err
    }

    pub(crate) fn not_found(&mut self, name: &str, label: Label) -> FileApiError {
        let message = self.messages.render(MessageKey::NotFound, &escape(name), Some(label));
        self.fail(FileApiError::NotFound(message))
    }

    /// Map a failed primitive to the given error, keeping fatal backend
    /// errors fatal.
    pub(crate) fn primitive_failed(
        &mut self,
        err: BackendError,
        operation: &str,
        build: impl FnOnce(&MessageCatalog) -> FileApiError,
    ) -> FileApiError {
        warn!(backend = self.backend.name(), operation, error = %err, "Primitive operation failed");
        match err {
            BackendError::Configuration(message) => FileApiError::Configuration(message),
            _ => {
                let mapped = build(&self.messages);
                self.fail(mapped)
            }
        }
    }
}
