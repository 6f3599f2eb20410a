//! Error types for file operations.
//!
//! Every user-facing variant carries the message already rendered from the
//! [`MessageCatalog`](crate::messages::MessageCatalog), so `Display` is exactly
//! the text recorded as the API's last error.

use std::io;

use thiserror::Error;

/// Errors returned by [`FileApi`](crate::FileApi) operations.
#[derive(Debug, Error)]
pub enum FileApiError {
    /// File or directory does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Destination already exists, or an empty file name was given.
    #[error("{0}")]
    AlreadyExists(String),

    /// Directory still has entries.
    #[error("{0}")]
    NotEmpty(String),

    /// Directory listing could not be opened.
    #[error("{0}")]
    NotReadable(String),

    /// Target directory is not writable.
    #[error("{0}")]
    NoRights(String),

    /// Rename was requested without a new name.
    #[error("{0}")]
    NoName(String),

    /// Rename primitive failed.
    #[error("{0}")]
    NotRenamed(String),

    /// Copy primitive failed.
    #[error("{0}")]
    NotCopied(String),

    /// Move primitive failed.
    #[error("{0}")]
    NotMoved(String),

    /// Delete primitive failed.
    #[error("{0}")]
    NotDeleted(String),

    /// Upload record is missing, oversized, partial or otherwise rejected.
    #[error("{0}")]
    UploadInvalid(String),

    /// Catch-all for write and ingestion failures.
    #[error("{0}")]
    General(String),

    /// HTTP transport returned an error status.
    #[error("{message}")]
    RemoteTransport { code: u16, message: String },

    /// Range header used an unsupported unit.
    #[error("{0}")]
    RangeNotSatisfiable(String),

    /// A file name tried to leave its directory.
    #[error("invalid path component: {0}")]
    PathTraversal(String),

    /// A synthetic upload record would overwrite an existing one.
    #[error("{0}")]
    DuplicateInput(String),

    /// Upload table has no record at the requested input or slot.
    #[error("upload record not found: {0}")]
    UploadSlotMissing(String),

    /// Size string could not be parsed.
    #[error("invalid size: {0}")]
    InvalidSize(String),

    /// Construction or remote session setup failed. Never recorded as the
    /// last error.
    #[error("{0}")]
    Configuration(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FileApiError {
    /// Returns true for errors that signal an unusable instance rather than
    /// a failed operation.
    pub fn is_configuration(&self) -> bool {
        matches!(self, FileApiError::Configuration(_))
    }
}

/// Result type alias for file operations.
pub type Result<T> = std::result::Result<T, FileApiError>;
