//! # FileApi Library
//!
//! Sandboxed file management over interchangeable storage backends.
//!
//! ## Overview
//!
//! A [`FileApi`] instance is confined to one root directory. Callers pass
//! root-relative paths; nothing they pass can resolve outside the root.
//! It provides:
//!
//! - **Path Sandboxing**: Root-bound resolution with working directory
//! - **File Operations**: Create, delete, copy, move, rename and list
//! - **Upload Ingestion**: Validation and storage of submitted files
//! - **Range Downloads**: HTTP `Range` parsing and chunked streaming
//! - **Storage Backends**: Local filesystem or a remote FTP server
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            FileApi                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐   │
//! │  │    Path      │  │   Message    │  │   Upload Table /     │   │
//! │  │   Sandbox    │  │   Catalog    │  │   Range Downloader   │   │
//! │  └──────────────┘  └──────────────┘  └──────────────────────┘   │
//! │                                                                 │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                 StorageBackend (trait)                     │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! │                                                                 │
//! │  ┌───────────────────┐  ┌───────────────────────────────────┐   │
//! │  │   LocalBackend    │  │     RemoteBackend (FTP)           │   │
//! │  └───────────────────┘  └───────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fileapi::FileApi;
//!
//! fn main() -> fileapi::Result<()> {
//!     let mut api = FileApi::new("/srv/files")?;
//!
//!     api.create_directory("reports/2024")?;
//!     api.create_file("reports/2024", "notes.txt", b"hello", false)?;
//!     api.rename("reports/2024", "notes.txt", "readme.txt")?;
//!
//!     for entry in api.list_files("reports/2024")? {
//!         println!("{} {}", entry.name, entry.size);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`api`]: The [`FileApi`] facade and its operations
//! - [`backend`]: Storage backend trait with local and FTP implementations
//! - [`sandbox`]: Root-bound path resolution
//! - [`upload`]: Upload records and the upload table
//! - [`download`]: Byte-range download streaming
//! - [`messages`]: User-facing message catalog
//! - [`units`]: Size strings, extensions and icons
//! - [`config`]: Configuration loading and defaults

pub mod api;
pub mod backend;
pub mod config;
pub mod download;
pub mod error;
pub mod messages;
pub mod mime;
pub mod sandbox;
pub mod units;
pub mod upload;

// Re-export the facade for convenience
pub use api::{FileApi, FileEntry, USER_AGENT};

// Re-export error types for convenience
pub use error::{FileApiError, Result};

// Re-export config types for convenience
pub use config::{BackendKind, Config, ConfigError};

// Re-export backend types for convenience
pub use backend::{BackendError, LocalBackend, RemoteBackend, StorageBackend};

// Re-export path types for convenience
pub use sandbox::{PathSandbox, SandboxError};

// Re-export upload types for convenience
pub use upload::{UploadField, UploadRecord, UploadSource, UploadStatus, UploadTable, UploadValue};

// Re-export download types for convenience
pub use download::{
    parse_range, BufferedResponse, ByteRange, DownloadOutcome, DownloadResponse, StreamResponse,
    DEFAULT_CHUNK_SIZE,
};

// Re-export message types for convenience
pub use messages::{Label, MessageCatalog, MessageKey};
