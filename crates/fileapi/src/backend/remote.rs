//! FTP backend.
//!
//! The remote directory configured as `remote.root` mirrors the sandbox root,
//! so a virtual path maps to `remote.root + (path relative to root)`. Reads
//! (existence checks, listings, downloads) go through the local view of the
//! root; only mutations are sent to the server.
//!
//! The session is opened lazily on the first mutation and closed when the
//! backend is dropped. A failed connect or login is fatal for the instance.

use std::fs::File;
use std::io::{Cursor, Read};
use std::net::ToSocketAddrs;
use std::path::Path;
use std::time::Duration;

use suppaftp::types::{FileType, FormatControl};
use suppaftp::{FtpError, FtpStream, Mode};
use tracing::{debug, info, warn};

use super::{BackendError, CopySource, StorageBackend, TransferMode};
use crate::config::RemoteConfig;
use crate::mime;
use crate::sandbox::{validate_file_name, PathSandbox};

/// Message used for every connect or login failure.
pub const LOGIN_FAILED: &str = "FTP login failed.";

/// Permissions applied to directories created on the server.
const REMOTE_DIRECTORY_MODE: u32 = 0o777;

/// Commands the remote backend needs from a server session.
pub trait RemoteSession: Send {
    fn make_dir(&mut self, path: &str) -> Result<(), BackendError>;
    fn chmod(&mut self, mode: u32, path: &str) -> Result<(), BackendError>;
    fn remove_dir(&mut self, path: &str) -> Result<(), BackendError>;
    fn delete(&mut self, path: &str) -> Result<(), BackendError>;
    fn rename(&mut self, from: &str, to: &str) -> Result<(), BackendError>;
    fn retrieve(&mut self, path: &str, mode: TransferMode) -> Result<Vec<u8>, BackendError>;
    fn store(&mut self, path: &str, mode: TransferMode, data: &mut dyn Read) -> Result<u64, BackendError>;
    fn quit(&mut self) -> Result<(), BackendError>;
}

/// Opens authenticated sessions.
pub trait SessionConnector: Send {
    type Session: RemoteSession;

    fn connect(&self, config: &RemoteConfig) -> Result<Self::Session, BackendError>;
}

/// Connector for real FTP servers.
#[derive(Debug, Default, Clone, Copy)]
pub struct FtpConnector;

/// Passive-mode FTP session.
pub struct FtpSession {
    stream: FtpStream,
}

fn remote_err(e: FtpError) -> BackendError {
    BackendError::Remote(e.to_string())
}

impl SessionConnector for FtpConnector {
    type Session = FtpSession;

    fn connect(&self, config: &RemoteConfig) -> Result<FtpSession, BackendError> {
        let login_failed = |reason: String| {
            warn!(host = %config.host, port = config.port, reason = %reason, "FTP connection failed");
            BackendError::Configuration(LOGIN_FAILED.to_string())
        };

        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| login_failed(e.to_string()))?
            .next()
            .ok_or_else(|| login_failed("host did not resolve".to_string()))?;

        let mut stream = FtpStream::connect_timeout(addr, Duration::from_secs(config.timeout_secs))
            .map_err(|e| login_failed(e.to_string()))?;
        stream
            .login(config.user.as_str(), config.password.as_str())
            .map_err(|e| login_failed(e.to_string()))?;
        stream.set_mode(Mode::Passive);

        Ok(FtpSession { stream })
    }
}

impl FtpSession {
    fn set_type(&mut self, mode: TransferMode) -> Result<(), BackendError> {
        let file_type = match mode {
            TransferMode::Ascii => FileType::Ascii(FormatControl::Default),
            TransferMode::Binary => FileType::Binary,
        };
        self.stream.transfer_type(file_type).map_err(remote_err)
    }
}

impl RemoteSession for FtpSession {
    fn make_dir(&mut self, path: &str) -> Result<(), BackendError> {
        self.stream.mkdir(path).map_err(remote_err)
    }

    fn chmod(&mut self, mode: u32, path: &str) -> Result<(), BackendError> {
        self.stream
            .site(format!("CHMOD {:o} {}", mode, path))
            .map(|_| ())
            .map_err(remote_err)
    }

    fn remove_dir(&mut self, path: &str) -> Result<(), BackendError> {
        self.stream.rmdir(path).map_err(remote_err)
    }

    fn delete(&mut self, path: &str) -> Result<(), BackendError> {
        self.stream.rm(path).map_err(remote_err)
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), BackendError> {
        self.stream.rename(from, to).map_err(remote_err)
    }

    fn retrieve(&mut self, path: &str, mode: TransferMode) -> Result<Vec<u8>, BackendError> {
        self.set_type(mode)?;
        let cursor = self.stream.retr_as_buffer(path).map_err(remote_err)?;
        Ok(cursor.into_inner())
    }

    fn store(&mut self, path: &str, mode: TransferMode, mut data: &mut dyn Read) -> Result<u64, BackendError> {
        self.set_type(mode)?;
        self.stream.put_file(path, &mut data).map_err(remote_err)
    }

    fn quit(&mut self) -> Result<(), BackendError> {
        self.stream.quit().map_err(remote_err)
    }
}

/// Backend sending mutations to an FTP server.
pub struct RemoteBackend<C: SessionConnector = FtpConnector> {
    config: RemoteConfig,
    connector: C,
    session: Option<C::Session>,
}

impl RemoteBackend<FtpConnector> {
    /// Create a backend for a real FTP server. No connection is made yet.
    pub fn new(config: RemoteConfig) -> Self {
        Self::with_connector(config, FtpConnector)
    }
}

impl<C: SessionConnector> RemoteBackend<C> {
    /// Create a backend using a custom session connector.
    pub fn with_connector(config: RemoteConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            session: None,
        }
    }

    /// Whether a session is currently open.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// The open session, connecting first if needed.
    pub fn connection(&mut self) -> Result<&mut C::Session, BackendError> {
        if self.session.is_none() {
            let session = self.connector.connect(&self.config)?;
            info!(host = %self.config.host, port = self.config.port, "FTP session opened");
            self.session = Some(session);
        }
        self.session
            .as_mut()
            .ok_or_else(|| BackendError::Configuration(LOGIN_FAILED.to_string()))
    }

    /// Remote path of a directory, without trailing separator.
    fn remote_dir(&self, sandbox: &PathSandbox, dir: &str) -> String {
        let local = sandbox.resolve(dir, true);
        let path = format!("{}{}", self.remote_root(), sandbox.relative_to_root(&local));
        match path.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        }
    }

    /// Remote path of a file, or of a directory when `file` is empty.
    fn remote_entry(&self, sandbox: &PathSandbox, dir: &str, file: &str) -> Result<String, BackendError> {
        if file.is_empty() {
            return Ok(self.remote_dir(sandbox, dir));
        }
        validate_file_name(file)?;
        let local = sandbox.resolve(dir, true);
        Ok(format!(
            "{}{}{}",
            self.remote_root(),
            sandbox.relative_to_root(&local),
            file
        ))
    }

    fn remote_root(&self) -> String {
        if self.config.root.ends_with('/') {
            self.config.root.clone()
        } else {
            format!("{}/", self.config.root)
        }
    }

    /// Upload `data` under a temporary name, then rename it into place.
    fn store_replacing(&mut self, path: &str, mode: TransferMode, data: &mut dyn Read) -> Result<(), BackendError> {
        let temp_path = format!("{}.{:x}.part", path, rand::random::<u32>());
        let session = self.connection()?;
        session.store(&temp_path, mode, data)?;
        if let Err(e) = session.rename(&temp_path, path) {
            if let Err(cleanup) = session.delete(&temp_path) {
                warn!(path = %temp_path, error = %cleanup, "Failed to cleanup remote temp file");
            }
            return Err(e);
        }
        Ok(())
    }
}

impl<C: SessionConnector> StorageBackend for RemoteBackend<C> {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn writable(&mut self, _sandbox: &PathSandbox, _dir: &str) -> bool {
        // permissions are only known once the server rejects a command
        true
    }

    fn make_directory(&mut self, sandbox: &PathSandbox, dir: &str) -> Result<(), BackendError> {
        let path = self.remote_dir(sandbox, dir);
        debug!(path = %path, "MKD");
        let session = self.connection()?;
        session.make_dir(&path)?;
        if let Err(e) = session.chmod(REMOTE_DIRECTORY_MODE, &path) {
            warn!(path = %path, error = %e, "Failed to chmod remote directory");
        }
        Ok(())
    }

    fn remove_directory(&mut self, sandbox: &PathSandbox, dir: &str) -> Result<(), BackendError> {
        let path = self.remote_dir(sandbox, dir);
        debug!(path = %path, "RMD");
        self.connection()?.remove_dir(&path)
    }

    fn copy_one(
        &mut self,
        sandbox: &PathSandbox,
        source: CopySource<'_>,
        dest_dir: &str,
        dest_file: &str,
    ) -> Result<(), BackendError> {
        let dest = self.remote_entry(sandbox, dest_dir, dest_file)?;

        match source {
            CopySource::Sandboxed { dir, file } => {
                let local = sandbox.resolve_entry(dir, file)?;
                let mode = TransferMode::for_content_type(&mime::detect(&local).unwrap_or_default());
                let from = self.remote_entry(sandbox, dir, file)?;
                debug!(from = %from, to = %dest, "RETR/STOR copy");
                let data = self.connection()?.retrieve(&from, mode)?;
                self.store_replacing(&dest, mode, &mut Cursor::new(data))
            }
            CopySource::External(path) => {
                let mode = TransferMode::for_content_type(&mime::detect(path)?);
                debug!(from = ?path, to = %dest, "STOR copy");
                let mut reader = File::open(path)?;
                self.store_replacing(&dest, mode, &mut reader)
            }
        }
    }

    fn remove_file(&mut self, sandbox: &PathSandbox, dir: &str, file: &str) -> Result<(), BackendError> {
        let path = self.remote_entry(sandbox, dir, file)?;
        debug!(path = %path, "DELE");
        self.connection()?.delete(&path)
    }

    fn rename_or_move(
        &mut self,
        sandbox: &PathSandbox,
        src_dir: &str,
        dst_dir: &str,
        src_file: &str,
        dst_file: &str,
    ) -> Result<(), BackendError> {
        let from = self.remote_entry(sandbox, src_dir, src_file)?;
        let to = self.remote_entry(sandbox, dst_dir, dst_file)?;
        debug!(from = %from, to = %to, "RNFR/RNTO");
        self.connection()?.rename(&from, &to)
    }

    fn write_file(
        &mut self,
        sandbox: &PathSandbox,
        dir: &str,
        file: &str,
        data: &[u8],
    ) -> Result<(), BackendError> {
        let path = self.remote_entry(sandbox, dir, file)?;
        let mode = TransferMode::for_content_type(mime::detect_bytes(data));
        debug!(path = %path, size = data.len(), "STOR");
        self.store_replacing(&path, mode, &mut Cursor::new(data))
    }

    fn relocate_upload(
        &mut self,
        sandbox: &PathSandbox,
        tmp: &Path,
        dest_dir: &str,
        dest_file: &str,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let dest = self.remote_entry(sandbox, dest_dir, dest_file)?;
        let mode = TransferMode::for_content_type(content_type);
        debug!(from = ?tmp, to = %dest, "STOR upload");

        let mut reader = File::open(tmp)?;
        self.store_replacing(&dest, mode, &mut reader)?;
        drop(reader);

        if let Err(e) = std::fs::remove_file(tmp) {
            warn!(path = ?tmp, error = %e, "Failed to remove relocated upload");
        }
        Ok(())
    }
}

impl<C: SessionConnector> Drop for RemoteBackend<C> {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            match session.quit() {
                Ok(()) => info!("FTP session closed"),
                Err(e) => debug!(error = %e, "FTP quit failed"),
            }
        }
    }
}
