//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fileapi::backend::{BackendError, RemoteSession, SessionConnector, TransferMode};
use fileapi::config::RemoteConfig;
use fileapi::{FileApi, LocalBackend, RemoteBackend};
use tempfile::TempDir;

/// A 1x1 transparent GIF.
pub const GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0xff, 0xff, 0xff,
    0x00, 0x00, 0x00, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

pub type CommandLog = Arc<Mutex<Vec<String>>>;

/// FTP session that applies commands to a local directory.
pub struct MirrorSession {
    base: PathBuf,
    log: CommandLog,
}

impl MirrorSession {
    fn local(&self, path: &str) -> PathBuf {
        self.base.join(path.trim_start_matches('/'))
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl RemoteSession for MirrorSession {
    fn make_dir(&mut self, path: &str) -> Result<(), BackendError> {
        self.record(format!("MKD {}", path));
        Ok(fs::create_dir(self.local(path))?)
    }

    fn chmod(&mut self, mode: u32, path: &str) -> Result<(), BackendError> {
        self.record(format!("SITE CHMOD {:o} {}", mode, path));
        Ok(())
    }

    fn remove_dir(&mut self, path: &str) -> Result<(), BackendError> {
        self.record(format!("RMD {}", path));
        Ok(fs::remove_dir(self.local(path))?)
    }

    fn delete(&mut self, path: &str) -> Result<(), BackendError> {
        self.record(format!("DELE {}", path));
        Ok(fs::remove_file(self.local(path))?)
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), BackendError> {
        self.record(format!("RNFR {} RNTO {}", from, to));
        Ok(fs::rename(self.local(from), self.local(to))?)
    }

    fn retrieve(&mut self, path: &str, mode: TransferMode) -> Result<Vec<u8>, BackendError> {
        self.record(format!("RETR {:?} {}", mode, path));
        Ok(fs::read(self.local(path))?)
    }

    fn store(&mut self, path: &str, mode: TransferMode, data: &mut dyn Read) -> Result<u64, BackendError> {
        self.record(format!("STOR {:?} {}", mode, path));
        let mut buffer = Vec::new();
        data.read_to_end(&mut buffer)?;
        fs::write(self.local(path), &buffer)?;
        Ok(buffer.len() as u64)
    }

    fn quit(&mut self) -> Result<(), BackendError> {
        self.record("QUIT".to_string());
        Ok(())
    }
}

/// Connector handing out [`MirrorSession`]s over one directory.
pub struct MirrorConnector {
    pub base: PathBuf,
    pub log: CommandLog,
}

impl SessionConnector for MirrorConnector {
    type Session = MirrorSession;

    fn connect(&self, _config: &RemoteConfig) -> Result<MirrorSession, BackendError> {
        Ok(MirrorSession {
            base: self.base.clone(),
            log: self.log.clone(),
        })
    }
}

/// Connector that always fails to log in.
pub struct RefusingConnector;

impl SessionConnector for RefusingConnector {
    type Session = MirrorSession;

    fn connect(&self, _config: &RemoteConfig) -> Result<MirrorSession, BackendError> {
        Err(BackendError::Configuration("FTP login failed.".to_string()))
    }
}

/// Build the standard fixture tree.
///
/// ```text
/// source/test.gif
/// source/empty/
/// source/case/alfa.txt
/// source/case/Abcď/
/// upload/fail/test.gif
/// ```
pub fn fixture() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path();
    fs::create_dir_all(base.join("source/empty")).unwrap();
    fs::create_dir_all(base.join("source/case/Abcď")).unwrap();
    fs::create_dir_all(base.join("upload/fail")).unwrap();
    fs::write(base.join("source/test.gif"), GIF).unwrap();
    fs::write(base.join("source/case/alfa.txt"), "alfa").unwrap();
    fs::write(base.join("upload/fail/test.gif"), GIF).unwrap();
    temp_dir
}

pub fn local_api(base: &Path) -> FileApi {
    FileApi::with_backend(base, Box::new(LocalBackend::new())).unwrap()
}

pub fn remote_api(base: &Path, log: CommandLog) -> FileApi {
    let connector = MirrorConnector {
        base: base.to_path_buf(),
        log,
    };
    let backend = RemoteBackend::with_connector(RemoteConfig::default(), connector);
    FileApi::with_backend(base, Box::new(backend)).unwrap()
}

/// Run a scenario once per backend, each on a fresh fixture.
pub fn each_backend(scenario: impl Fn(&mut FileApi, &Path)) {
    let temp_dir = fixture();
    let mut api = local_api(temp_dir.path());
    scenario(&mut api, temp_dir.path());

    let temp_dir = fixture();
    let mut api = remote_api(temp_dir.path(), CommandLog::default());
    scenario(&mut api, temp_dir.path());
}

pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}
