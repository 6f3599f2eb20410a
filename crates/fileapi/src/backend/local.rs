//! Local filesystem backend.

use std::fs::{self, DirBuilder, File};
use std::io::{self, Write};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::unistd::{access, AccessFlags};
use tracing::{debug, warn};

use super::{entry_path, BackendError, CopySource, StorageBackend};
use crate::sandbox::PathSandbox;

/// Mode for new directories, before the process umask.
pub const DIRECTORY_MODE: u32 = 0o777;

/// Backend operating directly on the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Unique hidden sibling name used for all-or-nothing writes.
fn temp_sibling(dest: &Path) -> PathBuf {
    let temp_filename = format!(
        ".upload_{:x}_{}.tmp",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos(),
        rand::random::<u32>()
    );
    dest.parent()
        .map(|parent| parent.join(&temp_filename))
        .unwrap_or_else(|| PathBuf::from(temp_filename))
}

/// Write `fill` into a temp sibling of `dest`, then rename it over `dest`.
fn write_atomic<F>(dest: &Path, fill: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let temp_path = temp_sibling(dest);
    let result = File::create(&temp_path)
        .and_then(|mut file| {
            fill(&mut file)?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&temp_path, dest));

    if result.is_err() && temp_path.exists() {
        if let Err(e) = fs::remove_file(&temp_path) {
            warn!(path = ?temp_path, error = %e, "Failed to cleanup temp file");
        }
    }
    result
}

impl StorageBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn writable(&mut self, sandbox: &PathSandbox, dir: &str) -> bool {
        let path = sandbox.resolve(dir, true);
        access(Path::new(&path), AccessFlags::W_OK).is_ok()
    }

    fn make_directory(&mut self, sandbox: &PathSandbox, dir: &str) -> Result<(), BackendError> {
        let path = sandbox.resolve(dir, true);
        debug!(path = %path, "mkdir");
        DirBuilder::new().mode(DIRECTORY_MODE).create(&path)?;
        Ok(())
    }

    fn remove_directory(&mut self, sandbox: &PathSandbox, dir: &str) -> Result<(), BackendError> {
        let path = sandbox.resolve(dir, true);
        debug!(path = %path, "rmdir");
        fs::remove_dir(&path)?;
        Ok(())
    }

    fn copy_one(
        &mut self,
        sandbox: &PathSandbox,
        source: CopySource<'_>,
        dest_dir: &str,
        dest_file: &str,
    ) -> Result<(), BackendError> {
        let source = match source {
            CopySource::Sandboxed { dir, file } => PathBuf::from(sandbox.resolve_entry(dir, file)?),
            CopySource::External(path) => path.to_path_buf(),
        };
        let dest = PathBuf::from(sandbox.resolve_entry(dest_dir, dest_file)?);
        debug!(from = ?source, to = ?dest, "copy");

        let mut reader = File::open(&source)?;
        write_atomic(&dest, |file| io::copy(&mut reader, file).map(|_| ()))?;
        Ok(())
    }

    fn remove_file(&mut self, sandbox: &PathSandbox, dir: &str, file: &str) -> Result<(), BackendError> {
        let path = sandbox.resolve_entry(dir, file)?;
        debug!(path = %path, "unlink");
        fs::remove_file(&path)?;
        Ok(())
    }

    fn rename_or_move(
        &mut self,
        sandbox: &PathSandbox,
        src_dir: &str,
        dst_dir: &str,
        src_file: &str,
        dst_file: &str,
    ) -> Result<(), BackendError> {
        let from = entry_path(sandbox, src_dir, src_file)?;
        let to = entry_path(sandbox, dst_dir, dst_file)?;
        debug!(from = %from, to = %to, "rename");
        fs::rename(&from, &to)?;
        Ok(())
    }

    fn write_file(
        &mut self,
        sandbox: &PathSandbox,
        dir: &str,
        file: &str,
        data: &[u8],
    ) -> Result<(), BackendError> {
        let dest = PathBuf::from(sandbox.resolve_entry(dir, file)?);
        debug!(path = ?dest, size = data.len(), "write");
        write_atomic(&dest, |f| f.write_all(data))?;
        Ok(())
    }

    fn relocate_upload(
        &mut self,
        sandbox: &PathSandbox,
        tmp: &Path,
        dest_dir: &str,
        dest_file: &str,
        _content_type: &str,
    ) -> Result<(), BackendError> {
        let dest = PathBuf::from(sandbox.resolve_entry(dest_dir, dest_file)?);
        debug!(from = ?tmp, to = ?dest, "relocate upload");

        match fs::rename(tmp, &dest) {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(Errno::EXDEV as i32) => {
                let mut reader = File::open(tmp)?;
                write_atomic(&dest, |file| io::copy(&mut reader, file).map(|_| ()))?;
                if let Err(e) = fs::remove_file(tmp) {
                    warn!(path = ?tmp, error = %e, "Failed to remove relocated upload");
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
