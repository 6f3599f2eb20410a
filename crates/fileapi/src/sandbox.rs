//! Root-bound virtual path resolution.
//!
//! Paths are handled as `/`-separated strings relative to the current working
//! directory. Resolution never yields a path above the root: every `../`
//! segment is collapsed before the path is joined with the current directory.

use std::path::Path;

use thiserror::Error;

/// Errors that can occur during path resolution.
#[derive(Debug, Error, PartialEq)]
pub enum SandboxError {
    /// Root directory does not exist.
    #[error("root directory not found: {0}")]
    RootNotFound(String),

    /// Target of a directory change does not exist.
    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    /// A single-segment name contained a separator or a dot reference.
    #[error("path traversal detected: {0}")]
    PathTraversal(String),
}

/// Virtual path resolver bound to a root directory.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSandbox {
    /// Absolute root, always ending with `/`.
    root: String,
    /// Working directory, always `root` or below it, always ending with `/`.
    current: String,
}

impl PathSandbox {
    /// Create a sandbox rooted at an existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let root = with_trailing_slash(&root.as_ref().to_string_lossy());
        if !Path::new(&root).is_dir() {
            return Err(SandboxError::RootNotFound(root));
        }
        Ok(Self {
            current: root.clone(),
            root,
        })
    }

    /// Root directory with trailing separator.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Current working directory with trailing separator.
    pub fn current(&self) -> &str {
        &self.current
    }

    /// Collapse every `../` reference until none is left.
    ///
    /// A `../` at the start or after a `/` becomes a single `/`. Names that
    /// merely start with two dots (`..x/`) are left alone.
    pub fn filter(path: &str) -> String {
        let mut current = path.to_string();
        loop {
            let next = strip_parent_refs(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    /// Normalize a caller-supplied path.
    ///
    /// Strips a leading `./`, appends `/` to non-empty directory paths and
    /// removes parent references.
    pub fn normalize(path: &str, is_dir: bool) -> String {
        let mut path = path.strip_prefix("./").unwrap_or(path).to_string();
        if path == "." || path == ".." {
            path.clear();
        }
        if is_dir && !path.is_empty() && !path.ends_with('/') {
            path.push('/');
        }
        let mut filtered = Self::filter(&path);
        // a trailing `..` without separator only occurs in file mode
        if filtered.ends_with("/..") {
            filtered.truncate(filtered.len() - 2);
        }
        filtered
    }

    /// Resolve a path against the current directory.
    ///
    /// Empty input yields the current directory. A path that already starts
    /// with the current directory is returned as is, so resolving twice is
    /// harmless.
    pub fn resolve(&self, path: &str, is_dir: bool) -> String {
        if path.is_empty() {
            return self.current.clone();
        }
        let normalized = Self::normalize(path, is_dir);
        if normalized.starts_with(&self.current) {
            normalized
        } else {
            format!("{}{}", self.current, normalized)
        }
    }

    /// Resolve a directory and append a single file name to it.
    pub fn resolve_entry(&self, dir: &str, file: &str) -> Result<String, SandboxError> {
        validate_file_name(file)?;
        Ok(format!("{}{}", self.resolve(dir, true), file))
    }

    /// Change the working directory, relative to the root.
    ///
    /// The working directory is left untouched when the target does not
    /// exist.
    pub fn change_directory(&mut self, path: &str) -> Result<(), SandboxError> {
        let target = format!("{}{}", self.root, Self::normalize(path, true));
        if !Path::new(&target).is_dir() {
            return Err(SandboxError::DirectoryNotFound(target));
        }
        self.current = target;
        Ok(())
    }

    /// Remove the current directory prefix, if present.
    pub fn strip<'a>(&self, path: &'a str) -> &'a str {
        path.strip_prefix(self.current.as_str()).unwrap_or(path)
    }

    /// Remove the root prefix, if present.
    pub fn relative_to_root<'a>(&self, path: &'a str) -> &'a str {
        path.strip_prefix(self.root.as_str()).unwrap_or(path)
    }
}

/// Reject names that are not a single path segment.
pub fn validate_file_name(file: &str) -> Result<(), SandboxError> {
    if file.contains('/') || file.contains('\0') || file == "." || file == ".." {
        return Err(SandboxError::PathTraversal(file.to_string()));
    }
    Ok(())
}

fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

/// One left-to-right pass replacing `(^|/)../` with `/`.
fn strip_parent_refs(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;

    if let Some(stripped) = rest.strip_prefix("../") {
        out.push('/');
        rest = stripped;
    }
    while let Some(idx) = rest.find("/../") {
        out.push_str(&rest[..idx]);
        out.push('/');
        rest = &rest[idx + 4..];
    }
    out.push_str(rest);
    out
}
