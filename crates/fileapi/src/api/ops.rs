//! Composed file and directory operations.
//!
//! Preconditions (existence, rights, naming) are checked before any backend
//! primitive runs; a failing primitive is mapped to the matching `Not*`
//! error.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::FileApi;
use crate::backend::CopySource;
use crate::error::{FileApiError, Result};
use crate::messages::{escape, Label, MessageKey};
use crate::sandbox::validate_file_name;

/// Which primitive a copy-or-move runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Copy,
    Move,
}

impl FileApi {
    /// Create a directory and every missing ancestor.
    ///
    /// Segments are created in order, each after a writability check on its
    /// parent. The first failure stops the walk; segments created so far
    /// are kept, so a retry resumes where it stopped.
    pub fn create_directory(&mut self, dir: &str) -> Result<()> {
        let resolved = self.sandbox.resolve(dir, true);
        if Path::new(&resolved).is_dir() {
            return Ok(());
        }
        let relative = self.sandbox.strip(&resolved).to_string();

        let mut way = String::new();
        for segment in relative.split('/').filter(|s| !s.is_empty()) {
            let next = format!("{}{}/", way, segment);
            if !Path::new(&self.sandbox.resolve(&next, true)).is_dir() {
                if !self.backend.writable(&self.sandbox, &way) {
                    let target = format!("{}{}", self.sandbox.current(), way);
                    let message = self.messages.render(MessageKey::NoRights, &escape(&target), None);
                    return Err(self.fail(FileApiError::NoRights(message)));
                }
                if let Err(e) = self.backend.make_directory(&self.sandbox, &next) {
                    let name = escape(segment);
                    return Err(self.primitive_failed(e, "make_directory", |m| {
                        FileApiError::General(m.render(MessageKey::GeneralError, &name, None))
                    }));
                }
                debug!(dir = %next, "Created directory");
            }
            way = next;
        }
        Ok(())
    }

    /// Create a file with the given content.
    ///
    /// Fails when the name is empty, or when the file exists and `replace`
    /// is false. The directory is created first if needed.
    pub fn create_file(&mut self, dir: &str, file: &str, data: &[u8], replace: bool) -> Result<()> {
        if file.is_empty() || (!replace && self.exists(dir, Some(file), false)) {
            let message = self.messages.render(MessageKey::Exist, &escape(file), Some(Label::File));
            return Err(self.fail(FileApiError::AlreadyExists(message)));
        }
        self.check_name(file)?;
        self.create_directory(dir)?;

        if !self.backend.writable(&self.sandbox, dir) {
            return Err(self.no_rights(dir));
        }

        if let Err(e) = self.backend.write_file(&self.sandbox, dir, file, data) {
            let name = escape(file);
            return Err(self.primitive_failed(e, "write_file", |m| {
                FileApiError::General(m.render(MessageKey::GeneralError, &name, None))
            }));
        }
        Ok(())
    }

    /// Delete a file, or an empty directory when `file` is `None`.
    pub fn delete(&mut self, dir: &str, file: Option<&str>) -> Result<()> {
        let file = file.filter(|f| !f.is_empty());
        let label = Label::for_entry(file);
        let shown = file.unwrap_or(dir);

        if !self.exists(dir, file, false) {
            return Err(self.not_found(shown, label));
        }

        match file {
            None => {
                let path = self.sandbox.resolve(dir, true);
                let mut entries = match fs::read_dir(&path) {
                    Ok(entries) => entries,
                    Err(_) => {
                        let message = self.messages.render(MessageKey::NotReadable, &escape(dir), Some(label));
                        return Err(self.fail(FileApiError::NotReadable(message)));
                    }
                };
                if entries.next().is_some() {
                    let message = self.messages.render(MessageKey::NotEmpty, &escape(dir), Some(label));
                    return Err(self.fail(FileApiError::NotEmpty(message)));
                }
                drop(entries);

                if let Err(e) = self.backend.remove_directory(&self.sandbox, dir) {
                    let name = escape(dir);
                    return Err(self.primitive_failed(e, "remove_directory", |m| {
                        FileApiError::NotDeleted(m.render(MessageKey::NotDelete, &name, Some(label)))
                    }));
                }
            }
            Some(name) => {
                if let Err(e) = self.backend.remove_file(&self.sandbox, dir, name) {
                    let name = escape(name);
                    return Err(self.primitive_failed(e, "remove_file", |m| {
                        FileApiError::NotDeleted(m.render(MessageKey::NotDelete, &name, Some(label)))
                    }));
                }
            }
        }
        Ok(())
    }

    /// Copy a file, or create a directory's counterpart when no names are
    /// given.
    ///
    /// The destination name defaults to the source name. A directory cannot
    /// be copied under a file name; that fails with `NotCopied` and leaves
    /// both trees untouched.
    pub fn copy(&mut self, src_dir: &str, dst_dir: &str, src_file: Option<&str>, dst_file: Option<&str>) -> Result<()> {
        self.process_action(Action::Copy, src_dir, dst_dir, src_file, dst_file)
    }

    /// Move a file or a whole directory.
    ///
    /// The destination name defaults to the source name.
    pub fn move_entry(
        &mut self,
        src_dir: &str,
        dst_dir: &str,
        src_file: Option<&str>,
        dst_file: Option<&str>,
    ) -> Result<()> {
        self.process_action(Action::Move, src_dir, dst_dir, src_file, dst_file)
    }

    /// Rename a file within its directory.
    pub fn rename(&mut self, dir: &str, old: &str, new: &str) -> Result<()> {
        if new.is_empty() {
            let message = self.messages.render(MessageKey::NoName, "", None);
            return Err(self.fail(FileApiError::NoName(message)));
        }
        if !self.exists(dir, Some(old), false) {
            return Err(self.not_found(old, Label::File));
        }
        self.check_name(new)?;
        if self.exists(dir, Some(new), false) || self.exists(&format!("{}/{}", dir.trim_end_matches('/'), new), None, false) {
            let message = self.messages.render(MessageKey::Exist, &escape(new), Some(Label::File));
            return Err(self.fail(FileApiError::AlreadyExists(message)));
        }

        if let Err(e) = self.backend.rename_or_move(&self.sandbox, dir, dir, old, new) {
            let name = escape(old);
            return Err(self.primitive_failed(e, "rename", |m| {
                FileApiError::NotRenamed(m.render(MessageKey::NotRename, &name, Some(Label::File)))
            }));
        }
        Ok(())
    }

    /// Shared copy/move state machine: verify source, verify destination is
    /// absent, ensure destination directory, run the primitive.
    fn process_action(
        &mut self,
        action: Action,
        src_dir: &str,
        dst_dir: &str,
        src_file: Option<&str>,
        dst_file: Option<&str>,
    ) -> Result<()> {
        let src_file = src_file.filter(|f| !f.is_empty());
        let dst_file = dst_file.filter(|f| !f.is_empty()).or(src_file);

        if !self.exists(src_dir, src_file, false) {
            return Err(self.not_found(src_file.unwrap_or(src_dir), Label::for_entry(src_file)));
        }
        if self.exists(dst_dir, dst_file, false) {
            let message = self.messages.render(
                MessageKey::Exist,
                &escape(dst_file.unwrap_or(dst_dir)),
                Some(Label::for_entry(dst_file)),
            );
            return Err(self.fail(FileApiError::AlreadyExists(message)));
        }
        if let Some(name) = dst_file {
            self.check_name(name)?;
        }

        let label = Label::for_entry(src_file);
        let shown = escape(src_file.unwrap_or(src_dir));
        let result = match (action, src_file, dst_file) {
            (Action::Copy, Some(src), Some(dst)) => {
                self.create_directory(dst_dir)?;
                self.backend.copy_one(
                    &self.sandbox,
                    CopySource::Sandboxed { dir: src_dir, file: src },
                    dst_dir,
                    dst,
                )
            }
            // a directory copy is satisfied by creating the destination
            (Action::Copy, _, None) => return self.create_directory(dst_dir),
            // a directory cannot be copied onto a file name
            (Action::Copy, None, Some(_)) => {
                let message = self.messages.render(MessageKey::NotCopy, &shown, Some(label));
                return Err(self.fail(FileApiError::NotCopied(message)));
            }
            (Action::Move, _, _) => {
                match src_file {
                    Some(_) => self.create_directory(dst_dir)?,
                    None => self.create_directory(&parent_of(dst_dir))?,
                }
                self.backend.rename_or_move(
                    &self.sandbox,
                    src_dir,
                    dst_dir,
                    src_file.unwrap_or(""),
                    dst_file.unwrap_or(""),
                )
            }
        };

        if let Err(e) = result {
            return Err(match action {
                Action::Copy => self.primitive_failed(e, "copy", |m| {
                    FileApiError::NotCopied(m.render(MessageKey::NotCopy, &shown, Some(label)))
                }),
                Action::Move => self.primitive_failed(e, "move", |m| {
                    FileApiError::NotMoved(m.render(MessageKey::NotMove, &shown, Some(label)))
                }),
            });
        }
        Ok(())
    }

    pub(crate) fn no_rights(&mut self, dir: &str) -> FileApiError {
        let target = self.sandbox.resolve(dir, true);
        let message = self.messages.render(MessageKey::NoRights, &escape(&target), None);
        self.fail(FileApiError::NoRights(message))
    }

    pub(crate) fn check_name(&mut self, file: &str) -> Result<()> {
        validate_file_name(file).map_err(|_| self.fail(FileApiError::PathTraversal(file.to_string())))
    }
}

/// Parent of a directory path, `""` for a top-level directory.
fn parent_of(dir: &str) -> String {
    let trimmed = dir.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(pos) => trimmed[..=pos].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileApi) {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        fs::create_dir_all(base.join("source")).unwrap();
        fs::create_dir_all(base.join("upload/fail")).unwrap();
        fs::write(base.join("source/test.gif"), "gif").unwrap();
        fs::write(base.join("upload/fail/test.gif"), "gif").unwrap();
        let api = FileApi::new(base).unwrap();
        (temp_dir, api)
    }

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("a/b/c"), "a/b/");
        assert_eq!(parent_of("a/b/"), "a/");
        assert_eq!(parent_of("testb"), "");
    }

    #[test]
    fn test_create_directory_nested() {
        let (temp_dir, mut api) = setup();
        api.create_directory("a/b/c").unwrap();
        assert!(temp_dir.path().join("a/b/c").is_dir());

        // existing directories are fine
        api.create_directory("a/b/c/").unwrap();
        api.create_directory("").unwrap();
    }

    #[test]
    fn test_create_directory_blocked_by_file() {
        let (temp_dir, mut api) = setup();
        fs::write(temp_dir.path().join("blocker"), "x").unwrap();

        let err = api.create_directory("blocker/sub").unwrap_err();
        assert!(matches!(err, FileApiError::General(_)));
        assert_eq!(api.last_error(), "General error: &#039;blocker&#039;");
    }

    #[test]
    fn test_create_file_exists() {
        let (_temp_dir, mut api) = setup();
        assert!(api.create_file("upload/fail/", "test.gif", b"test", false).is_err());
        assert_eq!(api.last_error(), "File &#039;test.gif&#039; already exists.");

        assert!(api.create_file("upload/", "", b"test", true).is_err());
        assert_eq!(api.last_error(), "File &#039;&#039; already exists.");
    }

    #[test]
    fn test_create_file_replace() {
        let (temp_dir, mut api) = setup();
        api.create_file("upload/fail/", "test.gif", b"new", true).unwrap();
        assert_eq!(fs::read(temp_dir.path().join("upload/fail/test.gif")).unwrap(), b"new");
    }

    #[test]
    fn test_create_file_rejects_path_in_name() {
        let (_temp_dir, mut api) = setup();
        let err = api.create_file("", "../escape.txt", b"x", false).unwrap_err();
        assert!(matches!(err, FileApiError::PathTraversal(_)));
    }

    #[test]
    fn test_delete_messages() {
        let (_temp_dir, mut api) = setup();

        assert!(api.delete("upload/fail/", None).is_err());
        assert_eq!(api.last_error(), "Directory &#039;upload/fail/&#039; is not empty.");

        assert!(api.delete("nothing/", None).is_err());
        assert_eq!(api.last_error(), "Directory &#039;nothing/&#039; not found.");

        assert!(api.delete("upload/", Some("none.gif")).is_err());
        assert_eq!(api.last_error(), "File &#039;none.gif&#039; not found.");
    }

    #[test]
    fn test_delete_file_and_directory() {
        let (temp_dir, mut api) = setup();
        api.delete("upload/fail/", Some("test.gif")).unwrap();
        api.delete("upload/fail/", None).unwrap();
        assert!(!temp_dir.path().join("upload/fail").exists());
    }

    #[test]
    fn test_rename_failures() {
        let (_temp_dir, mut api) = setup();

        assert!(matches!(api.rename("test", "test", ""), Err(FileApiError::NoName(_))));
        assert_eq!(api.last_error(), "No new name was entered.");

        assert!(api.rename("failto", "failto", "nonexistent").is_err());
        assert_eq!(api.last_error(), "File &#039;failto&#039; not found.");
    }

    #[test]
    fn test_rename_onto_existing() {
        let (temp_dir, mut api) = setup();
        fs::write(temp_dir.path().join("upload/fail/other.gif"), "x").unwrap();

        assert!(matches!(
            api.rename("upload/fail/", "test.gif", "other.gif"),
            Err(FileApiError::AlreadyExists(_))
        ));
        assert_eq!(api.last_error(), "File &#039;other.gif&#039; already exists.");
        assert_eq!(fs::read_to_string(temp_dir.path().join("upload/fail/other.gif")).unwrap(), "x");
    }

    #[test]
    fn test_move_failures() {
        let (_temp_dir, mut api) = setup();

        assert!(api.move_entry("", "upload/", Some("failto"), None).is_err());
        assert_eq!(api.last_error(), "File &#039;failto&#039; not found.");

        assert!(api.move_entry("source/", "upload/fail/", Some("test.gif"), None).is_err());
        assert_eq!(api.last_error(), "File &#039;test.gif&#039; already exists.");

        assert!(api.move_entry("upload/", "upload", None, None).is_err());
        assert_eq!(api.last_error(), "Directory &#039;upload&#039; already exists.");
    }

    #[test]
    fn test_copy_failures() {
        let (_temp_dir, mut api) = setup();

        assert!(api.copy("", "upload/", Some("failto"), None).is_err());
        assert_eq!(api.last_error(), "File &#039;failto&#039; not found.");

        assert!(api.copy("source/", "upload/fail/", Some("test.gif"), None).is_err());
        assert_eq!(api.last_error(), "File &#039;test.gif&#039; already exists.");

        assert!(api.copy("upload/", "upload", None, None).is_err());
        assert_eq!(api.last_error(), "Directory &#039;upload&#039; already exists.");
    }

    #[test]
    fn test_move_directory_into_new_parent() {
        let (temp_dir, mut api) = setup();
        api.create_directory("test").unwrap();
        fs::write(temp_dir.path().join("test/inner.txt"), "x").unwrap();

        api.move_entry("test", "deep/nested/testb", None, None).unwrap();

        assert!(!temp_dir.path().join("test").exists());
        assert!(temp_dir.path().join("deep/nested/testb/inner.txt").is_file());
    }

    #[test]
    fn test_copy_with_new_name() {
        let (temp_dir, mut api) = setup();
        api.copy("source/", "upload/", Some("test.gif"), Some("copy.gif")).unwrap();

        assert!(temp_dir.path().join("source/test.gif").is_file());
        assert_eq!(fs::read_to_string(temp_dir.path().join("upload/copy.gif")).unwrap(), "gif");
    }
}
