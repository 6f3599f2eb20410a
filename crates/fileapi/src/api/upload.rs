//! Upload validation and ingestion.

use std::fs;
use std::path::Path;

use super::FileApi;
use crate::backend::CopySource;
use crate::error::{FileApiError, Result};
use crate::messages::{escape, MessageKey};
use crate::mime;
use crate::upload::{UploadField, UploadSource, UploadStatus, UploadValue};

impl FileApi {
    /// Check the status of an upload record.
    ///
    /// A missing record counts as "no file". With `empty_ok`, "no file" is
    /// accepted.
    pub fn is_upload(&mut self, source: &dyn UploadSource, input: &str, slot: Option<u32>, empty_ok: bool) -> Result<()> {
        let status = source
            .get(input, UploadField::Error, slot)
            .and_then(UploadValue::as_number)
            .map(UploadStatus::from_code)
            .unwrap_or(UploadStatus::NoFile);
        let name = source
            .get(input, UploadField::Name, slot)
            .and_then(UploadValue::as_text)
            .unwrap_or_default();

        let message = match status {
            UploadStatus::Ok => return Ok(()),
            UploadStatus::NoFile if empty_ok => return Ok(()),
            UploadStatus::NoFile => self.messages.render(MessageKey::NoUpload, "", None),
            UploadStatus::IniSize | UploadStatus::FormSize => {
                self.messages.render(MessageKey::UploadMaxSize, &escape(name), None)
            }
            UploadStatus::Partial => self.messages.render(MessageKey::UploadStopped, &escape(name), None),
            UploadStatus::Other(code) => {
                self.messages.render_code(MessageKey::UploadError, &escape(name), code, None)
            }
        };
        Err(self.fail(FileApiError::UploadInvalid(message)))
    }

    /// Ingest an uploaded file into `dir`.
    ///
    /// The stored name defaults to the record's name. With `copy` the
    /// temporary file is duplicated and kept; otherwise it is consumed.
    pub fn upload(
        &mut self,
        source: &dyn UploadSource,
        input: &str,
        slot: Option<u32>,
        dir: &str,
        file: Option<&str>,
        copy: bool,
    ) -> Result<()> {
        self.is_upload(source, input, slot, false)?;
        let record = match source.record(input, slot) {
            Some(record) => record,
            None => {
                let key = match slot {
                    Some(slot) => format!("{}[{}]", input, slot),
                    None => input.to_string(),
                };
                return Err(self.fail(FileApiError::UploadSlotMissing(key)));
            }
        };

        let file = file
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| record.name.clone());
        self.check_name(&file)?;

        if !self.backend.writable(&self.sandbox, dir) {
            return Err(self.no_rights(dir));
        }

        let result = if copy {
            self.backend
                .copy_one(&self.sandbox, CopySource::External(&record.tmp_name), dir, &file)
        } else {
            self.backend
                .relocate_upload(&self.sandbox, &record.tmp_name, dir, &file, &record.mime_type)
        };

        if let Err(e) = result {
            let detail = escape(&format!("{}, {}{}", record.tmp_name.display(), dir, file));
            return Err(self.primitive_failed(e, "upload", |m| {
                FileApiError::General(m.render(MessageKey::GeneralError, &detail, None))
            }));
        }
        Ok(())
    }

    /// Register an existing file as a successful upload.
    ///
    /// Size and content type are read from `tmp`. Fails when a record
    /// already exists at the input and slot, or when the input holds an
    /// unslotted record and a slot is requested.
    pub fn fake_upload(
        &mut self,
        table: &mut dyn UploadSource,
        input: &str,
        tmp: &Path,
        name: &str,
        slot: Option<u32>,
    ) -> Result<()> {
        let taken = match (table.field(input, UploadField::Name), slot) {
            (Some(UploadValue::Slots(slots)), Some(slot)) => slots.contains_key(&slot),
            (Some(_), _) => true,
            (None, _) => false,
        };
        if taken {
            let message = self.messages.render(MessageKey::InputExists, "", None);
            return Err(self.fail(FileApiError::DuplicateInput(message)));
        }

        let (mime_type, size) = match (mime::detect(tmp), fs::metadata(tmp)) {
            (Ok(mime_type), Ok(metadata)) => (mime_type, metadata.len()),
            _ => return Err(self.not_found(&tmp.to_string_lossy(), crate::messages::Label::File)),
        };

        table.set(input, UploadField::Name, name.into(), slot);
        table.set(input, UploadField::Type, mime_type.into(), slot);
        table.set(input, UploadField::TmpName, tmp.to_string_lossy().to_string().into(), slot);
        table.set(input, UploadField::Error, UploadStatus::Ok.code().into(), slot);
        table.set(input, UploadField::Size, (size as i64).into(), slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::{UploadRecord, UploadTable};
    use std::path::PathBuf;
    use tempfile::TempDir;

    const GIF: &[u8] = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";

    fn setup() -> (TempDir, FileApi, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        fs::create_dir_all(base.join("source")).unwrap();
        fs::create_dir_all(base.join("upload")).unwrap();
        let gif = base.join("source/test.gif");
        fs::write(&gif, GIF).unwrap();
        let api = FileApi::new(base).unwrap();
        (temp_dir, api, gif)
    }

    fn record(tmp: &Path, code: i64) -> UploadRecord {
        UploadRecord {
            name: "test.gif".to_string(),
            mime_type: "image/gif".to_string(),
            tmp_name: tmp.to_path_buf(),
            status: UploadStatus::from_code(code),
            size: 79,
        }
    }

    #[test]
    fn test_is_upload_statuses() {
        let (_temp_dir, mut api, gif) = setup();
        let mut table = UploadTable::new();

        let cases = [
            (1, "File &#039;test.gif&#039; has exceeded the maximum size."),
            (2, "File &#039;test.gif&#039; has exceeded the maximum size."),
            (3, "Upload of file &#039;test.gif&#039; has been stopped."),
            (4, "No file to upload was specified."),
            (5, "Unable to upload file &#039;test.gif&#039; (error 5)."),
        ];

        table.insert_record("test", &record(&gif, 0), Some(0));
        assert!(api.is_upload(&table, "test", Some(0), false).is_ok());

        for (code, expected) in cases {
            table.insert_record("test", &record(&gif, code), Some(0));
            let err = api.is_upload(&table, "test", Some(0), false).unwrap_err();
            assert!(matches!(err, FileApiError::UploadInvalid(_)));
            assert_eq!(api.last_error(), expected);
        }

        table.insert_record("test", &record(&gif, 4), Some(0));
        assert!(api.is_upload(&table, "test", Some(0), true).is_ok());
    }

    #[test]
    fn test_is_upload_missing_record() {
        let (_temp_dir, mut api, _gif) = setup();
        let table = UploadTable::new();

        assert!(api.is_upload(&table, "none", None, true).is_ok());
        assert!(api.is_upload(&table, "none", None, false).is_err());
        assert_eq!(api.last_error(), "No file to upload was specified.");
    }

    #[test]
    fn test_upload_stopped() {
        let (_temp_dir, mut api, gif) = setup();
        let mut table = UploadTable::new();
        let mut rec = record(&gif, 3);
        rec.name = "mask_01.gif".to_string();
        table.insert_record("from", &rec, Some(0));

        assert!(api.upload(&table, "from", Some(0), "upload/", None, false).is_err());
        assert_eq!(api.last_error(), "Upload of file &#039;mask_01.gif&#039; has been stopped.");
    }

    #[test]
    fn test_upload_copy_keeps_source() {
        let (temp_dir, mut api, gif) = setup();
        let mut table = UploadTable::new();
        table.insert_record("from", &record(&gif, 0), Some(0));

        api.upload(&table, "from", Some(0), "upload/", Some("target.gif"), true)
            .unwrap();

        assert!(gif.exists());
        assert_eq!(fs::read(temp_dir.path().join("upload/target.gif")).unwrap(), GIF);
    }

    #[test]
    fn test_upload_move_consumes_source() {
        let (temp_dir, mut api, gif) = setup();
        let mut table = UploadTable::new();
        table.insert("from", &record(&gif, 0));

        api.upload(&table, "from", None, "upload/", None, false).unwrap();

        assert!(!gif.exists());
        assert!(temp_dir.path().join("upload/test.gif").is_file());
    }

    #[test]
    fn test_upload_missing_temp_file() {
        let (temp_dir, mut api, _gif) = setup();
        let mut table = UploadTable::new();
        table.insert_record("from", &record(Path::new("/fail/none.gif"), 0), Some(0));

        let err = api
            .upload(&table, "from", Some(0), "upload/", Some("target.gif"), true)
            .unwrap_err();

        assert!(matches!(err, FileApiError::General(_)));
        assert_eq!(api.last_error(), "General error: &#039;/fail/none.gif, upload/target.gif&#039;");
        assert!(!temp_dir.path().join("upload/target.gif").exists());
    }

    #[test]
    fn test_upload_into_missing_directory() {
        let (_temp_dir, mut api, gif) = setup();
        let mut table = UploadTable::new();
        table.insert("from", &record(&gif, 0));

        let err = api.upload(&table, "from", None, "nowhere/", None, true).unwrap_err();
        assert!(matches!(err, FileApiError::NoRights(_)));
        assert!(api.last_error().starts_with("You do not have write rights to: &#039;"));
    }

    #[test]
    fn test_fake_upload() {
        let (_temp_dir, mut api, gif) = setup();
        let mut table = UploadTable::new();

        api.fake_upload(&mut table, "fake", &gif, "test.gif", None).unwrap();
        let rec = table.record("fake", None).unwrap();
        assert_eq!(rec.name, "test.gif");
        assert_eq!(rec.mime_type, "image/gif");
        assert_eq!(rec.tmp_name, gif);
        assert_eq!(rec.status, UploadStatus::Ok);
        assert_eq!(rec.size, GIF.len() as u64);

        api.fake_upload(&mut table, "fake2", &gif, "test.gif", Some(1)).unwrap();
        assert_eq!(table.record("fake2", Some(1)).unwrap().name, "test.gif");
    }

    #[test]
    fn test_fake_upload_duplicate() {
        let (_temp_dir, mut api, gif) = setup();
        let mut table = UploadTable::new();
        api.fake_upload(&mut table, "fake", &gif, "test.gif", Some(0)).unwrap();

        let err = api.fake_upload(&mut table, "fake", &gif, "other.gif", Some(0)).unwrap_err();
        assert!(matches!(err, FileApiError::DuplicateInput(_)));
        assert_eq!(api.last_error(), "File input already exists.");

        // another slot of the same input is free
        api.fake_upload(&mut table, "fake", &gif, "other.gif", Some(1)).unwrap();
    }

    #[test]
    fn test_fake_upload_slot_over_flat_record() {
        let (_temp_dir, mut api, gif) = setup();
        let mut table = UploadTable::new();
        api.fake_upload(&mut table, "fake", &gif, "test.gif", None).unwrap();

        let err = api.fake_upload(&mut table, "fake", &gif, "other.gif", Some(1)).unwrap_err();
        assert!(matches!(err, FileApiError::DuplicateInput(_)));
        assert_eq!(table.record("fake", None).unwrap().name, "test.gif");
        assert!(table.record("fake", Some(1)).is_none());
    }

    #[test]
    fn test_synthetic_upload_behaves_like_real() {
        let (temp_dir, mut api, gif) = setup();
        let mut table = UploadTable::new();
        api.fake_upload(&mut table, "fake", &gif, "fake.gif", None).unwrap();

        api.upload(&table, "fake", None, "upload/", None, true).unwrap();
        assert_eq!(fs::read(temp_dir.path().join("upload/fake.gif")).unwrap(), GIF);
    }
}
