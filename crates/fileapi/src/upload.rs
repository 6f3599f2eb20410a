//! Upload records as submitted by an HTTP form.
//!
//! An [`UploadTable`] holds one entry per form input. Each input has five
//! fields (`name`, `type`, `tmp_name`, `error`, `size`); a field is either a
//! plain value or, for multi-file inputs, a map of numbered slots that may be
//! nested further.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::error::{FileApiError, Result};

/// Field of an upload record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UploadField {
    Name,
    Type,
    TmpName,
    Error,
    Size,
}

impl UploadField {
    pub const ALL: [UploadField; 5] = [
        UploadField::Name,
        UploadField::Type,
        UploadField::TmpName,
        UploadField::Error,
        UploadField::Size,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadField::Name => "name",
            UploadField::Type => "type",
            UploadField::TmpName => "tmp_name",
            UploadField::Error => "error",
            UploadField::Size => "size",
        }
    }
}

/// Value stored in an upload field.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadValue {
    Text(String),
    Number(i64),
    Slots(BTreeMap<u32, UploadValue>),
}

impl UploadValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            UploadValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            UploadValue::Number(n) => Some(*n),
            UploadValue::Text(s) => s.trim().parse().ok(),
            UploadValue::Slots(_) => None,
        }
    }

    /// Follow `levels` into nested slots.
    pub fn descend(&self, levels: &[u32]) -> Option<&UploadValue> {
        levels.iter().try_fold(self, |value, level| match value {
            UploadValue::Slots(slots) => slots.get(level),
            _ => None,
        })
    }
}

impl From<&str> for UploadValue {
    fn from(value: &str) -> Self {
        UploadValue::Text(value.to_string())
    }
}

impl From<String> for UploadValue {
    fn from(value: String) -> Self {
        UploadValue::Text(value)
    }
}

impl From<i64> for UploadValue {
    fn from(value: i64) -> Self {
        UploadValue::Number(value)
    }
}

/// Outcome codes of a form upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Ok,
    /// Exceeds the server-side size limit.
    IniSize,
    /// Exceeds the form's declared size limit.
    FormSize,
    /// Transfer was interrupted.
    Partial,
    NoFile,
    Other(i64),
}

impl UploadStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => UploadStatus::Ok,
            1 => UploadStatus::IniSize,
            2 => UploadStatus::FormSize,
            3 => UploadStatus::Partial,
            4 => UploadStatus::NoFile,
            other => UploadStatus::Other(other),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            UploadStatus::Ok => 0,
            UploadStatus::IniSize => 1,
            UploadStatus::FormSize => 2,
            UploadStatus::Partial => 3,
            UploadStatus::NoFile => 4,
            UploadStatus::Other(code) => *code,
        }
    }
}

/// One submitted file awaiting ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRecord {
    pub name: String,
    pub mime_type: String,
    pub tmp_name: PathBuf,
    pub status: UploadStatus,
    pub size: u64,
}

/// Read/write access to upload records.
pub trait UploadSource {
    /// Raw field value of an input, slots included.
    fn field(&self, input: &str, field: UploadField) -> Option<&UploadValue>;

    /// Replace a raw field value.
    fn set_field(&mut self, input: &str, field: UploadField, value: UploadValue);

    /// Whether the input exists at all.
    fn has_input(&self, input: &str) -> bool;

    /// Field value, optionally inside a numbered slot.
    fn get(&self, input: &str, field: UploadField, slot: Option<u32>) -> Option<&UploadValue> {
        let value = self.field(input, field)?;
        match slot {
            Some(slot) => value.descend(&[slot]),
            None => Some(value),
        }
    }

    /// Set a field value, optionally inside a numbered slot.
    fn set(&mut self, input: &str, field: UploadField, value: UploadValue, slot: Option<u32>) {
        let value = match slot {
            Some(slot) => place(self.field(input, field).cloned(), &[slot], value),
            None => value,
        };
        self.set_field(input, field, value);
    }

    /// Assemble a complete record.
    fn record(&self, input: &str, slot: Option<u32>) -> Option<UploadRecord> {
        let text = |field| self.get(input, field, slot).and_then(UploadValue::as_text);
        let number = |field| self.get(input, field, slot).and_then(UploadValue::as_number);

        Some(UploadRecord {
            name: text(UploadField::Name).unwrap_or_default().to_string(),
            mime_type: text(UploadField::Type).unwrap_or_default().to_string(),
            tmp_name: PathBuf::from(text(UploadField::TmpName).unwrap_or_default()),
            status: UploadStatus::from_code(number(UploadField::Error)?),
            size: number(UploadField::Size).unwrap_or(0).max(0) as u64,
        })
    }
}

/// Put `value` at `levels` inside `existing`, keeping sibling slots.
fn place(existing: Option<UploadValue>, levels: &[u32], value: UploadValue) -> UploadValue {
    match levels.split_first() {
        None => value,
        Some((first, rest)) => {
            let mut slots = match existing {
                Some(UploadValue::Slots(slots)) => slots,
                _ => BTreeMap::new(),
            };
            let child = slots.remove(first);
            slots.insert(*first, place(child, rest, value));
            UploadValue::Slots(slots)
        }
    }
}

/// In-memory upload table keyed by input name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadTable {
    inputs: HashMap<String, BTreeMap<UploadField, UploadValue>>,
}

impl UploadTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a single-file input.
    pub fn insert(&mut self, input: &str, record: &UploadRecord) {
        self.insert_record(input, record, None);
    }

    /// Insert a record, optionally into a numbered slot.
    pub fn insert_record(&mut self, input: &str, record: &UploadRecord, slot: Option<u32>) {
        self.set(input, UploadField::Name, record.name.as_str().into(), slot);
        self.set(input, UploadField::Type, record.mime_type.as_str().into(), slot);
        self.set(
            input,
            UploadField::TmpName,
            record.tmp_name.to_string_lossy().to_string().into(),
            slot,
        );
        self.set(input, UploadField::Error, record.status.code().into(), slot);
        self.set(input, UploadField::Size, (record.size as i64).into(), slot);
    }

    /// Copy every field of `from`, read at `from_levels`, into `to` at
    /// `to_levels`.
    ///
    /// Fails without touching `to` when `from` is missing or any field lacks
    /// one of the source levels.
    pub fn clone_record(&mut self, from: &str, from_levels: &[u32], to: &str, to_levels: &[u32]) -> Result<()> {
        let source = self
            .inputs
            .get(from)
            .ok_or_else(|| FileApiError::UploadSlotMissing(from.to_string()))?;

        let mut collected = Vec::with_capacity(source.len());
        for (field, value) in source {
            let value = value
                .descend(from_levels)
                .ok_or_else(|| FileApiError::UploadSlotMissing(format!("{}{:?}", from, from_levels)))?;
            collected.push((*field, value.clone()));
        }

        for (field, value) in collected {
            let existing = self.field(to, field).cloned();
            self.set_field(to, field, place(existing, to_levels, value));
        }
        Ok(())
    }
}

impl UploadSource for UploadTable {
    fn field(&self, input: &str, field: UploadField) -> Option<&UploadValue> {
        self.inputs.get(input)?.get(&field)
    }

    fn set_field(&mut self, input: &str, field: UploadField, value: UploadValue) {
        self.inputs.entry(input.to_string()).or_default().insert(field, value);
    }

    fn has_input(&self, input: &str) -> bool {
        self.inputs.contains_key(input)
    }
}
