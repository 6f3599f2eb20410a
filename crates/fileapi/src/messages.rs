//! User-visible message templates.
//!
//! Templates use `{name}` and `{code}` placeholders. Messages about a file or
//! directory are prefixed with a type label, so templates for them start with
//! a space (`" {name} not found."` renders as `File 'a.txt' not found.`).
//! Every template can be overridden from the `[messages]` config table.

use std::collections::HashMap;

/// Message keys known to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    NoUpload,
    UploadMaxSize,
    UploadStopped,
    UploadError,
    NoRights,
    NoName,
    Exist,
    NotEmpty,
    NotFound,
    NotReadable,
    NotRename,
    NotCopy,
    NotMove,
    NotDelete,
    GeneralError,
    HttpError,
    InputExists,
}

impl MessageKey {
    pub const ALL: [MessageKey; 17] = [
        MessageKey::NoUpload,
        MessageKey::UploadMaxSize,
        MessageKey::UploadStopped,
        MessageKey::UploadError,
        MessageKey::NoRights,
        MessageKey::NoName,
        MessageKey::Exist,
        MessageKey::NotEmpty,
        MessageKey::NotFound,
        MessageKey::NotReadable,
        MessageKey::NotRename,
        MessageKey::NotCopy,
        MessageKey::NotMove,
        MessageKey::NotDelete,
        MessageKey::GeneralError,
        MessageKey::HttpError,
        MessageKey::InputExists,
    ];

    /// Key name as used in configuration overrides.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKey::NoUpload => "NO_UPLOAD",
            MessageKey::UploadMaxSize => "UPLOAD_MAX_SIZE",
            MessageKey::UploadStopped => "UPLOAD_STOPPED",
            MessageKey::UploadError => "UPLOAD_ERROR",
            MessageKey::NoRights => "NO_RIGHTS",
            MessageKey::NoName => "NO_NAME",
            MessageKey::Exist => "EXIST",
            MessageKey::NotEmpty => "NOT_EMPTY",
            MessageKey::NotFound => "NOT_FOUND",
            MessageKey::NotReadable => "NOT_READABLE",
            MessageKey::NotRename => "NOT_RENAME",
            MessageKey::NotCopy => "NOT_COPY",
            MessageKey::NotMove => "NOT_MOVE",
            MessageKey::NotDelete => "NOT_DELETE",
            MessageKey::GeneralError => "GENERAL_ERROR",
            MessageKey::HttpError => "HTTP_ERROR",
            MessageKey::InputExists => "INPUT_EXISTS",
        }
    }

    fn default_template(&self) -> &'static str {
        match self {
            MessageKey::NoUpload => "No file to upload was specified.",
            MessageKey::UploadMaxSize => "File {name} has exceeded the maximum size.",
            MessageKey::UploadStopped => "Upload of file {name} has been stopped.",
            MessageKey::UploadError => "Unable to upload file {name} (error {code}).",
            MessageKey::NoRights => "You do not have write rights to: {name}.",
            MessageKey::NoName => "No new name was entered.",
            MessageKey::Exist => " {name} already exists.",
            MessageKey::NotEmpty => " {name} is not empty.",
            MessageKey::NotFound => " {name} not found.",
            MessageKey::NotReadable => " {name} cannot be read.",
            MessageKey::NotRename => " {name} cannot be renamed.",
            MessageKey::NotCopy => " {name} cannot be copied.",
            MessageKey::NotMove => " {name} cannot be moved.",
            MessageKey::NotDelete => " {name} cannot be deleted.",
            MessageKey::GeneralError => "General error: {name}",
            MessageKey::HttpError => "HTTP error: {code}",
            MessageKey::InputExists => "File input already exists.",
        }
    }
}

/// Kind of entry a message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    File,
    Directory,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::File => "FILE",
            Label::Directory => "DIR",
        }
    }

    /// Picks `File` when a file name is present, `Directory` otherwise.
    pub fn for_entry(file: Option<&str>) -> Self {
        match file {
            Some(name) if !name.is_empty() => Label::File,
            _ => Label::Directory,
        }
    }

    fn default_text(&self) -> &'static str {
        match self {
            Label::File => "File",
            Label::Directory => "Directory",
        }
    }
}

/// Key to template mapping with per-key overrides.
#[derive(Debug, Clone)]
pub struct MessageCatalog {
    templates: HashMap<String, String>,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        let mut templates = HashMap::new();
        for key in MessageKey::ALL {
            templates.insert(key.as_str().to_string(), key.default_template().to_string());
        }
        for label in [Label::File, Label::Directory] {
            templates.insert(label.as_str().to_string(), label.default_text().to_string());
        }
        Self { templates }
    }
}

impl MessageCatalog {
    /// Creates the default catalog with the given overrides applied on top.
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut catalog = Self::default();
        for (key, template) in overrides {
            catalog.templates.insert(key.clone(), template.clone());
        }
        catalog
    }

    /// Renders a known message.
    pub fn render(&self, key: MessageKey, name: &str, label: Option<Label>) -> String {
        self.render_key(key.as_str(), name, None, label)
    }

    /// Renders a known message that carries a numeric code.
    pub fn render_code(&self, key: MessageKey, name: &str, code: i64, label: Option<Label>) -> String {
        self.render_key(key.as_str(), name, Some(code), label)
    }

    /// Renders a message by key name.
    ///
    /// Unknown keys render as the key itself, prefixed with the raw label
    /// (`FILE`, `DIR`) when one is given.
    pub fn render_key(&self, key: &str, name: &str, code: Option<i64>, label: Option<Label>) -> String {
        let Some(template) = self.templates.get(key) else {
            return match label {
                Some(label) => format!("{}{}", label.as_str(), key),
                None => key.to_string(),
            };
        };

        // the name goes in last and is never rescanned
        let message = match code {
            Some(code) => template.replace("{code}", &code.to_string()),
            None => template.clone(),
        };
        let message = message.replace("{name}", name);

        match label {
            Some(label) => {
                let prefix = self
                    .templates
                    .get(label.as_str())
                    .map(String::as_str)
                    .unwrap_or(label.default_text());
                format!("{}{}", prefix, message)
            }
            None => message,
        }
    }
}

/// Wraps `value` in single quotes and escapes HTML special characters.
pub fn escape(value: &str) -> String {
    escape_with(value, "'")
}

/// Wraps `value` in `quote` and escapes `& " ' < >` as HTML entities.
pub fn escape_with(value: &str, quote: &str) -> String {
    let raw = format!("{quote}{value}{quote}");
    let mut out = String::with_capacity(raw.len() + 12);
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
