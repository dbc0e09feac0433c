//! Public data models shared by the resolver, the dispatcher and callers.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// How the message body is interpreted by Webex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    Text,
    #[default]
    Markdown,
}

impl MessageFormat {
    /// Request field carrying the body for this format.
    pub fn field_name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
        }
    }
}

impl fmt::Display for MessageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

impl FromStr for MessageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "markdown" => Ok(Self::Markdown),
            _ => Err("expected 'text' or 'markdown'".to_string()),
        }
    }
}

/// Where a message is delivered.
///
/// The kind is decided once from the raw value: anything containing `@` is a
/// person email, everything else is a room id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    Email(String),
    Room(String),
}

impl Destination {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.contains('@') {
            Self::Email(raw)
        } else {
            Self::Room(raw)
        }
    }

    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Email(_) => "toPersonEmail",
            Self::Room(_) => "roomId",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Email(v) | Self::Room(v) => v,
        }
    }

    pub fn is_email(&self) -> bool {
        matches!(self, Self::Email(_))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.field_name(), self.value())
    }
}

/// Message record returned by Webex for every accepted request.
///
/// Deserializing never fails for a JSON object: a field whose shape does not
/// match its typed slot stays in `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Map<String, Value>")]
pub struct WebexMessage {
    /// Webex message identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_person_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    /// Content URLs of the files attached to this message.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// Creation time as reported by Webex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// Every other field of the response, preserved as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for WebexMessage {
    fn from(mut extra: Map<String, Value>) -> Self {
        Self {
            id: take(&mut extra, "id"),
            room_id: take(&mut extra, "roomId"),
            room_type: take(&mut extra, "roomType"),
            to_person_email: take(&mut extra, "toPersonEmail"),
            person_id: take(&mut extra, "personId"),
            person_email: take(&mut extra, "personEmail"),
            text: take(&mut extra, "text"),
            markdown: take(&mut extra, "markdown"),
            files: take::<Vec<String>>(&mut extra, "files").unwrap_or_default(),
            created: take(&mut extra, "created"),
            extra,
        }
    }
}

/// Move `key` out of `map` if it deserializes as `T`; leave it otherwise.
fn take<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Option<T> {
    let parsed = T::deserialize(map.get(key)?).ok()?;
    map.remove(key);
    Some(parsed)
}

/// Result of a successful `send`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SendOutcome {
    /// The plan had exactly one request.
    Single(WebexMessage),
    /// The plan had several requests; records are in submission order.
    Multiple(Vec<WebexMessage>),
}

impl SendOutcome {
    pub(crate) fn from_records(mut records: Vec<WebexMessage>) -> Self {
        if records.len() == 1 {
            Self::Single(records.remove(0))
        } else {
            Self::Multiple(records)
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multiple(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn first(&self) -> Option<&WebexMessage> {
        match self {
            Self::Single(record) => Some(record),
            Self::Multiple(records) => records.first(),
        }
    }

    pub fn into_vec(self) -> Vec<WebexMessage> {
        match self {
            Self::Single(record) => vec![record],
            Self::Multiple(records) => records,
        }
    }
}

/// In-memory file ready to be attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebexFile {
    /// Name presented to Webex.
    pub filename: String,
    /// Raw file content.
    pub blob: Vec<u8>,
    /// MIME type sent with the multipart part.
    pub mime_type: String,
}

impl WebexFile {
    /// Lowercased extension of `filename`, if it has one.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

/// One attachment of a `send` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    /// Local file opened right before its request is sent.
    Path(PathBuf),
    /// Content already held in memory.
    File(WebexFile),
}

impl Attachment {
    /// Display name used for diagnostics and the multipart filename.
    pub fn filename(&self) -> String {
        match self {
            Self::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Self::File(file) => file.filename.clone(),
        }
    }
}

impl From<PathBuf> for Attachment {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for Attachment {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<WebexFile> for Attachment {
    fn from(file: WebexFile) -> Self {
        Self::File(file)
    }
}
