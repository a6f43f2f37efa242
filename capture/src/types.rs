//! Event types for document lifecycle telemetry.
//!
//! This module defines the signals the host editor emits, the documents they
//! refer to, and the [`EventRecord`] envelope delivered to exporters. The
//! record's JSON shape is the export schema consumed downstream, so field names
//! are fixed (camelCase, with the reopen range marker in `rangestart_line` style).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scheme of local, file-backed resources. Only these are ever reported.
pub const FILE_SCHEME: &str = "file";

/// Canonical URI string identifying a document.
///
/// Equality is exact string match; no normalization is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceLocator(String);

impl ResourceLocator {
    /// Wraps a locator string as-is.
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    /// Returns the locator string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the URI scheme (the part before the first `:`), if any.
    #[must_use]
    pub fn scheme(&self) -> Option<&str> {
        self.0
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .filter(|scheme| !scheme.is_empty())
    }

    /// Returns true if this locator names a local file-backed resource.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.scheme() == Some(FILE_SCHEME)
    }
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<url::Url> for ResourceLocator {
    fn from(url: url::Url) -> Self {
        Self(url.into())
    }
}

/// Names of the events this system can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventName {
    DocumentOpen,
    DocumentChange,
    DocumentClose,
    DocumentSave,
    /// Synthetic event triggered by the remote command channel.
    Reopen,
}

impl EventName {
    /// Returns the wire name, which doubles as the settings category key.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DocumentOpen => "documentOpen",
            Self::DocumentChange => "documentChange",
            Self::DocumentClose => "documentClose",
            Self::DocumentSave => "documentSave",
            Self::Reopen => "reopen",
        }
    }

    /// Looks up an event by its wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "documentOpen" => Some(Self::DocumentOpen),
            "documentChange" => Some(Self::DocumentChange),
            "documentClose" => Some(Self::DocumentClose),
            "documentSave" => Some(Self::DocumentSave),
            "reopen" => Some(Self::Reopen),
            _ => None,
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Zero-based line/character position within a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[must_use]
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Span between two positions in a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub start: Position,
    pub end: Position,
}

impl TextRange {
    #[must_use]
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Returns true if the range covers no text (start equals end).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// One content-change operation: replace `range` with `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentChange {
    pub range: TextRange,
    /// Offset of the range start, in characters from the document start.
    pub range_offset: usize,
    /// Length of the replaced range, in characters.
    pub range_length: usize,
    pub text: String,
}

/// A snapshot of a document as provided by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub locator: ResourceLocator,
    pub language_id: String,
    /// Display name of the document (usually the file path).
    pub file_name: String,
    pub text: String,
}

impl Document {
    /// Returns the first line of the document text.
    #[must_use]
    pub fn first_line(&self) -> &str {
        self.text.split('\n').next().unwrap_or_default()
    }
}

/// A raw lifecycle signal from the host editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSignal {
    Opened(Document),
    Changed {
        document: Document,
        changes: Vec<ContentChange>,
    },
    Closed(Document),
    Saved(Document),
}

impl DocumentSignal {
    /// Returns the document the signal refers to.
    #[must_use]
    pub fn document(&self) -> &Document {
        match self {
            Self::Opened(document)
            | Self::Closed(document)
            | Self::Saved(document)
            | Self::Changed { document, .. } => document,
        }
    }

    /// Returns the event category this signal belongs to.
    #[must_use]
    pub fn event_name(&self) -> EventName {
        match self {
            Self::Opened(_) => EventName::DocumentOpen,
            Self::Changed { .. } => EventName::DocumentChange,
            Self::Closed(_) => EventName::DocumentClose,
            Self::Saved(_) => EventName::DocumentSave,
        }
    }
}

/// One outgoing telemetry event.
///
/// Identity and provenance fields are always present. Payload fields are
/// populated per event kind and omitted from JSON when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub event_name: EventName,

    /// Epoch milliseconds.
    pub event_time: i64,

    pub session_id: String,

    pub machine_id: String,

    pub document_uri: ResourceLocator,

    /// Assigned by the identity registry.
    pub document_id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_content: Option<String>,

    /// JSON-serialized list of [`ContentChange`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_changes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,

    #[serde(
        rename = "rangestart_line",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub range_start_line: Option<String>,

    #[serde(
        rename = "rangestart_character",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub range_start_character: Option<String>,

    #[serde(
        rename = "rangeend_line",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub range_end_line: Option<String>,

    #[serde(
        rename = "rangeend_character",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub range_end_character: Option<String>,

    /// Hex SHA-256 of the document text (reopen only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl EventRecord {
    /// Parses the change payload back into its list of changes.
    ///
    /// Returns `None` if this record carries no change payload.
    pub fn parsed_changes(&self) -> Option<serde_json::Result<Vec<ContentChange>>> {
        self.document_changes
            .as_deref()
            .map(serde_json::from_str::<Vec<ContentChange>>)
    }
}
