//! Typed telemetry settings.
//!
//! The host stores settings as a flat JSON object keyed by dotted names, the
//! same way editor `settings.json` files do. This module reads the keys it
//! recognizes into validated structs once at startup; unknown keys are ignored.
//!
//! | Key | Type | Default |
//! |-----|------|---------|
//! | `telemetry.activeEvents` | list of `{ "name": ..., ... }` | absent |
//! | `telemetry.exporters` | list of `{ "args": { "id": ..., ... }, "activeEvents"?: [...] }` | absent |
//! | `telemetry.key` | string | absent |
//! | `telemetry.activeEvents.<category>` | bool | `true` |
//! | `telemetry.reopen.routing` | `"all"` or `"activeEvents"` | `"all"` |
//!
//! An absent category toggle counts as enabled. Hosts ship these keys with
//! default-on values, so a settings file that omits one means "on".
//!
//! # Example
//!
//! ```
//! use doctel_capture::settings::TelemetrySettings;
//!
//! let settings = TelemetrySettings::from_json_str(r#"{
//!     "telemetry.activeEvents": [{ "name": "documentOpen" }],
//!     "telemetry.exporters": [{ "args": { "id": "X" } }]
//! }"#).unwrap();
//!
//! assert_eq!(settings.exporters.as_ref().map(Vec::len), Some(1));
//! assert!(settings.toggles.document_open);
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use crate::types::EventName;

/// Errors that can occur while loading settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings document is not valid JSON or has the wrong shape.
    #[error("invalid settings: {0}")]
    Json(#[from] serde_json::Error),

    /// An exporter descriptor has an empty `args.id`.
    #[error("exporter at index {index} has an empty id")]
    EmptyExporterId { index: usize },
}

/// A named reference to one event category, with optional extra options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveEvent {
    pub name: String,

    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl ActiveEvent {
    /// Creates an active event with no extra options.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Map::new(),
        }
    }
}

/// The identifying args block of an exporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExporterArgs {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consentlink: Option<String>,

    /// HTTP endpoint records are POSTed to. Without one, records are logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Exporter-specific args passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A configured destination for telemetry events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExporterDescriptor {
    pub args: ExporterArgs,

    /// Per-exporter override of the global active-event list.
    #[serde(
        rename = "activeEvents",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub active_events: Option<Vec<ActiveEvent>>,
}

impl ExporterDescriptor {
    /// Creates a descriptor with the given id and no override.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            args: ExporterArgs {
                id: id.into(),
                consentlink: None,
                url: None,
                extra: Map::new(),
            },
            active_events: None,
        }
    }

    /// Sets the per-exporter active-event override.
    #[must_use]
    pub fn with_active_events<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_events = Some(names.into_iter().map(ActiveEvent::named).collect());
        self
    }

    /// Sets the HTTP endpoint.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.args.url = Some(url.into());
        self
    }
}

/// Per-category on/off switches, consulted for every signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryToggles {
    pub document_open: bool,
    pub document_change: bool,
    pub document_close: bool,
    pub document_save: bool,
    pub reopen: bool,
}

impl CategoryToggles {
    /// Returns whether the given category is enabled.
    #[must_use]
    pub fn is_enabled(&self, event: EventName) -> bool {
        match event {
            EventName::DocumentOpen => self.document_open,
            EventName::DocumentChange => self.document_change,
            EventName::DocumentClose => self.document_close,
            EventName::DocumentSave => self.document_save,
            EventName::Reopen => self.reopen,
        }
    }

    /// Returns a copy with one category switched.
    #[must_use]
    pub fn with(mut self, event: EventName, enabled: bool) -> Self {
        match event {
            EventName::DocumentOpen => self.document_open = enabled,
            EventName::DocumentChange => self.document_change = enabled,
            EventName::DocumentClose => self.document_close = enabled,
            EventName::DocumentSave => self.document_save = enabled,
            EventName::Reopen => self.reopen = enabled,
        }
        self
    }
}

impl Default for CategoryToggles {
    fn default() -> Self {
        Self {
            document_open: true,
            document_change: true,
            document_close: true,
            document_save: true,
            reopen: true,
        }
    }
}

/// Which exporters receive remote-triggered reopen events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReopenRouting {
    /// Every resolved exporter, regardless of its active events.
    #[default]
    All,
    /// Only exporters whose resolved active events include `reopen`.
    ActiveEvents,
}

/// Raw settings document, keyed the way the host stores them.
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    #[serde(rename = "telemetry.activeEvents", default)]
    active_events: Option<Vec<ActiveEvent>>,

    #[serde(rename = "telemetry.exporters", default)]
    exporters: Option<Vec<ExporterDescriptor>>,

    #[serde(rename = "telemetry.key", default)]
    key: Option<String>,

    #[serde(rename = "telemetry.activeEvents.documentOpen", default)]
    document_open: Option<bool>,

    #[serde(rename = "telemetry.activeEvents.documentChange", default)]
    document_change: Option<bool>,

    #[serde(rename = "telemetry.activeEvents.documentClose", default)]
    document_close: Option<bool>,

    #[serde(rename = "telemetry.activeEvents.documentSave", default)]
    document_save: Option<bool>,

    #[serde(rename = "telemetry.activeEvents.reopen", default)]
    reopen: Option<bool>,

    #[serde(rename = "telemetry.reopen.routing", default)]
    reopen_routing: Option<ReopenRouting>,
}

/// Validated telemetry settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySettings {
    /// Global active-event list; `None` when the key is absent.
    pub active_events: Option<Vec<ActiveEvent>>,

    /// Exporter descriptors; `None` when the key is absent.
    pub exporters: Option<Vec<ExporterDescriptor>>,

    /// Opaque credential passed through to exporters.
    pub key: Option<String>,

    pub toggles: CategoryToggles,

    pub reopen_routing: ReopenRouting,
}

impl TelemetrySettings {
    /// Parses settings from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the JSON is malformed or an exporter id is empty.
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let raw: RawSettings = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    /// Loads settings from a file.
    ///
    /// A missing file is not an error: it yields empty settings, which resolve
    /// to no exporters.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the file cannot be read or does not parse.
    pub fn from_path(path: &Path) -> Result<Self, SettingsError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json_str(&contents),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "No settings file, telemetry has no exporters");
                Ok(Self::default())
            }
            Err(source) => Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn from_raw(raw: RawSettings) -> Result<Self, SettingsError> {
        if let Some(exporters) = &raw.exporters {
            if let Some(index) = exporters.iter().position(|e| e.args.id.trim().is_empty()) {
                return Err(SettingsError::EmptyExporterId { index });
            }
        }

        let defaults = CategoryToggles::default();
        let toggles = CategoryToggles {
            document_open: raw.document_open.unwrap_or(defaults.document_open),
            document_change: raw.document_change.unwrap_or(defaults.document_change),
            document_close: raw.document_close.unwrap_or(defaults.document_close),
            document_save: raw.document_save.unwrap_or(defaults.document_save),
            reopen: raw.reopen.unwrap_or(defaults.reopen),
        };

        Ok(Self {
            active_events: raw.active_events,
            exporters: raw.exporters,
            key: raw.key,
            toggles,
            reopen_routing: raw.reopen_routing.unwrap_or_default(),
        })
    }
}
