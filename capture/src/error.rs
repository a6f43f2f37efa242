//! Error types for the capture crate.
//!
//! Each subsystem has its own error enum next to the code that produces it;
//! [`CaptureError`] wraps them for callers that drive the whole pipeline.

use thiserror::Error;

use crate::config::ConfigError;
use crate::document::DocumentError;
use crate::exporter::ExportError;
use crate::remote::{ChannelError, CommandError};
use crate::settings::SettingsError;
use crate::watcher::WatcherError;

/// Errors that can occur during capture operations.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    /// A document requested by the remote channel could not be fetched.
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    #[error("remote command error: {0}")]
    Command(#[from] CommandError),

    #[error("command channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("export error: {0}")]
    Export(#[from] ExportError),

    #[error("file watch error: {0}")]
    Watch(#[from] WatcherError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_invalid_value_display() {
        let err = ConfigError::InvalidValue {
            key: "DOCTEL_SIGNAL_BUFFER".to_string(),
            message: "expected positive integer".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for DOCTEL_SIGNAL_BUFFER: expected positive integer"
        );
    }

    #[test]
    fn capture_error_config_display() {
        let err: CaptureError = ConfigError::NoHomeDirectory.into();
        assert_eq!(
            err.to_string(),
            "configuration error: failed to determine home directory"
        );
    }

    #[test]
    fn capture_error_settings_display() {
        let err: CaptureError = SettingsError::EmptyExporterId { index: 2 }.into();
        assert!(matches!(err, CaptureError::Settings(_)));
        assert!(err.to_string().starts_with("settings error: "));
    }

    #[test]
    fn capture_error_document_display() {
        let err: CaptureError = DocumentError::UnsupportedScheme("untitled".to_string()).into();
        assert_eq!(err.to_string(), "document error: unsupported scheme: untitled");
    }

    #[test]
    fn capture_error_channel_display() {
        let err: CaptureError = ChannelError::UnsupportedScheme("http".to_string()).into();
        assert_eq!(
            err.to_string(),
            "command channel error: unsupported server URL scheme: http"
        );
    }

    #[test]
    fn capture_error_export_display() {
        let err: CaptureError = ExportError::Status { status: 503 }.into();
        assert_eq!(err.to_string(), "export error: exporter returned status 503");
    }

    #[test]
    fn capture_error_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CaptureError = io_err.into();
        assert!(matches!(err, CaptureError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn capture_error_json_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ invalid json }").unwrap_err();
        let err: CaptureError = json_err.into();
        assert!(matches!(err, CaptureError::Json(_)));
        assert!(err.to_string().contains("JSON error"));
    }

    #[test]
    fn error_source_chain() {
        use std::error::Error;

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: CaptureError = io_err.into();
        assert!(err.source().is_some());
    }
}
