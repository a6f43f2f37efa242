//! Document access for the remote reopen flow.
//!
//! The host owns documents; this module defines the [`DocumentSource`] seam
//! the pipeline fetches through, and [`FsDocumentSource`], which serves
//! `file:` locators straight from disk.

use std::future::Future;
use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

use crate::types::{Document, ResourceLocator, FILE_SCHEME};

/// Language id used when the extension is not recognized.
pub const PLAINTEXT_LANGUAGE: &str = "plaintext";

/// Errors that can occur while fetching a document.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The locator is not a valid URI.
    #[error("invalid locator {locator}: {source}")]
    InvalidLocator {
        locator: String,
        #[source]
        source: url::ParseError,
    },

    /// The locator does not name a local file.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// The locator cannot be mapped to a filesystem path, or a path to a locator.
    #[error("not a valid file path: {0}")]
    InvalidPath(String),

    /// The document could not be read (it may no longer exist).
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Asynchronous access to host documents.
pub trait DocumentSource: Send + Sync {
    /// Opens the document named by `locator` and returns its current content.
    fn open_document(
        &self,
        locator: &ResourceLocator,
    ) -> impl Future<Output = Result<Document, DocumentError>> + Send;
}

/// Serves `file:` documents from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDocumentSource;

impl DocumentSource for FsDocumentSource {
    async fn open_document(&self, locator: &ResourceLocator) -> Result<Document, DocumentError> {
        let url = Url::parse(locator.as_str()).map_err(|source| DocumentError::InvalidLocator {
            locator: locator.to_string(),
            source,
        })?;
        if url.scheme() != FILE_SCHEME {
            return Err(DocumentError::UnsupportedScheme(url.scheme().to_string()));
        }

        let path = url
            .to_file_path()
            .map_err(|()| DocumentError::InvalidPath(locator.to_string()))?;
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| DocumentError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(Document {
            locator: locator.clone(),
            language_id: language_id(&path).to_string(),
            file_name: path.display().to_string(),
            text,
        })
    }
}

/// Builds a document snapshot for a file at an absolute `path`.
///
/// # Errors
///
/// Returns `DocumentError::InvalidPath` if `path` is not absolute.
pub fn document_from_path(path: &Path, text: String) -> Result<Document, DocumentError> {
    let url = Url::from_file_path(path)
        .map_err(|()| DocumentError::InvalidPath(path.display().to_string()))?;

    Ok(Document {
        locator: ResourceLocator::from(url),
        language_id: language_id(path).to_string(),
        file_name: path.display().to_string(),
        text,
    })
}

/// Derives a language id from a file extension.
#[must_use]
pub fn language_id(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return PLAINTEXT_LANGUAGE;
    };

    match ext.to_ascii_lowercase().as_str() {
        "rs" => "rust",
        "ts" => "typescript",
        "tsx" => "typescriptreact",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "javascriptreact",
        "py" => "python",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cc" | "cpp" | "hpp" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "json" => "json",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "md" => "markdown",
        "html" => "html",
        "css" => "css",
        "sh" => "shellscript",
        _ => PLAINTEXT_LANGUAGE,
    }
}
