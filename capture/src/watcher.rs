//! Workspace watcher that turns file system activity into document signals.
//!
//! Stands in for an editor host: files under the workspace root are treated
//! as documents, and their lifecycle is mapped onto [`DocumentSignal`]s:
//!
//! | File system event          | Signals                      |
//! |----------------------------|------------------------------|
//! | file created               | `Opened`                     |
//! | content modified           | `Changed` followed by `Saved` |
//! | first sight of a file      | `Opened`                     |
//! | tracked file removed       | `Closed`                     |
//!
//! The watcher keeps the last seen text of each file so content changes can
//! be expressed as line-level [`ContentChange`]s. Paths with a hidden
//! component (`.git`, `.cache`, ...) are ignored, as are files that are not
//! valid UTF-8.
//!
//! The notify callback only forwards raw events through an internal channel;
//! all file I/O happens on a dedicated async task.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use notify::{
    event::{CreateKind, ModifyKind, RemoveKind},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use similar::{DiffTag, TextDiff};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::document::document_from_path;
use crate::types::{ContentChange, DocumentSignal, Position, TextRange};

/// Capacity of the channel between the notify callback and the async task.
const INTERNAL_CHANNEL_CAPACITY: usize = 1000;

#[derive(Debug)]
enum InternalEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
}

/// Errors that can occur during workspace watching.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to initialize the file system watcher.
    #[error("failed to create watcher: {0}")]
    WatcherInit(#[from] notify::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The workspace directory does not exist.
    #[error("workspace directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),
}

type Snapshots = Arc<RwLock<HashMap<PathBuf, String>>>;

/// Watches a workspace directory and emits document signals.
#[derive(Debug)]
pub struct WorkspaceWatcher {
    /// Dropping this stops the watch subscription.
    #[allow(dead_code)]
    watcher: RecommendedWatcher,
    snapshots: Snapshots,
    root: PathBuf,
}

impl WorkspaceWatcher {
    /// Starts watching `root` recursively; signals are sent to `signals`.
    ///
    /// Files that already exist are not replayed. They become documents the
    /// first time they are modified.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` does not exist or the watcher cannot be
    /// initialized.
    pub fn new(root: PathBuf, signals: mpsc::Sender<DocumentSignal>) -> Result<Self, WatcherError> {
        if !root.is_dir() {
            return Err(WatcherError::DirectoryNotFound(root));
        }
        // Locators are built from absolute paths.
        let root = root.canonicalize()?;

        let snapshots: Snapshots = Arc::new(RwLock::new(HashMap::new()));
        let (internal_tx, internal_rx) = mpsc::channel(INTERNAL_CHANNEL_CAPACITY);

        tokio::spawn(process_internal_events(
            internal_rx,
            Arc::clone(&snapshots),
            signals,
        ));

        let watcher = create_watcher(internal_tx, root.clone())?;
        info!(root = %root.display(), "Watching workspace");

        Ok(Self {
            watcher,
            snapshots,
            root,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the number of files currently treated as open documents.
    pub async fn open_document_count(&self) -> usize {
        self.snapshots.read().await.len()
    }
}

fn create_watcher(
    internal_tx: mpsc::Sender<InternalEvent>,
    root: PathBuf,
) -> Result<RecommendedWatcher, WatcherError> {
    let callback_root = root.clone();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            handle_notify_event(res, &callback_root, &internal_tx);
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    debug!(root = %root.display(), "Started recursive watch");

    Ok(watcher)
}

fn handle_notify_event(
    res: notify::Result<Event>,
    root: &Path,
    internal_tx: &mpsc::Sender<InternalEvent>,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "File watcher error");
            return;
        }
    };

    trace!(kind = ?event.kind, paths = ?event.paths, "Received notify event");

    for path in &event.paths {
        if is_hidden(root, path) {
            continue;
        }

        let internal = match event.kind {
            EventKind::Create(CreateKind::File | CreateKind::Any) => {
                InternalEvent::Created(path.clone())
            }
            EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => {
                InternalEvent::Modified(path.clone())
            }
            EventKind::Remove(RemoveKind::File | RemoveKind::Any) => {
                InternalEvent::Removed(path.clone())
            }
            _ => continue,
        };

        // Never block the notify thread.
        if let Err(e) = internal_tx.try_send(internal) {
            warn!(error = %e, "Failed to queue file event, channel may be full");
        }
    }
}

/// Returns true if any component of `path` below `root` starts with a dot.
fn is_hidden(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|c| match c {
        Component::Normal(name) => name.to_str().is_some_and(|n| n.starts_with('.')),
        _ => false,
    })
}

async fn process_internal_events(
    mut rx: mpsc::Receiver<InternalEvent>,
    snapshots: Snapshots,
    signals: mpsc::Sender<DocumentSignal>,
) {
    while let Some(event) = rx.recv().await {
        let emitted = match event {
            InternalEvent::Created(path) => handle_created(&path, &snapshots).await,
            InternalEvent::Modified(path) => handle_modified(&path, &snapshots).await,
            InternalEvent::Removed(path) => handle_removed(&path, &snapshots).await,
        };

        for signal in emitted {
            if signals.send(signal).await.is_err() {
                debug!("Signal consumer gone, stopping watcher task");
                return;
            }
        }
    }

    debug!("Watcher event processor shutting down");
}

async fn read_text(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Some(text),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Skipping unreadable file");
            None
        }
    }
}

async fn handle_created(path: &Path, snapshots: &Snapshots) -> Vec<DocumentSignal> {
    let Some(text) = read_text(path).await else {
        return Vec::new();
    };
    let document = match document_from_path(path, text.clone()) {
        Ok(document) => document,
        Err(e) => {
            warn!(error = %e, "Cannot build document");
            return Vec::new();
        }
    };

    snapshots.write().await.insert(path.to_path_buf(), text);
    vec![DocumentSignal::Opened(document)]
}

async fn handle_modified(path: &Path, snapshots: &Snapshots) -> Vec<DocumentSignal> {
    let Some(text) = read_text(path).await else {
        return Vec::new();
    };
    let document = match document_from_path(path, text.clone()) {
        Ok(document) => document,
        Err(e) => {
            warn!(error = %e, "Cannot build document");
            return Vec::new();
        }
    };

    let previous = snapshots
        .write()
        .await
        .insert(path.to_path_buf(), text.clone());

    match previous {
        None => vec![DocumentSignal::Opened(document)],
        Some(old) if old == text => {
            trace!(path = %path.display(), "Content unchanged");
            Vec::new()
        }
        Some(old) => {
            let changes = diff_changes(&old, &text);
            vec![
                DocumentSignal::Changed {
                    document: document.clone(),
                    changes,
                },
                DocumentSignal::Saved(document),
            ]
        }
    }
}

async fn handle_removed(path: &Path, snapshots: &Snapshots) -> Vec<DocumentSignal> {
    let Some(text) = snapshots.write().await.remove(path) else {
        trace!(path = %path.display(), "Removed file was never opened");
        return Vec::new();
    };

    match document_from_path(path, text) {
        Ok(document) => vec![DocumentSignal::Closed(document)],
        Err(e) => {
            warn!(error = %e, "Cannot build document");
            Vec::new()
        }
    }
}

/// Expresses the difference between two texts as line-level content changes.
///
/// Every range is relative to `old`, so the changes are listed in document
/// order and never overlap.
#[must_use]
pub fn diff_changes(old: &str, new: &str) -> Vec<ContentChange> {
    let diff = TextDiff::from_lines(old, new);
    let old_lines = diff.old_slices();
    let new_lines = diff.new_slices();

    // Character offset of the start of each old line, plus the total.
    let mut offsets = Vec::with_capacity(old_lines.len() + 1);
    let mut offset = 0;
    offsets.push(offset);
    for line in old_lines {
        offset += line.chars().count();
        offsets.push(offset);
    }

    diff.ops()
        .iter()
        .filter_map(|op| {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            if tag == DiffTag::Equal {
                return None;
            }

            let start = Position::new(to_u32(old_range.start), 0);
            let end = line_end(old_lines, old_range.end);

            Some(ContentChange {
                range: TextRange::new(start, end),
                range_offset: offsets[old_range.start],
                range_length: offsets[old_range.end] - offsets[old_range.start],
                text: new_lines[new_range].concat(),
            })
        })
        .collect()
}

/// Position just past old line `end - 1`.
fn line_end(old_lines: &[&str], end: usize) -> Position {
    match old_lines.get(end.wrapping_sub(1)) {
        // A final line without a newline ends on its own line.
        Some(last) if end == old_lines.len() && !last.ends_with('\n') => {
            Position::new(to_u32(end - 1), to_u32(last.chars().count()))
        }
        _ => Position::new(to_u32(end), 0),
    }
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
