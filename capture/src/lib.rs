//! Doctel capture - document lifecycle telemetry.
//!
//! This crate turns editor document activity (open, change, close, save) into
//! telemetry event records and delivers them to configured exporters. A
//! remote command channel lets a collection server request that a document be
//! re-opened and reported on demand.
//!
//! # Overview
//!
//! ```text
//!  settings ──▶ resolve ──▶ dispatch (producers ↔ exporters)
//!                               │
//!  DocumentSignal ──▶ envelope ─┴─▶ exporter (EventSink)
//!                      ▲
//!  remote command ──▶ document (DocumentSource)
//! ```
//!
//! Documents get small stable integer ids from the [`identity`] registry for
//! the lifetime of the process. Only local `file:` documents are reported,
//! and only while the host's telemetry switch is on.
//!
//! # Modules
//!
//! - [`types`]: Document, signal, and event record types
//! - [`identity`]: Document id registry
//! - [`settings`]: Telemetry settings file
//! - [`resolve`]: Exporter resolution and active-event inheritance
//! - [`envelope`]: Event record construction and gating
//! - [`dispatch`]: Producer to exporter routing
//! - [`exporter`]: Event delivery sinks
//! - [`document`]: Document access for reopen requests
//! - [`remote`]: WebSocket command channel
//! - [`status`]: Live status text
//! - [`pipeline`]: Everything wired together
//! - [`watcher`]: Workspace watcher producing document signals
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types

pub mod config;
pub mod dispatch;
pub mod document;
pub mod envelope;
pub mod error;
pub mod exporter;
pub mod identity;
pub mod pipeline;
pub mod remote;
pub mod resolve;
pub mod settings;
pub mod status;
pub mod types;
pub mod watcher;

pub use config::{Config, ConfigError};
pub use dispatch::{Dispatcher, Listener, Producer};
pub use document::{DocumentError, DocumentSource, FsDocumentSource};
pub use envelope::{content_hash, Envelope, EnvelopeBuilder, HostEnvironment, TelemetrySwitch};
pub use error::{CaptureError, Result};
pub use exporter::{ChannelSink, Delivery, EventSink, ExportError, ExporterSink};
pub use identity::IdentityRegistry;
pub use pipeline::Pipeline;
pub use remote::{ChannelState, RemoteChannel, RemoteCommand};
pub use resolve::{resolve_exporters, ResolvedExporter};
pub use settings::{ActiveEvent, ExporterDescriptor, ReopenRouting, TelemetrySettings};
pub use status::StatusLine;
pub use types::{ContentChange, Document, DocumentSignal, EventName, EventRecord, ResourceLocator};
pub use watcher::{WatcherError, WorkspaceWatcher};
