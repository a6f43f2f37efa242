//! Event envelope construction.
//!
//! Turns raw lifecycle signals into [`EventRecord`]s. A signal is rejected
//! (no record, no error) when:
//!
//! - the host's global telemetry switch is off,
//! - its category is disabled in settings, or
//! - the document is not a local `file:` resource.
//!
//! Accepted signals get a document id from the [`IdentityRegistry`], the
//! current time in epoch milliseconds, and the host's session and machine ids.
//! Each build also yields a short status text for live display; that text is
//! never part of the exported record.

use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{trace, warn};

use crate::identity::IdentityRegistry;
use crate::settings::CategoryToggles;
use crate::types::{ContentChange, Document, DocumentSignal, EventName, EventRecord};

/// Operation tag carried by reopen records.
pub const REOPEN_OPERATION: &str = "open";

/// Value of every range-marker field on reopen records.
const ZERO_MARKER: &str = "0";

/// Owner side of the host's global telemetry switch.
#[derive(Debug)]
pub struct TelemetrySwitch {
    tx: watch::Sender<bool>,
}

impl TelemetrySwitch {
    /// Creates a switch in the given initial state.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        let (tx, _rx) = watch::channel(enabled);
        Self { tx }
    }

    /// Flips the switch, notifying every subscriber if the value changed.
    pub fn set(&self, enabled: bool) {
        self.tx.send_if_modified(|current| {
            let changed = *current != enabled;
            *current = enabled;
            changed
        });
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Returns a receiver that observes changes of the switch.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Read-only facts the host provides about its environment.
#[derive(Debug, Clone)]
pub struct HostEnvironment {
    telemetry: watch::Receiver<bool>,
    session_id: String,
    machine_id: String,
}

impl HostEnvironment {
    pub fn new(
        switch: &TelemetrySwitch,
        session_id: impl Into<String>,
        machine_id: impl Into<String>,
    ) -> Self {
        Self {
            telemetry: switch.subscribe(),
            session_id: session_id.into(),
            machine_id: machine_id.into(),
        }
    }

    #[must_use]
    pub fn is_telemetry_enabled(&self) -> bool {
        *self.telemetry.borrow()
    }

    /// Returns a fresh receiver for telemetry switch changes.
    #[must_use]
    pub fn telemetry_changes(&self) -> watch::Receiver<bool> {
        let mut rx = self.telemetry.clone();
        rx.mark_unchanged();
        rx
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }
}

/// A built record plus its live-display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub record: EventRecord,
    pub status: String,
}

/// Builds event records from signals.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    host: HostEnvironment,
    toggles: CategoryToggles,
    registry: Arc<IdentityRegistry>,
}

impl EnvelopeBuilder {
    pub fn new(
        host: HostEnvironment,
        toggles: CategoryToggles,
        registry: Arc<IdentityRegistry>,
    ) -> Self {
        Self {
            host,
            toggles,
            registry,
        }
    }

    #[must_use]
    pub fn host(&self) -> &HostEnvironment {
        &self.host
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.registry
    }

    /// Returns true if an event of `event` kind about `document` may be reported.
    #[must_use]
    pub fn admits(&self, event: EventName, document: &Document) -> bool {
        if !self.host.is_telemetry_enabled() {
            trace!(event = %event, "Telemetry disabled by host");
            return false;
        }
        if !self.toggles.is_enabled(event) {
            trace!(event = %event, "Event category disabled");
            return false;
        }
        if !document.locator.is_file() {
            trace!(event = %event, locator = %document.locator, "Ignoring non-file resource");
            return false;
        }
        true
    }

    /// Builds the envelope for a lifecycle signal.
    ///
    /// Returns `None` when the signal is rejected, or when a change signal
    /// carries no content changes.
    #[must_use]
    pub fn build(&self, signal: &DocumentSignal) -> Option<Envelope> {
        let event = signal.event_name();
        let document = signal.document();
        if !self.admits(event, document) {
            return None;
        }

        let id = self.registry.resolve_id(&document.locator);
        let mut record = self.base_record(event, document, id);

        let status = match signal {
            DocumentSignal::Opened(document) => {
                record.document_content = Some(document.text.clone());
                format!(
                    "Document {id} ({}) Open: {}",
                    document.file_name,
                    document.first_line()
                )
            }
            DocumentSignal::Changed { changes, .. } => {
                let status = change_summary(id, changes)?;
                match serde_json::to_string(changes) {
                    Ok(json) => record.document_changes = Some(json),
                    Err(e) => {
                        warn!(error = %e, locator = %document.locator, "Failed to serialize changes");
                        return None;
                    }
                }
                status
            }
            DocumentSignal::Closed(_) => format!("Document {id} Close"),
            DocumentSignal::Saved(_) => format!("Document {id} Save"),
        };

        Some(Envelope { record, status })
    }

    /// Builds the synthetic reopen record for a document fetched on request
    /// of the remote channel.
    #[must_use]
    pub fn build_reopen(&self, document: &Document) -> Option<Envelope> {
        if !self.admits(EventName::Reopen, document) {
            return None;
        }

        let id = self.registry.resolve_id(&document.locator);
        let mut record = self.base_record(EventName::Reopen, document, id);
        record.language_id = Some(document.language_id.clone());
        record.operation = Some(REOPEN_OPERATION.to_string());
        record.document_content = Some(document.text.clone());
        record.range_start_line = Some(ZERO_MARKER.to_string());
        record.range_start_character = Some(ZERO_MARKER.to_string());
        record.range_end_line = Some(ZERO_MARKER.to_string());
        record.range_end_character = Some(ZERO_MARKER.to_string());
        record.hash = Some(content_hash(&document.text));

        Some(Envelope {
            record,
            status: format!("Document {id} Reopen"),
        })
    }

    fn base_record(&self, event: EventName, document: &Document, id: u64) -> EventRecord {
        EventRecord {
            event_name: event,
            event_time: Utc::now().timestamp_millis(),
            session_id: self.host.session_id().to_string(),
            machine_id: self.host.machine_id().to_string(),
            document_uri: document.locator.clone(),
            document_id: id,
            document_content: None,
            document_changes: None,
            language_id: None,
            operation: None,
            range_start_line: None,
            range_start_character: None,
            range_end_line: None,
            range_end_character: None,
            hash: None,
        }
    }
}

/// Returns the lowercase hex SHA-256 digest of `text`.
#[must_use]
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Describes a change list for live display, based on its last change.
///
/// Returns `None` for an empty list.
#[must_use]
pub fn change_summary(id: u64, changes: &[ContentChange]) -> Option<String> {
    let change = changes.last()?;
    let summary = if change.range.is_empty() {
        format!("Document {id} Add: {}", change.text)
    } else if change.text.is_empty() {
        format!("Document {id} Delete")
    } else {
        format!("Document {id} Replace: {}", change.text)
    };
    Some(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Position, ResourceLocator, TextRange};

    fn document(locator: &str, text: &str) -> Document {
        Document {
            locator: ResourceLocator::new(locator),
            language_id: "plaintext".to_string(),
            file_name: locator.trim_start_matches("file://").to_string(),
            text: text.to_string(),
        }
    }

    fn builder(switch: &TelemetrySwitch, toggles: CategoryToggles) -> EnvelopeBuilder {
        EnvelopeBuilder::new(
            HostEnvironment::new(switch, "session-1", "machine-1"),
            toggles,
            Arc::new(IdentityRegistry::new()),
        )
    }

    fn insert(line: u32, text: &str) -> ContentChange {
        ContentChange {
            range: TextRange::new(Position::new(line, 0), Position::new(line, 0)),
            range_offset: 0,
            range_length: 0,
            text: text.to_string(),
        }
    }

    fn replace(text: &str) -> ContentChange {
        ContentChange {
            range: TextRange::new(Position::new(0, 0), Position::new(0, 5)),
            range_offset: 0,
            range_length: 5,
            text: text.to_string(),
        }
    }

    #[test]
    fn open_record_carries_identity_and_text() {
        let switch = TelemetrySwitch::new(true);
        let builder = builder(&switch, CategoryToggles::default());

        let envelope = builder
            .build(&DocumentSignal::Opened(document("file:///a.txt", "hello\nworld")))
            .unwrap();

        let record = envelope.record;
        assert_eq!(record.event_name, EventName::DocumentOpen);
        assert_eq!(record.document_id, 1);
        assert_eq!(record.session_id, "session-1");
        assert_eq!(record.machine_id, "machine-1");
        assert_eq!(record.document_uri.as_str(), "file:///a.txt");
        assert_eq!(record.document_content.as_deref(), Some("hello\nworld"));
        assert!(record.event_time > 0);
        assert_eq!(envelope.status, "Document 1 (/a.txt) Open: hello");
    }

    #[test]
    fn disabled_telemetry_rejects_everything() {
        let switch = TelemetrySwitch::new(false);
        let builder = builder(&switch, CategoryToggles::default());
        let doc = document("file:///a.txt", "hello");

        assert!(builder.build(&DocumentSignal::Opened(doc.clone())).is_none());
        assert!(builder.build(&DocumentSignal::Saved(doc.clone())).is_none());
        assert!(builder.build_reopen(&doc).is_none());
        assert!(builder.registry().is_empty());
    }

    #[test]
    fn switch_changes_are_observed() {
        let switch = TelemetrySwitch::new(false);
        let builder = builder(&switch, CategoryToggles::default());
        let doc = document("file:///a.txt", "hello");

        assert!(builder.build(&DocumentSignal::Closed(doc.clone())).is_none());
        switch.set(true);
        assert!(builder.build(&DocumentSignal::Closed(doc)).is_some());
    }

    #[test]
    fn disabled_category_is_rejected() {
        let switch = TelemetrySwitch::new(true);
        let toggles = CategoryToggles::default().with(EventName::DocumentOpen, false);
        let builder = builder(&switch, toggles);
        let doc = document("file:///a.txt", "hello");

        assert!(builder.build(&DocumentSignal::Opened(doc.clone())).is_none());
        assert!(builder.build(&DocumentSignal::Saved(doc)).is_some());
    }

    #[test]
    fn non_file_resources_are_never_reported() {
        let switch = TelemetrySwitch::new(true);
        let builder = builder(&switch, CategoryToggles::default());

        for locator in ["untitled:Untitled-1", "git:/a.txt?ref", "output:extension"] {
            let doc = document(locator, "text");
            assert!(builder.build(&DocumentSignal::Opened(doc.clone())).is_none());
            assert!(builder.build_reopen(&doc).is_none());
        }
    }

    #[test]
    fn empty_change_list_produces_nothing() {
        let switch = TelemetrySwitch::new(true);
        let builder = builder(&switch, CategoryToggles::default());

        let signal = DocumentSignal::Changed {
            document: document("file:///a.txt", "hello"),
            changes: Vec::new(),
        };
        assert!(builder.build(&signal).is_none());
    }

    #[test]
    fn change_payload_round_trips() {
        let switch = TelemetrySwitch::new(true);
        let builder = builder(&switch, CategoryToggles::default());
        let changes = vec![insert(0, "a"), insert(1, "b"), replace("c")];

        let envelope = builder
            .build(&DocumentSignal::Changed {
                document: document("file:///a.txt", "hello"),
                changes: changes.clone(),
            })
            .unwrap();

        assert_eq!(envelope.record.event_name, EventName::DocumentChange);
        assert!(envelope.record.document_content.is_none());
        let parsed = envelope.record.parsed_changes().unwrap().unwrap();
        assert_eq!(parsed, changes);
    }

    #[test]
    fn close_and_save_carry_no_payload() {
        let switch = TelemetrySwitch::new(true);
        let builder = builder(&switch, CategoryToggles::default());
        let doc = document("file:///a.txt", "hello");

        let close = builder.build(&DocumentSignal::Closed(doc.clone())).unwrap();
        let save = builder.build(&DocumentSignal::Saved(doc)).unwrap();

        assert!(close.record.document_content.is_none());
        assert!(save.record.document_changes.is_none());
        assert_eq!(close.status, "Document 1 Close");
        assert_eq!(save.status, "Document 1 Save");
    }

    #[test]
    fn reopen_record_has_zero_range_marker_and_hash() {
        let switch = TelemetrySwitch::new(true);
        let builder = builder(&switch, CategoryToggles::default());
        let mut doc = document("file:///a.txt", "hello");
        doc.language_id = "rust".to_string();

        let record = builder.build_reopen(&doc).unwrap().record;

        assert_eq!(record.event_name, EventName::Reopen);
        assert_eq!(record.language_id.as_deref(), Some("rust"));
        assert_eq!(record.operation.as_deref(), Some("open"));
        assert_eq!(record.document_content.as_deref(), Some("hello"));
        assert_eq!(record.range_start_line.as_deref(), Some("0"));
        assert_eq!(record.range_start_character.as_deref(), Some("0"));
        assert_eq!(record.range_end_line.as_deref(), Some("0"));
        assert_eq!(record.range_end_character.as_deref(), Some("0"));
        assert_eq!(record.hash, Some(content_hash("hello")));
    }

    #[test]
    fn reopen_respects_its_category_toggle() {
        let switch = TelemetrySwitch::new(true);
        let toggles = CategoryToggles::default().with(EventName::Reopen, false);
        let builder = builder(&switch, toggles);

        assert!(builder.build_reopen(&document("file:///a.txt", "x")).is_none());
    }

    #[test]
    fn content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash("hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(content_hash("hello"), content_hash("hello"));
        assert_ne!(content_hash("hello"), content_hash("hello!"));
        assert_eq!(content_hash("").len(), 64);
    }

    #[test]
    fn change_summary_classifies_last_change() {
        assert_eq!(
            change_summary(3, &[insert(0, "x")]).as_deref(),
            Some("Document 3 Add: x")
        );
        assert_eq!(
            change_summary(3, &[insert(0, "x"), replace("")]).as_deref(),
            Some("Document 3 Delete")
        );
        assert_eq!(
            change_summary(3, &[replace("yz")]).as_deref(),
            Some("Document 3 Replace: yz")
        );
        assert_eq!(change_summary(3, &[]), None);
    }

    #[test]
    fn same_document_keeps_its_id_across_kinds() {
        let switch = TelemetrySwitch::new(true);
        let builder = builder(&switch, CategoryToggles::default());
        let a = document("file:///a.txt", "hello");
        let b = document("file:///b.txt", "bye");

        let first = builder.build(&DocumentSignal::Opened(a.clone())).unwrap();
        let other = builder.build(&DocumentSignal::Opened(b)).unwrap();
        let again = builder.build_reopen(&a).unwrap();

        assert_eq!(first.record.document_id, 1);
        assert_eq!(other.record.document_id, 2);
        assert_eq!(again.record.document_id, 1);
    }
}
