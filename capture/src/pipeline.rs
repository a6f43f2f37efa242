//! The capture pipeline.
//!
//! Owns everything between raw host signals and exporters:
//!
//! ```text
//!  DocumentSignal ──▶ Dispatcher has listeners? ──▶ EnvelopeBuilder ──▶ EventSink (per listener)
//!  RemoteCommand  ──▶ DocumentSource ──▶ EnvelopeBuilder::build_reopen ──▶ EventSink (per reopen target)
//! ```
//!
//! Signals and commands are processed one at a time, in arrival order, by a
//! single task (see [`Pipeline::run`]).

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::dispatch::{Dispatcher, Producer};
use crate::document::DocumentSource;
use crate::envelope::{EnvelopeBuilder, HostEnvironment};
use crate::exporter::EventSink;
use crate::identity::IdentityRegistry;
use crate::remote::RemoteCommand;
use crate::resolve::resolve_settings;
use crate::settings::{ReopenRouting, TelemetrySettings};
use crate::status::StatusLine;
use crate::types::DocumentSignal;

/// Shown when telemetry is switched off by the host.
pub const TELEMETRY_DISABLED_NOTICE: &str = "Telemetry extension is disabled.";

/// Builds the consent notice shown to the user.
#[must_use]
pub fn consent_notice(enabled: bool, exporter_ids: &[&str]) -> String {
    if enabled {
        format!("Telemetry data is being logged to {}.", exporter_ids.join(" & "))
    } else {
        TELEMETRY_DISABLED_NOTICE.to_string()
    }
}

/// An activated capture pipeline.
pub struct Pipeline<D> {
    builder: EnvelopeBuilder,
    dispatcher: Dispatcher,
    sink: Arc<dyn EventSink>,
    documents: D,
    status: Arc<StatusLine>,
    reopen_routing: ReopenRouting,
}

impl<D: DocumentSource> Pipeline<D> {
    /// Resolves exporters from `settings` and activates their producers.
    pub fn activate(
        settings: &TelemetrySettings,
        host: HostEnvironment,
        registry: Arc<IdentityRegistry>,
        sink: Arc<dyn EventSink>,
        documents: D,
    ) -> Self {
        let mut dispatcher = Dispatcher::new();
        dispatcher.activate(resolve_settings(settings));

        let builder = EnvelopeBuilder::new(host, settings.toggles, registry);
        let pipeline = Self {
            builder,
            dispatcher,
            sink,
            documents,
            status: Arc::new(StatusLine::new()),
            reopen_routing: settings.reopen_routing,
        };

        info!("{}", pipeline.consent_notice());
        pipeline
    }

    /// Returns the consent notice for the current telemetry state.
    #[must_use]
    pub fn consent_notice(&self) -> String {
        let ids: Vec<&str> = self.dispatcher.exporters().iter().map(|e| e.id()).collect();
        consent_notice(self.builder.host().is_telemetry_enabled(), &ids)
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn status(&self) -> &Arc<StatusLine> {
        &self.status
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        self.builder.registry()
    }

    /// Handles one lifecycle signal; returns the number of deliveries.
    pub fn handle_signal(&self, signal: &DocumentSignal) -> usize {
        let producer = Producer::for_signal(signal);
        // Ids are only assigned to documents some exporter hears about.
        if !self.dispatcher.has_listeners(producer) {
            trace!(producer = producer.id(), "No listeners");
            return 0;
        }

        let Some(envelope) = self.builder.build(signal) else {
            return 0;
        };
        self.status.set(envelope.status);

        let mut delivered = 0;
        for listener in self.dispatcher.listeners(producer) {
            self.sink.publish(&envelope.record, &listener.exporter);
            delivered += 1;
        }

        debug!(
            event = %envelope.record.event_name,
            document_id = envelope.record.document_id,
            delivered,
            "Dispatched event"
        );
        delivered
    }

    /// Handles one remote reopen command; returns the number of deliveries.
    pub async fn handle_command(&self, command: RemoteCommand) -> usize {
        if !self.builder.host().is_telemetry_enabled() {
            debug!(locator = %command.locator, "Telemetry disabled, ignoring reopen");
            return 0;
        }

        let document = match self.documents.open_document(&command.locator).await {
            Ok(document) => document,
            Err(e) => {
                warn!(locator = %command.locator, error = %e, "Cannot reopen document");
                return 0;
            }
        };

        let Some(envelope) = self.builder.build_reopen(&document) else {
            return 0;
        };
        self.status.set(envelope.status);

        let targets = self.dispatcher.reopen_targets(self.reopen_routing);
        for exporter in &targets {
            self.sink.publish(&envelope.record, exporter);
        }

        info!(
            locator = %command.locator,
            document_id = envelope.record.document_id,
            targets = targets.len(),
            "Reported reopened document"
        );
        targets.len()
    }

    /// Processes signals and commands until both channels are closed.
    ///
    /// The consent notice is logged again whenever the host flips telemetry.
    pub async fn run(
        self,
        mut signals: mpsc::Receiver<DocumentSignal>,
        mut commands: mpsc::Receiver<RemoteCommand>,
    ) {
        let mut telemetry = self.builder.host().telemetry_changes();
        let mut switch_alive = true;
        let mut signals_open = true;
        let mut commands_open = true;

        while signals_open || commands_open {
            tokio::select! {
                signal = signals.recv(), if signals_open => match signal {
                    Some(signal) => {
                        self.handle_signal(&signal);
                    }
                    None => {
                        debug!("Signal channel closed");
                        signals_open = false;
                    }
                },
                command = commands.recv(), if commands_open => match command {
                    Some(command) => {
                        self.handle_command(command).await;
                    }
                    None => {
                        debug!("Command channel closed");
                        commands_open = false;
                    }
                },
                changed = telemetry.changed(), if switch_alive => {
                    if changed.is_ok() {
                        info!("{}", self.consent_notice());
                    } else {
                        switch_alive = false;
                    }
                }
            }
        }

        info!("Pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_lists_exporters() {
        assert_eq!(
            consent_notice(true, &["X", "Y"]),
            "Telemetry data is being logged to X & Y."
        );
        assert_eq!(
            consent_notice(true, &["X"]),
            "Telemetry data is being logged to X."
        );
    }

    #[test]
    fn notice_when_disabled() {
        assert_eq!(consent_notice(false, &["X"]), TELEMETRY_DISABLED_NOTICE);
    }
}
