//! Producer dispatch.
//!
//! Each lifecycle category has one [`Producer`] variant. Activating a resolved
//! exporter binds a [`Listener`] for every producer named in its active-event
//! list; signals are then routed by looking up the listeners of the signal's
//! producer.
//!
//! Activation is idempotent per `(exporter, producer)` pair, so activating
//! the same configuration twice never duplicates deliveries. Exporters are
//! matched by their whole resolved value, not by id: two descriptors that
//! share an id but differ in args or active events stay separate.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::resolve::ResolvedExporter;
use crate::settings::ReopenRouting;
use crate::types::{DocumentSignal, EventName};

/// A source of one category of lifecycle signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Producer {
    DocumentOpen,
    DocumentChange,
    DocumentClose,
    DocumentSave,
}

impl Producer {
    /// Every producer, in registration order.
    pub const ALL: [Producer; 4] = [
        Producer::DocumentOpen,
        Producer::DocumentChange,
        Producer::DocumentClose,
        Producer::DocumentSave,
    ];

    #[must_use]
    pub fn event_name(self) -> EventName {
        match self {
            Self::DocumentOpen => EventName::DocumentOpen,
            Self::DocumentChange => EventName::DocumentChange,
            Self::DocumentClose => EventName::DocumentClose,
            Self::DocumentSave => EventName::DocumentSave,
        }
    }

    /// Returns the producer id matched against active-event names.
    #[must_use]
    pub fn id(self) -> &'static str {
        self.event_name().as_str()
    }

    /// Returns the producer that emits `signal`.
    #[must_use]
    pub fn for_signal(signal: &DocumentSignal) -> Self {
        match signal {
            DocumentSignal::Opened(_) => Self::DocumentOpen,
            DocumentSignal::Changed { .. } => Self::DocumentChange,
            DocumentSignal::Closed(_) => Self::DocumentClose,
            DocumentSignal::Saved(_) => Self::DocumentSave,
        }
    }
}

/// A producer bound to one exporter.
#[derive(Debug, Clone)]
pub struct Listener {
    pub producer: Producer,
    pub exporter: Arc<ResolvedExporter>,
}

/// Routing table from producers to exporters.
#[derive(Debug, Default)]
pub struct Dispatcher {
    exporters: Vec<Arc<ResolvedExporter>>,
    listeners: Vec<Listener>,
    /// `(index into exporters, producer)` pairs with a listener.
    activated: HashSet<(usize, Producer)>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates listeners for the given exporters.
    ///
    /// Pairs that are already active are skipped. Returns the number of
    /// listeners added.
    pub fn activate(&mut self, exporters: impl IntoIterator<Item = ResolvedExporter>) -> usize {
        let mut added = 0;

        for exporter in exporters {
            for active in &exporter.active_events {
                if EventName::from_name(&active.name).is_none() {
                    warn!(
                        exporter = %exporter.id(),
                        event = %active.name,
                        "Active event matches no known producer"
                    );
                }
            }

            let slot = match self.exporters.iter().position(|e| **e == exporter) {
                Some(slot) => slot,
                None => {
                    if self.exporters.iter().any(|e| e.id() == exporter.id()) {
                        warn!(exporter = %exporter.id(), "Exporter id is configured more than once");
                    }
                    self.exporters.push(Arc::new(exporter));
                    self.exporters.len() - 1
                }
            };
            let exporter = Arc::clone(&self.exporters[slot]);

            for producer in Producer::ALL {
                if !exporter.wants(producer.id()) {
                    continue;
                }
                if !self.activated.insert((slot, producer)) {
                    debug!(
                        exporter = %exporter.id(),
                        producer = producer.id(),
                        "Listener already active"
                    );
                    continue;
                }

                self.listeners.push(Listener {
                    producer,
                    exporter: Arc::clone(&exporter),
                });
                added += 1;
            }
        }

        info!(
            exporters = self.exporters.len(),
            listeners = self.listeners.len(),
            added,
            "Activated producers"
        );

        added
    }

    /// Returns the listeners bound to `producer`, in activation order.
    pub fn listeners(&self, producer: Producer) -> impl Iterator<Item = &Listener> {
        self.listeners
            .iter()
            .filter(move |l| l.producer == producer)
    }

    #[must_use]
    pub fn has_listeners(&self, producer: Producer) -> bool {
        self.listeners(producer).next().is_some()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Returns every activated exporter, including those with no listeners.
    #[must_use]
    pub fn exporters(&self) -> &[Arc<ResolvedExporter>] {
        &self.exporters
    }

    /// Returns the exporters a reopen record goes to under `routing`.
    #[must_use]
    pub fn reopen_targets(&self, routing: ReopenRouting) -> Vec<Arc<ResolvedExporter>> {
        self.exporters
            .iter()
            .filter(|e| match routing {
                ReopenRouting::All => true,
                ReopenRouting::ActiveEvents => e.wants(EventName::Reopen.as_str()),
            })
            .cloned()
            .collect()
    }
}
