//! Exporter resolution.
//!
//! Merges the global active-event list with per-exporter overrides, once at
//! startup:
//!
//! - With a non-empty global list, every exporter without its own list
//!   inherits the global one. Exporters that specify a list keep it, even
//!   when that list is empty.
//! - Without a global list (absent or empty), only exporters carrying a
//!   non-empty list of their own are kept. Unconfigured exporters receive
//!   nothing rather than everything.

use serde::Serialize;
use tracing::debug;

use crate::settings::{ActiveEvent, ExporterArgs, ExporterDescriptor, TelemetrySettings};

/// An exporter whose active-event list has been made explicit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedExporter {
    pub args: ExporterArgs,
    pub active_events: Vec<ActiveEvent>,
}

impl ResolvedExporter {
    /// Returns the exporter id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.args.id
    }

    /// Returns true if the resolved list names `event`.
    #[must_use]
    pub fn wants(&self, event: &str) -> bool {
        self.active_events.iter().any(|a| a.name == event)
    }
}

/// Resolves exporter descriptors against the global active-event list.
#[must_use]
pub fn resolve_exporters(
    global: Option<&[ActiveEvent]>,
    exporters: Option<&[ExporterDescriptor]>,
) -> Vec<ResolvedExporter> {
    let Some(exporters) = exporters else {
        return Vec::new();
    };

    let resolved: Vec<ResolvedExporter> = match global.filter(|g| !g.is_empty()) {
        Some(global) => exporters
            .iter()
            .map(|e| ResolvedExporter {
                args: e.args.clone(),
                active_events: e
                    .active_events
                    .clone()
                    .unwrap_or_else(|| global.to_vec()),
            })
            .collect(),
        None => exporters
            .iter()
            .filter_map(|e| match &e.active_events {
                Some(events) if !events.is_empty() => Some(ResolvedExporter {
                    args: e.args.clone(),
                    active_events: events.clone(),
                }),
                _ => {
                    debug!(exporter = %e.args.id, "Dropping exporter without active events");
                    None
                }
            })
            .collect(),
    };

    debug!(
        configured = exporters.len(),
        resolved = resolved.len(),
        "Resolved exporters"
    );

    resolved
}

/// Resolves the exporters named in `settings`.
#[must_use]
pub fn resolve_settings(settings: &TelemetrySettings) -> Vec<ResolvedExporter> {
    resolve_exporters(
        settings.active_events.as_deref(),
        settings.exporters.as_deref(),
    )
}
