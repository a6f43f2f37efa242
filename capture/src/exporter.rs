//! Delivery of event records to exporters.
//!
//! Delivery is fire-and-forget: [`EventSink::publish`] never blocks the caller
//! and never reports failure back. There is no acknowledgment and no retry;
//! failed deliveries are logged and dropped.
//!
//! - [`ExporterSink`] POSTs JSON to the exporter's `url` arg, or writes the
//!   record to the `doctel::export` log target when no url is configured.
//! - [`ChannelSink`] hands records to an in-process consumer.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::resolve::ResolvedExporter;
use crate::types::EventRecord;

/// HTTP request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Header carrying the `telemetry.key` credential.
pub const TELEMETRY_KEY_HEADER: &str = "X-Telemetry-Key";

/// Header carrying the exporter id.
pub const EXPORTER_ID_HEADER: &str = "X-Exporter-Id";

/// Errors that can occur while delivering a record.
#[derive(Error, Debug)]
pub enum ExportError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Exporter endpoint answered with a non-success status.
    #[error("exporter returned status {status}")]
    Status { status: u16 },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid header value (key or exporter id contains invalid characters).
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

/// Outbound event sink contract.
pub trait EventSink: Send + Sync {
    /// Delivers `record` to `exporter` without waiting for the outcome.
    fn publish(&self, record: &EventRecord, exporter: &ResolvedExporter);
}

/// Default sink: HTTP for exporters with a `url`, structured log otherwise.
#[derive(Debug, Clone)]
pub struct ExporterSink {
    client: Client,
    key: Option<String>,
}

impl ExporterSink {
    /// Creates a sink that attaches `key` (the `telemetry.key` setting) to
    /// every HTTP delivery.
    ///
    /// # Errors
    ///
    /// Returns `ExportError::Http` if the HTTP client cannot be built.
    pub fn new(key: Option<String>) -> Result<Self, ExportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self { client, key })
    }

    fn headers(&self, exporter_id: &str) -> Result<HeaderMap, ExportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(EXPORTER_ID_HEADER, HeaderValue::from_str(exporter_id)?);
        if let Some(key) = &self.key {
            headers.insert(TELEMETRY_KEY_HEADER, HeaderValue::from_str(key)?);
        }
        Ok(headers)
    }
}

impl EventSink for ExporterSink {
    fn publish(&self, record: &EventRecord, exporter: &ResolvedExporter) {
        let Some(url) = exporter.args.url.clone() else {
            match serde_json::to_string(record) {
                Ok(json) => info!(
                    target: "doctel::export",
                    exporter = %exporter.id(),
                    event = %record.event_name,
                    record = %json,
                    "Exported event"
                ),
                Err(e) => warn!(exporter = %exporter.id(), error = %e, "Failed to serialize event"),
            }
            return;
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(exporter = %exporter.id(), "No async runtime, dropping event");
            return;
        };

        let headers = match self.headers(exporter.id()) {
            Ok(headers) => headers,
            Err(e) => {
                warn!(exporter = %exporter.id(), error = %e, "Dropping event");
                return;
            }
        };

        let client = self.client.clone();
        let record = record.clone();
        let exporter_id = exporter.id().to_string();

        runtime.spawn(async move {
            match post_record(&client, &url, headers, &record).await {
                Ok(()) => debug!(
                    exporter = %exporter_id,
                    event = %record.event_name,
                    "Event delivered"
                ),
                Err(e) => warn!(
                    exporter = %exporter_id,
                    event = %record.event_name,
                    error = %e,
                    "Event delivery failed"
                ),
            }
        });
    }
}

/// POSTs one record as JSON.
async fn post_record(
    client: &Client,
    url: &str,
    headers: HeaderMap,
    record: &EventRecord,
) -> Result<(), ExportError> {
    let body = serde_json::to_string(record)?;
    let response = client.post(url).headers(headers).body(body).send().await?;

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(ExportError::Status {
            status: status.as_u16(),
        })
    }
}

/// A record delivered through a [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub exporter_id: String,
    pub record: EventRecord,
}

/// Sink that forwards deliveries to an in-process consumer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl ChannelSink {
    /// Creates a sink and the receiver its deliveries arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, record: &EventRecord, exporter: &ResolvedExporter) {
        let delivery = Delivery {
            exporter_id: exporter.id().to_string(),
            record: record.clone(),
        };
        if self.tx.send(delivery).is_err() {
            debug!(exporter = %exporter.id(), "Delivery consumer gone, dropping event");
        }
    }
}
