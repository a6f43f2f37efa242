//! Integration tests for the remote command channel.
//!
//! Each test runs a throwaway WebSocket server on a local port, points a
//! [`RemoteChannel`] at it, and checks what reaches the command consumer.

use std::sync::Arc;
use std::time::Duration;

use doctel_capture::document::FsDocumentSource;
use doctel_capture::envelope::{content_hash, HostEnvironment, TelemetrySwitch};
use doctel_capture::exporter::ChannelSink;
use doctel_capture::identity::IdentityRegistry;
use doctel_capture::pipeline::Pipeline;
use doctel_capture::remote::{channel_url, ChannelState, RemoteChannel};
use doctel_capture::settings::TelemetrySettings;
use doctel_capture::types::EventName;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

const TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Test Helpers
// =============================================================================

/// Accepts one connection, reports the request URI, sends `frames`, then
/// closes the connection.
async fn serve_once(frames: Vec<Message>) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (uri_tx, uri_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket =
            tokio_tungstenite::accept_hdr_async(stream, |request: &Request, response: Response| {
                let _ = uri_tx.send(request.uri().to_string());
                Ok(response)
            })
            .await
            .unwrap();

        for frame in frames {
            socket.send(frame).await.unwrap();
        }
        let _ = socket.close(None).await;
        // Drain until the client acknowledges the close.
        while let Some(Ok(_)) = socket.next().await {}
    });

    (format!("ws://{addr}"), uri_rx)
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_handshake_carries_client_id() {
    let (server, uri_rx) = serve_once(Vec::new()).await;
    let (tx, _rx) = mpsc::channel(8);

    let mut channel = RemoteChannel::spawn(channel_url(&server, "machine-1").unwrap(), tx);

    let uri = timeout(TIMEOUT, uri_rx).await.unwrap().unwrap();
    assert_eq!(uri, "/?clientId=machine-1");
    assert_eq!(
        timeout(TIMEOUT, channel.wait_terminal()).await.unwrap(),
        ChannelState::Closed
    );
}

#[tokio::test]
async fn test_commands_are_forwarded_in_order() {
    let (server, _uri) = serve_once(vec![
        Message::text(r#""file:///a.txt""#),
        Message::text("not json"),
        Message::binary(br#""file:///b.txt""#.to_vec()),
    ])
    .await;
    let (tx, mut rx) = mpsc::channel(8);

    let channel = RemoteChannel::spawn(channel_url(&server, "m").unwrap(), tx);

    let first = timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
    let second = timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.locator.as_str(), "file:///a.txt");
    assert_eq!(second.locator.as_str(), "file:///b.txt");

    channel.close().await;
}

#[tokio::test]
async fn test_close_stops_the_channel() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        // Keep the connection open until the client leaves.
        while let Some(Ok(_)) = socket.next().await {}
    });

    let (tx, _rx) = mpsc::channel(8);
    let channel = RemoteChannel::spawn(channel_url(&format!("ws://{addr}"), "m").unwrap(), tx);
    let mut states = channel.state_changes();

    timeout(TIMEOUT, states.wait_for(|s| *s == ChannelState::Open))
        .await
        .unwrap()
        .unwrap();

    timeout(TIMEOUT, channel.close()).await.unwrap();
    assert_eq!(*states.borrow(), ChannelState::Closed);
}

#[tokio::test]
async fn test_remote_reopen_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.txt");
    std::fs::write(&path, "hello").unwrap();
    let locator = Url::from_file_path(&path).unwrap().to_string();

    let (server, _uri) = serve_once(vec![Message::text(
        serde_json::to_string(&locator).unwrap(),
    )])
    .await;

    let settings = TelemetrySettings::from_json_str(
        r#"{ "telemetry.exporters": [{ "args": { "id": "X" }, "activeEvents": [] }] }"#,
    )
    .unwrap();
    let switch = TelemetrySwitch::new(true);
    let (sink, mut deliveries) = ChannelSink::new();
    let pipeline = Pipeline::activate(
        &settings,
        HostEnvironment::new(&switch, "s", "m"),
        Arc::new(IdentityRegistry::new()),
        Arc::new(sink),
        FsDocumentSource,
    );

    let (_signal_tx, signal_rx) = mpsc::channel(8);
    let (command_tx, command_rx) = mpsc::channel(8);
    let channel = RemoteChannel::spawn(channel_url(&server, "m").unwrap(), command_tx);
    tokio::spawn(pipeline.run(signal_rx, command_rx));

    let delivery = timeout(TIMEOUT, deliveries.recv()).await.unwrap().unwrap();
    assert_eq!(delivery.exporter_id, "X");
    assert_eq!(delivery.record.event_name, EventName::Reopen);
    assert_eq!(delivery.record.document_uri.as_str(), locator);
    assert_eq!(delivery.record.document_content.as_deref(), Some("hello"));
    assert_eq!(delivery.record.range_start_line.as_deref(), Some("0"));
    assert_eq!(delivery.record.hash, Some(content_hash("hello")));

    channel.close().await;
}
