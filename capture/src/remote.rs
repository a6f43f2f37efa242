//! Remote command channel.
//!
//! A persistent outbound WebSocket connection to the collection server. The
//! server pushes "reopen and report" commands: each inbound text or binary
//! frame is a JSON-encoded string holding a document URI.
//!
//! # Lifecycle
//!
//! ```text
//! Connecting ──handshake ok──▶ Open ──close frame / shutdown──▶ Closed
//!      │                        │
//!      └──handshake failed──────┴──transport error──────────────▶ Errored
//! ```
//!
//! One task owns the connection and forwards decoded [`RemoteCommand`]s to a
//! single consumer. Malformed frames are logged and dropped without closing
//! the channel. Connection loss is terminal; nothing reconnects.
//!
//! # Example
//!
//! ```no_run
//! use tokio::sync::mpsc;
//! use doctel_capture::remote::{channel_url, RemoteChannel};
//!
//! # async fn example() -> Result<(), doctel_capture::remote::ChannelError> {
//! let url = channel_url("ws://localhost:8080", "machine-1")?;
//! let (tx, mut rx) = mpsc::channel(16);
//! let channel = RemoteChannel::spawn(url, tx);
//!
//! while let Some(command) = rx.recv().await {
//!     println!("reopen {}", command.locator);
//! }
//! channel.close().await;
//! # Ok(())
//! # }
//! ```

use futures::{SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::types::ResourceLocator;

/// Query parameter carrying the client identifier.
pub const CLIENT_ID_PARAM: &str = "clientId";

/// Connection state of the remote channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
    Errored,
}

impl ChannelState {
    /// Returns true once the channel can no longer deliver commands.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }
}

/// An instruction to re-open a document and report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub locator: ResourceLocator,
}

/// Errors decoding one inbound frame.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Frame body is not a JSON string.
    #[error("malformed command payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Decoded string is not a URI.
    #[error("invalid locator {value:?}: {source}")]
    Locator {
        value: String,
        #[source]
        source: url::ParseError,
    },
}

/// Errors setting up the channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Server URL does not parse.
    #[error("invalid server URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Server URL is not a `ws:` or `wss:` URL.
    #[error("unsupported server URL scheme: {0}")]
    UnsupportedScheme(String),
}

/// Builds `<server_url>?clientId=<client_id>`.
///
/// # Errors
///
/// Returns `ChannelError` if `server_url` is not a valid `ws`/`wss` URL.
pub fn channel_url(server_url: &str, client_id: &str) -> Result<Url, ChannelError> {
    let mut url = Url::parse(server_url).map_err(|source| ChannelError::InvalidUrl {
        url: server_url.to_string(),
        source,
    })?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ChannelError::UnsupportedScheme(url.scheme().to_string()));
    }

    url.query_pairs_mut().append_pair(CLIENT_ID_PARAM, client_id);
    Ok(url)
}

/// Decodes one frame body into a command.
///
/// # Errors
///
/// Returns `CommandError` if the body is not a JSON string holding a URI.
pub fn decode_command(payload: &[u8]) -> Result<RemoteCommand, CommandError> {
    let value: String = serde_json::from_slice(payload)?;
    let url = Url::parse(&value).map_err(|source| CommandError::Locator {
        value: value.clone(),
        source,
    })?;

    Ok(RemoteCommand {
        locator: ResourceLocator::from(url),
    })
}

/// Reads frames until the stream ends, forwarding decoded commands.
///
/// Returns the terminal state: `Closed` on a close frame, end of stream, or
/// when the consumer has gone away; `Errored` on a transport error.
pub async fn read_commands<St>(mut stream: St, commands: &mpsc::Sender<RemoteCommand>) -> ChannelState
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        let decoded = match frame {
            Ok(Message::Text(text)) => decode_command(text.as_str().as_bytes()),
            Ok(Message::Binary(bytes)) => decode_command(&bytes),
            Ok(Message::Close(frame)) => {
                info!(frame = ?frame, "Server closed the command channel");
                return ChannelState::Closed;
            }
            Ok(other) => {
                trace!(frame = ?other, "Ignoring control frame");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "Command channel transport error");
                return ChannelState::Errored;
            }
        };

        match decoded {
            Ok(command) => {
                debug!(locator = %command.locator, "Received reopen command");
                if commands.send(command).await.is_err() {
                    debug!("Command consumer gone, closing channel");
                    return ChannelState::Closed;
                }
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed remote command");
            }
        }
    }

    debug!("Command stream ended");
    ChannelState::Closed
}

/// Handle to the task that owns the connection.
///
/// Dropping the handle closes the connection.
#[derive(Debug)]
pub struct RemoteChannel {
    state: watch::Receiver<ChannelState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RemoteChannel {
    /// Spawns the connection task; decoded commands are sent to `commands`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(url: Url, commands: mpsc::Sender<RemoteCommand>) -> Self {
        let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run_channel(url, commands, state_tx, shutdown_rx));

        Self {
            state: state_rx,
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Returns a receiver observing state transitions.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Waits until the channel reaches a terminal state.
    pub async fn wait_terminal(&mut self) -> ChannelState {
        if let Ok(state) = self.state.wait_for(|s| s.is_terminal()).await {
            return *state;
        }
        *self.state.borrow()
    }

    /// Closes the connection and waits for the task to finish.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.task).await {
            debug!(error = %e, "Command channel task ended abnormally");
        }
    }
}

async fn run_channel(
    url: Url,
    commands: mpsc::Sender<RemoteCommand>,
    state: watch::Sender<ChannelState>,
    mut shutdown: oneshot::Receiver<()>,
) {
    info!(url = %url, "Connecting to collection server");

    let socket = tokio::select! {
        result = tokio_tungstenite::connect_async(url.as_str()) => match result {
            Ok((socket, _response)) => socket,
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to connect to collection server");
                state.send_replace(ChannelState::Errored);
                return;
            }
        },
        _ = &mut shutdown => {
            state.send_replace(ChannelState::Closed);
            return;
        }
    };

    state.send_replace(ChannelState::Open);
    info!("Connected to collection server");

    let (mut sink, stream) = socket.split();
    let final_state = tokio::select! {
        terminal = read_commands(stream, &commands) => terminal,
        _ = &mut shutdown => ChannelState::Closed,
    };

    if final_state == ChannelState::Closed {
        if let Err(e) = sink.close().await {
            debug!(error = %e, "Error closing command channel");
        }
    }

    state.send_replace(final_state);
    info!(state = ?final_state, "Command channel finished");
}
