//! Reconnecting WebSocket socket.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;

use chainwatch_core::{CloseInfo, Socket, SocketEvent, SocketEvents, WatchError};

/// Configuration for the WebSocket transport.
#[derive(Debug, Clone)]
pub struct WsSocketConfig {
    /// Reconnect backoff starting duration.
    pub reconnect_initial: Duration,
    /// Maximum reconnect backoff.
    pub reconnect_max: Duration,
}

impl Default for WsSocketConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(60),
        }
    }
}

/// Command sent from the client to the background socket task.
enum Command {
    Send(String),
    Terminate,
    Close,
}

/// WebSocket transport implementing [`Socket`].
///
/// A background task owns the connection and keeps it alive: connect
/// failures and drops are retried with exponential backoff, and lifecycle
/// transitions are reported through the [`SocketEvents`] stream returned by
/// [`WsSocket::connect`].
pub struct WsSocket {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl WsSocket {
    /// Start the background task and return the socket plus its event stream.
    pub fn connect(url: impl Into<String>, config: WsSocketConfig) -> (Arc<Self>, SocketEvents) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let url = url.into();

        tokio::spawn(async move {
            socket_task(url, cmd_rx, event_tx, config).await;
        });

        (Arc::new(Self { cmd_tx }), event_rx)
    }
}

#[async_trait]
impl Socket for WsSocket {
    async fn send(&self, text: String) -> Result<(), WatchError> {
        self.cmd_tx
            .send(Command::Send(text))
            .map_err(|_| WatchError::Transport {
                message: "socket task closed".into(),
            })
    }

    fn terminate(&self) {
        let _ = self.cmd_tx.send(Command::Terminate);
    }

    fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close);
    }
}

/// Background task that owns the WebSocket connection.
async fn socket_task(
    url: String,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SocketEvent>,
    config: WsSocketConfig,
) {
    let mut backoff = config.reconnect_initial;
    let mut connected_before = false;

    loop {
        tracing::info!(url = %url, "connecting via WebSocket");

        let conn = tokio_tungstenite::connect_async(&url).await;

        match conn {
            Err(e) => {
                tracing::warn!(error = %e, "WS connect failed, retrying in {backoff:?}");
                if events.send(SocketEvent::Error(e.to_string())).is_err() {
                    return; // client gone
                }
                time::sleep(backoff).await;
                backoff = (backoff * 2).min(config.reconnect_max);
                continue;
            }
            Ok((ws_stream, _)) => {
                backoff = config.reconnect_initial; // reset on success
                let signal = if connected_before {
                    SocketEvent::Reopen
                } else {
                    SocketEvent::Open
                };
                connected_before = true;
                if events.send(signal).is_err() {
                    return;
                }

                let (mut sink, mut stream) = ws_stream.split();
                let mut close_info = CloseInfo::default();

                loop {
                    tokio::select! {
                        // Commands from the client
                        cmd = cmd_rx.recv() => {
                            match cmd {
                                None | Some(Command::Close) => {
                                    let _ = sink.send(Message::Close(None)).await;
                                    let _ = events.send(SocketEvent::Closed);
                                    return;
                                }
                                Some(Command::Terminate) => {
                                    // Drop the connection; the outer loop reconnects.
                                    close_info.reason = "terminated by liveness check".into();
                                    break;
                                }
                                Some(Command::Send(text)) => {
                                    if sink.send(Message::Text(text.into())).await.is_err() {
                                        // Connection dropped — break to reconnect
                                        break;
                                    }
                                }
                            }
                        }
                        // Frames from the server
                        msg = stream.next() => {
                            match msg {
                                None => break, // stream closed
                                Some(Err(e)) => {
                                    tracing::warn!(error = %e, "WS receive error");
                                    let _ = events.send(SocketEvent::Error(e.to_string()));
                                    break;
                                }
                                Some(Ok(Message::Text(text))) => {
                                    let _ = events.send(SocketEvent::Message(text.to_string()));
                                }
                                Some(Ok(Message::Ping(_))) => {
                                    // tungstenite answers the pong itself
                                    let _ = events.send(SocketEvent::Ping);
                                }
                                Some(Ok(Message::Close(frame))) => {
                                    if let Some(frame) = frame {
                                        close_info = CloseInfo {
                                            code: Some(frame.code.into()),
                                            reason: frame.reason.to_string(),
                                        };
                                    }
                                    break;
                                }
                                _ => {}
                            }
                        }
                    }
                }

                tracing::warn!(url = %url, "WS disconnected, reconnecting in {backoff:?}");
                if events.send(SocketEvent::Down(close_info)).is_err() {
                    return;
                }
                time::sleep(backoff).await;
                backoff = (backoff * 2).min(config.reconnect_max);
            }
        }
    }
}
