//! Connection manager.
//!
//! A single pump task consumes the transport's event stream and produces
//! the visible connection state plus the re-synchronization side effects:
//! session announcement on open, address-subscription replay on reopen, and
//! ping-based liveness detection that terminates a silently-dead transport.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};

use chainwatch_core::{ConnectionState, SocketEvent, SocketEvents, WatchError};

use crate::client::Session;
use crate::router;

/// A transport that goes this long without a ping is presumed dead and is
/// forcibly terminated; its reconnect machinery recovers it.
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(31);

pub(crate) async fn pump(session: Arc<Session>, mut events: SocketEvents) {
    let liveness = time::sleep(LIVENESS_TIMEOUT);
    tokio::pin!(liveness);
    let mut armed = false;

    loop {
        tokio::select! {
            _ = liveness.as_mut(), if armed => {
                armed = false;
                tracing::warn!("no ping within liveness window; terminating transport");
                session.socket.terminate();
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SocketEvent::Open => {
                        session.set_state(ConnectionState::Connected);
                        session.announce().await;
                        liveness.as_mut().reset(Instant::now() + LIVENESS_TIMEOUT);
                        armed = true;
                        if let Some(listener) = &session.lifecycle {
                            listener.on_open();
                        }
                    }
                    SocketEvent::Reopen => {
                        session.set_state(ConnectionState::Connected);
                        // Session identity must be re-established before any
                        // queued application message, so both the announce and
                        // the address replay bypass the rate-limited queue.
                        session.announce().await;
                        session.replay_accounts().await;
                        liveness.as_mut().reset(Instant::now() + LIVENESS_TIMEOUT);
                        armed = true;
                        if let Some(listener) = &session.lifecycle {
                            listener.on_reopen();
                        }
                    }
                    SocketEvent::Down(info) => {
                        session.set_state(ConnectionState::Disconnected);
                        armed = false;
                        if let Some(listener) = &session.lifecycle {
                            listener.on_down(&info);
                        }
                    }
                    SocketEvent::Ping => {
                        liveness.as_mut().reset(Instant::now() + LIVENESS_TIMEOUT);
                        armed = true;
                    }
                    SocketEvent::Message(text) => {
                        if let Err(e) = router::route(&session, &text) {
                            // No error sink registered: deliberately fatal.
                            tracing::error!(error = %e, "unhandled server error; stopping client");
                            break;
                        }
                    }
                    SocketEvent::Error(message) => {
                        match &session.error_sink {
                            Some(sink) => sink.on_error(WatchError::Transport { message }),
                            None => tracing::warn!(%message, "transport error"),
                        }
                    }
                    SocketEvent::Closed => {
                        session.set_state(ConnectionState::Disconnected);
                        armed = false;
                        if let Some(listener) = &session.lifecycle {
                            listener.on_close();
                        }
                        break;
                    }
                }
            }
        }
    }
}
