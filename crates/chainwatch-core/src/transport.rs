//! The `Socket` trait — the reconnecting-transport seam.
//!
//! The client treats the transport as a black box that keeps itself
//! connected: opening sockets, TLS and backoff on dead connections are the
//! transport's problem. The client consumes lifecycle signals and text
//! frames through a [`SocketEvents`] stream and pushes bytes back through
//! [`Socket::send`].

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::WatchError;

/// Visible connection state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Close details passed to the caller's down handler.
#[derive(Debug, Clone, Default)]
pub struct CloseInfo {
    pub code: Option<u16>,
    pub reason: String,
}

/// Lifecycle signals and payloads emitted by a transport.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// First successful connect.
    Open,
    /// Connection re-established after a drop.
    Reopen,
    /// Connection lost; the transport keeps reconnecting.
    Down(CloseInfo),
    /// A text frame arrived.
    Message(String),
    /// A transport-level ping arrived (liveness signal).
    Ping,
    /// Transport-level error; connection state is unchanged.
    Error(String),
    /// Transport shut down permanently.
    Closed,
}

/// Receiving half of a transport's event stream.
pub type SocketEvents = mpsc::UnboundedReceiver<SocketEvent>;

/// The transport abstraction every backing socket implements.
///
/// # Thread safety
/// Implementations must be `Send + Sync`; clients hold them as
/// `Arc<dyn Socket>` across tasks.
#[async_trait]
pub trait Socket: Send + Sync + 'static {
    /// Transmit one already-encoded frame.
    async fn send(&self, text: String) -> Result<(), WatchError>;

    /// Forcibly drop the current connection. The transport's own reconnect
    /// machinery is expected to recover it; used when liveness detection
    /// concludes the peer has silently stopped responding.
    fn terminate(&self);

    /// Shut down permanently. Emits [`SocketEvent::Closed`] once.
    fn close(&self);
}
