//! chainwatch-core — foundation types and traits for ChainWatch.
//!
//! # Overview
//!
//! ChainWatch is a resilient client for realtime transaction-monitoring
//! services: callers watch transactions or addresses over a persistent
//! socket and receive state-change notifications as they occur. The core
//! crate defines:
//!
//! - [`Envelope`] / [`InboundFrame`] — wire types for both directions
//! - [`TransactionState`] / [`EventKind`] — the typed notification payload
//! - [`WatchError`] — structured error type, plus the server-reason classifier
//! - [`RateLimitRule`] — the server-tunable outbound pacing rule
//! - [`Socket`] — the reconnecting-transport seam every transport implements
//! - [`SessionStore`] — pluggable session-continuity cache
//! - listener traits — per-concern callbacks for connection, error and
//!   transaction events

pub mod config;
pub mod envelope;
pub mod error;
pub mod limit;
pub mod listener;
pub mod session;
pub mod state;
pub mod transport;

pub use config::{network_name, ClientConfig, System};
pub use envelope::{Envelope, InboundEvent, InboundFrame, TxIdentifier};
pub use error::{classify_reason, ReasonClass, WatchError};
pub use limit::RateLimitRule;
pub use listener::{ConnectionListener, ErrorSink, TransactionHandler, TransactionListener};
pub use session::{session_key, MemoryStore, SessionStore};
pub use state::{EventKind, TransactionState};
pub use transport::{CloseInfo, ConnectionState, Socket, SocketEvent, SocketEvents};
