//! chainwatch-ws — reconnecting WebSocket transport for ChainWatch.
//!
//! # Features
//! - Auto-reconnect on disconnect (exponential backoff)
//! - Open / Reopen / Down lifecycle signals for the connection manager
//! - Ping forwarding for liveness detection
//! - Forced termination without shutdown (liveness recovery path)

pub mod socket;

pub use socket::{WsSocket, WsSocketConfig};
