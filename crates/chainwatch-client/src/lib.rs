//! chainwatch-client — the resilient watch client.
//!
//! # Overview
//!
//! A [`WatchClient`] maintains a persistent connection to a remote
//! transaction-monitoring service through any [`chainwatch_core::Socket`]
//! transport, lets callers register interest in transactions or addresses,
//! and delivers typed state-change notifications as they occur. Three
//! coupled concerns live here:
//!
//! - **Connection manager** — consumes transport lifecycle signals,
//!   re-announces session identity and replays address subscriptions on
//!   reconnect, and terminates silently-dead connections via ping liveness.
//! - **Outbound queue** — buffers watch intents and drains them at the
//!   server-controlled pace without dropping or reordering; a server-blocked
//!   message is retransmitted ahead of everything enqueued after it.
//! - **Inbound router** — classifies every server frame (errors, echoes,
//!   state transitions, identity reassignment) and dispatches it to the
//!   matching per-entity listener exactly once.

mod client;
mod connection;
mod queue;
mod registry;
mod router;

pub use client::{ClientBuilder, WatchClient};
pub use queue::QUEUE_LIMIT;
pub use registry::WatchId;
