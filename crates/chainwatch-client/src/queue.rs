//! Outbound queue and rate-limited drain task.
//!
//! Intents are encoded at enqueue time and drained onto the transport by a
//! background task started lazily on first enqueue. The drain pace comes
//! from the active [`RateLimitRule`], which the server may tighten at any
//! moment through a rate-limit frame; once the queue empties the rule falls
//! back to the built-in default and the task exits until the next enqueue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{self, Instant};

use chainwatch_core::{ConnectionState, RateLimitRule, WatchError};

use crate::client::Session;

/// Hard bound on queued-but-unsent messages. Exceeding it is a synchronous
/// caller error, never a silent drop.
pub const QUEUE_LIMIT: usize = 10_000;

/// Pause before each send so a pending server rate-limit response can land
/// and re-pace the drain before more messages go out.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Queue, pacing rule and retry gate shared by the inbound router and the
/// drain task. Fields are mutex-guarded: the two tasks run on a preemptive
/// scheduler.
pub(crate) struct Outbound {
    queue: Mutex<VecDeque<String>>,
    rule: Mutex<RateLimitRule>,
    retry_until: Mutex<Option<Instant>>,
    draining: AtomicBool,
}

impl Default for Outbound {
    fn default() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            rule: Mutex::new(RateLimitRule::DEFAULT),
            retry_until: Mutex::new(None),
            draining: AtomicBool::new(false),
        }
    }
}

impl Outbound {
    /// Append an encoded envelope, failing when the queue is over capacity.
    pub(crate) fn push_back(&self, message: String) -> Result<(), WatchError> {
        let mut queue = self.queue.lock().unwrap();
        if queue.len() > QUEUE_LIMIT {
            return Err(WatchError::QueueCapacity { limit: QUEUE_LIMIT });
        }
        queue.push_back(message);
        Ok(())
    }

    /// Re-insert a server-blocked message ahead of everything else. Not
    /// subject to the capacity bound: the message was already accepted once.
    pub(crate) fn push_front(&self, message: String) {
        self.queue.lock().unwrap().push_front(message);
    }

    pub(crate) fn pop_front(&self) -> Option<String> {
        self.queue.lock().unwrap().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }

    pub(crate) fn rule(&self) -> RateLimitRule {
        *self.rule.lock().unwrap()
    }

    pub(crate) fn set_rule(&self, rule: RateLimitRule) {
        *self.rule.lock().unwrap() = rule;
    }

    fn reset_rule(&self) {
        *self.rule.lock().unwrap() = RateLimitRule::DEFAULT;
    }

    /// Install the retry gate. At most one may be outstanding; a newer
    /// server signal replaces the previous deadline.
    pub(crate) fn set_retry_gate(&self, deadline: Instant) {
        *self.retry_until.lock().unwrap() = Some(deadline);
    }

    fn take_retry_gate(&self) -> Option<Instant> {
        self.retry_until.lock().unwrap().take()
    }

    /// Claim the drain slot. Returns `true` when the caller must spawn the
    /// drain task.
    pub(crate) fn try_begin_drain(&self) -> bool {
        self.draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn end_drain(&self) {
        self.draining.store(false, Ordering::SeqCst);
    }
}

/// Long-lived drain task: transmits queued envelopes in FIFO order at the
/// active rule's pace, suspending while disconnected and while a retry gate
/// is pending. Exits once the queue is empty.
pub(crate) async fn drain(session: Arc<Session>) {
    let mut connection = session.connection.subscribe();

    loop {
        if session.destroyed.load(Ordering::SeqCst) {
            session.outbound.end_drain();
            return;
        }

        // Suspend until the connection is established. `destroy()` publishes
        // a state change, so this wait also wakes on teardown.
        while *connection.borrow() != ConnectionState::Connected {
            if session.destroyed.load(Ordering::SeqCst) || connection.changed().await.is_err() {
                session.outbound.end_drain();
                return;
            }
        }

        time::sleep(SETTLE_DELAY).await;

        if let Some(deadline) = session.outbound.take_retry_gate() {
            time::sleep_until(deadline).await;
        }

        let Some(message) = session.outbound.pop_front() else {
            session.outbound.reset_rule();
            session.outbound.end_drain();
            // An enqueue racing the slot release re-claims the drain.
            if session.outbound.is_empty() || !session.outbound.try_begin_drain() {
                return;
            }
            continue;
        };

        time::sleep(session.outbound.rule().delay()).await;

        if let Err(e) = session.socket.send(message).await {
            // One in-flight send may race teardown of the transport.
            tracing::warn!(error = %e, "outbound send failed; message dropped");
        }
    }
}
