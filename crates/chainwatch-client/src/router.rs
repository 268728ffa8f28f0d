//! Inbound frame router.
//!
//! Each server frame is parsed and dispatched exactly once: rate-limit
//! signals are absorbed into the outbound queue's pacing state, classified
//! errors go to the single error sink, and transaction events reach the
//! matching registry listeners followed by every generic handler.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use chainwatch_core::{
    classify_reason, InboundEvent, InboundFrame, ReasonClass, TransactionState, WatchError,
};

use crate::client::Session;

/// Route one raw frame. `Err` is returned only when no error sink is
/// registered; the caller treats that as fatal.
pub(crate) fn route(session: &Session, raw: &str) -> Result<(), WatchError> {
    let frame = match InboundFrame::decode(raw) {
        Ok(frame) => frame,
        Err(e) => return session.emit_error(WatchError::Codec(e)),
    };

    if let Some(id) = frame.connection_id.as_deref() {
        session.set_connection_id(id);
    }

    if frame.is_error() {
        let reason = frame.reason.clone().unwrap_or_default();
        return match classify_reason(&reason) {
            ReasonClass::RateLimit => {
                absorb_rate_limit(session, &frame);
                Ok(())
            }
            class => session.emit_error(rejection_error(class, reason, frame.event.as_ref())),
        };
    }

    let Some(event) = frame.event else {
        return Ok(());
    };
    let Some(transaction) = event.transaction else {
        return Ok(());
    };

    let state =
        match TransactionState::flatten(transaction, event.event_code.as_deref(), event.contract_call)
        {
            Ok(state) => state,
            Err(e) => return session.emit_error(WatchError::Codec(e)),
        };

    // Echoes of our own watch requests and unsubscribe confirmations carry
    // no new state.
    if state.event_code.is_echo() || state.is_unsubscribed() {
        return Ok(());
    }

    if state.event_code.is_reassignment() {
        rewrite_watched_identifier(session, &state);
    }

    let listener_result = dispatch_entity_listeners(session, &state);

    for handler in &session.handlers {
        handler(&state, listener_result.as_ref());
    }

    Ok(())
}

/// Rate limiting is an internal control signal: install the retry gate and
/// the new rule, and put the blocked message back at the head of the line.
fn absorb_rate_limit(session: &Session, frame: &InboundFrame) {
    if let Some(ms) = frame.retry_ms {
        session
            .outbound
            .set_retry_gate(Instant::now() + Duration::from_millis(ms));
    }
    if let Some(rule) = frame.limit_rules {
        session.outbound.set_rule(rule);
    }
    if let Some(blocked) = frame.blocked_msg.clone() {
        session.outbound.push_front(blocked);
    }
    tracing::debug!(retry_ms = frame.retry_ms, "rate limit signal absorbed");
}

/// A speed-up/cancel replaces the transaction's identity; the watched entry
/// follows it so the original listener keeps receiving events.
fn rewrite_watched_identifier(session: &Session, state: &TransactionState) {
    let Some(original) = state.transaction.original_hash.as_deref() else {
        return;
    };
    let Some(new_value) = state
        .transaction
        .hash
        .as_deref()
        .or(state.transaction.tx_id.as_deref())
    else {
        return;
    };
    if session.registry.rewrite_identifier(original, new_value) {
        tracing::debug!(original, new = new_value, "watched transaction reassigned");
    }
}

/// Invoke the per-entity listeners for this event and capture the result of
/// the last one. A lookup miss yields `None` — generic handlers still run.
fn dispatch_entity_listeners(session: &Session, state: &TransactionState) -> Option<Value> {
    if let Some(address) = state.transaction.watched_address.as_deref() {
        let address = session.config.system.normalize_address(address);
        let mut last = None;
        for listener in session.registry.account_listeners(&address) {
            last = listener.on_transaction(state);
        }
        last
    } else {
        session
            .registry
            .transaction_listener(
                state.transaction.hash.as_deref(),
                state.transaction.tx_id.as_deref(),
            )
            .and_then(|listener| listener.on_transaction(state))
    }
}

/// Build the structured error for a classified server rejection, carrying
/// the offending identifier or address where the frame supplies one.
fn rejection_error(class: ReasonClass, reason: String, event: Option<&InboundEvent>) -> WatchError {
    let tx_field = |field: &str| -> Option<String> {
        event
            .and_then(|e| e.transaction.as_ref())
            .and_then(|t| t.get(field))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    match class {
        ReasonClass::InvalidApiKey => WatchError::InvalidApiKey,
        ReasonClass::UnsupportedNetwork => WatchError::UnsupportedNetwork { message: reason },
        ReasonClass::QuotaExceeded => WatchError::QuotaExceeded { message: reason },
        ReasonClass::InvalidTransactionId => WatchError::InvalidTransactionId {
            id: tx_field("txid").unwrap_or_default(),
        },
        ReasonClass::InvalidTransactionHash => WatchError::InvalidTransactionHash {
            hash: tx_field("hash").unwrap_or_default(),
        },
        ReasonClass::InvalidAddress => WatchError::InvalidAddress {
            address: event
                .and_then(|e| e.account.as_ref())
                .map(|a| a.address.clone())
                .unwrap_or_default(),
        },
        ReasonClass::RateLimit | ReasonClass::Other => WatchError::Server { message: reason },
    }
}
