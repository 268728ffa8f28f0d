//! Per-concern listener seams.
//!
//! One interface per concern instead of a bag of loosely-typed callbacks:
//! connection lifecycle, error sink, and per-entity transaction listeners
//! are separate traits, and generic transaction handlers observe every
//! event regardless of entity matching.

use serde_json::Value;

use crate::error::WatchError;
use crate::state::TransactionState;
use crate::transport::CloseInfo;

/// Connection-lifecycle notifications. All methods default to no-ops.
pub trait ConnectionListener: Send + Sync {
    fn on_open(&self) {}
    fn on_down(&self, _info: &CloseInfo) {}
    fn on_reopen(&self) {}
    fn on_close(&self) {}
}

/// The single sink for surfaced errors.
///
/// When no sink is registered, protocol/validation errors become fatal to
/// the routing task instead — errors are never both sunk and raised.
pub trait ErrorSink: Send + Sync {
    fn on_error(&self, error: WatchError);
}

impl<F> ErrorSink for F
where
    F: Fn(WatchError) + Send + Sync,
{
    fn on_error(&self, error: WatchError) {
        self(error)
    }
}

/// Per-entity listener attached to a watched transaction or account.
///
/// The return value of the last listener invoked for an event is forwarded
/// to every generic [`TransactionHandler`].
pub trait TransactionListener: Send + Sync {
    fn on_transaction(&self, state: &TransactionState) -> Option<Value>;
}

impl<F> TransactionListener for F
where
    F: Fn(&TransactionState) -> Option<Value> + Send + Sync,
{
    fn on_transaction(&self, state: &TransactionState) -> Option<Value> {
        self(state)
    }
}

/// Generic handler invoked for every routed transaction event, with the
/// captured result of the last per-entity listener (`None` on lookup miss).
pub type TransactionHandler = Box<dyn Fn(&TransactionState, Option<&Value>) + Send + Sync>;
