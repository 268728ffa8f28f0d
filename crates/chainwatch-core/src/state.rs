//! Typed notification payloads delivered to listeners and handlers.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// The kind of state transition a server event reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Transaction submitted to the network.
    Sent,
    /// Transaction seen in the mempool.
    Pool,
    /// Transaction mined.
    Confirmed,
    /// Transaction reverted or rejected.
    Failed,
    /// Transaction evicted from the mempool.
    Dropped,
    /// Transaction replaced with a higher-fee variant.
    SpeedUp,
    /// Transaction replaced with a cancellation.
    Cancel,
    /// Server echo of the caller's own watch request.
    WatchEcho,
    /// Server echo of the caller's own unwatch request.
    UnwatchEcho,
    /// Any code this client does not model.
    Other(String),
}

impl EventKind {
    pub fn from_code(code: &str) -> Self {
        match code {
            "txSent" => Self::Sent,
            "txPool" => Self::Pool,
            "txConfirmed" => Self::Confirmed,
            "txFailed" => Self::Failed,
            "txDropped" => Self::Dropped,
            "txSpeedUp" => Self::SpeedUp,
            "txCancel" => Self::Cancel,
            "watchRequest" => Self::WatchEcho,
            "unwatchRequest" => Self::UnwatchEcho,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_code(&self) -> &str {
        match self {
            Self::Sent => "txSent",
            Self::Pool => "txPool",
            Self::Confirmed => "txConfirmed",
            Self::Failed => "txFailed",
            Self::Dropped => "txDropped",
            Self::SpeedUp => "txSpeedUp",
            Self::Cancel => "txCancel",
            Self::WatchEcho => "watchRequest",
            Self::UnwatchEcho => "unwatchRequest",
            Self::Other(code) => code,
        }
    }

    /// Server echoes of the caller's own requests carry no new state.
    pub fn is_echo(&self) -> bool {
        matches!(self, Self::WatchEcho | Self::UnwatchEcho)
    }

    /// Hash-reassignment events: the watched identifier must be rewritten.
    pub fn is_reassignment(&self) -> bool {
        matches!(self, Self::SpeedUp | Self::Cancel)
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_code())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Ok(Self::from_code(&code))
    }
}

/// The transaction body as delivered by the server.
///
/// Fields beyond the ones this client inspects are preserved verbatim in
/// `extra` so callers see the full server payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TxBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(rename = "txid", skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watched_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_hash: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A flattened state object: transaction body plus event code and
/// contract-call detail, as handed to listeners and generic handlers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionState {
    pub event_code: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_call: Option<Value>,
    #[serde(flatten)]
    pub transaction: TxBody,
}

impl TransactionState {
    /// Flatten a raw inbound transaction value with its event code.
    pub fn flatten(
        transaction: Value,
        event_code: Option<&str>,
        contract_call: Option<Value>,
    ) -> Result<Self, serde_json::Error> {
        if !transaction.is_object() {
            return Err(serde_json::Error::custom("transaction is not an object"));
        }
        Ok(Self {
            event_code: event_code.map(EventKind::from_code).unwrap_or_else(|| {
                EventKind::Other(String::new())
            }),
            contract_call,
            transaction: serde_json::from_value(transaction)?,
        })
    }

    /// `true` when the server marked the transaction as unsubscribed.
    pub fn is_unsubscribed(&self) -> bool {
        self.transaction.status.as_deref() == Some("unsubscribed")
    }
}
