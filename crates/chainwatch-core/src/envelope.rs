//! Wire types for both directions of the monitoring protocol.
//!
//! Outbound intents are wrapped in an [`Envelope`] carrying the caller's
//! identity and blockchain coordinates; inbound frames deserialize into
//! [`InboundFrame`], a superset of every payload shape the server emits
//! (errors, rate-limit signals, transaction events, identity reassignment).

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ClientConfig;
use crate::limit::RateLimitRule;

/// Outbound category codes.
pub const CATEGORY_INITIALIZE: &str = "initialize";
pub const CATEGORY_ACCOUNT: &str = "accountAddress";
pub const CATEGORY_TRANSACTION: &str = "activeTransaction";

/// Outbound event codes.
pub const EVENT_CHECK_DAPP_ID: &str = "checkDappId";
pub const EVENT_WATCH: &str = "watch";
pub const EVENT_UNWATCH: &str = "unwatch";
pub const EVENT_TX_SENT: &str = "txSent";

/// How a transaction is identified on the wire.
///
/// Hash-keyed systems (Ethereum) address transactions by hash; id-keyed
/// systems (Bitcoin) by txid. The registry stores the raw value either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxIdentifier {
    Hash(String),
    Id(String),
}

impl TxIdentifier {
    /// The raw identifier value, independent of keying scheme.
    pub fn value(&self) -> &str {
        match self {
            Self::Hash(s) | Self::Id(s) => s,
        }
    }
}

/// The `blockchain` sub-object present in every outbound envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blockchain {
    pub system: String,
    pub network: String,
}

/// Reference to an account in an envelope or inbound event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRef {
    pub address: String,
}

/// Reference to a transaction in an outbound envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
}

impl From<&TxIdentifier> for TransactionRef {
    fn from(id: &TxIdentifier) -> Self {
        match id {
            TxIdentifier::Hash(h) => Self {
                hash: Some(h.clone()),
                txid: None,
            },
            TxIdentifier::Id(i) => Self {
                hash: None,
                txid: Some(i.clone()),
            },
        }
    }
}

/// An outbound wire envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub time_stamp: String,
    pub dapp_id: String,
    pub version: String,
    pub blockchain: Blockchain,
    pub category_code: String,
    pub event_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionRef>,
}

impl Envelope {
    fn base(config: &ClientConfig, category_code: &str, event_code: &str) -> Self {
        Self {
            time_stamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            dapp_id: config.dapp_id.clone(),
            version: config.version.clone(),
            blockchain: Blockchain {
                system: config.system.as_str().to_string(),
                network: config.network_name().to_string(),
            },
            category_code: category_code.to_string(),
            event_code: event_code.to_string(),
            connection_id: None,
            account: None,
            transaction: None,
        }
    }

    /// Session-establishing envelope, sent outside the rate-limited queue on
    /// every open/reopen. Carries the persisted connection id if one exists.
    pub fn initialize(config: &ClientConfig, connection_id: Option<&str>) -> Self {
        let mut env = Self::base(config, CATEGORY_INITIALIZE, EVENT_CHECK_DAPP_ID);
        env.connection_id = connection_id.map(str::to_string);
        env
    }

    pub fn watch_account(config: &ClientConfig, address: &str) -> Self {
        let mut env = Self::base(config, CATEGORY_ACCOUNT, EVENT_WATCH);
        env.account = Some(AccountRef {
            address: address.to_string(),
        });
        env
    }

    pub fn unwatch_account(config: &ClientConfig, address: &str) -> Self {
        let mut env = Self::base(config, CATEGORY_ACCOUNT, EVENT_UNWATCH);
        env.account = Some(AccountRef {
            address: address.to_string(),
        });
        env
    }

    pub fn watch_transaction(config: &ClientConfig, id: &TxIdentifier) -> Self {
        let mut env = Self::base(config, CATEGORY_TRANSACTION, EVENT_TX_SENT);
        env.transaction = Some(TransactionRef::from(id));
        env
    }

    pub fn unwatch_transaction(config: &ClientConfig, id: &TxIdentifier) -> Self {
        let mut env = Self::base(config, CATEGORY_TRANSACTION, EVENT_UNWATCH);
        env.transaction = Some(TransactionRef::from(id));
        env
    }

    /// Serialize to the wire representation.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// The `event` sub-object of an inbound frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    pub event_code: Option<String>,
    pub contract_call: Option<Value>,
    pub transaction: Option<Value>,
    pub account: Option<AccountRef>,
}

/// A parsed inbound frame.
///
/// Every field is optional: the server multiplexes errors, control signals
/// and entity events over one stream and the router classifies per frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    pub status: Option<String>,
    pub reason: Option<String>,
    pub connection_id: Option<String>,
    pub retry_ms: Option<u64>,
    pub limit_rules: Option<RateLimitRule>,
    pub blocked_msg: Option<String>,
    pub event: Option<InboundEvent>,
}

impl InboundFrame {
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// `true` when the server flagged this frame as an error.
    pub fn is_error(&self) -> bool {
        self.status.as_deref() == Some("error")
    }
}
