//! Structured error type and the server-reason classifier.

use thiserror::Error;

/// Errors surfaced by a watch client.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Outbound queue is at capacity — reported synchronously, never queued.
    #[error("outbound queue is full (limit {limit})")]
    QueueCapacity { limit: usize },

    /// The server rejected the configured API key.
    #[error("server rejected the API key")]
    InvalidApiKey,

    /// The server does not support the configured network.
    #[error("network not supported: {message}")]
    UnsupportedNetwork { message: String },

    /// The account's usage quota has been exhausted.
    #[error("usage quota exceeded: {message}")]
    QuotaExceeded { message: String },

    /// The server rejected a transaction id.
    #[error("not a valid transaction id: {id}")]
    InvalidTransactionId { id: String },

    /// The server rejected a transaction hash.
    #[error("not a valid transaction hash: {hash}")]
    InvalidTransactionHash { hash: String },

    /// The server rejected an address.
    #[error("not a valid address: {address}")]
    InvalidAddress { address: String },

    /// Any other server-reported error.
    #[error("server error: {message}")]
    Server { message: String },

    /// Transport-level failure. Queue and registry state are untouched.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// A frame or envelope failed to (de)serialize.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Operation attempted after `destroy()`.
    #[error("client has been destroyed")]
    Destroyed,
}

impl WatchError {
    /// `true` for errors the server reported about a specific request
    /// (key, network, quota, identifier or address validation).
    pub fn is_server_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidApiKey
                | Self::UnsupportedNetwork { .. }
                | Self::QuotaExceeded { .. }
                | Self::InvalidTransactionId { .. }
                | Self::InvalidTransactionHash { .. }
                | Self::InvalidAddress { .. }
                | Self::Server { .. }
        )
    }
}

/// Classification of a server `reason` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonClass {
    /// Rate-limit signal — absorbed internally, never surfaced to callers.
    RateLimit,
    InvalidApiKey,
    UnsupportedNetwork,
    QuotaExceeded,
    InvalidTransactionId,
    InvalidTransactionHash,
    InvalidAddress,
    /// Anything the table does not match.
    Other,
}

/// Ordered classification table: first matching substring wins.
///
/// The order is an observable compatibility surface. Patterns overlap
/// (every chain-specific address pattern also contains "not a valid"), so
/// reordering entries changes how overlapping reasons classify. Keep the
/// rate-limit pattern first and the generic address pattern after the
/// chain-specific variants.
const REASON_TABLE: &[(&str, ReasonClass)] = &[
    ("ratelimit", ReasonClass::RateLimit),
    ("not a valid API key", ReasonClass::InvalidApiKey),
    ("network not supported", ReasonClass::UnsupportedNetwork),
    ("maximum allowed amount", ReasonClass::QuotaExceeded),
    ("not a valid transaction id", ReasonClass::InvalidTransactionId),
    ("not a valid transaction hash", ReasonClass::InvalidTransactionHash),
    ("not a valid Ethereum address", ReasonClass::InvalidAddress),
    ("not a valid Bitcoin address", ReasonClass::InvalidAddress),
    ("not a valid address", ReasonClass::InvalidAddress),
];

/// Classify a server-supplied `reason` by ordered substring match.
pub fn classify_reason(reason: &str) -> ReasonClass {
    for (pattern, class) in REASON_TABLE {
        if reason.contains(pattern) {
            return *class;
        }
    }
    ReasonClass::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_detected() {
        assert_eq!(
            classify_reason("ratelimit reached, retry shortly"),
            ReasonClass::RateLimit
        );
    }

    #[test]
    fn rate_limit_wins_over_later_patterns() {
        // Overlapping reason: table order decides.
        assert_eq!(
            classify_reason("ratelimit: 0x00 is not a valid address"),
            ReasonClass::RateLimit
        );
    }

    #[test]
    fn chain_specific_address_before_generic() {
        assert_eq!(
            classify_reason("0xZZ is not a valid Ethereum address"),
            ReasonClass::InvalidAddress
        );
        assert_eq!(
            classify_reason("xyz is not a valid Bitcoin address"),
            ReasonClass::InvalidAddress
        );
        assert_eq!(
            classify_reason("xyz is not a valid address for this system"),
            ReasonClass::InvalidAddress
        );
    }

    #[test]
    fn unknown_reason_falls_through() {
        assert_eq!(classify_reason("the server is on fire"), ReasonClass::Other);
    }

    #[test]
    fn classified_rejections() {
        assert_eq!(
            classify_reason("this is not a valid API key"),
            ReasonClass::InvalidApiKey
        );
        assert_eq!(
            classify_reason("network not supported: triton"),
            ReasonClass::UnsupportedNetwork
        );
        assert_eq!(
            classify_reason("you have reached the maximum allowed amount of subscriptions"),
            ReasonClass::QuotaExceeded
        );
        assert_eq!(
            classify_reason("abc is not a valid transaction id"),
            ReasonClass::InvalidTransactionId
        );
        assert_eq!(
            classify_reason("0x12 is not a valid transaction hash"),
            ReasonClass::InvalidTransactionHash
        );
    }
}
