//! Client configuration and network-name lookup.

/// The blockchain system a client monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum System {
    Ethereum,
    Bitcoin,
}

impl System {
    /// Wire identifier used in the envelope's `blockchain.system` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Bitcoin => "bitcoin",
        }
    }

    /// Whether addresses on this system are case-sensitive.
    ///
    /// Ethereum addresses are hex and compared case-insensitively; Bitcoin
    /// addresses are base58/bech32 and must be preserved verbatim.
    pub fn case_sensitive_addresses(&self) -> bool {
        match self {
            Self::Ethereum => false,
            Self::Bitcoin => true,
        }
    }

    /// Normalize an address for registry comparison and dispatch.
    pub fn normalize_address(&self, address: &str) -> String {
        if self.case_sensitive_addresses() {
            address.to_string()
        } else {
            address.to_lowercase()
        }
    }
}

impl std::fmt::Display for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Human-readable network name for the envelope's `blockchain.network` field.
pub fn network_name(system: System, network_id: u64) -> &'static str {
    match system {
        System::Ethereum => match network_id {
            1 => "main",
            3 => "ropsten",
            4 => "rinkeby",
            5 => "goerli",
            42 => "kovan",
            100 => "xdai",
            _ => "local",
        },
        System::Bitcoin => match network_id {
            1 => "main",
            2 => "test",
            _ => "local",
        },
    }
}

/// Configuration for a [`super::Socket`]-backed watch client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API key identifying the calling application.
    pub dapp_id: String,
    /// Target blockchain system.
    pub system: System,
    /// Numeric network identifier (e.g. `1` for Ethereum mainnet).
    pub network_id: u64,
    /// Client version reported in every envelope.
    pub version: String,
}

impl ClientConfig {
    pub fn new(dapp_id: impl Into<String>, system: System, network_id: u64) -> Self {
        Self {
            dapp_id: dapp_id.into(),
            system,
            network_id,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Human-readable name of the configured network.
    pub fn network_name(&self) -> &'static str {
        network_name(self.system, self.network_id)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(String::new(), System::Ethereum, 1)
    }
}
