//! Session-continuity cache with a pluggable storage backend.
//!
//! The server assigns a `connectionId` that survives reconnects; persisting
//! it lets a restarted client resume its previous session. Storage is a
//! plain key/value seam: in-memory by default, external stores optional.
//! The key is a stable hash of the caller's identity — a derivation detail,
//! not a security mechanism.

use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::config::ClientConfig;

/// Key/value storage seam for session continuity.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

/// Default in-memory store. Survives reconnects, not process restarts.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }
}

/// Derive the storage key for a client's session entry.
pub fn session_key(config: &ClientConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(config.dapp_id.as_bytes());
    hasher.update(b":");
    hasher.update(config.system.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(config.network_id.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::System;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.get("k").is_none());
        store.set("k", "v");
        assert_eq!(store.get("k").as_deref(), Some("v"));
        store.set("k", "v2");
        assert_eq!(store.get("k").as_deref(), Some("v2"));
    }

    #[test]
    fn session_key_is_stable() {
        let config = ClientConfig::new("key", System::Ethereum, 1);
        assert_eq!(session_key(&config), session_key(&config));
    }

    #[test]
    fn session_key_varies_by_identity() {
        let a = ClientConfig::new("key", System::Ethereum, 1);
        let b = ClientConfig::new("key", System::Ethereum, 100);
        let c = ClientConfig::new("other", System::Ethereum, 1);
        assert_ne!(session_key(&a), session_key(&b));
        assert_ne!(session_key(&a), session_key(&c));
    }
}
