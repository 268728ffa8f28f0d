//! Watch registry.
//!
//! Tracks the transactions and addresses currently of interest and the
//! listener(s) attached to each. Account addresses are stored and compared
//! post-normalization; transaction identifiers compare verbatim and are
//! rewritten in place when the server reassigns a hash (speed-up/cancel),
//! so existing registrations keep receiving events under the new identity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chainwatch_core::{TransactionListener, TxIdentifier};

/// Handle returned by a watch registration; passed back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

struct TxEntry {
    id: WatchId,
    identifier: TxIdentifier,
    listener: Arc<dyn TransactionListener>,
}

struct AccountEntry {
    address: String,
    /// Insertion order is dispatch order.
    listeners: Vec<(WatchId, Arc<dyn TransactionListener>)>,
}

#[derive(Default)]
struct Inner {
    transactions: Vec<TxEntry>,
    accounts: Vec<AccountEntry>,
}

/// What a [`Registry::remove`] call actually removed.
pub(crate) enum Removed {
    Transaction {
        identifier: TxIdentifier,
    },
    AccountListener {
        address: String,
        /// `true` when this was the address's last listener and the entry
        /// itself was deleted.
        last: bool,
    },
}

#[derive(Default)]
pub(crate) struct Registry {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl Registry {
    fn next_id(&self) -> WatchId {
        WatchId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn add_transaction(
        &self,
        identifier: TxIdentifier,
        listener: Arc<dyn TransactionListener>,
    ) -> WatchId {
        let id = self.next_id();
        self.inner.lock().unwrap().transactions.push(TxEntry {
            id,
            identifier,
            listener,
        });
        id
    }

    /// Register a listener for `address` (already normalized). A second
    /// listener for an address being watched appends to the existing entry.
    pub(crate) fn add_account(
        &self,
        address: String,
        listener: Arc<dyn TransactionListener>,
    ) -> WatchId {
        let id = self.next_id();
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.accounts.iter_mut().find(|e| e.address == address) {
            entry.listeners.push((id, listener));
        } else {
            inner.accounts.push(AccountEntry {
                address,
                listeners: vec![(id, listener)],
            });
        }
        id
    }

    pub(crate) fn remove(&self, id: WatchId) -> Option<Removed> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(pos) = inner.transactions.iter().position(|e| e.id == id) {
            let entry = inner.transactions.remove(pos);
            return Some(Removed::Transaction {
                identifier: entry.identifier,
            });
        }

        for pos in 0..inner.accounts.len() {
            let entry = &mut inner.accounts[pos];
            if let Some(idx) = entry.listeners.iter().position(|(lid, _)| *lid == id) {
                entry.listeners.remove(idx);
                let address = entry.address.clone();
                let last = entry.listeners.is_empty();
                if last {
                    inner.accounts.remove(pos);
                }
                return Some(Removed::AccountListener { address, last });
            }
        }

        None
    }

    /// Rewrite every watched identifier equal to `original` to `new_value`,
    /// keeping each entry (and its listener) alive under the new identity.
    pub(crate) fn rewrite_identifier(&self, original: &str, new_value: &str) -> bool {
        let mut rewritten = false;
        for entry in self
            .inner
            .lock()
            .unwrap()
            .transactions
            .iter_mut()
            .filter(|e| e.identifier.value() == original)
        {
            entry.identifier = match entry.identifier {
                TxIdentifier::Hash(_) => TxIdentifier::Hash(new_value.to_string()),
                TxIdentifier::Id(_) => TxIdentifier::Id(new_value.to_string()),
            };
            rewritten = true;
        }
        rewritten
    }

    /// Look up a watched transaction by either of the event's identifiers.
    pub(crate) fn transaction_listener(
        &self,
        hash: Option<&str>,
        tx_id: Option<&str>,
    ) -> Option<Arc<dyn TransactionListener>> {
        let inner = self.inner.lock().unwrap();
        inner
            .transactions
            .iter()
            .find(|e| {
                let value = e.identifier.value();
                hash == Some(value) || tx_id == Some(value)
            })
            .map(|e| Arc::clone(&e.listener))
    }

    /// All listeners for `address` (already normalized), in registration order.
    pub(crate) fn account_listeners(&self, address: &str) -> Vec<Arc<dyn TransactionListener>> {
        self.inner
            .lock()
            .unwrap()
            .accounts
            .iter()
            .find(|e| e.address == address)
            .map(|e| e.listeners.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default()
    }

    /// Snapshot of watched addresses, used to replay subscriptions after a
    /// reconnect.
    pub(crate) fn watched_addresses(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .accounts
            .iter()
            .map(|e| e.address.clone())
            .collect()
    }

    pub(crate) fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.transactions.clear();
        inner.accounts.clear();
    }

    #[cfg(test)]
    fn transaction_count(&self) -> usize {
        self.inner.lock().unwrap().transactions.len()
    }

    #[cfg(test)]
    fn account_count(&self) -> usize {
        self.inner.lock().unwrap().accounts.len()
    }
}
