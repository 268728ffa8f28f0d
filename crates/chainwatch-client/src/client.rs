//! The `WatchClient` facade and the session object shared by its tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::watch;

use chainwatch_core::{
    session_key, ClientConfig, ConnectionListener, ConnectionState, Envelope, ErrorSink,
    MemoryStore, RateLimitRule, SessionStore, Socket, SocketEvents, TransactionHandler,
    TransactionListener, TransactionState, TxIdentifier, WatchError,
};

use crate::connection;
use crate::queue::{self, Outbound};
use crate::registry::{Registry, Removed, WatchId};

/// State shared by the inbound pump/router and the outbound drain task.
///
/// One instance per client, owned behind an `Arc`; the mutex-guarded fields
/// inside `Outbound` are the only state both tasks mutate.
pub(crate) struct Session {
    pub(crate) config: ClientConfig,
    pub(crate) socket: Arc<dyn Socket>,
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) session_key: String,
    pub(crate) registry: Registry,
    pub(crate) outbound: Outbound,
    pub(crate) connection: watch::Sender<ConnectionState>,
    pub(crate) connection_id: Mutex<Option<String>>,
    pub(crate) lifecycle: Option<Arc<dyn ConnectionListener>>,
    pub(crate) error_sink: Option<Arc<dyn ErrorSink>>,
    pub(crate) handlers: Vec<TransactionHandler>,
    pub(crate) destroyed: AtomicBool,
}

impl Session {
    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.connection.send_replace(state);
    }

    pub(crate) fn connection_id(&self) -> Option<String> {
        self.connection_id.lock().unwrap().clone()
    }

    /// Remember the server-assigned session identity, in memory and in the
    /// persistent store, so the next initialization envelope can resume it.
    pub(crate) fn set_connection_id(&self, id: &str) {
        let mut current = self.connection_id.lock().unwrap();
        if current.as_deref() != Some(id) {
            tracing::debug!(connection_id = id, "session identity assigned");
            *current = Some(id.to_string());
            self.store.set(&self.session_key, id);
        }
    }

    /// Hand an error to the sink, or return it when no sink is registered.
    /// Errors are never both sunk and returned.
    pub(crate) fn emit_error(&self, error: WatchError) -> Result<(), WatchError> {
        match &self.error_sink {
            Some(sink) => {
                sink.on_error(error);
                Ok(())
            }
            None => Err(error),
        }
    }

    /// Send the session-establishing envelope, bypassing the queue.
    pub(crate) async fn announce(&self) {
        let envelope = Envelope::initialize(&self.config, self.connection_id().as_deref());
        self.send_direct(&envelope).await;
    }

    /// Re-issue a watch intent for every watched address, bypassing the
    /// queue. The server retains hash subscriptions across a reconnect but
    /// not address subscriptions, so transactions are not re-announced.
    pub(crate) async fn replay_accounts(&self) {
        for address in self.registry.watched_addresses() {
            let envelope = Envelope::watch_account(&self.config, &address);
            self.send_direct(&envelope).await;
        }
    }

    async fn send_direct(&self, envelope: &Envelope) {
        match envelope.encode() {
            Ok(text) => {
                if let Err(e) = self.socket.send(text).await {
                    tracing::warn!(error = %e, "direct send failed");
                }
            }
            Err(e) => tracing::error!(error = %e, "envelope failed to encode"),
        }
    }

    /// Queue an envelope for rate-limited transmission, starting the drain
    /// task if none is running.
    pub(crate) fn enqueue(self: &Arc<Self>, envelope: &Envelope) -> Result<(), WatchError> {
        self.outbound.push_back(envelope.encode()?)?;
        if self.outbound.try_begin_drain() {
            tokio::spawn(queue::drain(Arc::clone(self)));
        }
        Ok(())
    }
}

/// Builder for a [`WatchClient`]. Lifecycle listeners, the error sink and
/// generic transaction handlers are fixed at construction.
pub struct ClientBuilder {
    config: ClientConfig,
    store: Arc<dyn SessionStore>,
    lifecycle: Option<Arc<dyn ConnectionListener>>,
    error_sink: Option<Arc<dyn ErrorSink>>,
    handlers: Vec<TransactionHandler>,
}

impl ClientBuilder {
    /// Use a persistent store for session continuity across restarts.
    /// Defaults to the in-memory store.
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn connection_listener(mut self, listener: impl ConnectionListener + 'static) -> Self {
        self.lifecycle = Some(Arc::new(listener));
        self
    }

    /// Register the error sink. Without one, protocol/validation errors are
    /// fatal to the routing task.
    pub fn error_sink(mut self, sink: impl ErrorSink + 'static) -> Self {
        self.error_sink = Some(Arc::new(sink));
        self
    }

    /// Register a generic handler observing every routed transaction event.
    /// May be called repeatedly; handlers run in registration order.
    pub fn transaction_handler(
        mut self,
        handler: impl Fn(&TransactionState, Option<&Value>) + Send + Sync + 'static,
    ) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Attach the transport and start the client's background tasks.
    /// Must be called from within a Tokio runtime.
    pub fn connect(self, socket: Arc<dyn Socket>, events: SocketEvents) -> WatchClient {
        let session_key = session_key(&self.config);
        let connection_id = self.store.get(&session_key);
        let (connection, _) = watch::channel(ConnectionState::Disconnected);

        let session = Arc::new(Session {
            config: self.config,
            socket,
            store: self.store,
            session_key,
            registry: Registry::default(),
            outbound: Outbound::default(),
            connection,
            connection_id: Mutex::new(connection_id),
            lifecycle: self.lifecycle,
            error_sink: self.error_sink,
            handlers: self.handlers,
            destroyed: AtomicBool::new(false),
        });

        tokio::spawn(connection::pump(Arc::clone(&session), events));

        WatchClient { session }
    }
}

/// Client for a realtime transaction-monitoring service.
///
/// Register interest with [`watch_transaction`](Self::watch_transaction) /
/// [`watch_account`](Self::watch_account); notifications arrive on the
/// registered listeners and on the generic handlers supplied at build time.
pub struct WatchClient {
    session: Arc<Session>,
}

impl WatchClient {
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            store: Arc::new(MemoryStore::new()),
            lifecycle: None,
            error_sink: None,
            handlers: Vec::new(),
        }
    }

    /// Watch a single transaction. Events for it (including under a
    /// reassigned hash after a speed-up or cancel) reach `listener`.
    pub fn watch_transaction(
        &self,
        identifier: TxIdentifier,
        listener: impl TransactionListener + 'static,
    ) -> Result<WatchId, WatchError> {
        self.ensure_live()?;
        let envelope = Envelope::watch_transaction(&self.session.config, &identifier);
        let id = self
            .session
            .registry
            .add_transaction(identifier, Arc::new(listener));
        self.session.enqueue(&envelope)?;
        Ok(id)
    }

    /// Watch every transaction touching `address`. Additional listeners for
    /// an address already being watched share its entry; dispatch follows
    /// registration order.
    pub fn watch_account(
        &self,
        address: &str,
        listener: impl TransactionListener + 'static,
    ) -> Result<WatchId, WatchError> {
        self.ensure_live()?;
        let normalized = self.session.config.system.normalize_address(address);
        let id = self
            .session
            .registry
            .add_account(normalized.clone(), Arc::new(listener));
        self.session
            .enqueue(&Envelope::watch_account(&self.session.config, &normalized))?;
        Ok(id)
    }

    /// Drop a registration. The caller's state is untouched; only the
    /// registry reference is released. An unwatch intent is sent when the
    /// entity is no longer watched by anyone.
    pub fn unwatch(&self, id: WatchId) -> Result<(), WatchError> {
        self.ensure_live()?;
        match self.session.registry.remove(id) {
            Some(Removed::Transaction { identifier }) => self.session.enqueue(
                &Envelope::unwatch_transaction(&self.session.config, &identifier),
            ),
            Some(Removed::AccountListener { address, last: true }) => self
                .session
                .enqueue(&Envelope::unwatch_account(&self.session.config, &address)),
            Some(Removed::AccountListener { last: false, .. }) | None => Ok(()),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.session.connection.borrow()
    }

    /// The server-assigned session identity, if one has been received.
    pub fn connection_id(&self) -> Option<String> {
        self.session.connection_id()
    }

    /// Messages queued but not yet transmitted.
    pub fn queued(&self) -> usize {
        self.session.outbound.len()
    }

    /// The pacing rule currently applied to outbound transmission.
    pub fn active_rule(&self) -> RateLimitRule {
        self.session.outbound.rule()
    }

    /// Tear the client down: close the transport and drop all watches.
    /// The drain task is not cancelled and may attempt one further send
    /// against the closed transport; that send fails harmlessly.
    pub fn destroy(&self) {
        if !self.session.destroyed.swap(true, Ordering::SeqCst) {
            // Publish a state change so a drain task parked on the
            // connected-wait observes the teardown.
            self.session.set_state(ConnectionState::Disconnected);
            self.session.registry.clear();
            self.session.socket.close();
        }
    }

    fn ensure_live(&self) -> Result<(), WatchError> {
        if self.session.destroyed.load(Ordering::SeqCst) {
            return Err(WatchError::Destroyed);
        }
        Ok(())
    }
}

impl Drop for WatchClient {
    fn drop(&mut self) {
        self.destroy();
    }
}
