//! End-to-end client behavior against a mock transport.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use chainwatch_client::{ClientBuilder, WatchClient};
use chainwatch_core::{
    session_key, ClientConfig, CloseInfo, ConnectionListener, ConnectionState, MemoryStore,
    RateLimitRule, SessionStore, Socket, SocketEvent, System, TransactionState, TxIdentifier,
    WatchError,
};

struct MockSocket {
    sent: Mutex<Vec<(Instant, String)>>,
    terminated: AtomicBool,
    closed: AtomicBool,
}

impl MockSocket {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            terminated: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }

    fn sent_at(&self) -> Vec<(Instant, String)> {
        self.sent.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Socket for MockSocket {
    async fn send(&self, text: String) -> Result<(), WatchError> {
        if self.is_closed() {
            return Err(WatchError::Transport {
                message: "socket closed".into(),
            });
        }
        self.sent.lock().unwrap().push((Instant::now(), text));
        Ok(())
    }

    fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct Harness {
    client: WatchClient,
    socket: Arc<MockSocket>,
    events: mpsc::UnboundedSender<SocketEvent>,
}

fn config() -> ClientConfig {
    ClientConfig::new("test-key", System::Ethereum, 1)
}

fn build(customize: impl FnOnce(ClientBuilder) -> ClientBuilder) -> Harness {
    let socket = MockSocket::new();
    let (events, rx) = mpsc::unbounded_channel();
    let client = customize(WatchClient::builder(config())).connect(socket.clone(), rx);
    Harness {
        client,
        socket,
        events,
    }
}

fn noop() -> impl Fn(&TransactionState) -> Option<Value> + Send + Sync {
    |_: &TransactionState| None
}

fn decode(text: &str) -> Value {
    serde_json::from_str(text).unwrap()
}

/// Let spawned tasks run; with the clock paused this advances time only
/// once every task is idle.
async fn tick() {
    time::sleep(Duration::from_millis(10)).await;
}

async fn flush() {
    time::sleep(Duration::from_secs(30)).await;
}

#[tokio::test(start_paused = true)]
async fn open_announces_session_before_anything_else() {
    let h = build(|b| b);
    h.events.send(SocketEvent::Open).unwrap();
    tick().await;

    assert_eq!(h.client.connection_state(), ConnectionState::Connected);
    let sent = h.socket.sent();
    assert_eq!(sent.len(), 1);
    let init = decode(&sent[0]);
    assert_eq!(init["categoryCode"], "initialize");
    assert_eq!(init["eventCode"], "checkDappId");
    assert_eq!(init["dappId"], "test-key");
    assert!(init.get("connectionId").is_none());
}

#[tokio::test(start_paused = true)]
async fn connection_id_is_persisted_and_resumed() {
    let store = Arc::new(MemoryStore::new());
    let socket = MockSocket::new();
    let (events, rx) = mpsc::unbounded_channel();
    let client = WatchClient::builder(config())
        .session_store(store.clone())
        .connect(socket.clone(), rx);

    events.send(SocketEvent::Open).unwrap();
    tick().await;
    events
        .send(SocketEvent::Message(json!({"connectionId": "c9"}).to_string()))
        .unwrap();
    tick().await;

    assert_eq!(client.connection_id().as_deref(), Some("c9"));
    let key = session_key(&config());
    assert_eq!(store.get(&key).as_deref(), Some("c9"));

    // The next announcement carries the assigned identity.
    socket.clear();
    events.send(SocketEvent::Reopen).unwrap();
    tick().await;
    let init = decode(&socket.sent()[0]);
    assert_eq!(init["connectionId"], "c9");

    // A fresh client resumes the stored session.
    let socket2 = MockSocket::new();
    let (events2, rx2) = mpsc::unbounded_channel();
    let _client2 = WatchClient::builder(config())
        .session_store(store)
        .connect(socket2.clone(), rx2);
    events2.send(SocketEvent::Open).unwrap();
    tick().await;
    let init = decode(&socket2.sent()[0]);
    assert_eq!(init["connectionId"], "c9");
}

#[tokio::test(start_paused = true)]
async fn reopen_replays_accounts_but_not_transactions() {
    let h = build(|b| b);
    h.events.send(SocketEvent::Open).unwrap();
    tick().await;

    h.client.watch_account("0xAaaa", noop()).unwrap();
    h.client.watch_account("0xBbbb", noop()).unwrap();
    h.client
        .watch_transaction(TxIdentifier::Hash("0x1".into()), noop())
        .unwrap();
    flush().await;
    h.socket.clear();

    h.events.send(SocketEvent::Reopen).unwrap();
    tick().await;

    let sent = h.socket.sent();
    assert_eq!(decode(&sent[0])["categoryCode"], "initialize");

    let replays: Vec<Value> = sent[1..].iter().map(|m| decode(m)).collect();
    assert_eq!(replays.len(), 2, "one watch intent per account, nothing else");
    for replay in &replays {
        assert_eq!(replay["categoryCode"], "accountAddress");
        assert_eq!(replay["eventCode"], "watch");
    }
    let mut addresses: Vec<&str> = replays
        .iter()
        .map(|r| r["account"]["address"].as_str().unwrap())
        .collect();
    addresses.sort_unstable();
    assert_eq!(addresses, vec!["0xaaaa", "0xbbbb"]);
}

#[tokio::test(start_paused = true)]
async fn blocked_message_preempts_queue_after_gate() {
    let h = build(|b| b);
    h.events.send(SocketEvent::Open).unwrap();
    tick().await;
    h.socket.clear();

    h.client
        .watch_transaction(TxIdentifier::Hash("0x1".into()), noop())
        .unwrap();
    h.client
        .watch_transaction(TxIdentifier::Hash("0x2".into()), noop())
        .unwrap();

    // First watch intent leaves after the settle delay plus default pacing.
    time::sleep(Duration::from_millis(600)).await;
    assert_eq!(h.socket.sent().len(), 1);

    let gate_start = Instant::now();
    h.events
        .send(SocketEvent::Message(
            json!({
                "status": "error",
                "reason": "ratelimit reached",
                "retryMs": 60_000,
                "limitRules": {"points": 1, "duration": 10},
                "blockedMsg": "BLOCKED",
            })
            .to_string(),
        ))
        .unwrap();

    time::sleep(Duration::from_secs(120)).await;

    let sent = h.socket.sent_at();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[1].1, "BLOCKED", "blocked message jumps the queue");
    assert!(
        sent[1].0 >= gate_start + Duration::from_secs(60),
        "nothing may be sent before the retry gate resolves"
    );
    assert_eq!(decode(&sent[2].1)["transaction"]["hash"], "0x2");
}

#[tokio::test(start_paused = true)]
async fn rule_resets_to_default_once_queue_drains() {
    let h = build(|b| b);
    h.events.send(SocketEvent::Open).unwrap();
    tick().await;

    h.events
        .send(SocketEvent::Message(
            json!({
                "status": "error",
                "reason": "ratelimit reached",
                "limitRules": {"points": 1, "duration": 20},
            })
            .to_string(),
        ))
        .unwrap();
    tick().await;
    assert_eq!(
        h.client.active_rule(),
        RateLimitRule {
            points: 1,
            duration: 20
        }
    );

    h.client.watch_account("0xabc", noop()).unwrap();
    time::sleep(Duration::from_secs(60)).await;

    assert_eq!(h.client.queued(), 0);
    assert_eq!(h.client.active_rule(), RateLimitRule::DEFAULT);
}

#[tokio::test(start_paused = true)]
async fn rule_change_paces_from_the_next_transmission() {
    let h = build(|b| b);
    h.events.send(SocketEvent::Open).unwrap();
    tick().await;
    h.socket.clear();

    h.client.watch_account("0xa1", noop()).unwrap();
    h.client.watch_account("0xa2", noop()).unwrap();
    h.client.watch_account("0xa3", noop()).unwrap();

    // Tighten the rule while the first message is still pacing out.
    time::sleep(Duration::from_millis(600)).await;
    assert_eq!(h.socket.sent().len(), 1);
    h.events
        .send(SocketEvent::Message(
            json!({
                "status": "error",
                "reason": "ratelimit reached",
                "limitRules": {"points": 2, "duration": 4},
            })
            .to_string(),
        ))
        .unwrap();

    flush().await;

    let sent = h.socket.sent_at();
    assert_eq!(sent.len(), 3);
    let new_delay = Duration::from_secs(2); // 4s / 2 points
    assert!(sent[1].0 - sent[0].0 >= new_delay);
    assert!(sent[2].0 - sent[1].0 >= new_delay);
}

#[tokio::test(start_paused = true)]
async fn speedup_follows_the_transaction_to_its_new_hash() {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let listener_seen = seen.clone();

    let h = build(|b| b);
    h.events.send(SocketEvent::Open).unwrap();
    tick().await;

    h.client
        .watch_transaction(
            TxIdentifier::Hash("0xa".into()),
            move |state: &TransactionState| -> Option<Value> {
                listener_seen
                    .lock()
                    .unwrap()
                    .push(state.event_code.as_code().to_string());
                None
            },
        )
        .unwrap();

    h.events
        .send(SocketEvent::Message(
            json!({
                "event": {
                    "eventCode": "txSpeedUp",
                    "transaction": {"hash": "0xnew", "originalHash": "0xa"},
                }
            })
            .to_string(),
        ))
        .unwrap();
    tick().await;

    h.events
        .send(SocketEvent::Message(
            json!({
                "event": {
                    "eventCode": "txConfirmed",
                    "transaction": {"hash": "0xnew"},
                }
            })
            .to_string(),
        ))
        .unwrap();
    tick().await;

    assert_eq!(*seen.lock().unwrap(), vec!["txSpeedUp", "txConfirmed"]);
}

#[tokio::test(start_paused = true)]
async fn invalid_address_error_reaches_the_sink_exactly_once() {
    let errors = Arc::new(Mutex::new(Vec::<WatchError>::new()));
    let sink_errors = errors.clone();
    let listener_calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = Arc::new(AtomicUsize::new(0));

    let calls = listener_calls.clone();
    let handled = handler_calls.clone();
    let h = build(move |b| {
        b.error_sink(move |e: WatchError| sink_errors.lock().unwrap().push(e))
            .transaction_handler(move |_: &TransactionState, _: Option<&Value>| {
                handled.fetch_add(1, Ordering::SeqCst);
            })
    });
    h.events.send(SocketEvent::Open).unwrap();
    tick().await;

    h.client
        .watch_account("0xBAD", move |_: &TransactionState| -> Option<Value> {
            calls.fetch_add(1, Ordering::SeqCst);
            None
        })
        .unwrap();

    h.events
        .send(SocketEvent::Message(
            json!({
                "status": "error",
                "reason": "0xBAD is not a valid Ethereum address",
                "event": {"account": {"address": "0xBAD"}},
            })
            .to_string(),
        ))
        .unwrap();
    tick().await;

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(
        matches!(&errors[0], WatchError::InvalidAddress { address } if address == "0xBAD")
    );
    assert_eq!(listener_calls.load(Ordering::SeqCst), 0);
    assert_eq!(handler_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn account_listeners_run_in_order_and_handlers_see_last_result() {
    let order = Arc::new(Mutex::new(Vec::<i32>::new()));
    let captured = Arc::new(Mutex::new(Vec::<(String, Option<Value>)>::new()));

    let handler_captured = captured.clone();
    let h = build(move |b| {
        b.transaction_handler(move |state: &TransactionState, result: Option<&Value>| {
            handler_captured.lock().unwrap().push((
                state.transaction.hash.clone().unwrap_or_default(),
                result.cloned(),
            ));
        })
    });
    h.events.send(SocketEvent::Open).unwrap();
    tick().await;

    let first_order = order.clone();
    h.client
        .watch_account("0xB", move |_: &TransactionState| -> Option<Value> {
            first_order.lock().unwrap().push(1);
            Some(json!("one"))
        })
        .unwrap();
    let second_order = order.clone();
    h.client
        .watch_account("0xB", move |_: &TransactionState| -> Option<Value> {
            second_order.lock().unwrap().push(2);
            Some(json!("two"))
        })
        .unwrap();

    h.events
        .send(SocketEvent::Message(
            json!({
                "event": {
                    "eventCode": "txSent",
                    "transaction": {"hash": "0xA", "watchedAddress": "0xB"},
                }
            })
            .to_string(),
        ))
        .unwrap();
    tick().await;

    assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    let captured = captured.lock().unwrap();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].0, "0xA");
    assert_eq!(captured[0].1, Some(json!("two")));
}

#[tokio::test(start_paused = true)]
async fn generic_handlers_run_on_lookup_miss() {
    let captured = Arc::new(Mutex::new(Vec::<Option<Value>>::new()));
    let handler_captured = captured.clone();
    let h = build(move |b| {
        b.transaction_handler(move |_: &TransactionState, result: Option<&Value>| {
            handler_captured.lock().unwrap().push(result.cloned());
        })
    });
    h.events.send(SocketEvent::Open).unwrap();
    tick().await;

    h.events
        .send(SocketEvent::Message(
            json!({
                "event": {
                    "eventCode": "txSent",
                    "transaction": {"hash": "0xA", "watchedAddress": "0xUnwatched"},
                }
            })
            .to_string(),
        ))
        .unwrap();
    tick().await;

    assert_eq!(*captured.lock().unwrap(), vec![None]);
}

#[tokio::test(start_paused = true)]
async fn echoes_and_unsubscribed_transactions_are_discarded() {
    let listener_calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = Arc::new(AtomicUsize::new(0));

    let handled = handler_calls.clone();
    let h = build(move |b| {
        b.transaction_handler(move |_: &TransactionState, _: Option<&Value>| {
            handled.fetch_add(1, Ordering::SeqCst);
        })
    });
    h.events.send(SocketEvent::Open).unwrap();
    tick().await;

    let calls = listener_calls.clone();
    h.client
        .watch_transaction(
            TxIdentifier::Hash("0xa".into()),
            move |_: &TransactionState| -> Option<Value> {
                calls.fetch_add(1, Ordering::SeqCst);
                None
            },
        )
        .unwrap();

    for frame in [
        json!({"event": {"eventCode": "watchRequest", "transaction": {"hash": "0xa"}}}),
        json!({"event": {"eventCode": "txSent",
                         "transaction": {"hash": "0xa", "status": "unsubscribed"}}}),
    ] {
        h.events.send(SocketEvent::Message(frame.to_string())).unwrap();
    }
    tick().await;
    assert_eq!(listener_calls.load(Ordering::SeqCst), 0);
    assert_eq!(handler_calls.load(Ordering::SeqCst), 0);

    h.events
        .send(SocketEvent::Message(
            json!({"event": {"eventCode": "txSent", "transaction": {"hash": "0xa"}}}).to_string(),
        ))
        .unwrap();
    tick().await;
    assert_eq!(listener_calls.load(Ordering::SeqCst), 1);
    assert_eq!(handler_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn silent_transport_is_terminated_after_liveness_window() {
    let h = build(|b| b);
    h.events.send(SocketEvent::Open).unwrap();
    tick().await;

    time::sleep(Duration::from_secs(20)).await;
    h.events.send(SocketEvent::Ping).unwrap();
    tick().await;

    // 40s after open but only 20s after the last ping.
    time::sleep(Duration::from_secs(20)).await;
    assert!(!h.socket.is_terminated());

    time::sleep(Duration::from_secs(12)).await;
    assert!(h.socket.is_terminated());
}

#[tokio::test(start_paused = true)]
async fn lifecycle_listener_follows_transport_signals() {
    struct Recorder(Arc<Mutex<Vec<String>>>);
    impl ConnectionListener for Recorder {
        fn on_open(&self) {
            self.0.lock().unwrap().push("open".into());
        }
        fn on_down(&self, info: &CloseInfo) {
            self.0.lock().unwrap().push(format!("down:{}", info.reason));
        }
        fn on_reopen(&self) {
            self.0.lock().unwrap().push("reopen".into());
        }
        fn on_close(&self) {
            self.0.lock().unwrap().push("close".into());
        }
    }

    let calls = Arc::new(Mutex::new(Vec::new()));
    let h = build(|b| b.connection_listener(Recorder(calls.clone())));

    h.events.send(SocketEvent::Open).unwrap();
    tick().await;
    assert_eq!(h.client.connection_state(), ConnectionState::Connected);

    h.events
        .send(SocketEvent::Down(CloseInfo {
            code: Some(1006),
            reason: "gone".into(),
        }))
        .unwrap();
    tick().await;
    assert_eq!(h.client.connection_state(), ConnectionState::Disconnected);

    h.events.send(SocketEvent::Reopen).unwrap();
    h.events.send(SocketEvent::Closed).unwrap();
    tick().await;

    assert_eq!(
        *calls.lock().unwrap(),
        vec!["open", "down:gone", "reopen", "close"]
    );
}

#[tokio::test(start_paused = true)]
async fn destroy_closes_transport_and_rejects_new_watches() {
    let h = build(|b| b);
    h.events.send(SocketEvent::Open).unwrap();
    tick().await;

    h.client.destroy();
    assert!(h.socket.is_closed());
    assert!(matches!(
        h.client.watch_account("0x1", noop()),
        Err(WatchError::Destroyed)
    ));
}

#[tokio::test(start_paused = true)]
async fn server_rejection_without_sink_is_fatal_to_routing() {
    let listener_calls = Arc::new(AtomicUsize::new(0));

    let h = build(|b| b);
    h.events.send(SocketEvent::Open).unwrap();
    tick().await;

    let calls = listener_calls.clone();
    h.client
        .watch_transaction(
            TxIdentifier::Hash("0xa".into()),
            move |_: &TransactionState| -> Option<Value> {
                calls.fetch_add(1, Ordering::SeqCst);
                None
            },
        )
        .unwrap();

    h.events
        .send(SocketEvent::Message(
            json!({"status": "error", "reason": "this is not a valid API key"}).to_string(),
        ))
        .unwrap();
    tick().await;

    // The routing task stopped; later frames are no longer dispatched.
    h.events
        .send(SocketEvent::Message(
            json!({"event": {"eventCode": "txSent", "transaction": {"hash": "0xa"}}}).to_string(),
        ))
        .unwrap();
    tick().await;
    assert_eq!(listener_calls.load(Ordering::SeqCst), 0);
}
