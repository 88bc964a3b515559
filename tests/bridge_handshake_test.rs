//! End-to-end bridge tests against an in-process web counterpart.
//!
//! These drive the public API the way a host does: script messages go in
//! through the [`BridgeHandle`], scripts come out of the [`ScriptQueue`],
//! and a [`WebPeer`] plays the page.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use alternator_bridge::bridge::peer::WebPeer;
use alternator_bridge::bridge::transport::payload_from_script;
use alternator_bridge::bridge::{
    BridgeError, BridgeHandle, BridgeHandler, CipherError, Coordinate, Envelope, MessageType,
    Payload, ScriptQueue, ScriptReceiver, TokenError, TokenProvider, MESSAGE_CHANNEL,
};
use alternator_bridge::storage::{KeyValueStore, MemoryStore, SavedPath, StorageKey};
use alternator_bridge::{Alternator, Config};
use async_trait::async_trait;

#[derive(Default)]
struct Recorder {
    errors: Mutex<Vec<String>>,
    loading: Mutex<Vec<bool>>,
    messages: Mutex<Vec<Envelope>>,
    established: Mutex<u32>,
}

impl BridgeHandler for Recorder {
    fn on_message(&self, envelope: &Envelope) {
        self.messages.lock().unwrap().push(envelope.clone());
    }

    fn on_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn on_loading_changed(&self, loading: bool) {
        self.loading.lock().unwrap().push(loading);
    }

    fn on_established(&self) {
        *self.established.lock().unwrap() += 1;
    }
}

/// Returns tokens from a queue; fails once it runs dry.
struct QueuedTokens(Mutex<Vec<String>>);

impl QueuedTokens {
    fn new(tokens: &[&str]) -> Self {
        Self(Mutex::new(tokens.iter().rev().map(|t| (*t).to_string()).collect()))
    }
}

#[async_trait]
impl TokenProvider for QueuedTokens {
    async fn refresh_token(&self) -> Result<String, TokenError> {
        self.0.lock().unwrap().pop().ok_or(TokenError::Empty)
    }
}

struct Harness {
    alternator: Alternator,
    scripts: ScriptReceiver,
    recorder: Arc<Recorder>,
    store: Arc<MemoryStore>,
}

impl Harness {
    fn start(tokens: &[&str]) -> Self {
        let recorder = Arc::new(Recorder::default());
        let store = Arc::new(MemoryStore::new());
        let (queue, scripts) = ScriptQueue::channel();
        let config = Config {
            app_id: "com.example".into(),
            ..Config::default()
        };
        let alternator = Alternator::new(
            config,
            Arc::clone(&store) as Arc<dyn KeyValueStore>,
            Arc::new(QueuedTokens::new(tokens)),
            Arc::new(queue),
            Arc::clone(&recorder) as Arc<dyn BridgeHandler>,
        )
        .unwrap();
        Self {
            alternator,
            scripts,
            recorder,
            store,
        }
    }

    fn handle(&self) -> &BridgeHandle {
        self.alternator.handle()
    }

    fn post(&self, body: &str) {
        self.handle().on_script_message(MESSAGE_CHANNEL, Some(body)).unwrap();
    }

    async fn next_payload(&mut self) -> String {
        let script = tokio::time::timeout(Duration::from_secs(5), self.scripts.recv())
            .await
            .expect("timed out waiting for script")
            .expect("script queue closed");
        payload_from_script(&script).unwrap().to_string()
    }

    async fn handshake(&mut self) -> (WebPeer, Envelope) {
        let mut peer = WebPeer::new();
        self.post(&peer.handshake_request());
        let payload = self.next_payload().await;
        let response = peer.accept_response(&payload).unwrap();
        (peer, response)
    }

    /// Wait until every queued command has been processed.
    async fn settle(&self) {
        self.handle().is_established().await;
    }
}

// ========== Handshake Scenario ==========

#[tokio::test]
async fn test_end_to_end_handshake_and_loading() {
    let mut h = Harness::start(&["abc123"]);

    let mut peer = WebPeer::new();
    let request = peer.handshake_request();
    assert!(request.contains(r#""type":"HANDSHAKE""#));
    h.post(&request);

    // The response travels in clear.
    let payload = h.next_payload().await;
    let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(json["type"], "HANDSHAKE");
    assert_eq!(json["platform"], "ios");
    assert_eq!(json["data"]["jwt"], "abc123");
    assert_eq!(json["data"]["app_id"], "com.example");
    assert_eq!(json["data"]["key"].as_str().unwrap().len(), 44);

    peer.accept_response(&payload).unwrap();
    assert!(h.handle().is_established().await);
    assert_eq!(*h.recorder.established.lock().unwrap(), 1);

    // Native -> web: LOADING sealed, opens to the identical struct.
    h.handle()
        .send(MessageType::Loading, Payload::setting(true))
        .await
        .unwrap();
    let sealed = h.next_payload().await;
    assert!(!sealed.contains("LOADING"));
    let opened = peer.open(&sealed).unwrap();
    assert_eq!(opened.message_type, MessageType::Loading);
    assert_eq!(opened.data.setting, Some(true));
    assert_eq!(opened.data.app_id.as_deref(), Some("com.example"));

    // Web -> native: LOADING reaches the handler.
    h.post(&peer.seal(&Envelope::new(MessageType::Loading, Payload::setting(true))).unwrap());
    h.settle().await;
    assert_eq!(*h.recorder.loading.lock().unwrap(), vec![true]);
    assert!(h.recorder.errors.lock().unwrap().is_empty());

    h.alternator.shutdown().await;
}

#[tokio::test]
async fn test_second_handshake_invalidates_first() {
    let mut h = Harness::start(&["one", "two"]);
    let (first, _) = h.handshake().await;
    let (second, _) = h.handshake().await;
    assert_ne!(first.secret(), second.secret());

    h.post(&first.seal(&Envelope::new(MessageType::Loading, Payload::setting(true))).unwrap());
    h.post(&second.seal(&Envelope::new(MessageType::Loading, Payload::setting(false))).unwrap());
    h.settle().await;

    let errors = h.recorder.errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Decrypted error"));
    assert_eq!(*h.recorder.loading.lock().unwrap(), vec![false]);
}

#[tokio::test]
async fn test_token_failure_leaves_bridge_unestablished() {
    let mut h = Harness::start(&[]);
    let peer = WebPeer::new();
    h.post(&peer.handshake_request());
    h.settle().await;

    assert!(!h.handle().is_established().await);
    assert!(h.scripts.try_recv().is_none());
    assert_eq!(
        *h.recorder.errors.lock().unwrap(),
        vec!["We couldn't refresh the session".to_string()]
    );
    assert_eq!(
        h.handle().send(MessageType::Sample, Payload::default()).await,
        Err(BridgeError::Cipher(CipherError::NoKey))
    );

    // A retried handshake is still processed.
    h.post(&peer.handshake_request());
    h.settle().await;
    assert_eq!(h.recorder.errors.lock().unwrap().len(), 2);
}

// ========== Dispatch Scenarios ==========

#[tokio::test]
async fn test_token_renewal_ping_pong() {
    let mut h = Harness::start(&["first", "renewed"]);
    let (peer, _) = h.handshake().await;

    h.post(&peer.seal(&Envelope::new(MessageType::Token, Payload::default())).unwrap());
    let reply = peer.open(&h.next_payload().await).unwrap();

    assert_eq!(reply.message_type, MessageType::Token);
    assert_eq!(reply.data.value.as_deref(), Some("renewed"));
}

#[tokio::test]
async fn test_unknown_type_is_dropped_silently() {
    let mut h = Harness::start(&["t"]);
    let (peer, _) = h.handshake().await;

    h.post(&peer.seal_raw(r#"{"type":"SOMETHING_NEW","data":{}}"#).unwrap());
    h.settle().await;

    assert!(h.recorder.errors.lock().unwrap().is_empty());
    assert!(h.recorder.messages.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_filters_and_path_persist_for_next_session() {
    let mut h = Harness::start(&["t", "u"]);
    let (peer, _) = h.handshake().await;

    h.post(
        &peer
            .seal_raw(r#"{"type":"FILTER","platform":"web","data":{"filters":{"available":true,"plug":["CCS"],"sort":"price"}}}"#)
            .unwrap(),
    );
    h.post(&peer.seal(&Envelope::new(MessageType::Path, Payload::value("/locations/12"))).unwrap());
    h.settle().await;

    let store: &dyn KeyValueStore = &*h.store;
    let saved: SavedPath = store.get(StorageKey::SavedPath).unwrap();
    assert_eq!(saved.path, "/locations/12");
    assert_eq!(h.recorder.messages.lock().unwrap().len(), 1);

    // The next handshake carries the filters back verbatim.
    let (_, response) = h.handshake().await;
    let filters = serde_json::to_value(response.data.filters.unwrap()).unwrap();
    assert_eq!(
        filters,
        serde_json::json!({"available": true, "plug": ["CCS"], "sort": "price"})
    );

    // And the start URL resumes on the saved path exactly once.
    let url = h.alternator.start_url();
    assert!(url.ends_with("/locations/12"), "got {url}");
    assert!(!h.alternator.start_url().ends_with("/locations/12"));
}

#[tokio::test]
async fn test_location_reaches_page_after_handshake() {
    let mut h = Harness::start(&["t"]);
    let (peer, _) = h.handshake().await;

    h.handle().update_location(Coordinate::new(52.52, 13.405)).unwrap();
    let envelope = peer.open(&h.next_payload().await).unwrap();

    assert_eq!(envelope.message_type, MessageType::UserLocation);
    assert_eq!(envelope.data.coordinate(), Some(Coordinate::new(52.52, 13.405)));
}

#[tokio::test]
async fn test_shutdown_stops_delivery() {
    let mut h = Harness::start(&["t"]);
    let (peer, _) = h.handshake().await;

    h.alternator.shutdown().await;
    h.settle().await;

    assert!(h.handle().is_closed());
    assert!(h
        .handle()
        .on_script_message(MESSAGE_CHANNEL, Some(&peer.seal(&Envelope::new(MessageType::Token, Payload::default())).unwrap()))
        .is_err());
    assert!(h.scripts.try_recv().is_none());
}
