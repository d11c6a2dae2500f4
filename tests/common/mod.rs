//! Shared test helpers: a scripted in-process transport and wait utilities.
//!
//! The mock transport gives tests full control over the socket lifecycle
//! (when it opens, what the server pushes, when it errors) while capturing
//! every frame the client sends, so end-to-end protocol flows run without a
//! network connection.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use live_link::{
    CacheEntry, CollectionHandle, Connector, EntityHandle, LiveLinkError, LiveState, LocalStore,
    Result, Transport, TransportEvent,
};
use serde_json::Value;
use tokio::sync::mpsc;

/// Transport half handed to the client through the mock connector.
pub struct MockTransport {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    sent: mpsc::UnboundedSender<String>,
    open: bool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, text: &str) -> Result<()> {
        self.sent
            .send(text.to_string())
            .map_err(|_| LiveLinkError::TransportError("mock server gone".into()))
    }

    async fn close(&mut self) {
        self.open = false;
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        let event = self.events.recv().await;
        match &event {
            Some(TransportEvent::Open) => self.open = true,
            Some(TransportEvent::Error(_) | TransportEvent::Closed) | None => self.open = false,
            _ => {},
        }
        event
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Connector yielding one prepared [`MockTransport`].
pub struct MockConnector {
    transport: Mutex<Option<MockTransport>>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>> {
        match self.transport.lock().unwrap().take() {
            Some(transport) => Ok(Box::new(transport)),
            None => Err(LiveLinkError::TransportError(
                "mock transport already taken".into(),
            )),
        }
    }
}

/// Connector whose connect attempt always fails.
pub struct FailingConnector;

#[async_trait]
impl Connector for FailingConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>> {
        Err(LiveLinkError::TransportError("connection refused".into()))
    }
}

/// Server half of the mock: scripts transport events and captures client
/// frames.
pub struct MockServer {
    events: mpsc::UnboundedSender<TransportEvent>,
    sent: mpsc::UnboundedReceiver<String>,
}

impl MockServer {
    /// Signal that the socket is open.
    pub fn open(&self) {
        let _ = self.events.send(TransportEvent::Open);
    }

    /// Push one server frame (rendered to a single-line JSON text frame).
    pub fn push(&self, frame: Value) {
        let _ = self
            .events
            .send(TransportEvent::Message(frame.to_string()));
    }

    /// Signal a socket-level error.
    pub fn error(&self, message: &str) {
        let _ = self.events.send(TransportEvent::Error(message.to_string()));
    }

    /// Signal that the socket closed.
    pub fn close(&self) {
        let _ = self.events.send(TransportEvent::Closed);
    }

    /// Next frame sent by the client, parsed. Panics after 5 (virtual)
    /// seconds without one.
    pub async fn recv(&mut self) -> Value {
        let text = tokio::time::timeout(Duration::from_secs(5), self.sent.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client transport dropped");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    /// Asserts no client frame arrives within `ms` (virtual) milliseconds.
    pub async fn expect_silence(&mut self, ms: u64) {
        let outcome =
            tokio::time::timeout(Duration::from_millis(ms), self.sent.recv()).await;
        if let Ok(Some(frame)) = outcome {
            panic!("expected no client frame, got: {}", frame);
        }
    }
}

/// Build a connected mock connector/server pair.
pub fn mock_pair() -> (Arc<MockConnector>, MockServer) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    let connector = Arc::new(MockConnector {
        transport: Mutex::new(Some(MockTransport {
            events: events_rx,
            sent: sent_tx,
            open: false,
        })),
    });
    let server = MockServer {
        events: events_tx,
        sent: sent_rx,
    };
    (connector, server)
}

/// A cache store whose every operation rejects.
pub struct BrokenStore;

#[async_trait]
impl LocalStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<CacheEntry>> {
        Err(LiveLinkError::CacheStoreError("disk on fire".into()))
    }

    async fn set(&self, _key: &str, _entry: CacheEntry) -> Result<()> {
        Err(LiveLinkError::CacheStoreError("disk on fire".into()))
    }
}

/// Wait until an entity handle's state satisfies `pred`, or panic after 5
/// (virtual) seconds.
pub async fn wait_for_state(
    handle: &mut EntityHandle,
    pred: impl Fn(&LiveState) -> bool,
) -> LiveState {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let state = handle.state();
            if pred(&state) {
                return state;
            }
            assert!(handle.changed().await, "state channel closed while waiting");
        }
    })
    .await
    .expect("timed out waiting for state")
}

/// Collection-handle counterpart of [`wait_for_state`].
pub async fn wait_for_collection_state(
    handle: &mut CollectionHandle,
    pred: impl Fn(&LiveState) -> bool,
) -> LiveState {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let state = handle.state();
            if pred(&state) {
                return state;
            }
            assert!(handle.changed().await, "state channel closed while waiting");
        }
    })
    .await
    .expect("timed out waiting for state")
}
