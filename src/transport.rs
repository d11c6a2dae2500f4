//! Transport abstraction and the default WebSocket implementation.
//!
//! The sync service never touches a socket directly: it drives a boxed
//! [`Transport`] produced by a [`Connector`]. The default pair
//! ([`WsConnector`]/[`WsTransport`]) speaks WebSocket via tokio-tungstenite;
//! tests inject a scripted in-process transport instead.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message},
};
use url::Url;

use crate::error::{LiveLinkError, Result};

type WebSocketStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>;

/// Maximum accepted text frame size (64 MiB).
const MAX_TEXT_FRAME_BYTES: usize = 64 << 20;

/// Default connection timeout for [`WsConnector`].
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle and data events surfaced by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The socket is open; queued frames may be flushed.
    Open,
    /// One inbound text frame.
    Message(String),
    /// Socket-level failure.
    Error(String),
    /// The socket closed (gracefully or after an error).
    Closed,
}

/// A connected, bidirectional text-frame socket.
#[async_trait]
pub trait Transport: Send {
    /// Send one text frame.
    async fn send(&mut self, text: &str) -> Result<()>;

    /// Close the socket. Best-effort; further events may still be observed.
    async fn close(&mut self);

    /// Next lifecycle/data event, `None` once the socket is finished.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Whether the socket has reported open and not yet closed.
    fn is_open(&self) -> bool;
}

/// Factory producing connected transports. Injected at client construction;
/// defaults to [`WsConnector`].
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a transport to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>>;
}

// ── WebSocket implementation ────────────────────────────────────────────────

/// Default [`Connector`] over tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    /// Connector with the default connection timeout.
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_ws_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| LiveLinkError::ConfigurationError(format!("invalid ws_url '{}': {}", raw, e)))?;

    match url.scheme() {
        "ws" | "wss" => {},
        other => {
            return Err(LiveLinkError::ConfigurationError(format!(
                "ws_url must use ws:// or wss:// (found '{}')",
                other
            )));
        },
    }
    if url.host_str().is_none() {
        return Err(LiveLinkError::ConfigurationError(
            "ws_url must include a host".to_string(),
        ));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(LiveLinkError::ConfigurationError(
            "ws_url must not include username/password credentials".to_string(),
        ));
    }

    Ok(url)
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        let url = validate_ws_url(url)?;
        let request = url
            .as_str()
            .into_client_request()
            .map_err(|e| LiveLinkError::TransportError(format!("failed to build request: {}", e)))?;

        log::debug!("[live-link] connecting to {}", url);
        let connect_result =
            tokio::time::timeout(self.connect_timeout, connect_async(request)).await;

        let stream = match connect_result {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                return Err(LiveLinkError::TransportError(format!(
                    "connection failed: {}",
                    e
                )));
            },
            Err(_) => {
                return Err(LiveLinkError::TransportError(format!(
                    "connection timeout ({:?})",
                    self.connect_timeout
                )));
            },
        };

        log::debug!("[live-link] websocket established");
        Ok(Box::new(WsTransport {
            stream,
            open: true,
            pending_open: true,
        }))
    }
}

/// [`Transport`] over an established tokio-tungstenite stream.
///
/// `connect_async` completes the handshake, so the first event yielded is a
/// synthetic [`TransportEvent::Open`]; the service's queue-flush logic stays
/// uniform across real and injected transports.
pub struct WsTransport {
    stream: WebSocketStream,
    open: bool,
    pending_open: bool,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: &str) -> Result<()> {
        self.stream
            .send(Message::Text(text.to_string().into()))
            .await
            .map_err(|e| LiveLinkError::TransportError(format!("failed to send frame: {}", e)))
    }

    async fn close(&mut self) {
        self.open = false;
        let _ = self.stream.close(None).await;
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        if self.pending_open {
            self.pending_open = false;
            return Some(TransportEvent::Open);
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    if text.len() > MAX_TEXT_FRAME_BYTES {
                        log::warn!("[live-link] dropping oversized frame ({} bytes)", text.len());
                        continue;
                    }
                    return Some(TransportEvent::Message(text.to_string()));
                },
                Some(Ok(Message::Ping(payload))) => {
                    let _ = self.stream.send(Message::Pong(payload)).await;
                },
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {},
                Some(Ok(Message::Binary(_))) => {
                    log::warn!("[live-link] ignoring unexpected binary frame");
                },
                Some(Ok(Message::Close(_))) => {
                    self.open = false;
                    return Some(TransportEvent::Closed);
                },
                Some(Err(e)) => {
                    self.open = false;
                    return Some(TransportEvent::Error(e.to_string()));
                },
                None => {
                    self.open = false;
                    return None;
                },
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
