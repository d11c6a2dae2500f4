//! Connection lifecycle event hooks.
//!
//! Optional callbacks invoked by the sync service task on transport
//! transitions: open, close, and socket-level errors. Subscription-level
//! outcomes are not reported here; consumers observe those reactively
//! through their handles' [`LiveState`](crate::state::LiveState).
//!
//! # Example
//!
//! ```rust
//! use live_link::EventHandlers;
//!
//! let handlers = EventHandlers::new()
//!     .on_connect(|| println!("sync connection open"))
//!     .on_disconnect(|reason| println!("sync connection lost: {}", reason))
//!     .on_error(|error| eprintln!("sync error: {}", error));
//! ```

use std::fmt;
use std::sync::Arc;

/// Reason passed to the `on_disconnect` hook.
#[derive(Debug, Clone)]
pub struct DisconnectReason {
    /// Human-readable description of why the connection ended.
    pub message: String,
}

impl DisconnectReason {
    /// Create a disconnect reason.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

type OnConnect = Arc<dyn Fn() + Send + Sync>;
type OnDisconnect = Arc<dyn Fn(DisconnectReason) + Send + Sync>;
type OnError = Arc<dyn Fn(&str) + Send + Sync>;

/// Optional lifecycle callbacks, registered via the builder pattern.
///
/// All handlers are `Send + Sync` and invoked from the sync service task;
/// keep them fast and non-blocking.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_connect: Option<OnConnect>,
    pub(crate) on_disconnect: Option<OnDisconnect>,
    pub(crate) on_error: Option<OnError>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// Create an empty handler set (no callbacks registered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoked when the transport reports open.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Invoked when the transport closes.
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Invoked on socket-level errors (including connection failure).
    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn emit_connect(&self) {
        if let Some(cb) = &self.on_connect {
            cb();
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            cb(reason);
        }
    }

    pub(crate) fn emit_error(&self, error: &str) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }
}
