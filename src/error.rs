//! Error types for live-link.
//!
//! Only configuration-time failures (model conflicts, unregistered models,
//! bad builder input) are returned to callers as `Err`. Runtime protocol and
//! cache failures surface as [`LiveState`](crate::state::LiveState)
//! transitions on the affected handles instead, so consumers observing live
//! data never need a `try`/`catch` around reads.

use thiserror::Error;

/// Result type for live-link operations.
pub type Result<T> = std::result::Result<T, LiveLinkError>;

/// Errors that can occur in the live-link client.
#[derive(Debug, Error)]
pub enum LiveLinkError {
    /// A different model schema is already registered under this name.
    #[error("model name conflict: '{0}' is already registered with a different schema")]
    ModelNameConflict(String),

    /// Invalid client configuration (builder input, URLs, unregistered models).
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// The server rejected a subscribe request.
    #[error("subscription error: {0}")]
    SubscriptionError(String),

    /// Socket-level failure. Never returned from subscribe calls; live
    /// subscriptions demote to `cached`/`error` state instead.
    #[error("transport error: {0}")]
    TransportError(String),

    /// A local cache store operation failed. Always caught and swallowed at
    /// the call site; carried here only so store implementations have a
    /// uniform error type to return.
    #[error("cache store error: {0}")]
    CacheStoreError(String),

    /// A wire frame could not be encoded or decoded.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The client has been closed.
    #[error("client is closed")]
    Closed,
}
