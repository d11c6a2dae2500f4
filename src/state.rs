//! Reactive state observed through consumer handles.
//!
//! Every live subscription owns exactly one [`LiveState`] value inside a
//! `tokio::sync::watch` channel. All handles for the same subscription key
//! observe the same channel; only the sync service task writes to it.

use serde_json::Value;

/// Data payload of a live subscription.
///
/// Entity data is `None` after an `entity-removed` event: the entity exists
/// in the set as empty and the subscription stays active, so a later
/// `entity-added` can repopulate it. Collection order is reconciliation
/// order; the client never re-sorts.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveData {
    /// A single entity, possibly removed.
    Entity(Option<Value>),
    /// An ordered collection of entities.
    Collection(Vec<Value>),
}

impl LiveData {
    /// Empty payload for an entity subscription.
    pub(crate) fn empty_entity() -> Self {
        Self::Entity(None)
    }

    /// Empty payload for a collection subscription.
    pub(crate) fn empty_collection() -> Self {
        Self::Collection(Vec::new())
    }
}

/// State of one live subscription. Exactly one variant is active at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveState {
    /// Subscribed, no data yet, neither from cache nor from the server.
    Connecting,

    /// Hydrated from the local cache store. Stale-while-revalidate: shown
    /// immediately, not yet confirmed by the server. Also the state a
    /// `synced` subscription demotes to on a socket error, and the state a
    /// suspended subscription revives into.
    Cached {
        /// Last known data.
        data: LiveData,
    },

    /// Confirmed current as of the last applied server message.
    Synced {
        /// Live data.
        data: LiveData,
    },

    /// No active subscribers; the wire subscription is torn down but the
    /// last known data is retained for a fast revive.
    Suspended {
        /// Last known data.
        data: LiveData,
    },

    /// Socket-level or subscription-level failure with no retained data to
    /// fall back to. A failure after data was seen demotes to [`Cached`]
    /// instead, never here.
    ///
    /// [`Cached`]: LiveState::Cached
    Error {
        /// Failure description.
        error: String,
    },
}

impl LiveState {
    /// The retained data, if this state carries any.
    pub fn data(&self) -> Option<&LiveData> {
        match self {
            Self::Cached { data } | Self::Synced { data } | Self::Suspended { data } => Some(data),
            Self::Connecting | Self::Error { .. } => None,
        }
    }

    /// Short state name, used for logging and introspection snapshots.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Cached { .. } => "cached",
            Self::Synced { .. } => "synced",
            Self::Suspended { .. } => "suspended",
            Self::Error { .. } => "error",
        }
    }

    /// Returns `true` for the `synced` variant.
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced { .. })
    }

    /// Returns `true` for the `error` variant.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
