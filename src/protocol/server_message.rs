use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::change::Change;
use super::version::Version;

/// Reply mode of a `subscribed` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Full current-value payload replacing prior state outright.
    Snapshot,
    /// Ordered batch of incremental changes folded onto existing state.
    Delta,
}

/// Server-to-client messages.
///
/// `subscribed` and `subscription-error` are one-time replies correlated by
/// `request_id`; all other messages are push events correlated by the
/// server-assigned `subscription_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerSyncMessage {
    /// Successful reply to a subscribe request.
    Subscribed {
        /// The request this reply answers.
        request_id: String,
        /// Id assigned to the new subscription; all subsequent push events
        /// for it carry this id.
        subscription_id: String,
        /// Model name, echoed back.
        model: String,
        /// Whether `data` (snapshot) or `changes` (delta) carries the payload.
        mode: SyncMode,
        /// Snapshot payload: the entity object, or an array for collections.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        /// Delta payload: changes to fold onto existing (cached) data.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        changes: Option<Vec<Change>>,
        /// Primary-key field name, when the server overrides the registered one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        primary_key: Option<String>,
        /// Authoritative version once the payload is applied.
        version: Version,
    },

    /// A new entity appeared in the subscribed set.
    EntityAdded {
        /// Target subscription.
        subscription_id: String,
        /// The full entity payload.
        entity: Value,
        /// Version assigned to this event.
        version: Version,
    },

    /// Changed fields for an entity in the subscribed set.
    EntityUpdated {
        /// Target subscription.
        subscription_id: String,
        /// Primary-key value of the changed entity.
        id: Value,
        /// Changed fields only.
        change: Value,
        /// Version assigned to this event.
        version: Version,
    },

    /// An entity left the subscribed set.
    EntityRemoved {
        /// Target subscription.
        subscription_id: String,
        /// Primary-key value of the removed entity.
        id: Value,
        /// Version assigned to this event.
        version: Version,
    },

    /// The server rejected a subscribe request.
    SubscriptionError {
        /// The request this reply answers.
        request_id: String,
        /// Human-readable rejection reason.
        error: String,
    },
}

impl ServerSyncMessage {
    /// The subscription id this message targets, for push events.
    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            Self::Subscribed { subscription_id, .. }
            | Self::EntityAdded { subscription_id, .. }
            | Self::EntityUpdated { subscription_id, .. }
            | Self::EntityRemoved { subscription_id, .. } => Some(subscription_id.as_str()),
            Self::SubscriptionError { .. } => None,
        }
    }
}
