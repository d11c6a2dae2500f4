use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::query_options::QueryOptions;

/// Client-to-server request messages.
///
/// `request_id` correlates a subscribe request to its one-time
/// `subscribed`/`subscription-error` reply; it is client-assigned and never
/// reused. Unsubscribes are addressed by the server-assigned subscription id
/// instead and receive no reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientSyncMessage {
    /// Subscribe to live updates for a single entity.
    SubscribeEntity {
        /// Correlates the `subscribed` reply to this request.
        request_id: String,
        /// Registered model name.
        model: String,
        /// Primary-key value of the entity.
        key: Value,
        /// Resume point: the server may reply with a delta of changes after
        /// this sequence instead of a full snapshot.
        #[serde(skip_serializing_if = "Option::is_none")]
        last_seq: Option<u64>,
    },

    /// Subscribe to live updates for a filtered, ordered collection.
    SubscribeCollection {
        /// Correlates the `subscribed` reply to this request.
        request_id: String,
        /// Registered model name.
        model: String,
        /// Query options; unset fields are omitted from the frame.
        #[serde(flatten)]
        options: QueryOptions,
        /// Resume point, as for entity subscriptions.
        #[serde(skip_serializing_if = "Option::is_none")]
        last_seq: Option<u64>,
    },

    /// Tear down an established subscription.
    Unsubscribe {
        /// The server-assigned subscription id to tear down.
        subscription_id: String,
    },
}
