//! Wire protocol for the entity sync connection.
//!
//! Defines the closed message vocabulary exchanged over the socket, one
//! tagged union per direction, plus the shared payload types (versions,
//! delta change records, collection query options). Messages are serialized
//! as single-line JSON text frames discriminated by a `type` field; frames
//! are decoded exactly once at the socket boundary.

pub mod change;
pub mod client_message;
pub mod query_options;
pub mod server_message;
pub mod version;

pub use change::Change;
pub use client_message::ClientSyncMessage;
pub use query_options::QueryOptions;
pub use server_message::{ServerSyncMessage, SyncMode};
pub use version::Version;

use crate::error::{LiveLinkError, Result};

/// Encode an outbound message as a single-line text frame.
pub fn encode_frame(message: &ClientSyncMessage) -> Result<String> {
    serde_json::to_string(message)
        .map_err(|e| LiveLinkError::SerializationError(format!("failed to encode frame: {}", e)))
}

/// Decode an inbound text frame into a typed server message.
pub fn decode_frame(text: &str) -> Result<ServerSyncMessage> {
    serde_json::from_str(text).map_err(|e| {
        LiveLinkError::SerializationError(format!("failed to decode frame: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subscribe_entity_frame_shape() {
        let msg = ClientSyncMessage::SubscribeEntity {
            request_id: "1".to_string(),
            model: "User".to_string(),
            key: json!("123"),
            last_seq: None,
        };
        let frame = encode_frame(&msg).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "subscribe-entity");
        assert_eq!(value["requestId"], "1");
        assert_eq!(value["model"], "User");
        assert_eq!(value["key"], "123");
        // Unset lastSeq must be omitted, not null.
        assert!(value.get("lastSeq").is_none());
        assert!(!frame.contains('\n'), "frames must be single-line");
    }

    #[test]
    fn subscribe_collection_frame_omits_unset_options() {
        let msg = ClientSyncMessage::SubscribeCollection {
            request_id: "2".to_string(),
            model: "Message".to_string(),
            options: QueryOptions::new().with_top(10),
            last_seq: Some(42),
        };
        let value: serde_json::Value =
            serde_json::from_str(&encode_frame(&msg).unwrap()).unwrap();
        assert_eq!(value["type"], "subscribe-collection");
        assert_eq!(value["top"], 10);
        assert_eq!(value["lastSeq"], 42);
        assert!(value.get("filter").is_none());
        assert!(value.get("skip").is_none());
        assert!(value.get("order").is_none());
    }

    #[test]
    fn decode_snapshot_subscribed() {
        let text = r#"{"type":"subscribed","requestId":"1","subscriptionId":"s-9",
            "model":"User","mode":"snapshot","data":{"id":"123","name":"John"},
            "version":{"seq":1}}"#
            .replace('\n', "");
        let msg = decode_frame(&text).unwrap();
        match msg {
            ServerSyncMessage::Subscribed {
                request_id,
                subscription_id,
                mode,
                data,
                changes,
                version,
                ..
            } => {
                assert_eq!(request_id, "1");
                assert_eq!(subscription_id, "s-9");
                assert_eq!(mode, SyncMode::Snapshot);
                assert_eq!(data.unwrap()["name"], "John");
                assert!(changes.is_none());
                assert_eq!(version.seq, 1);
            },
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn decode_delta_subscribed_preserves_change_order() {
        let text = r#"{"type":"subscribed","requestId":"3","subscriptionId":"s-1",
            "model":"Message","mode":"delta","changes":[
              {"op":"added","entity":{"id":"m1"},"version":{"seq":5}},
              {"op":"removed","id":"m0","version":{"seq":6}}
            ],"version":{"seq":6}}"#
            .replace('\n', "");
        match decode_frame(&text).unwrap() {
            ServerSyncMessage::Subscribed { mode, changes, .. } => {
                assert_eq!(mode, SyncMode::Delta);
                let changes = changes.unwrap();
                assert_eq!(changes.len(), 2);
                assert!(matches!(changes[0], Change::Added { .. }));
                assert!(matches!(changes[1], Change::Removed { .. }));
            },
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn decode_push_events() {
        let updated = r#"{"type":"entity-updated","subscriptionId":"s-1","id":"123",
            "change":{"name":"Jane"},"version":{"seq":2}}"#
            .replace('\n', "");
        match decode_frame(&updated).unwrap() {
            ServerSyncMessage::EntityUpdated { id, change, version, .. } => {
                assert_eq!(id, json!("123"));
                assert_eq!(change["name"], "Jane");
                assert_eq!(version.seq, 2);
            },
            other => panic!("unexpected message: {:?}", other),
        }

        let err = r#"{"type":"subscription-error","requestId":"4","error":"denied"}"#;
        match decode_frame(err).unwrap() {
            ServerSyncMessage::SubscriptionError { request_id, error } => {
                assert_eq!(request_id, "4");
                assert_eq!(error, "denied");
            },
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn decode_rejects_unknown_type() {
        assert!(decode_frame(r#"{"type":"mystery"}"#).is_err());
    }
}
