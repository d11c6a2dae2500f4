//! Subscription registry: keyed live-subscription state shared across
//! duplicate requests.
//!
//! One [`SubscriptionEntry`] per subscription key. Duplicate subscribe calls
//! share the entry (and its watch channel) and only bump the reference
//! count, so no duplicate wire subscription is ever issued for the same key.
//! When the count drops to zero a suspend deadline is recorded; the sync
//! service task sleeps until the earliest deadline and demotes entries whose
//! deadline has passed. Entries are only fully removed when the client
//! closes.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{LiveLinkError, Result};
use crate::protocol::QueryOptions;
use crate::state::{LiveData, LiveState};

/// Derive the subscription key for a single-entity subscription.
///
/// String primary keys are embedded verbatim (`"User:123"`), everything else
/// in its JSON rendering.
pub(crate) fn entity_key(model: &str, key: &Value) -> String {
    match key {
        Value::String(s) => format!("{}:{}", model, s),
        other => format!("{}:{}", model, other),
    }
}

/// Derive the subscription key for a collection subscription from the
/// serialized query options; unset fields are omitted by serialization, so
/// equal options always produce equal keys.
pub(crate) fn collection_key(model: &str, options: &QueryOptions) -> Result<String> {
    let serialized = serde_json::to_string(options).map_err(|e| {
        LiveLinkError::SerializationError(format!("failed to serialize query options: {}", e))
    })?;
    Ok(format!("{}:collection:{}", model, serialized))
}

/// What a registry entry subscribes to; kept so a logically fresh subscribe
/// frame can be rebuilt after suspension.
#[derive(Debug, Clone)]
pub(crate) enum EntryKind {
    /// Single entity, by primary-key value.
    Entity { model: String, key: Value },
    /// Filtered, ordered collection.
    Collection { model: String, options: QueryOptions },
}

impl EntryKind {
    /// Model name this entry subscribes to.
    pub fn model(&self) -> &str {
        match self {
            Self::Entity { model, .. } | Self::Collection { model, .. } => model,
        }
    }

    /// Empty payload matching this entry's shape.
    pub fn empty_data(&self) -> LiveData {
        match self {
            Self::Entity { .. } => LiveData::empty_entity(),
            Self::Collection { .. } => LiveData::empty_collection(),
        }
    }
}

/// Internal state for one live subscription.
pub(crate) struct SubscriptionEntry {
    /// Subscription key (registry key, repeated here for logging).
    pub key: String,
    /// What this entry subscribes to.
    pub kind: EntryKind,
    /// Primary-key field name, from the registered model (the server may
    /// override it in its `subscribed` reply).
    pub primary_key: String,
    /// Writer side of the reactive state observed by all handles.
    pub state_tx: watch::Sender<LiveState>,
    /// Outstanding consumer handles.
    pub ref_count: usize,
    /// Armed when `ref_count` hits zero; cleared by a resubscribe.
    pub suspend_at: Option<Instant>,
    /// Last applied sequence number.
    pub last_seq: Option<u64>,
    /// Request id awaiting its `subscribed`/`subscription-error` reply.
    pub pending_request: Option<String>,
    /// Server-assigned id once established; cleared on suspension (a revive
    /// never reuses the old wire subscription).
    pub subscription_id: Option<String>,
}

impl SubscriptionEntry {
    pub fn new(key: String, kind: EntryKind, primary_key: String) -> Self {
        let (state_tx, _) = watch::channel(LiveState::Connecting);
        Self {
            key,
            kind,
            primary_key,
            state_tx,
            ref_count: 1,
            suspend_at: None,
            last_seq: None,
            pending_request: None,
            subscription_id: None,
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> LiveState {
        self.state_tx.borrow().clone()
    }

    /// Publish a new state to every observing handle.
    pub fn set_state(&self, state: LiveState) {
        self.state_tx.send_replace(state);
    }

    /// The retained data from the current state, or the empty payload for
    /// this entry's shape.
    pub fn data_or_empty(&self) -> LiveData {
        self.state()
            .data()
            .cloned()
            .unwrap_or_else(|| self.kind.empty_data())
    }
}

/// Introspection snapshot of one live subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    /// Subscription key.
    pub key: String,
    /// Model name.
    pub model: String,
    /// Outstanding consumer handles.
    pub ref_count: usize,
    /// Current state tag (`connecting`, `cached`, `synced`, `suspended`,
    /// `error`).
    pub state: &'static str,
    /// Last applied sequence number.
    pub last_seq: Option<u64>,
}

/// Keyed storage of live subscriptions plus the correlation indexes for
/// inbound messages. Mutated only by the sync service task.
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    entries: HashMap<String, SubscriptionEntry>,
    /// request id → subscription key, while a reply is outstanding.
    by_request: HashMap<String, String>,
    /// server subscription id → subscription key, while established.
    by_subscription: HashMap<String, String>,
}

impl SubscriptionRegistry {
    pub fn get(&self, key: &str) -> Option<&SubscriptionEntry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut SubscriptionEntry> {
        self.entries.get_mut(key)
    }

    pub fn insert(&mut self, entry: SubscriptionEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    /// Record an outstanding request for reply correlation.
    pub fn track_request(&mut self, request_id: String, key: String) {
        self.by_request.insert(request_id, key);
    }

    /// Resolve (and forget) an outstanding request id.
    pub fn resolve_request(&mut self, request_id: &str) -> Option<String> {
        self.by_request.remove(request_id)
    }

    /// Record the server-assigned subscription id for push-event routing.
    pub fn track_subscription(&mut self, subscription_id: String, key: String) {
        self.by_subscription.insert(subscription_id, key);
    }

    /// Key for an established subscription id.
    pub fn resolve_subscription(&self, subscription_id: &str) -> Option<&String> {
        self.by_subscription.get(subscription_id)
    }

    /// Drop the push-event route for a subscription id (on suspension).
    pub fn untrack_subscription(&mut self, subscription_id: &str) {
        self.by_subscription.remove(subscription_id);
    }

    /// Earliest armed suspend deadline, if any.
    pub fn next_suspend_deadline(&self) -> Option<Instant> {
        self.entries.values().filter_map(|e| e.suspend_at).min()
    }

    /// Keys whose suspend deadline has passed.
    pub fn due_suspends(&self, now: Instant) -> Vec<String> {
        self.entries
            .values()
            .filter(|e| e.suspend_at.is_some_and(|at| at <= now))
            .map(|e| e.key.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubscriptionEntry> {
        self.entries.values()
    }

    /// Introspection snapshot of every entry.
    pub fn snapshot(&self) -> Vec<SubscriptionInfo> {
        self.entries
            .values()
            .map(|entry| SubscriptionInfo {
                key: entry.key.clone(),
                model: entry.kind.model().to_string(),
                ref_count: entry.ref_count,
                state: entry.state().tag(),
                last_seq: entry.last_seq,
            })
            .collect()
    }

    /// Release all entries (client close). Dropping the watch senders wakes
    /// every handle with a closed channel.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_request.clear();
        self.by_subscription.clear();
    }
}
