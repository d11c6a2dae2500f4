//! Local cache store: stale-while-revalidate persistence for subscriptions.
//!
//! The store is treated as unreliable by design: every `get`/`set` failure is
//! caught at the call site and ignored, so a broken store degrades the client
//! to cache-less behavior (no `lastSeq` on subscribe, no stale data shown)
//! without ever blocking or corrupting the live path.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Current time in millis since Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// One persisted subscription snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The subscription key this entry belongs to.
    pub subscription_key: String,
    /// Model name.
    pub model: String,
    /// Last applied sequence number, replayed as `lastSeq` on resubscribe.
    pub last_seq: Option<u64>,
    /// Last known data: the entity object (or `null` after removal), or an
    /// array for collections.
    pub data: Value,
    /// Millis since Unix epoch when this entry was written.
    pub timestamp_ms: u64,
}

/// Async key → entry persistence used for cache hydration.
///
/// Injected at construction and optional. Implementations may be backed by
/// anything keyed and durable; failures are swallowed by the client.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Read the entry for a subscription key, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Write the entry for a subscription key, replacing any prior value.
    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()>;
}

/// In-memory [`LocalStore`] over a plain keyed map.
///
/// The reference implementation: it exists to make the store contract
/// testable without an external dependency, and doubles as a process-local
/// cache for short-lived clients.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Returns `true` when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.entries.lock().unwrap().insert(key.to_string(), entry);
        Ok(())
    }
}
