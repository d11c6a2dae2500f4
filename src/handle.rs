//! Consumer handles: disposable, reference-counted views of live state.
//!
//! A handle wraps the watch receiver of one subscription entry. Handles for
//! the same subscription key observe the same channel; disposing a handle
//! decrements the entry's reference count exactly once no matter how many
//! times `dispose` is called, and dropping an undisposed handle disposes it.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::state::{LiveData, LiveState};

/// Shared plumbing of entity and collection handles.
#[derive(Debug)]
struct HandleInner {
    key: String,
    state_rx: watch::Receiver<LiveState>,
    release_tx: mpsc::UnboundedSender<String>,
    disposed: AtomicBool,
}

impl HandleInner {
    fn new(
        key: String,
        state_rx: watch::Receiver<LiveState>,
        release_tx: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            key,
            state_rx,
            release_tx,
            disposed: AtomicBool::new(false),
        }
    }

    fn state(&self) -> LiveState {
        self.state_rx.borrow().clone()
    }

    async fn changed(&mut self) -> bool {
        self.state_rx.changed().await.is_ok()
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            // Send failure means the client is already closed; disposal is
            // then a no-op by contract.
            let _ = self.release_tx.send(self.key.clone());
        }
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Handle to a live single-entity subscription.
#[derive(Debug)]
pub struct EntityHandle {
    inner: HandleInner,
}

impl EntityHandle {
    pub(crate) fn new(
        key: String,
        state_rx: watch::Receiver<LiveState>,
        release_tx: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            inner: HandleInner::new(key, state_rx, release_tx),
        }
    }

    /// Subscription key this handle observes.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Current state snapshot.
    pub fn state(&self) -> LiveState {
        self.inner.state()
    }

    /// Wait for the next state change. Returns `false` once the client has
    /// been closed and no further changes can arrive.
    pub async fn changed(&mut self) -> bool {
        self.inner.changed().await
    }

    /// Release this handle's reference. Idempotent: repeated calls (and the
    /// eventual drop) decrement the reference count exactly once.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Whether `other` observes the same live subscription state.
    pub fn shares_state_with(&self, other: &Self) -> bool {
        self.inner.state_rx.same_channel(&other.inner.state_rx)
    }

    /// The entity's current data, whatever state carries it. `None` while
    /// connecting, after removal, or in the error state.
    pub fn value(&self) -> Option<Value> {
        match self.inner.state().data() {
            Some(LiveData::Entity(data)) => data.clone(),
            _ => None,
        }
    }
}

/// Handle to a live collection subscription.
pub struct CollectionHandle {
    inner: HandleInner,
}

impl CollectionHandle {
    pub(crate) fn new(
        key: String,
        state_rx: watch::Receiver<LiveState>,
        release_tx: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            inner: HandleInner::new(key, state_rx, release_tx),
        }
    }

    /// Subscription key this handle observes.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Current state snapshot.
    pub fn state(&self) -> LiveState {
        self.inner.state()
    }

    /// Wait for the next state change. Returns `false` once the client has
    /// been closed and no further changes can arrive.
    pub async fn changed(&mut self) -> bool {
        self.inner.changed().await
    }

    /// Release this handle's reference. Idempotent: repeated calls (and the
    /// eventual drop) decrement the reference count exactly once.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Whether `other` observes the same live subscription state.
    pub fn shares_state_with(&self, other: &Self) -> bool {
        self.inner.state_rx.same_channel(&other.inner.state_rx)
    }

    /// The collection's current items, in reconciliation order. Empty while
    /// connecting or in the error state.
    pub fn items(&self) -> Vec<Value> {
        match self.inner.state().data() {
            Some(LiveData::Collection(items)) => items.clone(),
            _ => Vec::new(),
        }
    }
}
