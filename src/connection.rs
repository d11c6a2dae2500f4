//! The entity sync service task.
//!
//! A single background task owns every piece of mutable state: the
//! transport, the subscription registry, the outbound frame queue, and the
//! suspend deadlines. The public client talks to it over a command channel
//! and handles release their references over a separate channel, so no lock
//! is ever held across an await and reconciliation of one inbound frame
//! always runs to completion before the next event is processed.
//!
//! Lifecycle:
//! 1. Establish the transport in the background (subscribes queue meanwhile)
//! 2. Enter the event loop: commands + releases + suspend deadlines + socket
//! 3. On `Close` (or all client handles dropped): best-effort unsubscribes,
//!    close the transport, release all registry state

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::event_handlers::{DisconnectReason, EventHandlers};
use crate::protocol::{
    decode_frame, encode_frame, Change, ClientSyncMessage, ServerSyncMessage, SyncMode,
};
use crate::reconcile;
use crate::registry::{EntryKind, SubscriptionEntry, SubscriptionInfo, SubscriptionRegistry};
use crate::state::{LiveData, LiveState};
use crate::store::{now_ms, CacheEntry, LocalStore};
use crate::transport::{Connector, Transport, TransportEvent};

/// Sleep target when no suspend deadline is armed. ~100 years is far enough
/// into the future to be effectively "never" without overflowing
/// `Instant + Duration`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Commands sent from the public client (and from internal helper tasks) to
/// the service task.
pub(crate) enum ServiceCmd {
    /// Look up or create the subscription for `key` and reply with a watch
    /// receiver on its reactive state.
    Subscribe {
        key: String,
        kind: EntryKind,
        primary_key: String,
        reply: oneshot::Sender<watch::Receiver<LiveState>>,
    },
    /// A cache hydration attempt finished (`None` on miss or store failure).
    Hydrated {
        key: String,
        cached: Option<CacheEntry>,
    },
    /// The background connect attempt finished.
    Connected(crate::error::Result<Box<dyn Transport>>),
    /// Introspection snapshot of all live subscriptions.
    Subscriptions {
        reply: oneshot::Sender<Vec<SubscriptionInfo>>,
    },
    /// Close the transport and release all registry state.
    Close,
}

/// Everything the service task needs at startup.
pub(crate) struct ServiceConfig {
    pub ws_url: String,
    pub connector: Arc<dyn Connector>,
    pub store: Option<Arc<dyn LocalStore>>,
    pub suspend_delay: Duration,
    pub handlers: EventHandlers,
    pub connected: Arc<AtomicBool>,
}

pub(crate) struct SyncService {
    ws_url: String,
    connector: Arc<dyn Connector>,
    store: Option<Arc<dyn LocalStore>>,
    suspend_delay: Duration,
    handlers: EventHandlers,
    /// Shared readiness flag mirrored for the public `is_connected`.
    connected: Arc<AtomicBool>,

    transport: Option<Box<dyn Transport>>,
    /// Whether the transport has reported open and not yet errored/closed.
    open: bool,
    /// Outbound frames buffered until the transport reports open; flushed
    /// FIFO, never dropped.
    outbox: VecDeque<String>,
    registry: SubscriptionRegistry,
    next_request_id: u64,
    /// Clone of the command sender for hydration/connect helper tasks.
    cmd_tx: mpsc::UnboundedSender<ServiceCmd>,
}

impl SyncService {
    pub fn new(config: ServiceConfig, cmd_tx: mpsc::UnboundedSender<ServiceCmd>) -> Self {
        Self {
            ws_url: config.ws_url,
            connector: config.connector,
            store: config.store,
            suspend_delay: config.suspend_delay,
            handlers: config.handlers,
            connected: config.connected,
            transport: None,
            open: false,
            outbox: VecDeque::new(),
            registry: SubscriptionRegistry::default(),
            next_request_id: 1,
            cmd_tx,
        }
    }

    /// Run the service until closed.
    pub async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<ServiceCmd>,
        mut release_rx: mpsc::UnboundedReceiver<String>,
    ) {
        // Connect in the background so subscribe calls are accepted (and
        // their frames queued) while the socket is still being established.
        {
            let connector = self.connector.clone();
            let url = self.ws_url.clone();
            let cmd_tx = self.cmd_tx.clone();
            tokio::spawn(async move {
                let result = connector.connect(&url).await;
                let _ = cmd_tx.send(ServiceCmd::Connected(result));
            });
        }

        let mut releases_open = true;
        loop {
            let suspend_deadline = self.registry.next_suspend_deadline();
            let suspend_sleep = tokio::time::sleep_until(
                suspend_deadline.unwrap_or_else(|| Instant::now() + FAR_FUTURE),
            );
            tokio::pin!(suspend_sleep);

            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(ServiceCmd::Subscribe { key, kind, primary_key, reply }) => {
                            self.handle_subscribe(key, kind, primary_key, reply).await;
                        },
                        Some(ServiceCmd::Hydrated { key, cached }) => {
                            self.handle_hydrated(&key, cached).await;
                        },
                        Some(ServiceCmd::Connected(result)) => {
                            self.handle_connected(result);
                        },
                        Some(ServiceCmd::Subscriptions { reply }) => {
                            let _ = reply.send(self.registry.snapshot());
                        },
                        Some(ServiceCmd::Close) | None => {
                            self.shutdown().await;
                            return;
                        },
                    }
                }

                key = release_rx.recv(), if releases_open => {
                    match key {
                        Some(key) => self.handle_release(&key),
                        None => releases_open = false,
                    }
                }

                _ = &mut suspend_sleep, if suspend_deadline.is_some() => {
                    self.fire_due_suspends().await;
                }

                event = next_transport_event(&mut self.transport), if self.transport.is_some() => {
                    match event {
                        Some(event) => self.handle_transport_event(event).await,
                        None => {
                            self.set_open(false);
                            self.transport = None;
                            self.handlers
                                .emit_disconnect(DisconnectReason::new("transport stream ended"));
                        },
                    }
                }
            }
        }
    }

    // ── Subscribe / release / suspend ───────────────────────────────────────

    async fn handle_subscribe(
        &mut self,
        key: String,
        kind: EntryKind,
        primary_key: String,
        reply: oneshot::Sender<watch::Receiver<LiveState>>,
    ) {
        // Shared entry: bump the count, cancel any pending suspend, and hand
        // out another receiver on the same channel. No new wire message
        // unless this revives a suspended subscription or retries a
        // server-rejected one.
        let mut shared = None;
        if let Some(entry) = self.registry.get_mut(&key) {
            entry.ref_count += 1;
            entry.suspend_at = None;
            let resubscribe = match entry.state() {
                // A revive is a logically fresh subscribe showing the
                // retained data; the old wire subscription id is never
                // reused.
                LiveState::Suspended { .. } => {
                    let data = entry.data_or_empty();
                    entry.set_state(LiveState::Cached { data });
                    true
                },
                // A rejected subscription is recoverable by subscribing
                // again: start over from connecting.
                LiveState::Error { .. } if entry.pending_request.is_none() => {
                    entry.set_state(LiveState::Connecting);
                    true
                },
                _ => false,
            };
            let old_subscription = if resubscribe {
                entry.subscription_id.take()
            } else {
                None
            };
            shared = Some((entry.state_tx.subscribe(), resubscribe, old_subscription));
        }
        if let Some((state_rx, resubscribe, old_subscription)) = shared {
            if let Some(subscription_id) = old_subscription {
                self.registry.untrack_subscription(&subscription_id);
            }
            let _ = reply.send(state_rx);
            if resubscribe {
                log::debug!("[live-link] re-issuing subscribe for '{}'", key);
                self.enqueue_subscribe(&key).await;
            }
            return;
        }

        let entry = SubscriptionEntry::new(key.clone(), kind, primary_key);
        let state_rx = entry.state_tx.subscribe();
        self.registry.insert(entry);
        let _ = reply.send(state_rx);

        match &self.store {
            Some(store) => {
                // Hydrate off-task; the result comes back as a command so the
                // stale-data guard runs here, after any fresher state.
                let store = store.clone();
                let cmd_tx = self.cmd_tx.clone();
                let hydrate_key = key.clone();
                tokio::spawn(async move {
                    let cached = match store.get(&hydrate_key).await {
                        Ok(found) => found,
                        Err(e) => {
                            log::debug!(
                                "[live-link] cache read failed for '{}': {}",
                                hydrate_key,
                                e
                            );
                            None
                        },
                    };
                    let _ = cmd_tx.send(ServiceCmd::Hydrated {
                        key: hydrate_key,
                        cached,
                    });
                });
            },
            None => self.enqueue_subscribe(&key).await,
        }
    }

    async fn handle_hydrated(&mut self, key: &str, cached: Option<CacheEntry>) {
        let Some(entry) = self.registry.get_mut(key) else {
            return;
        };
        if matches!(entry.state(), LiveState::Suspended { .. }) {
            // Suspended before the subscribe was ever sent; the revive path
            // issues a fresh subscribe when a consumer returns.
            return;
        }
        if let Some(found) = cached {
            // Stale-while-revalidate guard: only apply cached data while the
            // entry is still connecting with nothing newer applied.
            if matches!(entry.state(), LiveState::Connecting) && entry.last_seq.is_none() {
                entry.last_seq = found.last_seq;
                let data = data_from_cache(&entry.kind, found.data);
                entry.set_state(LiveState::Cached { data });
            }
        }
        self.enqueue_subscribe(key).await;
    }

    fn handle_release(&mut self, key: &str) {
        let suspend_delay = self.suspend_delay;
        let Some(entry) = self.registry.get_mut(key) else {
            return;
        };
        if entry.ref_count == 0 {
            log::warn!("[live-link] release for '{}' with zero references", key);
            return;
        }
        entry.ref_count -= 1;
        if entry.ref_count == 0 {
            entry.suspend_at = Some(Instant::now() + suspend_delay);
        }
    }

    async fn fire_due_suspends(&mut self) {
        let now = Instant::now();
        for key in self.registry.due_suspends(now) {
            self.suspend_entry(&key).await;
        }
    }

    async fn suspend_entry(&mut self, key: &str) {
        let subscription_id = {
            let Some(entry) = self.registry.get_mut(key) else {
                return;
            };
            entry.suspend_at = None;
            entry.pending_request = None;
            let data = entry.data_or_empty();
            entry.set_state(LiveState::Suspended { data });
            entry.subscription_id.take()
        };
        log::debug!("[live-link] suspending subscription '{}'", key);
        self.persist(key);
        if let Some(subscription_id) = subscription_id {
            self.registry.untrack_subscription(&subscription_id);
            self.enqueue_frame(&ClientSyncMessage::Unsubscribe { subscription_id })
                .await;
        }
    }

    // ── Transport lifecycle ─────────────────────────────────────────────────

    fn handle_connected(&mut self, result: crate::error::Result<Box<dyn Transport>>) {
        match result {
            Ok(transport) => {
                // Queued frames are flushed once the transport reports open.
                self.transport = Some(transport);
            },
            Err(e) => {
                let message = e.to_string();
                log::warn!("[live-link] connection failed: {}", message);
                self.handlers.emit_error(&message);
                self.demote_all(&message);
            },
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => {
                self.set_open(true);
                self.handlers.emit_connect();
                self.flush_outbox().await;
            },
            TransportEvent::Message(text) => match decode_frame(&text) {
                Ok(message) => self.dispatch(message),
                Err(e) => log::warn!("[live-link] failed to parse frame: {}", e),
            },
            TransportEvent::Error(message) => {
                log::warn!("[live-link] transport error: {}", message);
                self.set_open(false);
                self.handlers.emit_error(&message);
                self.demote_all(&message);
            },
            TransportEvent::Closed => {
                self.set_open(false);
                self.transport = None;
                self.handlers
                    .emit_disconnect(DisconnectReason::new("connection closed"));
            },
        }
    }

    /// Socket-level failure: entries with nothing to show become `error`,
    /// entries with data demote to `cached`, never to `error`, since there
    /// is retained data to show.
    fn demote_all(&mut self, reason: &str) {
        for entry in self.registry.iter() {
            match entry.state() {
                LiveState::Connecting => {
                    entry.set_state(LiveState::Error {
                        error: reason.to_string(),
                    });
                },
                LiveState::Synced { data } | LiveState::Cached { data } => {
                    entry.set_state(LiveState::Cached { data });
                },
                LiveState::Suspended { .. } | LiveState::Error { .. } => {},
            }
        }
    }

    // ── Outbound frames ─────────────────────────────────────────────────────

    /// Build and queue the subscribe frame for an entry, tracking the fresh
    /// request id for reply correlation.
    async fn enqueue_subscribe(&mut self, key: &str) {
        let message = {
            let Some(entry) = self.registry.get_mut(key) else {
                return;
            };
            let request_id = self.next_request_id.to_string();
            self.next_request_id += 1;
            let message = match &entry.kind {
                EntryKind::Entity { model, key } => ClientSyncMessage::SubscribeEntity {
                    request_id: request_id.clone(),
                    model: model.clone(),
                    key: key.clone(),
                    last_seq: entry.last_seq,
                },
                EntryKind::Collection { model, options } => {
                    ClientSyncMessage::SubscribeCollection {
                        request_id: request_id.clone(),
                        model: model.clone(),
                        options: options.clone(),
                        last_seq: entry.last_seq,
                    }
                },
            };
            entry.pending_request = Some(request_id.clone());
            message
        };
        if let ClientSyncMessage::SubscribeEntity { request_id, .. }
        | ClientSyncMessage::SubscribeCollection { request_id, .. } = &message
        {
            self.registry
                .track_request(request_id.clone(), key.to_string());
        }
        self.enqueue_frame(&message).await;
    }

    async fn enqueue_frame(&mut self, message: &ClientSyncMessage) {
        match encode_frame(message) {
            Ok(frame) => {
                self.outbox.push_back(frame);
                self.flush_outbox().await;
            },
            Err(e) => log::warn!("[live-link] failed to encode frame: {}", e),
        }
    }

    /// Flush queued frames FIFO while the transport is open. A frame that
    /// fails to send is put back at the front and the failure is treated as
    /// a socket error.
    async fn flush_outbox(&mut self) {
        while self.open {
            let Some(frame) = self.outbox.pop_front() else {
                return;
            };
            let Some(transport) = self.transport.as_mut() else {
                self.outbox.push_front(frame);
                return;
            };
            if let Err(e) = transport.send(&frame).await {
                let message = e.to_string();
                log::warn!("[live-link] send failed: {}", message);
                self.outbox.push_front(frame);
                self.set_open(false);
                self.handlers.emit_error(&message);
                self.demote_all(&message);
                return;
            }
        }
    }

    // ── Inbound dispatch ────────────────────────────────────────────────────

    fn dispatch(&mut self, message: ServerSyncMessage) {
        match message {
            ServerSyncMessage::Subscribed {
                request_id,
                subscription_id,
                mode,
                data,
                changes,
                primary_key,
                version,
                ..
            } => {
                let Some(key) = self.registry.resolve_request(&request_id) else {
                    log::debug!("[live-link] subscribed for unknown request '{}'", request_id);
                    return;
                };
                {
                    let Some(entry) = self.registry.get_mut(&key) else {
                        return;
                    };
                    // Only the latest outstanding request may install data; a
                    // reply to a request superseded by a suspend/revive cycle
                    // is stale.
                    if entry.pending_request.as_deref() != Some(request_id.as_str()) {
                        log::debug!(
                            "[live-link] ignoring stale subscribed reply for '{}' (request '{}')",
                            key,
                            request_id
                        );
                        return;
                    }
                    entry.pending_request = None;
                    entry.subscription_id = Some(subscription_id.clone());
                    if let Some(primary_key) = primary_key {
                        entry.primary_key = primary_key;
                    }

                    let mut live = entry.data_or_empty();
                    match mode {
                        SyncMode::Snapshot => {
                            live = data_from_snapshot(&entry.kind, data);
                        },
                        SyncMode::Delta => {
                            let changes = changes.unwrap_or_default();
                            let mut running = entry.last_seq;
                            reconcile::apply_delta(
                                &mut live,
                                &entry.primary_key,
                                &changes,
                                &mut running,
                            );
                            entry.last_seq = running;
                        },
                    }
                    // The outer version is authoritative once the payload is
                    // applied.
                    entry.last_seq = Some(version.seq);
                    entry.set_state(LiveState::Synced { data: live });
                }
                self.registry
                    .track_subscription(subscription_id, key.clone());
                self.persist(&key);
            },

            ServerSyncMessage::EntityAdded {
                subscription_id,
                entity,
                version,
            } => {
                self.apply_push(&subscription_id, Change::Added { entity, version });
            },
            ServerSyncMessage::EntityUpdated {
                subscription_id,
                id,
                change,
                version,
            } => {
                self.apply_push(&subscription_id, Change::Updated { id, change, version });
            },
            ServerSyncMessage::EntityRemoved {
                subscription_id,
                id,
                version,
            } => {
                self.apply_push(&subscription_id, Change::Removed { id, version });
            },

            ServerSyncMessage::SubscriptionError { request_id, error } => {
                let Some(key) = self.registry.resolve_request(&request_id) else {
                    log::debug!(
                        "[live-link] subscription-error for unknown request '{}'",
                        request_id
                    );
                    return;
                };
                let Some(entry) = self.registry.get_mut(&key) else {
                    return;
                };
                if entry.pending_request.as_deref() != Some(request_id.as_str()) {
                    log::debug!(
                        "[live-link] ignoring stale subscription-error for '{}' (request '{}')",
                        key,
                        request_id
                    );
                    return;
                }
                log::warn!("[live-link] subscription '{}' rejected: {}", key, error);
                entry.pending_request = None;
                entry.set_state(LiveState::Error { error });
            },
        }
    }

    /// Apply one push event to the live entry established under
    /// `subscription_id`.
    fn apply_push(&mut self, subscription_id: &str, change: Change) {
        let Some(key) = self.registry.resolve_subscription(subscription_id).cloned() else {
            log::debug!("[live-link] no subscription for id '{}'", subscription_id);
            return;
        };
        {
            let Some(entry) = self.registry.get_mut(&key) else {
                return;
            };
            let mut live = entry.data_or_empty();
            reconcile::apply_change(&mut live, &entry.primary_key, &change);
            entry.last_seq = Some(change.version().seq);
            entry.set_state(LiveState::Synced { data: live });
        }
        self.persist(&key);
    }

    // ── Cache persistence ───────────────────────────────────────────────────

    /// Persist an entry's current data fire-and-forget; store failures are
    /// logged and otherwise ignored.
    fn persist(&self, key: &str) {
        let Some(store) = &self.store else {
            return;
        };
        let Some(entry) = self.registry.get(key) else {
            return;
        };
        let data = match entry.data_or_empty() {
            LiveData::Entity(None) => Value::Null,
            LiveData::Entity(Some(value)) => value,
            LiveData::Collection(items) => Value::Array(items),
        };
        let cache_entry = CacheEntry {
            subscription_key: key.to_string(),
            model: entry.kind.model().to_string(),
            last_seq: entry.last_seq,
            data,
            timestamp_ms: now_ms(),
        };
        let store = store.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.set(&key, cache_entry).await {
                log::debug!("[live-link] cache write failed for '{}': {}", key, e);
            }
        });
    }

    // ── Shutdown ────────────────────────────────────────────────────────────

    async fn shutdown(&mut self) {
        if self.open {
            if let Some(transport) = self.transport.as_mut() {
                let subscription_ids: Vec<String> = self
                    .registry
                    .iter()
                    .filter_map(|entry| entry.subscription_id.clone())
                    .collect();
                for subscription_id in subscription_ids {
                    if let Ok(frame) =
                        encode_frame(&ClientSyncMessage::Unsubscribe { subscription_id })
                    {
                        let _ = transport.send(&frame).await;
                    }
                }
            }
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        self.set_open(false);
        // Dropping the watch senders wakes every handle with a closed channel.
        self.registry.clear();
        log::debug!("[live-link] sync service closed");
    }

    fn set_open(&mut self, open: bool) {
        self.open = open;
        self.connected.store(open, Ordering::SeqCst);
    }
}

async fn next_transport_event(
    transport: &mut Option<Box<dyn Transport>>,
) -> Option<TransportEvent> {
    match transport.as_mut() {
        Some(transport) => transport.next_event().await,
        None => std::future::pending().await,
    }
}

/// Interpret a snapshot payload for an entry's shape.
fn data_from_snapshot(kind: &EntryKind, data: Option<Value>) -> LiveData {
    match kind {
        EntryKind::Entity { .. } => match data {
            None | Some(Value::Null) => LiveData::Entity(None),
            Some(value) => LiveData::Entity(Some(value)),
        },
        EntryKind::Collection { .. } => match data {
            Some(Value::Array(items)) => LiveData::Collection(items),
            None => LiveData::empty_collection(),
            Some(other) => {
                log::warn!("[live-link] non-array collection snapshot: {}", other);
                LiveData::empty_collection()
            },
        },
    }
}

/// Interpret a persisted cache payload for an entry's shape.
fn data_from_cache(kind: &EntryKind, data: Value) -> LiveData {
    match kind {
        EntryKind::Entity { .. } => match data {
            Value::Null => LiveData::Entity(None),
            value => LiveData::Entity(Some(value)),
        },
        EntryKind::Collection { .. } => match data {
            Value::Array(items) => LiveData::Collection(items),
            other => {
                log::debug!(
                    "[live-link] discarding malformed cached collection: {}",
                    other
                );
                LiveData::empty_collection()
            },
        },
    }
}
