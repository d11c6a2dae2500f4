//! Public client facade with builder pattern.
//!
//! [`LiveLinkClient`] is a cheap-to-clone handle onto one sync service
//! instance. Each instance owns its own transport, subscription registry,
//! and timers; nothing is ambient or global, so tests and embedders can run
//! several independent clients side by side.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::connection::{ServiceCmd, ServiceConfig, SyncService};
use crate::error::{LiveLinkError, Result};
use crate::event_handlers::EventHandlers;
use crate::handle::{CollectionHandle, EntityHandle};
use crate::model::{ModelRegistry, ModelSchema};
use crate::protocol::QueryOptions;
use crate::registry::{collection_key, entity_key, EntryKind, SubscriptionInfo};
use crate::store::LocalStore;
use crate::transport::{Connector, WsConnector};

/// Delay between the last handle release and the wire unsubscribe, so brief
/// re-subscription (e.g. page navigation) avoids a full resync.
const DEFAULT_SUSPEND_DELAY: Duration = Duration::from_millis(1500);

/// Client for live entity synchronization.
///
/// Use [`LiveLinkClient::builder`] to construct instances.
///
/// # Examples
///
/// ```rust,no_run
/// use live_link::{LiveLinkClient, ModelSchema};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = LiveLinkClient::builder()
///     .ws_url("ws://localhost:3000/sync")
///     .build()?;
///
/// client.register_model(ModelSchema::new("User", "id"))?;
///
/// let mut user = client.subscribe_entity("User", "123").await?;
/// while user.changed().await {
///     println!("user state: {:?}", user.state());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LiveLinkClient {
    cmd_tx: mpsc::UnboundedSender<ServiceCmd>,
    release_tx: mpsc::UnboundedSender<String>,
    models: Arc<RwLock<ModelRegistry>>,
    connected: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl LiveLinkClient {
    /// Create a new builder for configuring the client.
    pub fn builder() -> LiveLinkClientBuilder {
        LiveLinkClientBuilder::new()
    }

    /// Register a model under its declared name.
    ///
    /// Idempotent for the same schema; registering a different schema under
    /// an already-used name fails with
    /// [`LiveLinkError::ModelNameConflict`].
    pub fn register_model(&self, schema: ModelSchema) -> Result<()> {
        self.models
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .register(schema)
    }

    /// Subscribe to live updates for one entity of a registered model.
    ///
    /// Duplicate subscriptions for the same key share one live entry (and
    /// one wire subscription); each returned handle holds its own reference.
    pub async fn subscribe_entity(
        &self,
        model: &str,
        key: impl Into<Value>,
    ) -> Result<EntityHandle> {
        let schema = self.lookup_model(model)?;
        let key_value = key.into();
        let subscription_key = entity_key(&schema.name, &key_value);
        let state_rx = self
            .request_subscription(
                subscription_key.clone(),
                EntryKind::Entity {
                    model: schema.name,
                    key: key_value,
                },
                schema.primary_key,
            )
            .await?;
        Ok(EntityHandle::new(
            subscription_key,
            state_rx,
            self.release_tx.clone(),
        ))
    }

    /// Subscribe to live updates for a filtered, ordered collection of a
    /// registered model.
    pub async fn subscribe_collection(
        &self,
        model: &str,
        options: QueryOptions,
    ) -> Result<CollectionHandle> {
        let schema = self.lookup_model(model)?;
        let subscription_key = collection_key(&schema.name, &options)?;
        let state_rx = self
            .request_subscription(
                subscription_key.clone(),
                EntryKind::Collection {
                    model: schema.name,
                    options,
                },
                schema.primary_key,
            )
            .await?;
        Ok(CollectionHandle::new(
            subscription_key,
            state_rx,
            self.release_tx.clone(),
        ))
    }

    /// Whether the transport has reported open and not yet errored/closed.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Introspection snapshot of all live subscriptions. Empty once closed.
    pub async fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ServiceCmd::Subscriptions { reply: reply_tx })
            .is_err()
        {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    /// Close the transport and release all registry state.
    ///
    /// Safe to call once; repeated calls and handle disposal afterwards are
    /// no-ops.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.cmd_tx.send(ServiceCmd::Close);
        }
    }

    fn lookup_model(&self, model: &str) -> Result<ModelSchema> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LiveLinkError::Closed);
        }
        self.models
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(model)
            .cloned()
            .ok_or_else(|| {
                LiveLinkError::ConfigurationError(format!("model '{}' is not registered", model))
            })
    }

    async fn request_subscription(
        &self,
        key: String,
        kind: EntryKind,
        primary_key: String,
    ) -> Result<tokio::sync::watch::Receiver<crate::state::LiveState>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(ServiceCmd::Subscribe {
                key,
                kind,
                primary_key,
                reply: reply_tx,
            })
            .map_err(|_| LiveLinkError::Closed)?;
        reply_rx.await.map_err(|_| LiveLinkError::Closed)
    }
}

/// Builder for configuring [`LiveLinkClient`] instances.
pub struct LiveLinkClientBuilder {
    ws_url: Option<String>,
    connector: Option<Arc<dyn Connector>>,
    local_store: Option<Arc<dyn LocalStore>>,
    suspend_delay: Duration,
    event_handlers: EventHandlers,
}

impl LiveLinkClientBuilder {
    fn new() -> Self {
        Self {
            ws_url: None,
            connector: None,
            local_store: None,
            suspend_delay: DEFAULT_SUSPEND_DELAY,
            event_handlers: EventHandlers::default(),
        }
    }

    /// Set the WebSocket URL of the sync server (`ws://` or `wss://`).
    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    /// Inject a custom transport factory. Defaults to [`WsConnector`].
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Inject a local cache store for stale-while-revalidate hydration.
    /// Optional; the store is treated as unreliable and never blocks the
    /// live path.
    pub fn local_store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.local_store = Some(store);
        self
    }

    /// Override the auto-suspend delay (default 1500 ms).
    pub fn suspend_delay(mut self, delay: Duration) -> Self {
        self.suspend_delay = delay;
        self
    }

    /// Register connection lifecycle callbacks.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Build the client and spawn its sync service task.
    ///
    /// Must be called within a tokio runtime.
    pub fn build(self) -> Result<LiveLinkClient> {
        let ws_url = self
            .ws_url
            .ok_or_else(|| LiveLinkError::ConfigurationError("ws_url is required".into()))?;
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WsConnector::new()));

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (release_tx, release_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));

        let service = SyncService::new(
            ServiceConfig {
                ws_url,
                connector,
                store: self.local_store,
                suspend_delay: self.suspend_delay,
                handlers: self.event_handlers,
                connected: connected.clone(),
            },
            cmd_tx.clone(),
        );
        let _ = tokio::spawn(service.run(cmd_rx, release_rx));

        Ok(LiveLinkClient {
            cmd_tx,
            release_tx,
            models: Arc::new(RwLock::new(ModelRegistry::default())),
            connected,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}
