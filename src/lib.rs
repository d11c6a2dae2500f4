//! # live-link: client-side entity synchronization
//!
//! Maintains a live, locally-cached, eventually-consistent replica of
//! server-held entities and collections over a single persistent WebSocket
//! connection, and exposes them as reactive, reference-counted handles.
//!
//! ## Features
//!
//! - **Live subscriptions**: subscribe to single entities or filtered
//!   collections; snapshots and deltas from the server are reconciled onto
//!   reactive state observed through `tokio::sync::watch`
//! - **Subscription sharing**: identical subscriptions share one live entry
//!   and one wire subscription, tracked by reference count
//! - **Auto-suspend**: after the last handle is released, a delayed
//!   unsubscribe tolerates brief re-subscription without a full resync
//! - **Stale-while-revalidate**: an optional local cache store hydrates
//!   subscriptions instantly with stale data while the server catches up,
//!   and resumes from the last applied sequence number
//! - **Failure containment**: cache failures are swallowed, socket failures
//!   demote state (`synced` → `cached`) instead of raising errors
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use live_link::{LiveLinkClient, ModelSchema, QueryOptions};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = LiveLinkClient::builder()
//!         .ws_url("ws://localhost:3000/sync")
//!         .build()?;
//!
//!     client.register_model(ModelSchema::new("User", "id"))?;
//!     client.register_model(ModelSchema::new("Message", "id"))?;
//!
//!     // A single entity, by primary key.
//!     let mut user = client.subscribe_entity("User", "123").await?;
//!
//!     // A filtered collection.
//!     let messages = client
//!         .subscribe_collection(
//!             "Message",
//!             QueryOptions::new()
//!                 .with_filter(json!({"channel": "general"}))
//!                 .with_top(50),
//!         )
//!         .await?;
//!
//!     while user.changed().await {
//!         println!("user: {:?}", user.state());
//!         println!("messages so far: {}", messages.items().len());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Caching
//!
//! ```rust,no_run
//! use live_link::{LiveLinkClient, MemoryStore};
//! use std::sync::Arc;
//!
//! # fn example() -> live_link::Result<()> {
//! let client = LiveLinkClient::builder()
//!     .ws_url("ws://localhost:3000/sync")
//!     .local_store(Arc::new(MemoryStore::new()))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

pub mod client;
mod connection;
pub mod error;
pub mod event_handlers;
pub mod handle;
pub mod model;
pub mod protocol;
pub mod reconcile;
mod registry;
pub mod state;
pub mod store;
pub mod transport;

// Re-export main types for convenience
pub use client::{LiveLinkClient, LiveLinkClientBuilder};
pub use error::{LiveLinkError, Result};
pub use event_handlers::{DisconnectReason, EventHandlers};
pub use handle::{CollectionHandle, EntityHandle};
pub use model::ModelSchema;
pub use protocol::{
    Change, ClientSyncMessage, QueryOptions, ServerSyncMessage, SyncMode, Version,
};
pub use registry::SubscriptionInfo;
pub use state::{LiveData, LiveState};
pub use store::{CacheEntry, LocalStore, MemoryStore};
pub use transport::{Connector, Transport, TransportEvent, WsConnector};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
