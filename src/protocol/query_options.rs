use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query options for a collection subscription.
///
/// Unset fields are omitted from serialization entirely, both on the wire
/// and in the derived subscription key, so `QueryOptions::default()` and an
/// explicit all-`None` value produce the same key.
///
/// # Example
///
/// ```rust
/// use live_link::QueryOptions;
/// use serde_json::json;
///
/// let options = QueryOptions::new()
///     .with_filter(json!({"channel": "general"}))
///     .with_top(50)
///     .with_order("createdAt desc");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Server-side filter expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,

    /// Maximum number of items to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<u64>,

    /// Number of items to skip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,

    /// Ordering expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
}

impl QueryOptions {
    /// Create empty query options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filter expression.
    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set the maximum number of items.
    pub fn with_top(mut self, top: u64) -> Self {
        self.top = Some(top);
        self
    }

    /// Set the number of items to skip.
    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Set the ordering expression.
    pub fn with_order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }
}
