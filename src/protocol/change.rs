use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::version::Version;

/// One incremental change record inside a delta batch.
///
/// Batches apply strictly in array order; each record carries its own
/// [`Version`] whose `seq` advances the subscription's running sequence as
/// the batch is folded onto existing data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Change {
    /// A new entity. Replaces the current value for entity subscriptions,
    /// appends for collections.
    Added {
        /// The full entity payload.
        entity: Value,
        /// Version assigned to this change.
        version: Version,
    },

    /// A partial update, shallow-merged onto the matching entity.
    Updated {
        /// Primary-key value identifying the target entity.
        id: Value,
        /// Changed fields only.
        change: Value,
        /// Version assigned to this change.
        version: Version,
    },

    /// An entity removal.
    Removed {
        /// Primary-key value identifying the removed entity.
        id: Value,
        /// Version assigned to this change.
        version: Version,
    },
}

impl Change {
    /// The version stamp carried by this change record.
    pub fn version(&self) -> &Version {
        match self {
            Self::Added { version, .. }
            | Self::Updated { version, .. }
            | Self::Removed { version, .. } => version,
        }
    }
}
