use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned version stamp attached to snapshots and change events.
///
/// `seq` is monotonically non-decreasing within one subscription. It orders
/// snapshot and delta application, is persisted to the local cache, and is
/// replayed as `lastSeq` on resubscribe so the server may send only the tail
/// of changes instead of a full snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Sequence number, scoped to a single subscription.
    pub seq: u64,
    /// Server wall-clock timestamp. Opaque to the client; may be empty.
    #[serde(default)]
    pub timestamp: String,
}

impl Version {
    /// Create a version with an empty timestamp.
    pub fn new(seq: u64) -> Self {
        Self {
            seq,
            timestamp: String::new(),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.seq)
    }
}
