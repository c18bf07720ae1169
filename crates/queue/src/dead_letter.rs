//! Dead-letter sink types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::queue::MessageId;

/// A message that exhausted its delivery budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub message_id: MessageId,
    pub body: String,
    pub partition_key: String,
    pub deduplication_id: String,
    pub receive_count: u32,
    pub sent_at: DateTime<Utc>,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Queue occupancy snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Deliverable now (ignoring partition blocking).
    pub visible: usize,
    /// Waiting for their send delay to elapse.
    pub delayed: usize,
    pub in_flight: usize,
    pub dead_lettered: usize,
}
