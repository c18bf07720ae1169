//! Ordered dispatch queue contract.
//!
//! The queue is the only thing standing between the dispatcher and the
//! consumer, and the consumer's correctness depends on what it promises:
//!
//! - **FIFO per partition**: messages sharing a partition key are delivered in
//!   send order; there is no ordering across partitions.
//! - **Single flight per partition**: while a message of a partition is in
//!   flight, no other message of that partition is handed to any receiver.
//! - **Deduplication**: a second send with the same deduplication id inside the
//!   dedup window is collapsed into the first message.
//! - **At-least-once**: a delivered message that is not acknowledged before its
//!   visibility timeout (or that is released) is delivered again.
//! - **Dead-letter sink**: after the configured number of receives without an
//!   acknowledgement, a message is moved aside and never redelivered.
//! - **Bounded delay**: a send may not ask for a delay above the ceiling.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier assigned to a message when it is first accepted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token proving the holder received a specific delivery of a message.
///
/// Every delivery gets a fresh handle; a handle from an earlier delivery
/// cannot acknowledge a later one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptHandle(Uuid);

impl ReceiptHandle {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ReceiptHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message to enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub body: String,
    pub partition_key: String,
    pub deduplication_id: String,
    /// How long the message stays invisible after being accepted.
    pub delay: Duration,
}

impl SendRequest {
    pub fn new(
        body: impl Into<String>,
        partition_key: impl Into<String>,
        deduplication_id: impl Into<String>,
    ) -> Self {
        Self {
            body: body.into(),
            partition_key: partition_key.into(),
            deduplication_id: deduplication_id.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Result of a send.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: MessageId,
    /// `true` when the send was collapsed into an earlier message with the same
    /// deduplication id.
    pub deduplicated: bool,
}

/// One delivery of a message to a receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: MessageId,
    pub receipt: ReceiptHandle,
    pub body: String,
    pub partition_key: String,
    pub deduplication_id: String,
    /// Number of times the message has been delivered, this delivery included.
    pub receive_count: u32,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("requested delay {requested:?} exceeds the queue ceiling {ceiling:?}")]
    DelayOutOfRange {
        requested: Duration,
        ceiling: Duration,
    },
    #[error("invalid send request: {0}")]
    InvalidRequest(String),
    #[error("unknown or stale receipt handle: {0}")]
    UnknownReceipt(ReceiptHandle),
    #[error("message not found in dead-letter sink: {0}")]
    DeadLetterNotFound(MessageId),
    #[error("queue state lock poisoned")]
    Poisoned,
    #[error("queue transport error: {0}")]
    Transport(String),
}

/// FIFO-per-partition, deduplicating message channel.
#[async_trait::async_trait]
pub trait DispatchQueue: Send + Sync {
    /// Enqueue a message. Rejects delays above the ceiling.
    async fn send(&self, request: SendRequest) -> Result<SendReceipt, QueueError>;

    /// Receive up to `max_messages` deliveries. Returns an empty batch when
    /// nothing is deliverable.
    async fn receive(&self, max_messages: usize) -> Result<Vec<Delivery>, QueueError>;

    /// Delete a delivered message (terminal outcome).
    async fn acknowledge(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;

    /// Return a delivered message to the queue for immediate redelivery.
    async fn release(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;

    /// Return a delivered message that was never processed. Like `release`,
    /// but the delivery does not count toward the dead-letter budget.
    async fn defer(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;
}

#[async_trait::async_trait]
impl<Q> DispatchQueue for Arc<Q>
where
    Q: DispatchQueue + ?Sized,
{
    async fn send(&self, request: SendRequest) -> Result<SendReceipt, QueueError> {
        (**self).send(request).await
    }

    async fn receive(&self, max_messages: usize) -> Result<Vec<Delivery>, QueueError> {
        (**self).receive(max_messages).await
    }

    async fn acknowledge(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        (**self).acknowledge(receipt).await
    }

    async fn release(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        (**self).release(receipt).await
    }

    async fn defer(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        (**self).defer(receipt).await
    }
}
