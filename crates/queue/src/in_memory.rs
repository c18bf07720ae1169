//! In-memory dispatch queue for tests/dev and single-process deployments.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::dead_letter::{DeadLetterEntry, QueueStats};
use crate::queue::{
    Delivery, DispatchQueue, MessageId, QueueError, ReceiptHandle, SendReceipt, SendRequest,
};

/// Queue tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Largest delay a send may request.
    pub max_delay: Duration,
    /// How long a delivered message stays hidden before it can be redelivered.
    pub visibility_timeout: Duration,
    /// Deliveries allowed before a message is moved to the dead-letter sink.
    pub max_receive_count: u32,
    /// How long a deduplication id is remembered.
    pub dedup_window: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_secs(900),
            visibility_timeout: Duration::from_secs(120),
            max_receive_count: 5,
            dedup_window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug)]
struct StoredMessage {
    id: MessageId,
    body: String,
    partition_key: String,
    deduplication_id: String,
    sent_at: DateTime<Utc>,
    /// Send delay end, or visibility deadline while in flight.
    visible_at: Instant,
    receive_count: u32,
    in_flight: Option<ReceiptHandle>,
}

impl StoredMessage {
    fn is_available(&self, now: Instant) -> bool {
        self.in_flight.is_none() && self.visible_at <= now
    }

    fn into_dead_letter(self) -> DeadLetterEntry {
        DeadLetterEntry {
            message_id: self.id,
            body: self.body,
            partition_key: self.partition_key,
            deduplication_id: self.deduplication_id,
            receive_count: self.receive_count,
            sent_at: self.sent_at,
            dead_lettered_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    /// Send order across all partitions.
    messages: VecDeque<StoredMessage>,
    /// deduplication id -> (message id, forget at)
    dedup: HashMap<String, (MessageId, Instant)>,
    dead_letters: Vec<DeadLetterEntry>,
}

impl QueueState {
    fn expire_dedup(&mut self, now: Instant) {
        self.dedup.retain(|_, (_, until)| *until > now);
    }

    /// Bring expired in-flight messages back and dead-letter exhausted ones.
    fn reclaim(&mut self, now: Instant, max_receive_count: u32) {
        for message in self.messages.iter_mut() {
            if message.in_flight.is_some() && message.visible_at <= now {
                debug!(message_id = %message.id, "visibility timeout expired");
                message.in_flight = None;
            }
        }

        let mut kept = VecDeque::with_capacity(self.messages.len());
        for message in self.messages.drain(..) {
            if message.is_available(now) && message.receive_count >= max_receive_count {
                warn!(
                    message_id = %message.id,
                    partition_key = %message.partition_key,
                    receive_count = message.receive_count,
                    "message moved to dead-letter sink"
                );
                self.dead_letters.push(message.into_dead_letter());
            } else {
                kept.push_back(message);
            }
        }
        self.messages = kept;
    }
}

/// In-memory FIFO-per-partition queue with deduplication, visibility timeout
/// and a dead-letter sink.
///
/// - Time is measured with `tokio::time::Instant` (pausable in tests)
/// - A partition is blocked while its oldest message is in flight or delayed
/// - One batch may carry several consecutive messages of the same partition
/// - `defer` hands a delivery back without spending its receive budget
#[derive(Debug)]
pub struct InMemoryDispatchQueue {
    config: QueueConfig,
    state: Mutex<QueueState>,
}

impl InMemoryDispatchQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>, QueueError> {
        self.state.lock().map_err(|_| QueueError::Poisoned)
    }

    /// Messages currently in the dead-letter sink, oldest first.
    pub fn dead_letters(&self) -> Result<Vec<DeadLetterEntry>, QueueError> {
        let mut state = self.lock()?;
        state.reclaim(Instant::now(), self.config.max_receive_count);
        Ok(state.dead_letters.clone())
    }

    /// Move a dead letter back to the tail of the queue with a fresh delivery budget.
    pub fn redrive(&self, message_id: MessageId) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        let position = state
            .dead_letters
            .iter()
            .position(|e| e.message_id == message_id)
            .ok_or(QueueError::DeadLetterNotFound(message_id))?;
        let entry = state.dead_letters.remove(position);

        state.messages.push_back(StoredMessage {
            id: entry.message_id,
            body: entry.body,
            partition_key: entry.partition_key,
            deduplication_id: entry.deduplication_id,
            sent_at: entry.sent_at,
            visible_at: Instant::now(),
            receive_count: 0,
            in_flight: None,
        });
        debug!(message_id = %message_id, "dead letter redriven");
        Ok(())
    }

    pub fn stats(&self) -> Result<QueueStats, QueueError> {
        let now = Instant::now();
        let mut state = self.lock()?;
        state.reclaim(now, self.config.max_receive_count);

        let mut stats = QueueStats {
            dead_lettered: state.dead_letters.len(),
            ..Default::default()
        };
        for message in &state.messages {
            if message.in_flight.is_some() {
                stats.in_flight += 1;
            } else if message.visible_at > now {
                stats.delayed += 1;
            } else {
                stats.visible += 1;
            }
        }
        Ok(stats)
    }
}

impl Default for InMemoryDispatchQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

#[async_trait::async_trait]
impl DispatchQueue for InMemoryDispatchQueue {
    async fn send(&self, request: SendRequest) -> Result<SendReceipt, QueueError> {
        if request.delay > self.config.max_delay {
            return Err(QueueError::DelayOutOfRange {
                requested: request.delay,
                ceiling: self.config.max_delay,
            });
        }
        if request.partition_key.is_empty() {
            return Err(QueueError::InvalidRequest("empty partition key".to_string()));
        }
        if request.deduplication_id.is_empty() {
            return Err(QueueError::InvalidRequest("empty deduplication id".to_string()));
        }

        let now = Instant::now();
        let mut state = self.lock()?;
        state.expire_dedup(now);

        if let Some((existing, _)) = state.dedup.get(&request.deduplication_id) {
            debug!(
                deduplication_id = %request.deduplication_id,
                message_id = %existing,
                "duplicate send collapsed"
            );
            return Ok(SendReceipt {
                message_id: *existing,
                deduplicated: true,
            });
        }

        let id = MessageId::new();
        state.dedup.insert(
            request.deduplication_id.clone(),
            (id, now + self.config.dedup_window),
        );
        state.messages.push_back(StoredMessage {
            id,
            body: request.body,
            partition_key: request.partition_key,
            deduplication_id: request.deduplication_id,
            sent_at: Utc::now(),
            visible_at: now + request.delay,
            receive_count: 0,
            in_flight: None,
        });

        Ok(SendReceipt {
            message_id: id,
            deduplicated: false,
        })
    }

    async fn receive(&self, max_messages: usize) -> Result<Vec<Delivery>, QueueError> {
        let now = Instant::now();
        let mut state = self.lock()?;
        state.reclaim(now, self.config.max_receive_count);

        let mut blocked: HashSet<String> = HashSet::new();
        let mut batch = Vec::new();

        for message in state.messages.iter_mut() {
            if batch.len() >= max_messages {
                break;
            }
            if blocked.contains(&message.partition_key) {
                continue;
            }
            if !message.is_available(now) {
                // Head of this partition is delayed or in flight: later messages wait.
                blocked.insert(message.partition_key.clone());
                continue;
            }

            let receipt = ReceiptHandle::new();
            message.receive_count += 1;
            message.in_flight = Some(receipt);
            message.visible_at = now + self.config.visibility_timeout;

            batch.push(Delivery {
                message_id: message.id,
                receipt,
                body: message.body.clone(),
                partition_key: message.partition_key.clone(),
                deduplication_id: message.deduplication_id.clone(),
                receive_count: message.receive_count,
                sent_at: message.sent_at,
            });
        }

        Ok(batch)
    }

    async fn acknowledge(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        let position = state
            .messages
            .iter()
            .position(|m| m.in_flight.as_ref() == Some(receipt))
            .ok_or(QueueError::UnknownReceipt(*receipt))?;
        state.messages.remove(position);
        Ok(())
    }

    async fn release(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let now = Instant::now();
        let mut state = self.lock()?;
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.in_flight.as_ref() == Some(receipt))
            .ok_or(QueueError::UnknownReceipt(*receipt))?;
        message.in_flight = None;
        message.visible_at = now;
        Ok(())
    }

    async fn defer(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let now = Instant::now();
        let mut state = self.lock()?;
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.in_flight.as_ref() == Some(receipt))
            .ok_or(QueueError::UnknownReceipt(*receipt))?;
        message.in_flight = None;
        message.visible_at = now;
        message.receive_count = message.receive_count.saturating_sub(1);
        Ok(())
    }
}
