//! `dayspread-queue` — ordered, deduplicating dispatch channel.
//!
//! ## Components
//!
//! - `DispatchQueue`: the contract the dispatcher sends to and the consumer
//!   receives from
//! - `InMemoryDispatchQueue`: FIFO-per-partition implementation with
//!   deduplication, visibility timeout and a dead-letter sink
//! - `DeadLetterEntry` / `QueueStats`: inspection types

pub mod dead_letter;
pub mod in_memory;
pub mod queue;

pub use dead_letter::{DeadLetterEntry, QueueStats};
pub use in_memory::{InMemoryDispatchQueue, QueueConfig};
pub use queue::{
    Delivery, DispatchQueue, MessageId, QueueError, ReceiptHandle, SendReceipt, SendRequest,
};
