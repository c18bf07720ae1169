//! Dispatch and consumption of daily jobs.
//!
//! ## Components
//!
//! - `JobDispatcher`: scans the record source and enqueues one delayed message
//!   per record
//! - `JobConsumer`: processes delivered messages against the two downstream
//!   services and persists one result per job per day
//! - `outcome`: consolidation of the two calls and retry classification

pub mod consumer;
pub mod dispatcher;
pub mod outcome;

pub use consumer::{
    BatchSummary, ConsumerConfig, ConsumerError, JobConsumer, JobOutcome, MessageOutcome,
    MessageReport,
};
pub use dispatcher::{DispatchError, DispatchSummary, DispatcherConfig, JobDispatcher};
pub use outcome::{
    CallOutcome, Consolidated, Disposition, FailurePolicy, RETRYABLE_CODES, consolidate,
    is_retryable,
};
