//! `dayspread-core` — data model shared by the dispatcher and the consumer.
//!
//! This crate contains **pure** types (no IO): identifiers, records, job
//! messages, dispatch results and the clock abstraction.

pub mod clock;
pub mod error;
pub mod id;
pub mod record;
pub mod result;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::DomainError;
pub use id::{CorrelationId, DeduplicationKey, JobId, Provider, format_business_date};
pub use record::{JobMessage, RawRecord, Record};
pub use result::{DispatchResult, DispatchStatus, FailureDetail, ResultKey};
