//! `dayspread-scheduler`
//!
//! **Responsibility:** turn a day's batch size into per-message delivery delays.
//!
//! The ideal schedule spreads jobs linearly over 24 hours; the dispatch queue
//! only accepts delays up to a ceiling, so each ideal offset is folded into
//! `[0, ceiling]` with a small jitter.

pub mod delay;
pub mod jitter;

pub use delay::{DelayPlan, PlanError, SECONDS_PER_DAY, fold_offset, spread_offsets};
pub use jitter::{FixedJitter, Jitter, RandomJitter};
