//! Record source: where the daily batch of candidate records is read from.
//!
//! The dispatcher performs exactly one bounded scan per run. Rows come back
//! raw (every attribute optional); normalization into `Record` happens in the
//! dispatcher so that placeholder ids follow scan order.

pub mod in_memory;
pub mod postgres;

use dayspread_core::RawRecord;
use thiserror::Error;

pub use in_memory::InMemoryRecordSource;
pub use postgres::PostgresRecordSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("record source unavailable: {0}")]
    Unavailable(String),

    #[error("record source query failed: {0}")]
    Query(String),

    #[error("record source lock poisoned")]
    Poisoned,
}

/// Read-only access to candidate records.
#[async_trait::async_trait]
pub trait RecordSource: Send + Sync {
    /// Return at most `limit` rows. Order is source-defined but stable.
    async fn scan(&self, limit: usize) -> Result<Vec<RawRecord>, SourceError>;
}

#[async_trait::async_trait]
impl<S> RecordSource for std::sync::Arc<S>
where
    S: RecordSource + ?Sized,
{
    async fn scan(&self, limit: usize) -> Result<Vec<RawRecord>, SourceError> {
        (**self).scan(limit).await
    }
}
