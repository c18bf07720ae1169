//! Result store: one row per job per business day.
//!
//! `put` is an upsert keyed by `(job id, date)`, so a redelivered message
//! that is processed again simply replaces the earlier outcome.

pub mod in_memory;
pub mod postgres;

use dayspread_core::{DispatchResult, ResultKey};
use thiserror::Error;

pub use in_memory::InMemoryResultStore;
pub use postgres::PostgresResultStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("result store unavailable: {0}")]
    Unavailable(String),

    #[error("result store write failed: {0}")]
    Write(String),

    #[error("stored result could not be decoded: {0}")]
    Decode(String),

    #[error("result store lock poisoned")]
    Poisoned,
}

#[async_trait::async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert or replace the result for `result.key()`.
    async fn put(&self, result: &DispatchResult) -> Result<(), StoreError>;

    async fn get(&self, key: &ResultKey) -> Result<Option<DispatchResult>, StoreError>;
}

#[async_trait::async_trait]
impl<S> ResultStore for std::sync::Arc<S>
where
    S: ResultStore + ?Sized,
{
    async fn put(&self, result: &DispatchResult) -> Result<(), StoreError> {
        (**self).put(result).await
    }

    async fn get(&self, key: &ResultKey) -> Result<Option<DispatchResult>, StoreError> {
        (**self).get(key).await
    }
}
