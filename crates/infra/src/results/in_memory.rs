use std::collections::BTreeMap;
use std::sync::RwLock;

use dayspread_core::{DispatchResult, ResultKey};

use super::{ResultStore, StoreError};

/// In-memory result store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    rows: RwLock<BTreeMap<ResultKey, DispatchResult>>,
    writes: RwLock<u64>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored results, ordered by key.
    pub fn all(&self) -> Vec<DispatchResult> {
        self.rows
            .read()
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful `put` calls, overwrites included.
    pub fn write_count(&self) -> u64 {
        self.writes.read().map(|w| *w).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl ResultStore for InMemoryResultStore {
    async fn put(&self, result: &DispatchResult) -> Result<(), StoreError> {
        self.rows
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .insert(result.key(), result.clone());
        *self.writes.write().map_err(|_| StoreError::Poisoned)? += 1;
        Ok(())
    }

    async fn get(&self, key: &ResultKey) -> Result<Option<DispatchResult>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::Poisoned)?;
        Ok(rows.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use dayspread_core::{FailureDetail, JobId};
    use serde_json::json;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, d).unwrap()
    }

    #[tokio::test]
    async fn second_write_for_same_key_replaces_first() {
        let store = InMemoryResultStore::new();
        let id = JobId::new("j1").unwrap();

        let failed = DispatchResult::failed(id.clone(), day(1), 503, 40, FailureDetail::new("HTTP 503", None));
        let ok = DispatchResult::ok(id.clone(), day(1), 200, 12, json!({"a": 1, "b": 2}));

        store.put(&failed).await.unwrap();
        store.put(&ok).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.write_count(), 2);
        let stored = store.get(&ResultKey::new(id, day(1))).await.unwrap().unwrap();
        assert_eq!(stored, ok);
    }

    #[tokio::test]
    async fn different_days_are_different_rows() {
        let store = InMemoryResultStore::new();
        let id = JobId::new("j1").unwrap();
        store
            .put(&DispatchResult::ok(id.clone(), day(1), 200, 1, json!({})))
            .await
            .unwrap();
        store
            .put(&DispatchResult::ok(id.clone(), day(2), 200, 1, json!({})))
            .await
            .unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.get(&ResultKey::new(id, day(3))).await.unwrap().is_none());
    }
}
