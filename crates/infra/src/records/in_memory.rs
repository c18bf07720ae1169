use std::sync::RwLock;

use dayspread_core::RawRecord;

use super::{RecordSource, SourceError};

/// In-memory record source for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRecordSource {
    records: RwLock<Vec<RawRecord>>,
}

impl InMemoryRecordSource {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn push(&self, record: RawRecord) -> Result<(), SourceError> {
        self.records
            .write()
            .map_err(|_| SourceError::Poisoned)?
            .push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl RecordSource for InMemoryRecordSource {
    async fn scan(&self, limit: usize) -> Result<Vec<RawRecord>, SourceError> {
        let records = self.records.read().map_err(|_| SourceError::Poisoned)?;
        Ok(records.iter().take(limit).cloned().collect())
    }
}
