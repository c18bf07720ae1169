//! Source records and the job messages built from them.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::DomainError;
use crate::id::{JobId, Provider};

/// A row as read from the record source: every attribute may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: Option<String>,
    pub provider: Option<String>,
    pub endpoint: Option<String>,
    /// JSON-encoded body.
    pub body: Option<String>,
}

/// A normalized candidate record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: JobId,
    pub provider: Provider,
    pub endpoint: String,
    pub body: JsonValue,
}

impl Record {
    /// Normalize a raw row, filling defaults for missing attributes.
    ///
    /// `index` is the row position in the scan and only feeds the placeholder id
    /// (`rec-{index}`). An unparsable or missing body becomes `{}`.
    pub fn from_raw(raw: RawRecord, index: usize) -> Self {
        let id = raw
            .id
            .and_then(|id| JobId::new(id).ok())
            .unwrap_or_else(|| placeholder_id(index));
        let provider = raw
            .provider
            .and_then(|p| Provider::new(p).ok())
            .unwrap_or_else(Provider::fallback);
        let endpoint = raw
            .endpoint
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| "/".to_string());
        let body = raw
            .body
            .and_then(|b| serde_json::from_str::<JsonValue>(&b).ok())
            .unwrap_or_else(|| JsonValue::Object(Default::default()));

        Self {
            id,
            provider,
            endpoint,
            body,
        }
    }
}

fn placeholder_id(index: usize) -> JobId {
    JobId(format!("rec-{index}"))
}

/// The unit carried by the dispatch queue. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMessage {
    pub id: JobId,
    pub provider: Provider,
    pub endpoint: String,
    pub body: JsonValue,
}

impl From<Record> for JobMessage {
    fn from(record: Record) -> Self {
        Self {
            id: record.id,
            provider: record.provider,
            endpoint: record.endpoint,
            body: record.body,
        }
    }
}

impl JobMessage {
    pub fn to_json(&self) -> Result<String, DomainError> {
        serde_json::to_string(self).map_err(|e| DomainError::malformed(e.to_string()))
    }

    /// Decode a queue body, rejecting empty identifiers.
    pub fn from_json(body: &str) -> Result<Self, DomainError> {
        let message: JobMessage =
            serde_json::from_str(body).map_err(|e| DomainError::malformed(e.to_string()))?;
        if message.id.as_str().trim().is_empty() {
            return Err(DomainError::malformed("empty job id"));
        }
        if message.provider.as_str().trim().is_empty() {
            return Err(DomainError::malformed("empty provider"));
        }
        Ok(message)
    }

    /// Best-effort extraction of the job id from a body that failed to decode.
    pub fn peek_id(body: &str) -> Option<JobId> {
        let value: JsonValue = serde_json::from_str(body).ok()?;
        let id = value.get("id")?.as_str()?;
        JobId::new(id).ok()
    }
}
