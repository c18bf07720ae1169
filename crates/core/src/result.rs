//! Dispatch results persisted by the consumer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::id::{JobId, format_business_date};

/// Terminal status of one processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchStatus {
    Ok,
    Failed,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Ok => "OK",
            DispatchStatus::Failed => "FAILED",
        }
    }
}

impl core::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store key: one row per job per business day.
///
/// A later attempt on the same day overwrites the earlier row, which is what
/// makes at-least-once delivery look idempotent from the store's side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResultKey {
    pub job_id: JobId,
    pub date: NaiveDate,
}

impl ResultKey {
    pub fn new(job_id: JobId, date: NaiveDate) -> Self {
        Self { job_id, date }
    }

    /// Partition key in single-table form: `RES#{id}#{date}`.
    pub fn partition_key(&self) -> String {
        format!("RES#{}#{}", self.job_id, format_business_date(self.date))
    }

    /// Sort key in single-table form: `RES#{id}`.
    pub fn sort_key(&self) -> String {
        format!("RES#{}", self.job_id)
    }
}

/// Diagnostic detail captured for failed attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl FailureDetail {
    pub fn new(message: impl Into<String>, code: Option<String>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }
}

/// Outcome of one processing attempt, as written to the result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub job_id: JobId,
    pub date: NaiveDate,
    pub status: DispatchStatus,
    pub http_status: u16,
    pub latency_ms: u64,
    /// Consolidated downstream payload (`{a, b}`), `null` for a side that failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureDetail>,
}

impl DispatchResult {
    pub fn ok(job_id: JobId, date: NaiveDate, http_status: u16, latency_ms: u64, payload: JsonValue) -> Self {
        Self {
            job_id,
            date,
            status: DispatchStatus::Ok,
            http_status,
            latency_ms,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failed(
        job_id: JobId,
        date: NaiveDate,
        http_status: u16,
        latency_ms: u64,
        error: FailureDetail,
    ) -> Self {
        Self {
            job_id,
            date,
            status: DispatchStatus::Failed,
            http_status,
            latency_ms,
            payload: None,
            error: Some(error),
        }
    }

    /// Attach partial downstream results to a failed attempt.
    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn key(&self) -> ResultKey {
        ResultKey::new(self.job_id.clone(), self.date)
    }

    pub fn is_ok(&self) -> bool {
        self.status == DispatchStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()
    }

    #[test]
    fn single_table_keys() {
        let key = ResultKey::new(JobId::new("j1").unwrap(), day());
        assert_eq!(key.partition_key(), "RES#j1#2026-05-01");
        assert_eq!(key.sort_key(), "RES#j1");
    }

    #[test]
    fn failed_result_serializes_with_error_detail() {
        let result = DispatchResult::failed(
            JobId::new("j1").unwrap(),
            day(),
            404,
            12,
            FailureDetail::new("HTTP 404", Some("NotFound".into())),
        )
        .with_payload(json!({"a": {"x": 1}, "b": null}));

        let encoded = serde_json::to_value(&result).unwrap();
        assert_eq!(encoded["status"], "FAILED");
        assert_eq!(encoded["httpStatus"], 404);
        assert_eq!(encoded["latencyMs"], 12);
        assert_eq!(encoded["error"]["code"], "NotFound");
        assert_eq!(encoded["payload"]["b"], JsonValue::Null);
    }

    #[test]
    fn ok_result_has_no_error() {
        let result = DispatchResult::ok(JobId::new("j1").unwrap(), day(), 200, 3, json!({"a": 1, "b": 2}));
        assert!(result.is_ok());
        assert!(result.error.is_none());
        assert_eq!(result.key().date, day());
    }
}
