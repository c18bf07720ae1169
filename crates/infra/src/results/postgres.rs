//! Postgres-backed result store.
//!
//! ## Idempotency
//!
//! `(job_id, business_date)` is the primary key and `put` is a single
//! `INSERT ... ON CONFLICT DO UPDATE`, so concurrent or repeated writes for the
//! same job and day leave exactly one row holding the last write.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | `PoolClosed`, `PoolTimedOut`, `Io` | `Unavailable` |
//! | `ColumnDecode`, `Decode` | `Decode` |
//! | anything else | `Write` |

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use tracing::instrument;

use dayspread_core::{DispatchResult, DispatchStatus, FailureDetail, JobId, ResultKey};

use super::{ResultStore, StoreError};
use crate::config::TableName;

#[derive(Debug, Clone)]
pub struct PostgresResultStore {
    pool: Arc<PgPool>,
    table: TableName,
}

impl PostgresResultStore {
    pub fn new(pool: PgPool, table: TableName) -> Self {
        Self {
            pool: Arc::new(pool),
            table,
        }
    }
}

#[derive(Debug)]
struct ResultRow {
    job_id: String,
    business_date: NaiveDate,
    status: String,
    http_status: i32,
    latency_ms: i64,
    payload: Option<JsonValue>,
    error: Option<JsonValue>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ResultRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ResultRow {
            job_id: row.try_get("job_id")?,
            business_date: row.try_get("business_date")?,
            status: row.try_get("status")?,
            http_status: row.try_get("http_status")?,
            latency_ms: row.try_get("latency_ms")?,
            payload: row.try_get("payload")?,
            error: row.try_get("error")?,
        })
    }
}

impl TryFrom<ResultRow> for DispatchResult {
    type Error = StoreError;

    fn try_from(row: ResultRow) -> Result<Self, Self::Error> {
        let job_id = JobId::new(row.job_id).map_err(|e| StoreError::Decode(e.to_string()))?;
        let status = match row.status.as_str() {
            "OK" => DispatchStatus::Ok,
            "FAILED" => DispatchStatus::Failed,
            other => return Err(StoreError::Decode(format!("unknown status {other:?}"))),
        };
        let http_status = u16::try_from(row.http_status)
            .map_err(|_| StoreError::Decode(format!("http status {} out of range", row.http_status)))?;
        let latency_ms = u64::try_from(row.latency_ms)
            .map_err(|_| StoreError::Decode(format!("negative latency {}", row.latency_ms)))?;
        let error = row
            .error
            .map(serde_json::from_value::<FailureDetail>)
            .transpose()
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(DispatchResult {
            job_id,
            date: row.business_date,
            status,
            http_status,
            latency_ms,
            payload: row.payload,
            error,
        })
    }
}

#[async_trait::async_trait]
impl ResultStore for PostgresResultStore {
    #[instrument(
        skip(self, result),
        fields(job_id = %result.job_id, date = %result.date, status = %result.status),
        err
    )]
    async fn put(&self, result: &DispatchResult) -> Result<(), StoreError> {
        let key = result.key();
        let error = result
            .error
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Write(e.to_string()))?;

        let sql = format!(
            r#"
            INSERT INTO {} (
                pk, sk, job_id, business_date, status, http_status, latency_ms, payload, error, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (job_id, business_date) DO UPDATE SET
                status = EXCLUDED.status,
                http_status = EXCLUDED.http_status,
                latency_ms = EXCLUDED.latency_ms,
                payload = EXCLUDED.payload,
                error = EXCLUDED.error,
                updated_at = EXCLUDED.updated_at
            "#,
            self.table
        );

        sqlx::query(&sql)
            .bind(key.partition_key())
            .bind(key.sort_key())
            .bind(result.job_id.as_str())
            .bind(result.date)
            .bind(result.status.as_str())
            .bind(i32::from(result.http_status))
            .bind(i64::try_from(result.latency_ms).unwrap_or(i64::MAX))
            .bind(result.payload.clone())
            .bind(error)
            .execute(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %key.job_id, date = %key.date), err)]
    async fn get(&self, key: &ResultKey) -> Result<Option<DispatchResult>, StoreError> {
        let sql = format!(
            r#"
            SELECT job_id, business_date, status, http_status, latency_ms, payload, error
            FROM {}
            WHERE job_id = $1 AND business_date = $2
            "#,
            self.table
        );

        let row: Option<ResultRow> = sqlx::query_as(&sql)
            .bind(key.job_id.as_str())
            .bind(key.date)
            .fetch_optional(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(DispatchResult::try_from).transpose()
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StoreError::Decode(err.to_string()),
        other => StoreError::Write(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row() -> ResultRow {
        ResultRow {
            job_id: "j1".into(),
            business_date: NaiveDate::from_ymd_opt(2026, 4, 2).unwrap(),
            status: "FAILED".into(),
            http_status: 503,
            latency_ms: 42,
            payload: Some(json!({"a": {"x": 1}, "b": null})),
            error: Some(json!({"message": "HTTP 503", "code": "Unavailable"})),
        }
    }

    #[test]
    fn row_decodes_into_a_result() {
        let result = DispatchResult::try_from(row()).unwrap();
        assert_eq!(result.job_id.as_str(), "j1");
        assert_eq!(result.status, DispatchStatus::Failed);
        assert_eq!(result.http_status, 503);
        assert_eq!(result.latency_ms, 42);
        assert_eq!(result.payload, Some(json!({"a": {"x": 1}, "b": null})));
        let error = result.error.unwrap();
        assert_eq!(error.message, "HTTP 503");
        assert_eq!(error.code.as_deref(), Some("Unavailable"));
    }

    #[test]
    fn unknown_status_is_a_decode_error() {
        let row = ResultRow {
            status: "PENDING".into(),
            ..row()
        };
        assert!(matches!(DispatchResult::try_from(row), Err(StoreError::Decode(_))));
    }

    #[test]
    fn out_of_range_http_status_is_a_decode_error() {
        for http_status in [-1, 70_000] {
            let row = ResultRow { http_status, ..row() };
            assert!(matches!(DispatchResult::try_from(row), Err(StoreError::Decode(_))));
        }
    }

    #[test]
    fn negative_latency_is_a_decode_error() {
        let row = ResultRow {
            latency_ms: -5,
            ..row()
        };
        assert!(matches!(DispatchResult::try_from(row), Err(StoreError::Decode(_))));
    }

    #[test]
    fn empty_job_id_is_a_decode_error() {
        let row = ResultRow {
            job_id: String::new(),
            ..row()
        };
        assert!(matches!(DispatchResult::try_from(row), Err(StoreError::Decode(_))));
    }
}
