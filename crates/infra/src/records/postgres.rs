//! Postgres-backed record source.
//!
//! Reads `id, provider, endpoint, body` from the configured table. All four
//! columns are nullable text; `body` holds a JSON document as a string. See
//! `migrations/0001_dispatch.sql` for the expected shape.

use std::sync::Arc;

use dayspread_core::RawRecord;
use sqlx::{PgPool, Row};
use tracing::instrument;

use super::{RecordSource, SourceError};
use crate::config::TableName;

#[derive(Debug, Clone)]
pub struct PostgresRecordSource {
    pool: Arc<PgPool>,
    table: TableName,
}

impl PostgresRecordSource {
    pub fn new(pool: PgPool, table: TableName) -> Self {
        Self {
            pool: Arc::new(pool),
            table,
        }
    }
}

#[derive(Debug)]
struct RecordRow {
    id: Option<String>,
    provider: Option<String>,
    endpoint: Option<String>,
    body: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for RecordRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(RecordRow {
            id: row.try_get("id")?,
            provider: row.try_get("provider")?,
            endpoint: row.try_get("endpoint")?,
            body: row.try_get("body")?,
        })
    }
}

impl From<RecordRow> for RawRecord {
    fn from(row: RecordRow) -> Self {
        RawRecord {
            id: row.id,
            provider: row.provider,
            endpoint: row.endpoint,
            body: row.body,
        }
    }
}

#[async_trait::async_trait]
impl RecordSource for PostgresRecordSource {
    #[instrument(skip(self), fields(table = %self.table), err)]
    async fn scan(&self, limit: usize) -> Result<Vec<RawRecord>, SourceError> {
        // The table name is a validated identifier; only the limit is bound.
        let sql = format!(
            "SELECT id, provider, endpoint, body FROM {} ORDER BY id NULLS LAST LIMIT $1",
            self.table
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows: Vec<RecordRow> = sqlx::query_as(&sql)
            .bind(limit)
            .fetch_all(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(RawRecord::from).collect())
    }
}

fn map_sqlx_error(err: sqlx::Error) -> SourceError {
    match err {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            SourceError::Unavailable(err.to_string())
        }
        other => SourceError::Query(other.to_string()),
    }
}
