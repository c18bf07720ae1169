//! Job dispatcher: one scan, one delay plan, one send per record.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use dayspread_core::{Clock, DeduplicationKey, DomainError, JobId, JobMessage, Record};
use dayspread_queue::{DispatchQueue, QueueError, SendRequest};
use dayspread_scheduler::{DelayPlan, Jitter};

use crate::records::{RecordSource, SourceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Upper bound on records read per run.
    pub scan_limit: usize,
    pub plan: DelayPlan,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            scan_limit: 1_000,
            plan: DelayPlan::default(),
        }
    }
}

/// Outcome of one dispatch run, returned to the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Number of send calls made (one per scanned record).
    pub enqueued: usize,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("record scan failed: {0}")]
    Source(#[from] SourceError),

    #[error("failed to encode job message: {0}")]
    Encode(#[from] DomainError),

    #[error("failed to enqueue job {job_id}: {source}")]
    Enqueue {
        job_id: JobId,
        #[source]
        source: QueueError,
    },
}

/// Turns the record source into a day's worth of delayed queue messages.
///
/// There are no retries: the first failed send aborts the run. Messages sent
/// before the failure stay enqueued, and re-running the same day is safe
/// because the queue collapses repeated deduplication keys.
pub struct JobDispatcher {
    source: Arc<dyn RecordSource>,
    queue: Arc<dyn DispatchQueue>,
    jitter: Arc<dyn Jitter>,
    clock: Arc<dyn Clock>,
    config: DispatcherConfig,
}

impl JobDispatcher {
    pub fn new(
        source: Arc<dyn RecordSource>,
        queue: Arc<dyn DispatchQueue>,
        jitter: Arc<dyn Jitter>,
        clock: Arc<dyn Clock>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            source,
            queue,
            jitter,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    #[instrument(skip(self), fields(scan_limit = self.config.scan_limit), err)]
    pub async fn dispatch(&self) -> Result<DispatchSummary, DispatchError> {
        let mut rows = self.source.scan(self.config.scan_limit).await?;
        rows.truncate(self.config.scan_limit);

        let date = self.clock.today();
        let delays = self.config.plan.delays(rows.len(), self.jitter.as_ref());

        let mut enqueued = 0usize;
        let mut deduplicated = 0usize;

        for (index, (raw, delay_secs)) in rows.into_iter().zip(delays).enumerate() {
            let record = Record::from_raw(raw, index);
            let dedup_key = DeduplicationKey::for_job(&record.id, date);
            let job_id = record.id.clone();
            let provider = record.provider.clone();
            let message = JobMessage::from(record);

            let request = SendRequest::new(message.to_json()?, provider.as_str(), dedup_key.as_str())
                .with_delay(Duration::from_secs(delay_secs));

            let receipt = self
                .queue
                .send(request)
                .await
                .map_err(|source| DispatchError::Enqueue {
                    job_id: job_id.clone(),
                    source,
                })?;

            enqueued += 1;
            if receipt.deduplicated {
                deduplicated += 1;
            }

            debug!(
                job_id = %job_id,
                provider = %provider,
                delay_secs,
                message_id = %receipt.message_id,
                deduplicated = receipt.deduplicated,
                "job enqueued"
            );
        }

        info!(
            enqueued,
            deduplicated,
            business_date = %date,
            "dispatch run complete"
        );

        Ok(DispatchSummary { enqueued })
    }
}
