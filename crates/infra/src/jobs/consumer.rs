//! Job consumer: fan out to both services, consolidate, persist, classify.
//!
//! ## Per-message flow
//!
//! 1. Decode the job message (malformed bodies are persisted as FAILED 400
//!    and acknowledged)
//! 2. Call services A and B concurrently, each as its own task raced against
//!    the per-call timeout; a timed-out task is detached and its result dropped
//! 3. Consolidate both outcomes and persist the result (always, success or not)
//! 4. Classify the failure, if any, into a `Disposition`
//!
//! ## Batches
//!
//! Messages of a batch are processed one after another. A failing message never
//! stops the rest of the batch, except that once a message of a partition asks
//! for a retry, later messages of the same partition are released unprocessed
//! so they cannot overtake it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info, warn};

use dayspread_core::{
    Clock, CorrelationId, DispatchResult, DispatchStatus, FailureDetail, JobId, JobMessage,
};
use dayspread_queue::{Delivery, DispatchQueue, MessageId, QueueError, ReceiptHandle};

use super::outcome::{CallOutcome, Disposition, FailurePolicy, consolidate};
use crate::downstream::{CallFailure, DownstreamClient, DownstreamRequest};
use crate::results::{ResultStore, StoreError};

/// Status persisted for message bodies that cannot be decoded.
pub const MALFORMED_MESSAGE_STATUS: u16 = 400;
pub const SERIALIZATION_ERROR: &str = "SerializationError";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Budget for each downstream call.
    pub request_timeout: Duration,
    pub retry_configuration_errors: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(5_000),
            retry_configuration_errors: false,
        }
    }
}

impl ConsumerConfig {
    pub fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy {
            retry_configuration_errors: self.retry_configuration_errors,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("failed to persist result for job {job_id}: {source}")]
    Persist {
        job_id: JobId,
        #[source]
        source: StoreError,
    },
}

/// Result of processing one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub status: DispatchStatus,
    pub http_status: u16,
    pub latency_ms: u64,
    pub disposition: Disposition,
}

/// What happened to one message of a batch.
#[derive(Debug)]
pub enum MessageOutcome {
    Processed(JobOutcome),
    /// The result could not be written; the message is left for redelivery.
    PersistFailed(ConsumerError),
    /// Not processed because an earlier message of its partition is being
    /// retried; handed back without spending a delivery.
    Deferred,
}

#[derive(Debug)]
pub struct MessageReport {
    pub message_id: MessageId,
    pub receipt: ReceiptHandle,
    pub partition_key: String,
    pub disposition: Disposition,
    pub outcome: MessageOutcome,
}

/// Counters for one received batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub received: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub acknowledged: usize,
    pub released: usize,
    pub deferred: usize,
    pub persist_failures: usize,
}

pub struct JobConsumer {
    results: Arc<dyn ResultStore>,
    service_a: Arc<dyn DownstreamClient>,
    service_b: Arc<dyn DownstreamClient>,
    clock: Arc<dyn Clock>,
    config: ConsumerConfig,
}

impl JobConsumer {
    pub fn new(
        results: Arc<dyn ResultStore>,
        service_a: Arc<dyn DownstreamClient>,
        service_b: Arc<dyn DownstreamClient>,
        clock: Arc<dyn Clock>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            results,
            service_a,
            service_b,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Process one delivery and persist its result.
    ///
    /// `Err` means only that the result could not be written.
    pub async fn process(&self, delivery: &Delivery) -> Result<JobOutcome, ConsumerError> {
        let date = self.clock.today();

        let message = match JobMessage::from_json(&delivery.body) {
            Ok(message) => message,
            Err(err) => {
                let job_id = JobMessage::peek_id(&delivery.body)
                    .unwrap_or_else(|| JobId::from_message_ref(delivery.message_id));
                warn!(
                    job_id = %job_id,
                    message_id = %delivery.message_id,
                    error = %err,
                    "malformed job message"
                );
                let result = DispatchResult::failed(
                    job_id,
                    date,
                    MALFORMED_MESSAGE_STATUS,
                    0,
                    FailureDetail::new(err.to_string(), Some(SERIALIZATION_ERROR.to_string())),
                );
                self.persist(&result).await?;
                return Ok(JobOutcome {
                    job_id: result.job_id,
                    status: result.status,
                    http_status: result.http_status,
                    latency_ms: 0,
                    disposition: Disposition::Acknowledge,
                });
            }
        };

        let request = DownstreamRequest {
            correlation_id: CorrelationId::for_job(&message.id, date),
            endpoint: message.endpoint.clone(),
            body: message.body.clone(),
        };

        let started = Instant::now();
        let (a, b) = tokio::join!(
            self.invoke(&self.service_a, &request),
            self.invoke(&self.service_b, &request),
        );
        let consolidated = consolidate(&a, &b, started.elapsed());
        let disposition = self.config.failure_policy().disposition(&consolidated);

        let result = match &consolidated.failure {
            None => DispatchResult::ok(
                message.id.clone(),
                date,
                consolidated.http_status,
                consolidated.latency_ms,
                consolidated.payload.clone(),
            ),
            Some(failure) => DispatchResult::failed(
                message.id.clone(),
                date,
                consolidated.http_status,
                consolidated.latency_ms,
                FailureDetail::new(failure.message.clone(), failure.code.clone()),
            )
            .with_payload(consolidated.payload.clone()),
        };

        self.persist(&result).await?;

        if consolidated.ok {
            info!(
                job_id = %message.id,
                provider = %message.provider,
                http_status = consolidated.http_status,
                latency_ms = consolidated.latency_ms,
                "job succeeded"
            );
        } else {
            warn!(
                job_id = %message.id,
                provider = %message.provider,
                http_status = consolidated.http_status,
                latency_ms = consolidated.latency_ms,
                error = ?consolidated.failure,
                disposition = ?disposition,
                "job failed"
            );
        }

        Ok(JobOutcome {
            job_id: message.id,
            status: result.status,
            http_status: result.http_status,
            latency_ms: result.latency_ms,
            disposition,
        })
    }

    /// Process a batch in order, applying the partition rule.
    pub async fn handle_batch(&self, batch: &[Delivery]) -> Vec<MessageReport> {
        let mut retrying: HashSet<&str> = HashSet::new();
        let mut reports = Vec::with_capacity(batch.len());

        for delivery in batch {
            let (disposition, outcome) = if retrying.contains(delivery.partition_key.as_str()) {
                (Disposition::Retry, MessageOutcome::Deferred)
            } else {
                match self.process(delivery).await {
                    Ok(outcome) => (outcome.disposition, MessageOutcome::Processed(outcome)),
                    Err(err) => {
                        error!(
                            message_id = %delivery.message_id,
                            partition_key = %delivery.partition_key,
                            error = %err,
                            "result not persisted, leaving message for redelivery"
                        );
                        (Disposition::Retry, MessageOutcome::PersistFailed(err))
                    }
                }
            };

            if disposition == Disposition::Retry {
                retrying.insert(delivery.partition_key.as_str());
            }

            reports.push(MessageReport {
                message_id: delivery.message_id,
                receipt: delivery.receipt,
                partition_key: delivery.partition_key.clone(),
                disposition,
                outcome,
            });
        }

        reports
    }

    /// Receive one batch, process it and settle every message with the queue.
    pub async fn run_once(
        &self,
        queue: &dyn DispatchQueue,
        batch_size: usize,
    ) -> Result<BatchSummary, QueueError> {
        let batch = queue.receive(batch_size).await?;
        let mut summary = BatchSummary {
            received: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            return Ok(summary);
        }

        for report in self.handle_batch(&batch).await {
            match &report.outcome {
                MessageOutcome::Processed(outcome) if outcome.status == DispatchStatus::Ok => {
                    summary.succeeded += 1
                }
                MessageOutcome::Processed(_) => summary.failed += 1,
                MessageOutcome::PersistFailed(_) => summary.persist_failures += 1,
                MessageOutcome::Deferred => summary.deferred += 1,
            }

            let settled = match (&report.outcome, report.disposition) {
                (MessageOutcome::Deferred, _) => queue.defer(&report.receipt).await,
                (_, Disposition::Acknowledge) => queue.acknowledge(&report.receipt).await,
                (_, Disposition::Retry) => queue.release(&report.receipt).await,
            };
            match settled {
                Ok(()) if report.disposition == Disposition::Acknowledge => summary.acknowledged += 1,
                Ok(()) => summary.released += 1,
                // The visibility timeout lapsed while processing: the message is
                // already back in the queue and will be redelivered.
                Err(QueueError::UnknownReceipt(_)) => warn!(
                    message_id = %report.message_id,
                    disposition = ?report.disposition,
                    "receipt expired before the message was settled"
                ),
                Err(err) => return Err(err),
            }
        }

        Ok(summary)
    }

    async fn persist(&self, result: &DispatchResult) -> Result<(), ConsumerError> {
        self.results
            .put(result)
            .await
            .map_err(|source| ConsumerError::Persist {
                job_id: result.job_id.clone(),
                source,
            })
    }

    async fn invoke(
        &self,
        client: &Arc<dyn DownstreamClient>,
        request: &DownstreamRequest,
    ) -> CallOutcome {
        let client = Arc::clone(client);
        let name = client.name().to_string();
        let request = request.clone();
        let task = tokio::spawn(async move { client.call(&request).await });

        // Dropping the join handle on timeout detaches the task.
        match tokio::time::timeout(self.config.request_timeout, task).await {
            Ok(Ok(Ok(reply))) => CallOutcome::Succeeded(reply),
            Ok(Ok(Err(failure))) => CallOutcome::Failed(failure),
            Ok(Err(join_error)) => {
                error!(service = %name, error = %join_error, "downstream call task failed");
                CallOutcome::Failed(CallFailure::internal(join_error.to_string()))
            }
            Err(_) => {
                warn!(
                    service = %name,
                    timeout_ms = self.config.request_timeout.as_millis() as u64,
                    "downstream call timed out"
                );
                CallOutcome::TimedOut
            }
        }
    }
}
