use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use dayspread_queue::DispatchQueue;

use crate::jobs::{BatchSummary, JobConsumer};

/// Consumer worker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Name for logging
    pub name: String,
    /// Messages requested per receive
    pub batch_size: usize,
    /// Pause after an empty receive or a queue error
    pub idle_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "consumer".to_string(),
            batch_size: 5,
            idle_backoff: Duration::from_millis(250),
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_idle_backoff(mut self, idle_backoff: Duration) -> Self {
        self.idle_backoff = idle_backoff;
        self
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub batches: u64,
    pub received: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub acknowledged: u64,
    pub released: u64,
    pub deferred: u64,
    pub persist_failures: u64,
    pub queue_errors: u64,
    pub started_at: Option<DateTime<Utc>>,
}

impl WorkerStats {
    fn record(&mut self, batch: &BatchSummary) {
        self.batches += 1;
        self.received += batch.received as u64;
        self.succeeded += batch.succeeded as u64;
        self.failed += batch.failed as u64;
        self.acknowledged += batch.acknowledged as u64;
        self.released += batch.released as u64;
        self.deferred += batch.deferred as u64;
        self.persist_failures += batch.persist_failures as u64;
    }
}

/// Handle to control a running worker.
///
/// Dropping the handle also stops the worker, after its current batch.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the in-flight batch to settle.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }

    /// Get current worker statistics.
    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn stats_handle(&self) -> Arc<Mutex<WorkerStats>> {
        self.stats.clone()
    }
}

/// Polls the dispatch queue and feeds batches to a `JobConsumer`.
///
/// - Batches are processed one at a time
/// - Every message is acknowledged or released according to its disposition
/// - Empty receives and queue errors back off for `idle_backoff`
#[derive(Debug)]
pub struct ConsumerWorker;

impl ConsumerWorker {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(
        consumer: Arc<JobConsumer>,
        queue: Arc<dyn DispatchQueue>,
        config: WorkerConfig,
    ) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(WorkerStats {
            started_at: Some(Utc::now()),
            ..Default::default()
        }));

        let join = tokio::spawn(worker_loop(consumer, queue, config, shutdown_rx, stats.clone()));

        WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }
}

async fn worker_loop(
    consumer: Arc<JobConsumer>,
    queue: Arc<dyn DispatchQueue>,
    config: WorkerConfig,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<Mutex<WorkerStats>>,
) {
    info!(worker = %config.name, batch_size = config.batch_size, "consumer worker started");

    loop {
        // `has_changed` errs once the handle (and its sender) is gone.
        if *shutdown.borrow() || shutdown.has_changed().is_err() {
            break;
        }

        let idle = match consumer.run_once(queue.as_ref(), config.batch_size).await {
            Ok(summary) if summary.received == 0 => true,
            Ok(summary) => {
                debug!(worker = %config.name, ?summary, "batch settled");
                if let Ok(mut s) = stats.lock() {
                    s.record(&summary);
                }
                false
            }
            Err(err) => {
                error!(worker = %config.name, error = %err, "queue operation failed");
                if let Ok(mut s) = stats.lock() {
                    s.queue_errors += 1;
                }
                true
            }
        };

        if idle {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(config.idle_backoff) => {}
            }
        }
    }

    info!(worker = %config.name, "consumer worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dayspread_core::{Clock, DispatchResult, FixedClock, ResultKey};
    use dayspread_queue::{InMemoryDispatchQueue, SendRequest};
    use serde_json::json;

    use crate::downstream::{CallFailure, DownstreamClient, DownstreamReply, DownstreamRequest};
    use crate::jobs::ConsumerConfig;
    use crate::results::{InMemoryResultStore, ResultStore};

    struct Echo;

    #[async_trait::async_trait]
    impl DownstreamClient for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn call(&self, request: &DownstreamRequest) -> Result<DownstreamReply, CallFailure> {
            Ok(DownstreamReply {
                http_status: 200,
                data: request.body.clone(),
            })
        }
    }

    /// Echo that takes a second per call.
    struct SlowEcho;

    #[async_trait::async_trait]
    impl DownstreamClient for SlowEcho {
        fn name(&self) -> &str {
            "slow"
        }

        async fn call(&self, request: &DownstreamRequest) -> Result<DownstreamReply, CallFailure> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(DownstreamReply {
                http_status: 200,
                data: request.body.clone(),
            })
        }
    }

    async fn fill(queue: &InMemoryDispatchQueue, n: usize) {
        for i in 0..n {
            let partition = format!("p{i}");
            let body = json!({"id": format!("j{i}"), "provider": partition, "endpoint": "/", "body": {"i": i}});
            queue
                .send(SendRequest::new(body.to_string(), partition, format!("j{i}@2026-04-02")))
                .await
                .unwrap();
        }
    }

    fn consumer_with(store: Arc<InMemoryResultStore>, client: Arc<dyn DownstreamClient>) -> Arc<JobConsumer> {
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 4, 2, 0, 0, 0).unwrap());
        Arc::new(JobConsumer::new(
            store,
            client.clone(),
            client,
            Arc::new(clock),
            ConsumerConfig::default(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_a_busy_worker() {
        let queue = Arc::new(InMemoryDispatchQueue::default());
        fill(&queue, 20).await;

        let store = Arc::new(InMemoryResultStore::new());
        let handle = ConsumerWorker::spawn(
            consumer_with(store.clone(), Arc::new(SlowEcho)),
            queue.clone(),
            WorkerConfig::default().with_batch_size(1),
        );
        let stats = handle.stats_handle();

        while stats.lock().unwrap().batches == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        drop(handle);

        // Long enough to drain all twenty messages if the worker kept going.
        tokio::time::sleep(Duration::from_secs(60)).await;

        let processed = stats.lock().unwrap().batches;
        assert!(processed <= 2, "worker kept running after its handle was dropped: {processed} batches");
        assert!(queue.stats().unwrap().visible >= 18);
        assert_eq!(store.len() as u64, processed);
    }

    #[tokio::test(start_paused = true)]
    async fn worker_drains_the_queue_and_stops_on_shutdown() {
        let queue = Arc::new(InMemoryDispatchQueue::default());
        for i in 0..7 {
            let body = json!({"id": format!("j{i}"), "provider": "p", "endpoint": "/", "body": {"i": i}});
            queue
                .send(SendRequest::new(body.to_string(), "p", format!("j{i}@2026-04-02")))
                .await
                .unwrap();
        }

        let store = Arc::new(InMemoryResultStore::new());
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 4, 2, 0, 0, 0).unwrap());
        let consumer = Arc::new(JobConsumer::new(
            store.clone(),
            Arc::new(Echo),
            Arc::new(Echo),
            Arc::new(clock),
            ConsumerConfig::default(),
        ));

        let handle = ConsumerWorker::spawn(consumer, queue.clone(), WorkerConfig::default().with_batch_size(3));

        for _ in 0..100 {
            if handle.stats().acknowledged == 7 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let stats = handle.stats();
        assert_eq!(stats.acknowledged, 7);
        assert_eq!(stats.succeeded, 7);
        assert!(stats.batches >= 3);
        handle.shutdown().await;

        assert_eq!(store.len(), 7);
        let date = clock.today();
        let result: DispatchResult = store
            .get(&ResultKey::new("j3".parse().unwrap(), date))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.payload, Some(json!({"a": {"i": 3}, "b": {"i": 3}})));
    }
}
