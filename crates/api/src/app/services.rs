//! Service wiring: record source, result store, queue, downstream clients.
//!
//! Postgres backs the record source and result store when `DATABASE_URL` is
//! set; otherwise both fall back to in-memory implementations, which is only
//! useful for local runs.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use sqlx::PgPool;

use dayspread_core::SystemClock;
use dayspread_infra::AppConfig;
use dayspread_infra::downstream::{DownstreamClient, HttpDownstream};
use dayspread_infra::jobs::{JobConsumer, JobDispatcher};
use dayspread_infra::records::{InMemoryRecordSource, PostgresRecordSource, RecordSource};
use dayspread_infra::results::{InMemoryResultStore, PostgresResultStore, ResultStore};
use dayspread_infra::workers::WorkerStats;
use dayspread_queue::InMemoryDispatchQueue;
use dayspread_scheduler::RandomJitter;

pub const SERVICE_A_PATH: &str = "/lambdaA";
pub const SERVICE_B_PATH: &str = "/lambdaB";

/// State shared by the HTTP handlers.
pub struct AppServices {
    pub dispatcher: Arc<JobDispatcher>,
    pub queue: Arc<InMemoryDispatchQueue>,
    worker_stats: Option<Arc<Mutex<WorkerStats>>>,
}

impl AppServices {
    pub fn new(dispatcher: Arc<JobDispatcher>, queue: Arc<InMemoryDispatchQueue>) -> Self {
        Self {
            dispatcher,
            queue,
            worker_stats: None,
        }
    }

    pub fn with_worker_stats(mut self, stats: Arc<Mutex<WorkerStats>>) -> Self {
        self.worker_stats = Some(stats);
        self
    }

    /// Snapshot of the consumer worker's counters, if one is attached.
    pub fn worker_stats(&self) -> Option<WorkerStats> {
        self.worker_stats
            .as_ref()
            .and_then(|stats| stats.lock().ok().map(|s| s.clone()))
    }
}

/// Everything `main` needs: the HTTP services plus the consumer to hand to
/// the worker.
pub struct Wiring {
    pub dispatcher: Arc<JobDispatcher>,
    pub consumer: Arc<JobConsumer>,
    pub queue: Arc<InMemoryDispatchQueue>,
}

impl Wiring {
    pub fn into_services(self) -> AppServices {
        AppServices::new(self.dispatcher, self.queue)
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<Wiring> {
    let (source, results): (Arc<dyn RecordSource>, Arc<dyn ResultStore>) =
        match config.database_url.as_deref() {
            Some(database_url) => {
                let pool = PgPool::connect(database_url)
                    .await
                    .context("failed to connect to Postgres")?;
                tracing::info!(
                    records = %config.records_table,
                    results = %config.results_table,
                    "using Postgres record source and result store"
                );
                (
                    Arc::new(PostgresRecordSource::new(pool.clone(), config.records_table.clone())),
                    Arc::new(PostgresResultStore::new(pool, config.results_table.clone())),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory record source and result store");
                (
                    Arc::new(InMemoryRecordSource::new(Vec::new())),
                    Arc::new(InMemoryResultStore::new()),
                )
            }
        };

    let queue = Arc::new(InMemoryDispatchQueue::new(config.queue_config()));

    let dispatcher = Arc::new(JobDispatcher::new(
        source,
        queue.clone(),
        Arc::new(RandomJitter),
        Arc::new(SystemClock),
        config
            .dispatcher_config()
            .context("invalid delay configuration")?,
    ));

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .context("failed to build HTTP client")?;

    let service_a: Arc<dyn DownstreamClient> = Arc::new(
        HttpDownstream::new("A", http.clone(), config.internal_api_url.clone(), SERVICE_A_PATH)
            .with_api_key(config.api_key.clone()),
    );
    let service_b: Arc<dyn DownstreamClient> = Arc::new(
        HttpDownstream::new("B", http, config.internal_api_url.clone(), SERVICE_B_PATH)
            .with_api_key(config.api_key.clone()),
    );

    let consumer = Arc::new(JobConsumer::new(
        results,
        service_a,
        service_b,
        Arc::new(SystemClock),
        config.consumer_config(),
    ));

    Ok(Wiring {
        dispatcher,
        consumer,
        queue,
    })
}
