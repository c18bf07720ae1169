use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, routing::post};
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use serde_json::{Value, json};

use dayspread_api::app::services::{AppServices, SERVICE_A_PATH, SERVICE_B_PATH};
use dayspread_core::{Clock, FixedClock, RawRecord, ResultKey};
use dayspread_infra::downstream::HttpDownstream;
use dayspread_infra::jobs::{ConsumerConfig, DispatcherConfig, JobConsumer, JobDispatcher};
use dayspread_infra::records::{InMemoryRecordSource, RecordSource, SourceError};
use dayspread_infra::results::{InMemoryResultStore, ResultStore};
use dayspread_infra::workers::{ConsumerWorker, WorkerConfig};
use dayspread_queue::InMemoryDispatchQueue;
use dayspread_scheduler::FixedJitter;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(services: AppServices) -> Self {
        // Same router as prod, bound to an ephemeral port.
        let app = dayspread_api::app::build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2026, 7, 14, 3, 0, 0).unwrap())
}

fn raw(id: &str, provider: &str) -> RawRecord {
    RawRecord {
        id: Some(id.into()),
        provider: Some(provider.into()),
        endpoint: Some("/sync".into()),
        body: Some(json!({"record": id}).to_string()),
    }
}

fn dispatcher(source: Arc<dyn RecordSource>, queue: Arc<InMemoryDispatchQueue>) -> Arc<JobDispatcher> {
    Arc::new(JobDispatcher::new(
        source,
        queue,
        Arc::new(FixedJitter(0)),
        Arc::new(clock()),
        DispatcherConfig::default(),
    ))
}

fn services_with(records: Vec<RawRecord>) -> (AppServices, Arc<InMemoryDispatchQueue>) {
    let queue = Arc::new(InMemoryDispatchQueue::default());
    let source = Arc::new(InMemoryRecordSource::new(records));
    (AppServices::new(dispatcher(source, queue.clone()), queue.clone()), queue)
}

struct UnreachableSource;

#[async_trait::async_trait]
impl RecordSource for UnreachableSource {
    async fn scan(&self, _limit: usize) -> Result<Vec<RawRecord>, SourceError> {
        Err(SourceError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn health_is_public() {
    let (services, _) = services_with(vec![]);
    let server = TestServer::spawn(services).await;

    let res = reqwest::get(format!("{}/health", server.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn trigger_enqueues_one_message_per_record() {
    let (services, queue) = services_with(vec![raw("a", "p1"), raw("b", "p2"), raw("c", "p1")]);
    let server = TestServer::spawn(services).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/dispatch", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"enqueued": 3}));

    let stats = queue.stats().unwrap();
    assert_eq!(stats.visible + stats.delayed, 3);

    let res = client
        .get(format!("{}/queue/stats", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["queue"]["visible"].as_u64().unwrap() + body["queue"]["delayed"].as_u64().unwrap(), 3);
    assert_eq!(body["queue"]["dead_lettered"], 0);
    assert!(body["worker"].is_null());
}

#[tokio::test]
async fn empty_source_reports_zero() {
    let (services, _) = services_with(vec![]);
    let server = TestServer::spawn(services).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{}/dispatch", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"enqueued": 0}));
}

#[tokio::test]
async fn unreachable_source_is_a_503() {
    let queue = Arc::new(InMemoryDispatchQueue::default());
    let services = AppServices::new(dispatcher(Arc::new(UnreachableSource), queue.clone()), queue);
    let server = TestServer::spawn(services).await;

    let res = reqwest::Client::new()
        .post(format!("{}/dispatch", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "source_unavailable");
}

#[tokio::test]
async fn dead_letter_endpoints() {
    let (services, _) = services_with(vec![]);
    let server = TestServer::spawn(services).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(format!("{}/dead-letters", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!([]));

    let res = client
        .post(format!(
            "{}/dead-letters/0190a5b2-7c4e-7d8f-9a1b-2c3d4e5f6a7b/redrive",
            server.base_url
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");

    let res = client
        .post(format!("{}/dead-letters/not-a-uuid/redrive", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn triggered_jobs_are_consumed_and_persisted() {
    let downstream = Router::new()
        .route(
            SERVICE_A_PATH,
            post(|Json(req): Json<Value>| async move {
                Json(json!({"ok": true, "httpStatus": 200, "data": req["body"].clone()}))
            }),
        )
        .route(
            SERVICE_B_PATH,
            post(|Json(req): Json<Value>| async move { Json(json!({"endpoint": req["endpoint"].clone()})) }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let downstream_url = format!("http://{}", listener.local_addr().unwrap());
    let stub = tokio::spawn(async move {
        axum::serve(listener, downstream).await.unwrap();
    });

    let queue = Arc::new(InMemoryDispatchQueue::default());
    let source = Arc::new(InMemoryRecordSource::new(vec![raw("a", "p1"), raw("b", "p2"), raw("c", "p1")]));
    let store = Arc::new(InMemoryResultStore::new());
    let http = reqwest::Client::new();
    let consumer = Arc::new(JobConsumer::new(
        store.clone(),
        Arc::new(HttpDownstream::new("A", http.clone(), Some(downstream_url.clone()), SERVICE_A_PATH)),
        Arc::new(HttpDownstream::new("B", http, Some(downstream_url), SERVICE_B_PATH)),
        Arc::new(clock()),
        ConsumerConfig::default(),
    ));
    let worker = ConsumerWorker::spawn(
        consumer,
        queue.clone(),
        WorkerConfig::default().with_idle_backoff(Duration::from_millis(10)),
    );

    let services = AppServices::new(dispatcher(source, queue.clone()), queue.clone())
        .with_worker_stats(worker.stats_handle());
    let server = TestServer::spawn(services).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/dispatch", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let mut stats = Value::Null;
    for _ in 0..200 {
        stats = client
            .get(format!("{}/queue/stats", server.base_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if stats["worker"]["acknowledged"] == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(stats["worker"]["acknowledged"], 3);
    assert_eq!(stats["worker"]["succeeded"], 3);

    worker.shutdown().await;
    stub.abort();

    assert_eq!(store.len(), 3);
    let result = store
        .get(&ResultKey::new("b".parse().unwrap(), clock().today()))
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(result.http_status, 200);
    assert_eq!(
        result.payload,
        Some(json!({"a": {"record": "b"}, "b": {"endpoint": "/sync"}}))
    );
}
