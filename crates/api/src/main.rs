use anyhow::Context;

use dayspread_api::app::{self, services};
use dayspread_infra::AppConfig;
use dayspread_infra::workers::ConsumerWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dayspread_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    if config.internal_api_url.is_none() {
        tracing::warn!("INTERNAL_API_URL not set; every job will fail with a configuration error");
    }

    let wiring = services::build_services(&config).await?;
    let worker = ConsumerWorker::spawn(
        wiring.consumer.clone(),
        wiring.queue.clone(),
        config.worker_config(),
    );
    let services = wiring.into_services().with_worker_stats(worker.stats_handle());

    let app = app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!(addr = %listener.local_addr()?, queue = %config.queue_url, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("trigger endpoint stopped, draining consumer");
    worker.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
