use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use dayspread_queue::MessageId;

use crate::app::errors::queue_error_to_response;
use crate::app::services::AppServices;

pub async fn stats(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let queue = match services.queue.stats() {
        Ok(stats) => stats,
        Err(err) => return queue_error_to_response(err),
    };
    let worker = services.worker_stats();
    Json(json!({ "queue": queue, "worker": worker })).into_response()
}

pub async fn dead_letters(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.queue.dead_letters() {
        Ok(entries) => Json(entries).into_response(),
        Err(err) => queue_error_to_response(err),
    }
}

pub async fn redrive(
    Extension(services): Extension<Arc<AppServices>>,
    Path(message_id): Path<MessageId>,
) -> axum::response::Response {
    match services.queue.redrive(message_id) {
        Ok(()) => {
            tracing::info!(message_id = %message_id, "dead letter redriven");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => queue_error_to_response(err),
    }
}
