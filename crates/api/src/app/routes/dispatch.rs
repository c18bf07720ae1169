use std::sync::Arc;

use axum::{Json, extract::Extension, response::IntoResponse};

use crate::app::errors::dispatch_error_to_response;
use crate::app::services::AppServices;

/// Run one dispatch over the record source.
///
/// Responds `{"enqueued": n}`; a failed run reports the error and leaves
/// already-sent messages in the queue.
pub async fn trigger(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.dispatcher.dispatch().await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "dispatch run failed");
            dispatch_error_to_response(err)
        }
    }
}
