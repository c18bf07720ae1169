use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use dayspread_infra::jobs::DispatchError;
use dayspread_queue::QueueError;

pub fn dispatch_error_to_response(err: DispatchError) -> Response {
    match &err {
        DispatchError::Source(_) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "source_unavailable", err.to_string())
        }
        DispatchError::Encode(_) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "encode_error", err.to_string())
        }
        DispatchError::Enqueue { .. } => {
            json_error(StatusCode::BAD_GATEWAY, "enqueue_error", err.to_string())
        }
    }
}

pub fn queue_error_to_response(err: QueueError) -> Response {
    match err {
        QueueError::DeadLetterNotFound(id) => json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("no dead letter with id {id}"),
        ),
        other => json_error(StatusCode::INTERNAL_SERVER_ERROR, "queue_error", other.to_string()),
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
