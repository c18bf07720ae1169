//! HTTP wiring for the trigger surface.
//!
//! - `services.rs`: builds the dispatcher, consumer and queue from `AppConfig`
//! - `routes/`: handlers (trigger, dead letters, stats)
//! - `errors.rs`: consistent JSON error responses

use std::sync::Arc;

use axum::{
    Extension, Router,
    routing::{get, post},
};

pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the router around already-wired services.
pub fn build_app(services: AppServices) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .route("/dispatch", post(routes::dispatch::trigger))
        .route("/queue/stats", get(routes::queue::stats))
        .route("/dead-letters", get(routes::queue::dead_letters))
        .route("/dead-letters/:message_id/redrive", post(routes::queue::redrive))
        .layer(Extension(Arc::new(services)))
}
