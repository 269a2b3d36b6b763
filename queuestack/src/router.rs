//! HTTP router for queuestack

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use queuestack_queue::{routes, stamp_request_id, QueueService};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Create the main application router
pub fn create_router(service: Arc<QueueService>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/_queuestack/health", get(health_check))
        .merge(routes(service))
        .layer(axum::middleware::from_fn(stamp_request_id))
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status": "running", "services": ["queue"]}"#,
    )
}
