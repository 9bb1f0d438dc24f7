use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, queue};
use crate::state::AppState;
use std::sync::Arc;

/// Health check and hold-queue API.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::health_check))
        .route("/queue", get(queue::queue_snapshot))
        .route("/queue/dequeue", post(queue::dequeue_caller))
        .layer(TraceLayer::new_for_http())
}
