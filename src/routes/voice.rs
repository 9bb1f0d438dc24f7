use axum::{Router, routing::post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::voice::{
    self, GATHER_PATH, HOLD_PATH, INCOMING_PATH, STATUS_PATH, TRANSFER_PATH, TRANSFER_STATUS_PATH,
};
use crate::state::AppState;

/// Create the router for the telephony provider's call-control callbacks
pub fn create_voice_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(INCOMING_PATH, post(voice::incoming_call))
        .route(GATHER_PATH, post(voice::gather_input))
        .route(TRANSFER_PATH, post(voice::transfer_call))
        .route(TRANSFER_STATUS_PATH, post(voice::transfer_status))
        .route(HOLD_PATH, post(voice::hold_loop))
        .route(STATUS_PATH, post(voice::call_status))
        .layer(TraceLayer::new_for_http())
}
