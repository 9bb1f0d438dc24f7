//! Hold-queue API for representatives.

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::call_control::CallControlError;
use crate::core::transfer::QueueEntry;
use crate::errors::app_error::{AppError, AppResult};
use crate::handlers::voice::TRANSFER_PATH;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct QueueSnapshot {
    pub length: usize,
    pub callers: Vec<QueueEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DequeueRequest {
    /// Number to connect the caller to; the configured default when absent.
    #[serde(default)]
    pub representative: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DequeueResponse {
    pub call_id: String,
    /// Whether the call was redirected right away; otherwise the hold loop
    /// picks the transfer up.
    pub redirected: bool,
}

/// `GET /queue`
pub async fn queue_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let callers = state.transfers.queue().snapshot();
    Json(QueueSnapshot {
        length: callers.len(),
        callers,
    })
}

/// `POST /queue/dequeue`: hands the longest-waiting caller to a representative.
///
/// Streamed hold calls notice the change themselves. Calls held by the
/// markup loop are redirected to the transfer callback when the provider
/// API is configured.
pub async fn dequeue_caller(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DequeueRequest>,
) -> AppResult<Json<DequeueResponse>> {
    let call_id = state
        .transfers
        .dequeue_next(request.representative.as_deref())?
        .ok_or_else(|| AppError::NotFound("No caller is waiting".to_string()))?;

    let mut redirected = false;
    if !state.config.voice_media_stream {
        let url = state.config.callback_url(TRANSFER_PATH);
        match state.bridge.call_control.redirect(&call_id, &url).await {
            Ok(()) => redirected = true,
            Err(CallControlError::NotConfigured) => {}
            Err(err) => warn!(call_id = %call_id, error = %err, "Redirect after dequeue failed"),
        }
    }

    info!(call_id = %call_id, redirected, "Dequeued caller");
    Ok(Json(DequeueResponse {
        call_id,
        redirected,
    }))
}
