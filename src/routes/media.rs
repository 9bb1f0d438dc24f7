use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::media;
use crate::state::AppState;
use std::sync::Arc;

/// Create the media-stream WebSocket router
///
/// The provider opens `/media` after the incoming-call markup connects the
/// call to a stream; one connection carries one call.
pub fn create_media_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/media", get(media::media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
