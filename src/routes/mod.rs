pub mod api;
pub mod media;
pub mod voice;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// Every route the server exposes, bound to `state`.
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(api::create_api_router())
        .merge(voice::create_voice_router())
        .merge(media::create_media_router())
        .with_state(state)
}
