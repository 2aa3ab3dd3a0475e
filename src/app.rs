use crate::{ingest, routes, state};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the main Axum router.
///
/// - `/`, `/health` and `/debug/whoami` are read-only.
/// - `/drop` and `/clip/push` gate every request through authorization and confirmation.
/// - Request bodies are capped at `max_upload_bytes`.
pub fn build_router(state: Arc<state::AppState>) -> Router {
    let limit = state.settings.max_upload_bytes;

    let ingest = Router::new()
        .route("/drop", post(ingest::drop_item))
        .route("/clip/push", post(ingest::clip_push))
        .layer(DefaultBodyLimit::max(limit));

    Router::new()
        .route("/", get(routes::banner))
        .route("/health", get(routes::health))
        .route("/debug/whoami", get(routes::whoami))
        .route("/admin/reload-config", post(routes::reload_config))
        .merge(ingest)
        .with_state(state)
}
