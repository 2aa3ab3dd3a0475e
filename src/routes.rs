use crate::{error::ApiError, state::AppState};
use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tracing::error;

pub async fn banner() -> &'static str {
    "Hello from Spacedrop!\n"
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let policy = state.policies.snapshot();
    let settings = &state.settings;
    let valid_modes: Vec<_> = state.policies.valid_modes().iter().collect();

    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "mode": policy.mode,
            "personal_user_id": policy.personal_user_id,
            "contacts_user_ids": policy.contacts_user_ids,
            "valid_modes": valid_modes,
            "downloads_dir": settings.downloads_dir,
            "config_path": state.policies.paths().config_path,
            "app_title": settings.app_title,
            "require_confirm_on_foreign": settings.confirm.require_confirm_on_foreign,
            "confirm_on_self": settings.confirm.confirm_on_self,
            "approval_timeout": settings.confirm.approval_timeout_secs,
        })),
    )
}

pub async fn whoami(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    let ip = peer.ip().to_canonical();
    let user_id = state.resolver.resolve(ip).await;
    (
        StatusCode::OK,
        Json(json!({ "src_ip": ip.to_string(), "user_id": user_id })),
    )
}

pub async fn reload_config(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let policies = state.policies.clone();
    let rec = tokio::task::spawn_blocking(move || policies.reload())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| {
            error!(error = %format!("{e:#}"), "policy reload failed; keeping previous policy");
            ApiError::Reload(format!("{e:#}"))
        })?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "mode": rec.mode,
            "personal_user_id": rec.personal_user_id,
            "contacts_user_ids": rec.contacts_user_ids,
        })),
    ))
}
