//! `/drop` and `/clip/push`: gate the sender, then act on what they sent.

use crate::{
    classify::{self, ClassifiedAction, FileUpload, InboundPayload},
    error::ApiError,
    gate::{self, Admission},
    state::AppState,
    storage,
};
use axum::{
    extract::{ConnectInfo, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::{net::SocketAddr, path::Path, sync::Arc};
use tracing::{error, info};

/// Multipart fields understood by the ingest endpoints. Unknown fields are drained.
#[derive(Debug, Default)]
pub struct FormParts {
    pub kind: Option<String>,
    pub text: Option<String>,
    pub file: Option<FilePart>,
    pub image: Option<FilePart>,
}

#[derive(Debug)]
pub struct FilePart {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

impl FilePart {
    /// Browsers send an empty nameless part for an untouched file input.
    fn is_blank(&self) -> bool {
        self.filename.as_deref().map_or(true, str::is_empty) && self.bytes.is_empty()
    }
}

impl FormParts {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "kind" => form.kind = Some(field.text().await?),
                "text" => form.text = Some(field.text().await?),
                "file" | "image" => {
                    let filename = field.file_name().map(str::to_string);
                    let bytes = field.bytes().await?.to_vec();
                    let part = Some(FilePart { filename, bytes }).filter(|p| !p.is_blank());
                    if name == "file" {
                        form.file = part;
                    } else {
                        form.image = part;
                    }
                }
                _ => {
                    field.bytes().await?;
                }
            }
        }
        Ok(form)
    }

    pub fn into_payload(self) -> InboundPayload {
        InboundPayload {
            text: self.text,
            file: self.file.map(|f| FileUpload {
                filename: f.filename.unwrap_or_default(),
                bytes: f.bytes,
            }),
        }
    }
}

fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

/// Carry out a classified action through the desktop collaborators.
pub async fn perform(
    state: &AppState,
    admission: &Admission,
    action: ClassifiedAction,
) -> Result<Response, ApiError> {
    match action {
        ClassifiedAction::OpenUrl(url) => {
            if let Err(e) = state.desktop.opener.open(&url).await {
                error!(%url, error = %e, "failed to open url");
                return Err(ApiError::OpenUrl {
                    url,
                    reason: e.to_string(),
                });
            }
            info!(
                %url,
                user_id = ?admission.user_id,
                confirmation = ?admission.outcome,
                "opened url"
            );
            state.desktop.notify_detached("Opening link", host_of(&url));
            Ok((
                StatusCode::OK,
                Json(json!({ "ok": true, "action": "opened_url", "url": url, "opened": true })),
            )
                .into_response())
        }

        ClassifiedAction::SaveFile {
            suggested_name,
            bytes,
        } => {
            let dir = state.settings.downloads_dir.clone();
            let name = suggested_name.clone();
            let saved =
                tokio::task::spawn_blocking(move || storage::save_unique(&dir, &name, &bytes))
                    .await
                    .map_err(|e| ApiError::Internal(e.to_string()))?
                    .map_err(|e| {
                        error!(error = %e, "failed to save upload");
                        ApiError::Save(e.to_string())
                    })?;

            info!(
                path = %saved.path.display(),
                length = saved.length,
                user_id = ?admission.user_id,
                confirmation = ?admission.outcome,
                "saved upload"
            );
            state
                .desktop
                .notify_detached("Saved to Downloads", suggested_name);
            Ok((
                StatusCode::OK,
                Json(json!({
                    "ok": true,
                    "action": "saved_file",
                    "saved_as": saved.path,
                    "length": saved.length,
                    "sha256": saved.sha256,
                    "mode": admission.policy.mode,
                    "user_id": admission.user_id,
                })),
            )
                .into_response())
        }

        ClassifiedAction::Reject(reason) => Err(ApiError::Rejected(reason)),
    }
}

pub async fn drop_item(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let admission = gate::admit(&state, peer.ip().to_canonical()).await?;
    let form = FormParts::read(multipart).await?;
    let action = classify::classify(form.into_payload());
    perform(&state, &admission, action).await
}

fn image_suffix(filename: Option<&str>) -> String {
    filename
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{e}"))
        .unwrap_or_else(|| ".png".to_string())
}

pub async fn clip_push(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let admission = gate::admit(&state, peer.ip().to_canonical()).await?;
    let form = FormParts::read(multipart).await?;
    let kind = form
        .kind
        .as_deref()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| "text".to_string());

    match kind.as_str() {
        "text" => {
            let Some(text) = form.text else {
                return Err(ApiError::MissingField { field: "text", kind });
            };
            state
                .desktop
                .clipboard
                .set_text(&text)
                .await
                .map_err(|e| ApiError::Clipboard {
                    kind: "text",
                    reason: e.to_string(),
                })?;
            info!(user_id = ?admission.user_id, chars = text.chars().count(), "clipboard text set");
            state
                .desktop
                .notify_detached("Clipboard updated", "Text from device");
            Ok(Json(json!({ "ok": true, "kind": "text" })).into_response())
        }

        "image" => {
            let Some(image) = form.image else {
                return Err(ApiError::MissingField { field: "image", kind });
            };
            let suffix = image_suffix(image.filename.as_deref());
            let staged = tokio::task::spawn_blocking(move || {
                let mut tmp = tempfile::Builder::new()
                    .prefix("spacedrop-clip-")
                    .suffix(&suffix)
                    .tempfile()?;
                std::io::Write::write_all(&mut tmp, &image.bytes)?;
                Ok::<_, std::io::Error>(tmp)
            })
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
            .map_err(|e| ApiError::Clipboard {
                kind: "image",
                reason: e.to_string(),
            })?;

            // `staged` is removed on drop, after the clipboard has read it.
            state
                .desktop
                .clipboard
                .set_image(staged.path())
                .await
                .map_err(|e| ApiError::Clipboard {
                    kind: "image",
                    reason: e.to_string(),
                })?;
            info!(user_id = ?admission.user_id, "clipboard image set");
            state
                .desktop
                .notify_detached("Clipboard updated", "Image from device");
            Ok(Json(json!({ "ok": true, "kind": "image" })).into_response())
        }

        _ => Err(ApiError::UnsupportedKind(kind)),
    }
}
