use crate::{classify::RejectReason, confirm::DeclineReason, policy_store::Mode};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

/// Uniform JSON error body: `{"ok": false, "error": ..., "details": ...}`.
pub fn json_error(status: StatusCode, message: &str, details: Value) -> Response {
    (
        status,
        Json(json!({ "ok": false, "error": message, "details": details })),
    )
        .into_response()
}

/// Request-level failures. None of these touch shared state.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    NotAllowed {
        message: String,
        user_id: Option<u64>,
        mode: Mode,
    },

    #[error("Declined by user (confirmation dialog)")]
    Declined(DeclineReason),

    #[error("{}", .0.message())]
    Rejected(RejectReason),

    #[error("Missing '{field}' for kind={kind}")]
    MissingField { field: &'static str, kind: String },

    #[error("Unsupported kind (use 'text' or 'image')")]
    UnsupportedKind(String),

    #[error("invalid multipart body: {0}")]
    Multipart(String),

    #[error("payload too large")]
    TooLarge,

    #[error("failed to open url: {reason}")]
    OpenUrl { url: String, reason: String },

    #[error("failed to save file: {0}")]
    Save(String),

    #[error("failed to set clipboard {kind}: {reason}")]
    Clipboard { kind: &'static str, reason: String },

    #[error("config reload failed: {0}")]
    Reload(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotAllowed { .. } => StatusCode::UNAUTHORIZED,
            Self::Declined(_) => StatusCode::FORBIDDEN,
            Self::Rejected(_) | Self::UnsupportedKind(_) | Self::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::MissingField { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::OpenUrl { .. } => StatusCode::BAD_GATEWAY,
            Self::Save(_) | Self::Clipboard { .. } | Self::Reload(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn details(&self) -> Value {
        match self {
            Self::NotAllowed { user_id, mode, .. } => json!({ "user_id": user_id, "mode": mode }),
            Self::Declined(reason) => json!({ "reason": reason }),
            Self::Rejected(reason) => json!({ "reason": reason }),
            Self::UnsupportedKind(kind) => json!({ "kind": kind }),
            Self::OpenUrl { url, .. } => {
                json!({ "action": "opened_url", "url": url, "opened": false })
            }
            _ => json!({}),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        json_error(self.status(), &self.to_string(), self.details())
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::TooLarge
        } else {
            Self::Multipart(e.body_text())
        }
    }
}
