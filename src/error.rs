//! Request-boundary error kinds and their JSON rendering.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("daily scan quota exhausted")]
    QuotaExceeded,

    #[error("analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("image upload failed for draft {draft_id}: {reason}")]
    ImageUploadFailed { draft_id: Uuid, reason: String },

    #[error("linking image to draft {draft_id} failed: {reason}")]
    LinkFailed { draft_id: Uuid, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    ValidationFailed(String),

    #[error("upstream failed: {0}")]
    UpstreamFailed(String),
}

impl AppError {
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        AppError::PersistenceFailed(err.to_string())
    }

    /// Short machine-readable kind, also used as the `error` field of responses.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::QuotaExceeded => "quota_exceeded",
            AppError::AnalysisFailed(_) => "analysis_failed",
            AppError::PersistenceFailed(_) => "persistence_failed",
            AppError::ImageUploadFailed { .. } => "image_upload_failed",
            AppError::LinkFailed { .. } => "link_failed",
            AppError::NotFound(_) => "not_found",
            AppError::ValidationFailed(_) => "validation_failed",
            AppError::UpstreamFailed(_) => "upstream_failed",
        }
    }

    /// Save step that failed, for errors a client can resume from.
    pub fn step(&self) -> Option<&'static str> {
        match self {
            AppError::ImageUploadFailed { .. } => Some("upload"),
            AppError::LinkFailed { .. } => Some("link"),
            _ => None,
        }
    }

    pub fn draft_id(&self) -> Option<Uuid> {
        match self {
            AppError::ImageUploadFailed { draft_id, .. } | AppError::LinkFailed { draft_id, .. } => {
                Some(*draft_id)
            }
            _ => None,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::AnalysisFailed(_) | AppError::UpstreamFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::PersistenceFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ImageUploadFailed { .. } | AppError::LinkFailed { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    draft_id: Option<Uuid>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = match &self {
            AppError::QuotaExceeded => None,
            AppError::PersistenceFailed(msg) => {
                tracing::error!(error = %msg, "persistence error");
                None
            }
            other => Some(other.to_string()),
        };

        let body = ErrorResponse {
            error: self.kind(),
            details,
            step: self.step(),
            draft_id: self.draft_id(),
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resumable_errors_carry_step_and_draft() {
        let id = Uuid::new_v4();
        let err = AppError::LinkFailed {
            draft_id: id,
            reason: "db down".into(),
        };
        assert_eq!(err.step(), Some("link"));
        assert_eq!(err.draft_id(), Some(id));
        assert_eq!(err.kind(), "link_failed");

        assert_eq!(AppError::QuotaExceeded.step(), None);
        assert_eq!(AppError::NotFound("food".into()).draft_id(), None);
    }

    #[tokio::test]
    async fn upload_failure_renders_retry_handle() {
        let id = Uuid::new_v4();
        let res = AppError::ImageUploadFailed {
            draft_id: id,
            reason: "timeout".into(),
        }
        .into_response();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "image_upload_failed");
        assert_eq!(json["step"], "upload");
        assert_eq!(json["draft_id"], id.to_string());
    }

    #[test]
    fn persistence_details_are_not_leaked() {
        let res = AppError::persistence("connection refused").into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
