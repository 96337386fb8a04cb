//! Maps the runtime's typed error taxonomy onto the HTTP status codes spec.md §6/§7
//! names: validation is 4xx with no persistence side effects, integrity failures are
//! 500, and a non-JSON upstream response from the Collector is 502.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use quasar_core::error::{SecretsError, ValidationError};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{} validation errors", .0.len())]
    ValidationMany(Vec<ValidationError>),
    #[error(transparent)]
    Secrets(#[from] SecretsError),
    #[error(transparent)]
    Db(#[from] quasar_db::DbError),
    #[error("collector returned a non-JSON response: {0:.200}")]
    BadUpstream(String),
    #[error("collector rejected the request with status {0}: {1:.200}")]
    CollectorRejected(StatusCode, String),
    #[error(transparent)]
    Upstream(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, json!({"error": self.to_string()})),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, json!({"error": self.to_string()})),
            ApiError::UnsupportedMediaType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, json!({"error": self.to_string()}))
            }
            ApiError::Validation(e) => (StatusCode::BAD_REQUEST, json!({"error": e.to_string()})),
            ApiError::ValidationMany(errs) => (
                StatusCode::BAD_REQUEST,
                json!({"errors": errs.iter().map(ToString::to_string).collect::<Vec<_>>()}),
            ),
            ApiError::Secrets(_) => (StatusCode::INTERNAL_SERVER_ERROR, json!({"error": self.to_string()})),
            ApiError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, json!({"error": self.to_string()})),
            ApiError::BadUpstream(_) => (StatusCode::BAD_GATEWAY, json!({"error": self.to_string()})),
            ApiError::CollectorRejected(status, _) => (*status, json!({"error": self.to_string()})),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, json!({"error": self.to_string()})),
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, json!({"error": self.to_string()})),
        };
        tracing::warn!(error = %self, status = %status, "request failed");
        (status, Json(body)).into_response()
    }
}
