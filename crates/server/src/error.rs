//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub const ERR_INVALID_AUTH: &str = "ERR_INVALID_AUTH";
pub const ERR_NOT_AUTHORIZED: &str = "ERR_NOT_AUTHORIZED";
pub const ERR_CONTENT_ADDING_DISABLED: &str = "ERR_CONTENT_ADDING_DISABLED";
pub const ERR_INVALID_INPUT: &str = "ERR_INVALID_INPUT";
pub const ERR_CONTENT_NOT_FOUND: &str = "ERR_CONTENT_NOT_FOUND";
pub const ERR_INTERNAL_SERVER: &str = "ERR_INTERNAL_SERVER";

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// HTTP status code.
    pub code: u16,
    /// One of the `ERR_*` constants.
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid auth: {0}")]
    InvalidAuth(String),

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("content adding is disabled for this user")]
    ContentAddingDisabled,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] shuttle_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] shuttle_metadata::MetadataError),

    #[error("ingest error: {0}")]
    Ingest(#[from] crate::ingest::IngestError),

    #[error("coordinator error: {0}")]
    Coordinator(#[from] crate::coordinator::CoordinatorError),
}

impl ApiError {
    /// Get the error constant for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAuth(_) => ERR_INVALID_AUTH,
            Self::NotAuthorized(_) => ERR_NOT_AUTHORIZED,
            Self::ContentAddingDisabled => ERR_CONTENT_ADDING_DISABLED,
            Self::BadRequest(_) => ERR_INVALID_INPUT,
            Self::NotFound(_) => ERR_CONTENT_NOT_FOUND,
            Self::Internal(_)
            | Self::Storage(_)
            | Self::Metadata(_)
            | Self::Ingest(_)
            | Self::Coordinator(_) => ERR_INTERNAL_SERVER,
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidAuth(_) | Self::NotAuthorized(_) => StatusCode::UNAUTHORIZED,
            Self::ContentAddingDisabled | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_)
            | Self::Storage(_)
            | Self::Metadata(_)
            | Self::Ingest(_)
            | Self::Coordinator(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller-facing detail. Internal failures never leak their text.
    fn details(&self) -> Option<String> {
        match self {
            Self::InvalidAuth(msg)
            | Self::NotAuthorized(msg)
            | Self::BadRequest(msg)
            | Self::NotFound(msg) => Some(msg.clone()),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            code: status.as_u16(),
            message: self.code(),
            details: self.details(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_content_adding_disabled_body() {
        let (status, body) = body_json(ApiError::ContentAddingDisabled).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
        assert_eq!(body["message"], ERR_CONTENT_ADDING_DISABLED);
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let err = ApiError::Internal("disk on fire at /var/lib/shuttle".to_string());
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], ERR_INTERNAL_SERVER);
        assert!(!body.to_string().contains("/var/lib/shuttle"));
    }

    #[tokio::test]
    async fn test_auth_errors_are_unauthorized() {
        let (status, body) = body_json(ApiError::InvalidAuth("bad token".to_string())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], ERR_INVALID_AUTH);
        assert_eq!(body["details"], "bad token");

        let (status, _) = body_json(ApiError::NotAuthorized("admin only".to_string())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
