use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use super::Operation;

/// Authentication and authorization failures.
///
/// Every variant maps to exactly one HTTP status via [`AuthError::status_code`].
/// Store and repository failures are kept apart from `Denied` so callers never
/// confuse "lookup failed" with "not allowed".
#[derive(Error, Debug)]
pub enum AuthError {
    /// Missing, unparseable, unknown or expired token.
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Permission denied: {operation} on {table}")]
    Denied { table: String, operation: Operation },

    /// Revoking a token that has no session record.
    #[error("No session exists for this token")]
    NotFound,

    #[error("Token store unavailable: {0}")]
    StoreUnavailable(#[from] redis::RedisError),

    #[error("Grant repository error: {0}")]
    Repository(#[from] sqlx::Error),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),
}

impl AuthError {
    pub fn denied(table: impl Into<String>, operation: Operation) -> Self {
        Self::Denied {
            table: table.into(),
            operation,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Denied { .. } => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::StoreUnavailable(_) | Self::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// True for failures of a backing store rather than of the caller.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Repository(_))
    }

    /// Message safe to return to the caller.
    pub fn public_message(&self) -> String {
        if self.is_internal() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if self.is_internal() {
            error!(error = %self, "Request aborted by backing store failure");
        }
        let status = self.status_code();
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
