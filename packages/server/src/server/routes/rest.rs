//! Pieces shared by the REST table routes.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::common::{AuthError, Principal};
use crate::server::app::AppState;
use crate::server::graphql::{ResolveError, ResolverContext};

/// Resolver failure rendered with REST status codes.
pub struct RestError(ResolveError);

impl From<ResolveError> for RestError {
    fn from(e: ResolveError) -> Self {
        Self(e)
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ResolveError::Unauthorized => StatusCode::FORBIDDEN,
            ResolveError::NotFound(_) => StatusCode::NOT_FOUND,
            ResolveError::InvalidArguments(_) => StatusCode::BAD_REQUEST,
            ResolveError::Store(source) => {
                error!(error = %source, "REST route failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub(super) fn context(state: &AppState, principal: Principal) -> ResolverContext {
    ResolverContext {
        principal,
        deps: state.deps.clone(),
    }
}

/// Unwrap a JSON body, answering a bad one with a 400 `{"error": ..}`.
pub(super) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AuthError::malformed(rejection.body_text()).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_per_resolver_error() {
        let cases = [
            (ResolveError::Unauthorized, StatusCode::FORBIDDEN),
            (ResolveError::not_found("gone"), StatusCode::NOT_FOUND),
            (ResolveError::InvalidArguments("bad".to_string()), StatusCode::BAD_REQUEST),
            (
                ResolveError::from(anyhow::anyhow!("pool closed")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(RestError::from(err).into_response().status(), status);
        }
    }
}
