use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use tracing::Instrument;

use crate::common::AuthError;
use crate::server::app::AppState;
use crate::server::auth::credential_header;
use crate::server::graphql::{ExecutionResult, QueryRequest};
use crate::server::middleware::ClientIp;

/// GraphQL POST endpoint
///
/// Status is decided by the executor: 401/403/400/500 when the request is
/// refused as a whole, 403 or 400 when a resolver failed, otherwise 200.
pub async fn graphql_handler(
    Extension(state): Extension<AppState>,
    client_ip: Option<Extension<ClientIp>>,
    headers: HeaderMap,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return ExecutionResult::rejected(AuthError::malformed(rejection.body_text()))
                .into_response()
        }
    };

    let span = tracing::info_span!(
        "graphql",
        client_ip = ?client_ip.map(|Extension(ClientIp(ip))| ip),
        operation_name = request.operation_name.as_deref().unwrap_or(""),
    );

    state
        .executor
        .execute(credential_header(&headers), &request)
        .instrument(span)
        .await
        .into_response()
}
