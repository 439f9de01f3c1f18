use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::common::AuthError;
use crate::domains::auth::{login, logout, LoginResult};
use crate::server::app::AppState;
use crate::server::auth::credential_header;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// POST /login
pub async fn login_handler(
    Extension(state): Extension<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AuthError> {
    let Json(body) = body.map_err(|rejection| AuthError::malformed(rejection.body_text()))?;

    match login(&body.email, &body.password, &state.deps).await? {
        LoginResult::Issued { token, .. } => Ok(Json(LoginResponse { token })),
        LoginResult::Rejected => Err(AuthError::Unauthenticated),
    }
}

/// POST /logout
pub async fn logout_handler(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AuthError> {
    logout(credential_header(&headers), &state.deps).await?;
    Ok(Json(json!({ "result": "OK" })))
}
