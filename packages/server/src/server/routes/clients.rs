//! REST routes over the `clients` table.
//!
//! Each route sits behind `require_grant` for its operation and reuses the
//! GraphQL resolvers, so both surfaces share one implementation.

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use super::rest::{context, json_body, RestError};
use crate::common::Principal;
use crate::domains::clients::edges::{
    ClientArgs, ClientQuery, ClientsArgs, ClientsQuery, CreateArgs, CreateClient, DeleteArgs,
    DeleteClient, UpdateArgs, UpdateClient,
};
use crate::server::app::AppState;
use crate::server::graphql::{Resolver, SelectionNode};

/// GET /clients?offset=&limit=
pub async fn list_clients(
    Extension(state): Extension<AppState>,
    Extension(principal): Extension<Principal>,
    Query(args): Query<ClientsArgs>,
) -> Result<Json<Value>, RestError> {
    let ctx = context(&state, principal);
    let value = ClientsQuery
        .resolve(&ctx, args, &SelectionNode::leaf("clients"))
        .await?;
    Ok(Json(value))
}

/// GET /clients/:id
pub async fn get_client(
    Extension(state): Extension<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, RestError> {
    let ctx = context(&state, principal);
    let value = ClientQuery
        .resolve(&ctx, ClientArgs { id }, &SelectionNode::leaf("client"))
        .await?;
    Ok(Json(value))
}

/// POST /clients
pub async fn create_client(
    Extension(state): Extension<AppState>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<CreateArgs>, JsonRejection>,
) -> Response {
    let args = match json_body(body) {
        Ok(args) => args,
        Err(response) => return response,
    };
    let ctx = context(&state, principal);
    match CreateClient
        .resolve(&ctx, args, &SelectionNode::leaf("create"))
        .await
    {
        Ok(value) => (StatusCode::CREATED, Json(value)).into_response(),
        Err(e) => RestError::from(e).into_response(),
    }
}

/// PATCH /clients
pub async fn update_client(
    Extension(state): Extension<AppState>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<UpdateArgs>, JsonRejection>,
) -> Response {
    let args = match json_body(body) {
        Ok(args) => args,
        Err(response) => return response,
    };
    let ctx = context(&state, principal);
    match UpdateClient
        .resolve(&ctx, args, &SelectionNode::leaf("update"))
        .await
    {
        Ok(value) => Json(json!({ "result": value })).into_response(),
        Err(e) => RestError::from(e).into_response(),
    }
}

/// DELETE /clients/:id
pub async fn delete_client(
    Extension(state): Extension<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, RestError> {
    let ctx = context(&state, principal);
    let value = DeleteClient
        .resolve(&ctx, DeleteArgs { id }, &SelectionNode::leaf("delete"))
        .await?;
    Ok(Json(json!({ "result": value })))
}
