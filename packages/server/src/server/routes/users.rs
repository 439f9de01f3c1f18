//! REST routes over the `users` table.
//!
//! Same shape as the client routes: one `require_grant` layer per operation,
//! with the GraphQL resolvers doing the work. Mutations answer
//! `{"status": "Success", "user": ..}`.

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::rest::{context, json_body, RestError};
use crate::common::Principal;
use crate::domains::users::edges::{
    CreateUser, CreateUserArgs, DeleteUser, DeleteUserArgs, UpdateRoles, UpdateRolesArgs,
    UpdateUser, UpdateUserArgs, UserArgs, UserGrantsQuery, UserQuery, UsersArgs, UsersQuery,
};
use crate::server::app::AppState;
use crate::server::graphql::{Resolver, SelectionNode};

/// Body of `PUT /users/:id/roles`
#[derive(Debug, Deserialize)]
pub struct RolesBody {
    pub roles: Vec<i32>,
}

fn success(user: Value) -> Json<Value> {
    Json(json!({ "status": "Success", "user": user }))
}

/// GET /users?offset=&limit=
pub async fn list_users(
    Extension(state): Extension<AppState>,
    Extension(principal): Extension<Principal>,
    Query(args): Query<UsersArgs>,
) -> Result<Json<Value>, RestError> {
    let ctx = context(&state, principal);
    let value = UsersQuery
        .resolve(&ctx, args, &SelectionNode::leaf("users"))
        .await?;
    Ok(Json(value))
}

/// GET /users/:id
pub async fn get_user(
    Extension(state): Extension<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, RestError> {
    let ctx = context(&state, principal);
    let value = UserQuery
        .resolve(&ctx, UserArgs { id }, &SelectionNode::leaf("user"))
        .await?;
    Ok(Json(value))
}

/// POST /users
pub async fn create_user(
    Extension(state): Extension<AppState>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<CreateUserArgs>, JsonRejection>,
) -> Response {
    let args = match json_body(body) {
        Ok(args) => args,
        Err(response) => return response,
    };
    let ctx = context(&state, principal);
    match CreateUser::new(state.password_cost)
        .resolve(&ctx, args, &SelectionNode::leaf("createUser"))
        .await
    {
        Ok(user) => (StatusCode::CREATED, success(user)).into_response(),
        Err(e) => RestError::from(e).into_response(),
    }
}

/// PATCH /users
pub async fn update_user(
    Extension(state): Extension<AppState>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<UpdateUserArgs>, JsonRejection>,
) -> Response {
    let args = match json_body(body) {
        Ok(args) => args,
        Err(response) => return response,
    };
    let ctx = context(&state, principal);
    match UpdateUser
        .resolve(&ctx, args, &SelectionNode::leaf("updateUser"))
        .await
    {
        Ok(user) => success(user).into_response(),
        Err(e) => RestError::from(e).into_response(),
    }
}

/// DELETE /users/:id
pub async fn delete_user(
    Extension(state): Extension<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, RestError> {
    let ctx = context(&state, principal);
    let user = DeleteUser
        .resolve(&ctx, DeleteUserArgs { id }, &SelectionNode::leaf("deleteUser"))
        .await?;
    Ok(success(user))
}

/// PUT /users/:id/roles
pub async fn replace_user_roles(
    Extension(state): Extension<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i32>,
    body: Result<Json<RolesBody>, JsonRejection>,
) -> Response {
    let RolesBody { roles } = match json_body(body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let ctx = context(&state, principal);
    match UpdateRoles
        .resolve(
            &ctx,
            UpdateRolesArgs { id, roles },
            &SelectionNode::leaf("updateRoles"),
        )
        .await
    {
        Ok(user) => success(user).into_response(),
        Err(e) => RestError::from(e).into_response(),
    }
}

/// GET /users/:id/grants
pub async fn user_grants(
    Extension(state): Extension<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, RestError> {
    let ctx = context(&state, principal);
    let grants = UserGrantsQuery
        .resolve(&ctx, UserArgs { id }, &SelectionNode::leaf("userGrants"))
        .await?;
    Ok(Json(json!({ "grants": grants })))
}
