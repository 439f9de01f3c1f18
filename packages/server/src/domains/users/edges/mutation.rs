use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::query::not_found;
use super::super::models::{NewUser, RoleAssignment};
use super::super::TABLE;
use crate::common::{Operation, PrincipalId, RoleId};
use crate::server::graphql::{ResolveError, Resolver, ResolverContext, SelectionNode};

/// bcrypt ignores everything past 72 bytes.
const MAX_PASSWORD_BYTES: usize = 72;

#[derive(Deserialize)]
pub struct CreateUserArgs {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserArgs {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteUserArgs {
    pub id: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRolesArgs {
    pub id: i32,
    pub roles: Vec<i32>,
}

fn invalid(message: &str) -> ResolveError {
    ResolveError::InvalidArguments(message.to_string())
}

fn require_name(name: &str) -> Result<&str, ResolveError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    Ok(name)
}

fn require_email(email: &str) -> Result<&str, ResolveError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(invalid("email must be an address like name@example.org")),
    }
}

fn require_password(password: &str) -> Result<&str, ResolveError> {
    if password.is_empty() {
        return Err(invalid("password must not be empty"));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(invalid("password must be at most 72 bytes"));
    }
    Ok(password)
}

fn to_value(user: impl serde::Serialize) -> Result<Value, ResolveError> {
    Ok(serde_json::to_value(user).map_err(anyhow::Error::from)?)
}

/// `createUser(name: String!, email: String!, password: String!)`
///
/// The password is stored as a bcrypt hash of the configured cost.
pub struct CreateUser {
    password_cost: u32,
}

impl CreateUser {
    pub fn new(password_cost: u32) -> Self {
        Self { password_cost }
    }
}

#[async_trait]
impl Resolver for CreateUser {
    type Args = CreateUserArgs;

    fn table(&self) -> &str {
        TABLE
    }

    fn operation(&self) -> Operation {
        Operation::Create
    }

    async fn resolve(
        &self,
        ctx: &ResolverContext,
        args: CreateUserArgs,
        _field: &SelectionNode,
    ) -> Result<Value, ResolveError> {
        let name = require_name(&args.name)?.to_string();
        let email = require_email(&args.email)?.to_string();
        let password = require_password(&args.password)?.to_string();

        let cost = self.password_cost;
        let password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(anyhow::Error::from)?
            .map_err(anyhow::Error::from)?;

        let user = ctx
            .deps
            .users
            .create(NewUser {
                name,
                email,
                password_hash,
            })
            .await?
            .ok_or_else(|| invalid("email is already registered"))?;

        info!(user_id = %user.id, principal_id = %ctx.principal.id, "User created");
        to_value(user)
    }
}

/// `updateUser(id: Int!, name: String!)`
pub struct UpdateUser;

#[async_trait]
impl Resolver for UpdateUser {
    type Args = UpdateUserArgs;

    fn table(&self) -> &str {
        TABLE
    }

    fn operation(&self) -> Operation {
        Operation::Update
    }

    async fn resolve(
        &self,
        ctx: &ResolverContext,
        args: UpdateUserArgs,
        _field: &SelectionNode,
    ) -> Result<Value, ResolveError> {
        let name = require_name(&args.name)?;
        let user = ctx
            .deps
            .users
            .update(PrincipalId::new(args.id), name)
            .await?
            .ok_or_else(|| not_found(args.id))?;
        to_value(user)
    }
}

/// `deleteUser(id: Int!)`, returning the deleted user
pub struct DeleteUser;

#[async_trait]
impl Resolver for DeleteUser {
    type Args = DeleteUserArgs;

    fn table(&self) -> &str {
        TABLE
    }

    fn operation(&self) -> Operation {
        Operation::Delete
    }

    async fn resolve(
        &self,
        ctx: &ResolverContext,
        args: DeleteUserArgs,
        _field: &SelectionNode,
    ) -> Result<Value, ResolveError> {
        let user = ctx
            .deps
            .users
            .delete(PrincipalId::new(args.id))
            .await?
            .ok_or_else(|| not_found(args.id))?;
        info!(user_id = args.id, principal_id = %ctx.principal.id, "User deleted");
        to_value(user)
    }
}

/// `updateRoles(id: Int!, roles: [Int!]!)` replaces the user's roles.
pub struct UpdateRoles;

#[async_trait]
impl Resolver for UpdateRoles {
    type Args = UpdateRolesArgs;

    fn table(&self) -> &str {
        TABLE
    }

    fn operation(&self) -> Operation {
        Operation::Update
    }

    async fn resolve(
        &self,
        ctx: &ResolverContext,
        args: UpdateRolesArgs,
        _field: &SelectionNode,
    ) -> Result<Value, ResolveError> {
        let roles: Vec<RoleId> = args.roles.iter().copied().map(RoleId::new).collect();
        match ctx
            .deps
            .users
            .replace_roles(PrincipalId::new(args.id), &roles)
            .await?
        {
            RoleAssignment::Assigned(user) => {
                info!(user_id = args.id, roles = ?args.roles, principal_id = %ctx.principal.id, "User roles replaced");
                to_value(user)
            }
            RoleAssignment::UnknownUser => Err(not_found(args.id)),
            RoleAssignment::UnknownRoles => Err(invalid("roles contains an unknown role id")),
        }
    }
}
