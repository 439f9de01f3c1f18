use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::super::TABLE;
use crate::common::{Operation, PrincipalId};
use crate::server::graphql::{ResolveError, Resolver, ResolverContext, SelectionNode};

#[derive(Debug, Deserialize)]
pub struct UserArgs {
    pub id: i32,
}

#[derive(Debug, Deserialize)]
pub struct UsersArgs {
    #[serde(default)]
    pub offset: i64,
    pub limit: Option<i64>,
}

pub(super) fn not_found(id: i32) -> ResolveError {
    ResolveError::not_found(format!("No user found by id {}", id))
}

/// `user(id: Int!)`
pub struct UserQuery;

#[async_trait]
impl Resolver for UserQuery {
    type Args = UserArgs;

    fn table(&self) -> &str {
        TABLE
    }

    fn operation(&self) -> Operation {
        Operation::Read
    }

    async fn resolve(
        &self,
        ctx: &ResolverContext,
        args: UserArgs,
        _field: &SelectionNode,
    ) -> Result<Value, ResolveError> {
        let user = ctx
            .deps
            .users
            .find_by_id(PrincipalId::new(args.id))
            .await?
            .ok_or_else(|| not_found(args.id))?;

        Ok(serde_json::to_value(user).map_err(anyhow::Error::from)?)
    }
}

/// `users(offset: Int = 0, limit: Int)`, ordered by id
pub struct UsersQuery;

#[async_trait]
impl Resolver for UsersQuery {
    type Args = UsersArgs;

    fn table(&self) -> &str {
        TABLE
    }

    fn operation(&self) -> Operation {
        Operation::Read
    }

    async fn resolve(
        &self,
        ctx: &ResolverContext,
        args: UsersArgs,
        _field: &SelectionNode,
    ) -> Result<Value, ResolveError> {
        if args.offset < 0 || args.limit.is_some_and(|l| l < 0) {
            return Err(ResolveError::InvalidArguments(
                "offset and limit must not be negative".to_string(),
            ));
        }

        let users = ctx.deps.users.list(args.offset, args.limit).await?;
        Ok(serde_json::to_value(users).map_err(anyhow::Error::from)?)
    }
}

/// `userGrants(id: Int!)`: `[{ table, operations }]` across every role the user holds
pub struct UserGrantsQuery;

#[async_trait]
impl Resolver for UserGrantsQuery {
    type Args = UserArgs;

    fn table(&self) -> &str {
        TABLE
    }

    fn operation(&self) -> Operation {
        Operation::Read
    }

    async fn resolve(
        &self,
        ctx: &ResolverContext,
        args: UserArgs,
        _field: &SelectionNode,
    ) -> Result<Value, ResolveError> {
        let id = PrincipalId::new(args.id);
        if ctx.deps.users.find_by_id(id).await?.is_none() {
            return Err(not_found(args.id));
        }

        let grants = ctx.deps.users.grants(id).await?;
        Ok(serde_json::to_value(grants).map_err(anyhow::Error::from)?)
    }
}
