use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::super::TABLE;
use crate::common::{ClientId, Operation};
use crate::server::graphql::{ResolveError, Resolver, ResolverContext, SelectionNode};

#[derive(Debug, Deserialize)]
pub struct ClientArgs {
    pub id: i32,
}

#[derive(Debug, Deserialize)]
pub struct ClientsArgs {
    #[serde(default)]
    pub offset: i64,
    pub limit: Option<i64>,
}

/// `client(id: Int!)`
pub struct ClientQuery;

#[async_trait]
impl Resolver for ClientQuery {
    type Args = ClientArgs;

    fn table(&self) -> &str {
        TABLE
    }

    fn operation(&self) -> Operation {
        Operation::Read
    }

    async fn resolve(
        &self,
        ctx: &ResolverContext,
        args: ClientArgs,
        _field: &SelectionNode,
    ) -> Result<Value, ResolveError> {
        let client = ctx
            .deps
            .clients
            .find_by_id(ClientId::new(args.id))
            .await?
            .ok_or_else(|| ResolveError::not_found(format!("No client found by id {}", args.id)))?;

        Ok(serde_json::to_value(client).map_err(anyhow::Error::from)?)
    }
}

/// `clients(offset: Int = 0, limit: Int)`, ordered by id
pub struct ClientsQuery;

#[async_trait]
impl Resolver for ClientsQuery {
    type Args = ClientsArgs;

    fn table(&self) -> &str {
        TABLE
    }

    fn operation(&self) -> Operation {
        Operation::Read
    }

    async fn resolve(
        &self,
        ctx: &ResolverContext,
        args: ClientsArgs,
        _field: &SelectionNode,
    ) -> Result<Value, ResolveError> {
        if args.offset < 0 || args.limit.is_some_and(|l| l < 0) {
            return Err(ResolveError::InvalidArguments(
                "offset and limit must not be negative".to_string(),
            ));
        }

        let clients = ctx.deps.clients.list(args.offset, args.limit).await?;
        Ok(serde_json::to_value(clients).map_err(anyhow::Error::from)?)
    }
}
