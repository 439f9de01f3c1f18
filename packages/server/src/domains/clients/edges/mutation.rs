use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::super::TABLE;
use crate::common::{ClientId, Operation};
use crate::server::graphql::{ResolveError, Resolver, ResolverContext, SelectionNode};

const SUCCESS: &str = "Success";

#[derive(Debug, Deserialize)]
pub struct CreateArgs {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateArgs {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteArgs {
    pub id: i32,
}

fn require_name(name: &str) -> Result<&str, ResolveError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ResolveError::InvalidArguments(
            "name must not be empty".to_string(),
        ));
    }
    Ok(name)
}

/// `create(name: String!)`
pub struct CreateClient;

#[async_trait]
impl Resolver for CreateClient {
    type Args = CreateArgs;

    fn table(&self) -> &str {
        TABLE
    }

    fn operation(&self) -> Operation {
        Operation::Create
    }

    async fn resolve(
        &self,
        ctx: &ResolverContext,
        args: CreateArgs,
        _field: &SelectionNode,
    ) -> Result<Value, ResolveError> {
        let name = require_name(&args.name)?;
        let client = ctx.deps.clients.create(name).await?;
        info!(client_id = %client.id, principal_id = %ctx.principal.id, "Client created");
        Ok(serde_json::to_value(client).map_err(anyhow::Error::from)?)
    }
}

/// `update(id: Int!, name: String!)`
pub struct UpdateClient;

#[async_trait]
impl Resolver for UpdateClient {
    type Args = UpdateArgs;

    fn table(&self) -> &str {
        TABLE
    }

    fn operation(&self) -> Operation {
        Operation::Update
    }

    fn returns_object(&self) -> bool {
        false
    }

    async fn resolve(
        &self,
        ctx: &ResolverContext,
        args: UpdateArgs,
        _field: &SelectionNode,
    ) -> Result<Value, ResolveError> {
        let name = require_name(&args.name)?;
        let updated = ctx.deps.clients.update(ClientId::new(args.id), name).await?;
        if updated == 0 {
            return Err(ResolveError::not_found(format!(
                "No client found by id {}",
                args.id
            )));
        }
        Ok(json!(SUCCESS))
    }
}

/// `delete(id: Int!)`
pub struct DeleteClient;

#[async_trait]
impl Resolver for DeleteClient {
    type Args = DeleteArgs;

    fn table(&self) -> &str {
        TABLE
    }

    fn operation(&self) -> Operation {
        Operation::Delete
    }

    fn returns_object(&self) -> bool {
        false
    }

    async fn resolve(
        &self,
        ctx: &ResolverContext,
        args: DeleteArgs,
        _field: &SelectionNode,
    ) -> Result<Value, ResolveError> {
        let deleted = ctx.deps.clients.delete(ClientId::new(args.id)).await?;
        if deleted == 0 {
            return Err(ResolveError::not_found(format!(
                "No client found by id {}",
                args.id
            )));
        }
        info!(client_id = args.id, principal_id = %ctx.principal.id, "Client deleted");
        Ok(json!(SUCCESS))
    }
}
