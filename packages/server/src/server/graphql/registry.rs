use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use super::{OperationKind, SelectionNode};
use crate::common::{AuthError, Operation, Principal};
use crate::kernel::ServerDeps;

/// Errors raised by a resolver once it is running.
///
/// These end up in the `errors` list of the response. Only `Unauthorized`
/// changes the status to 403; everything else is a 400.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Row-level check inside the resolver said no.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Data store error")]
    Store(#[from] anyhow::Error),
}

impl ResolveError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

/// What a resolver gets to see of the request besides its own field.
#[derive(Clone)]
pub struct ResolverContext {
    pub principal: Principal,
    pub deps: ServerDeps,
}

/// A top-level query or mutation field.
///
/// `table()` and `operation()` name the grant the Operation Guard checks
/// before the resolver may run. Arguments are decoded into `Args` before any
/// resolver of the request runs.
#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    type Args: DeserializeOwned + Send;

    fn table(&self) -> &str;

    fn operation(&self) -> Operation;

    /// Whether the field's value is an object (or a list of objects). Such a
    /// field must be queried with a selection set so the Selection Filter has
    /// something to narrow.
    fn returns_object(&self) -> bool {
        true
    }

    async fn resolve(
        &self,
        ctx: &ResolverContext,
        args: Self::Args,
        field: &SelectionNode,
    ) -> Result<Value, ResolveError>;
}

/// Object-safe view of a [`Resolver`], used by the registry.
pub trait FieldResolver: Send + Sync {
    fn table(&self) -> &str;

    fn operation(&self) -> Operation;

    fn returns_object(&self) -> bool;

    /// Decode the field's arguments and return the not yet started call.
    fn bind<'a>(
        &'a self,
        ctx: &'a ResolverContext,
        field: &'a SelectionNode,
    ) -> Result<BoxFuture<'a, Result<Value, ResolveError>>, AuthError>;
}

impl<R: Resolver> FieldResolver for R {
    fn table(&self) -> &str {
        Resolver::table(self)
    }

    fn operation(&self) -> Operation {
        Resolver::operation(self)
    }

    fn returns_object(&self) -> bool {
        Resolver::returns_object(self)
    }

    fn bind<'a>(
        &'a self,
        ctx: &'a ResolverContext,
        field: &'a SelectionNode,
    ) -> Result<BoxFuture<'a, Result<Value, ResolveError>>, AuthError> {
        let args: R::Args = field.arguments.decode()?;
        Ok(self.resolve(ctx, args, field))
    }
}

/// Top-level fields by operation kind, built once at startup.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    queries: HashMap<String, Arc<dyn FieldResolver>>,
    mutations: HashMap<String, Arc<dyn FieldResolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, name: &str, resolver: impl Resolver) -> Self {
        self.queries.insert(name.to_string(), Arc::new(resolver));
        self
    }

    pub fn mutation(mut self, name: &str, resolver: impl Resolver) -> Self {
        self.mutations.insert(name.to_string(), Arc::new(resolver));
        self
    }

    pub fn get(&self, kind: OperationKind, name: &str) -> Option<Arc<dyn FieldResolver>> {
        let fields = match kind {
            OperationKind::Query => &self.queries,
            OperationKind::Mutation => &self.mutations,
        };
        fields.get(name).cloned()
    }

    /// Field names of one kind, sorted.
    pub fn fields(&self, kind: OperationKind) -> Vec<&str> {
        let fields = match kind {
            OperationKind::Query => &self.queries,
            OperationKind::Mutation => &self.mutations,
        };
        let mut names: Vec<&str> = fields.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PrincipalId;
    use crate::kernel::test_dependencies::{SpyResolver, TestDependencies};
    use serde_json::json;

    fn context() -> ResolverContext {
        ResolverContext {
            principal: Principal::new(PrincipalId::new(1)),
            deps: TestDependencies::new().into_server_deps(),
        }
    }

    #[test]
    fn test_lookup_is_per_operation_kind() {
        let registry = ResolverRegistry::new()
            .query("clients", SpyResolver::new("clients", Operation::Read))
            .mutation(
                "delete",
                SpyResolver::new("clients", Operation::Delete).returning_scalar(),
            );

        assert!(registry.get(OperationKind::Query, "clients").is_some());
        assert!(registry.get(OperationKind::Mutation, "clients").is_none());

        let delete = registry.get(OperationKind::Mutation, "delete").unwrap();
        assert_eq!(delete.table(), "clients");
        assert_eq!(delete.operation(), Operation::Delete);
        assert!(!delete.returns_object());
        assert!(registry
            .get(OperationKind::Query, "clients")
            .is_some_and(|clients| clients.returns_object()));
        assert_eq!(registry.fields(OperationKind::Query), vec!["clients"]);
    }

    #[tokio::test]
    async fn test_bind_decodes_then_defers_the_call() {
        #[derive(serde::Deserialize)]
        struct ById {
            id: i32,
        }

        struct Echo;

        #[async_trait]
        impl Resolver for Echo {
            type Args = ById;

            fn table(&self) -> &str {
                "clients"
            }

            fn operation(&self) -> Operation {
                Operation::Read
            }

            async fn resolve(
                &self,
                _ctx: &ResolverContext,
                args: ById,
                _field: &SelectionNode,
            ) -> Result<Value, ResolveError> {
                Ok(json!({ "id": args.id }))
            }
        }

        let ctx = context();
        let echo = Echo;
        let good = SelectionNode::leaf("client").with_argument("id", json!(4));
        let call = echo.bind(&ctx, &good).unwrap();
        assert_eq!(call.await.unwrap(), json!({ "id": 4 }));

        let bad = SelectionNode::leaf("client").with_argument("id", json!("four"));
        assert!(matches!(
            echo.bind(&ctx, &bad),
            Err(AuthError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_resolve_error_messages() {
        assert_eq!(ResolveError::Unauthorized.to_string(), "Unauthorized");
        assert_eq!(
            ResolveError::not_found("No client found by id 9").to_string(),
            "No client found by id 9"
        );
        let store = ResolveError::from(anyhow::anyhow!("password=hunter2"));
        assert_eq!(store.to_string(), "Data store error");
    }
}
