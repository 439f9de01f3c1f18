use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error};

use super::{
    parse_request, FieldResolver, FieldScope, QueryRequest, ResolveError, ResolverContext,
    ResolverRegistry, SelectionFilter, SelectionNode,
};
use crate::common::{AuthError, Operation};
use crate::kernel::ServerDeps;
use crate::server::auth::OperationGuard;

// =============================================================================
// Response shape
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResponse {
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
}

/// HTTP status plus body of one executed request.
#[derive(Debug)]
pub struct ExecutionResult {
    pub status: StatusCode,
    pub body: GraphQLResponse,
}

impl ExecutionResult {
    /// Whole request refused before any resolver ran.
    pub fn rejected(err: AuthError) -> Self {
        if err.is_internal() {
            error!(error = %err, "Query aborted by backing store failure");
        }
        Self {
            status: err.status_code(),
            body: GraphQLResponse {
                data: None,
                errors: vec![GraphQLError {
                    message: err.public_message(),
                    path: Vec::new(),
                }],
            },
        }
    }
}

impl IntoResponse for ExecutionResult {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// =============================================================================
// Executor
// =============================================================================

/// Runs a query end to end: parse, guard every top-level field, filter nested
/// selections, then call resolvers on the filtered trees only.
#[derive(Clone)]
pub struct QueryExecutor {
    registry: Arc<ResolverRegistry>,
    guard: OperationGuard,
    filter: SelectionFilter,
    deps: ServerDeps,
}

impl QueryExecutor {
    pub fn new(deps: ServerDeps, registry: ResolverRegistry, scope: FieldScope) -> Self {
        Self {
            registry: Arc::new(registry),
            guard: OperationGuard::from_deps(&deps),
            filter: SelectionFilter::new(deps.grants.clone(), scope),
            deps,
        }
    }

    pub async fn execute(&self, credential: Option<&str>, request: &QueryRequest) -> ExecutionResult {
        match self.run(credential, request).await {
            Ok(result) => result,
            Err(e) => ExecutionResult::rejected(e),
        }
    }

    async fn run(
        &self,
        credential: Option<&str>,
        request: &QueryRequest,
    ) -> Result<ExecutionResult, AuthError> {
        let operation = parse_request(request)?;

        let mut planned: Vec<(&SelectionNode, Arc<dyn FieldResolver>)> = Vec::new();
        for field in &operation.fields {
            let resolver = self.registry.get(operation.kind, &field.name).ok_or_else(|| {
                AuthError::malformed(format!(
                    "unknown {} field '{}'",
                    operation.kind.as_str(),
                    field.name
                ))
            })?;
            if resolver.returns_object() && field.is_leaf() {
                return Err(AuthError::malformed(format!(
                    "field '{}' must have a selection of subfields",
                    field.name
                )));
            }
            planned.push((field, resolver));
        }

        let principal = self.guard.authenticate(credential).await?;

        let mut checked: Vec<(&str, Operation)> = Vec::new();
        for (_, resolver) in &planned {
            let grant = (resolver.table(), resolver.operation());
            if checked.contains(&grant) {
                continue;
            }
            self.guard.authorize(&principal, grant.0, grant.1).await?;
            checked.push(grant);
        }

        let mut filtered = Vec::with_capacity(planned.len());
        for (field, _) in &planned {
            if field.is_leaf() {
                filtered.push((*field).clone());
            } else {
                filtered.push(self.filter.filter(&principal, field).await?);
            }
        }

        let ctx = ResolverContext {
            principal,
            deps: self.deps.clone(),
        };
        let calls = planned
            .iter()
            .zip(&filtered)
            .map(|((_, resolver), field)| resolver.bind(&ctx, field))
            .collect::<Result<Vec<_>, _>>()?;

        let mut data = Map::new();
        let mut errors = Vec::new();
        let mut status = StatusCode::OK;

        for (call, field) in calls.into_iter().zip(&filtered) {
            let key = field.response_key().to_string();
            match call.await {
                Ok(value) => {
                    data.insert(key, project(&value, field));
                }
                Err(e) => {
                    match &e {
                        ResolveError::Store(source) => {
                            error!(field = %field.name, error = %source, "Resolver failed");
                        }
                        _ => debug!(field = %field.name, error = %e, "Resolver returned an error"),
                    }
                    if errors.is_empty() {
                        status = match e {
                            ResolveError::Unauthorized => StatusCode::FORBIDDEN,
                            _ => StatusCode::BAD_REQUEST,
                        };
                    }
                    errors.push(GraphQLError {
                        message: e.to_string(),
                        path: vec![key.clone()],
                    });
                    data.insert(key, Value::Null);
                }
            }
        }

        Ok(ExecutionResult {
            status,
            body: GraphQLResponse {
                data: Some(Value::Object(data)),
                errors,
            },
        })
    }
}

/// Shape a resolver's value after the filtered selection: only selected keys,
/// under their response keys, recursively. Lists are projected per item.
pub fn project(value: &Value, field: &SelectionNode) -> Value {
    let Some(children) = &field.selections else {
        return value.clone();
    };

    match value {
        Value::Array(items) => Value::Array(items.iter().map(|item| project(item, field)).collect()),
        Value::Object(object) => {
            let mut out = Map::new();
            for child in children {
                let projected = object
                    .get(&child.name)
                    .map(|v| project(v, child))
                    .unwrap_or(Value::Null);
                out.insert(child.response_key().to_string(), projected);
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}
