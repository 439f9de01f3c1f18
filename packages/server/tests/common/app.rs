//! HTTP client for integration testing.
//!
//! Drives the full router with `oneshot`, without binding a socket. Stores are
//! the in-memory doubles from `kernel::test_dependencies`, shared with the
//! test so it can seed them and inspect them afterwards.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use graphgate_core::kernel::TestDependencies;
use graphgate_core::server::{build_app, AppState, FieldScope};
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

/// Lowest bcrypt cost, to keep `createUser` fast under test.
const PASSWORD_COST: u32 = 4;

/// Router under test plus the doubles behind it.
pub struct TestApp {
    router: Router,
    pub deps: TestDependencies,
}

/// Status and decoded JSON body of one response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestResponse {
    /// Gets a value at the given dotted path under `data`.
    pub fn data(&self, path: &str) -> Value {
        let mut current = &self.body["data"];
        for key in path.split('.') {
            current = &current[key];
        }
        current.clone()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.body["errors"]
            .as_array()
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e["message"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl TestApp {
    pub fn new(deps: TestDependencies) -> Self {
        Self::with_scope(deps, FieldScope::FieldName)
    }

    pub fn with_scope(deps: TestDependencies, scope: FieldScope) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let state = AppState::new(deps.clone().into_server_deps(), scope, PASSWORD_COST);
        Self {
            router: build_app(state, Duration::from_secs(5)),
            deps,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    /// Send a raw request, for bodies a typed helper cannot produce.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
        }
    }

    pub async fn graphql(&self, token: Option<&str>, query: &str) -> TestResponse {
        self.request(
            Method::POST,
            "/graphql",
            token,
            Some(json!({ "query": query })),
        )
        .await
    }

    pub async fn graphql_with_variables(
        &self,
        token: Option<&str>,
        query: &str,
        variables: Value,
    ) -> TestResponse {
        self.request(
            Method::POST,
            "/graphql",
            token,
            Some(json!({ "query": query, "variables": variables })),
        )
        .await
    }
}
