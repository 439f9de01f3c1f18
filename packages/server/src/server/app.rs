//! Application setup and server configuration.

use std::time::Duration;

use axum::{
    extract::Extension,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method, StatusCode,
    },
    middleware,
    routing::{delete, get, patch, post, put, MethodRouter},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::common::Operation;
use crate::domains::clients::{register_client_resolvers, TABLE as CLIENTS_TABLE};
use crate::domains::users::{register_user_resolvers, TABLE as USERS_TABLE};
use crate::kernel::ServerDeps;
use crate::server::auth::{require_grant, OperationGuard, RequiredGrant};
use crate::server::graphql::{FieldScope, QueryExecutor, ResolverRegistry};
use crate::server::middleware::extract_client_ip;
use crate::server::routes::{
    create_client, create_user, delete_client, delete_user, get_client, get_user, graphql_handler,
    health_handler, list_clients, list_users, login_handler, logout_handler, replace_user_roles,
    update_client, update_user, user_grants,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: ServerDeps,
    pub executor: QueryExecutor,
    pub guard: OperationGuard,
    pub db_pool: Option<PgPool>,
    pub password_cost: u32,
}

impl AppState {
    /// `password_cost` is the bcrypt cost for passwords set through `createUser`.
    pub fn new(deps: ServerDeps, field_scope: FieldScope, password_cost: u32) -> Self {
        let registry = register_user_resolvers(
            register_client_resolvers(ResolverRegistry::new()),
            password_cost,
        );
        Self {
            executor: QueryExecutor::new(deps.clone(), registry, field_scope),
            guard: OperationGuard::from_deps(&deps),
            deps,
            db_pool: None,
            password_cost,
        }
    }

    pub fn with_db_pool(mut self, pool: PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    /// Guard a single route on `(table, operation)`.
    fn guarded(
        &self,
        table: &'static str,
        operation: Operation,
        route: MethodRouter,
    ) -> MethodRouter {
        let required = RequiredGrant {
            guard: self.guard.clone(),
            table,
            operation,
        };
        route.route_layer(middleware::from_fn_with_state(required, require_grant))
    }
}

/// Build the Axum application router
///
/// `/graphql` authorizes per top-level field inside the executor. The REST
/// routes each carry a `require_grant` route layer for their table.
pub fn build_app(state: AppState, request_timeout: Duration) -> Router {
    let clients = Router::new()
        .route(
            "/clients",
            state
                .guarded(CLIENTS_TABLE, Operation::Read, get(list_clients))
                .merge(state.guarded(CLIENTS_TABLE, Operation::Create, post(create_client)))
                .merge(state.guarded(CLIENTS_TABLE, Operation::Update, patch(update_client))),
        )
        .route(
            "/clients/:id",
            state
                .guarded(CLIENTS_TABLE, Operation::Read, get(get_client))
                .merge(state.guarded(CLIENTS_TABLE, Operation::Delete, delete(delete_client))),
        );

    let users = Router::new()
        .route(
            "/users",
            state
                .guarded(USERS_TABLE, Operation::Read, get(list_users))
                .merge(state.guarded(USERS_TABLE, Operation::Create, post(create_user)))
                .merge(state.guarded(USERS_TABLE, Operation::Update, patch(update_user))),
        )
        .route(
            "/users/:id",
            state
                .guarded(USERS_TABLE, Operation::Read, get(get_user))
                .merge(state.guarded(USERS_TABLE, Operation::Delete, delete(delete_user))),
        )
        .route(
            "/users/:id/roles",
            state.guarded(USERS_TABLE, Operation::Update, put(replace_user_roles)),
        )
        .route(
            "/users/:id/grants",
            state.guarded(USERS_TABLE, Operation::Read, get(user_grants)),
        );

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    Router::new()
        .route("/graphql", post(graphql_handler))
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/health", get(health_handler))
        .merge(clients)
        .merge(users)
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(middleware::from_fn(extract_client_ip))
        .layer(Extension(state))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
