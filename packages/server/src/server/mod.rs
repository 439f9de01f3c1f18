// HTTP server setup (Axum + GraphQL)
pub mod app;
pub mod auth;
pub mod graphql;
pub mod middleware;
pub mod routes;

pub use app::*;
pub use graphql::*;
