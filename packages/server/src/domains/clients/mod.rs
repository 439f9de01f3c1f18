//! Clients domain - the `clients` table behind GraphQL and REST
pub mod edges;
pub mod models;

pub use edges::register_client_resolvers;
pub use models::Client;

/// Table name used for grant checks.
pub const TABLE: &str = "clients";
