//! Users domain - account management behind GraphQL and REST
//!
//! Accounts, their role assignments and a read-only view of the grants those
//! roles carry. Every field is guarded on the `users` table.
pub mod edges;
pub mod models;

pub use edges::register_user_resolvers;
pub use models::User;

/// Table name used for grant checks.
pub const TABLE: &str = "users";
