//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod test_dependencies;
pub mod token_store;
pub mod traits;

pub use deps::{PostgresClientStore, PostgresGrantRepository, PostgresUserStore, ServerDeps};
pub use test_dependencies::TestDependencies;
pub use token_store::{RedisTokenStore, DEFAULT_TOKEN_LIFESPAN};
pub use traits::*;
