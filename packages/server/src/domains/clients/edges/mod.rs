pub mod mutation;
pub mod query;

pub use mutation::*;
pub use query::*;

use crate::server::graphql::ResolverRegistry;

/// Add every `clients` field to the registry.
pub fn register_client_resolvers(registry: ResolverRegistry) -> ResolverRegistry {
    registry
        .query("client", ClientQuery)
        .query("clients", ClientsQuery)
        .mutation("create", CreateClient)
        .mutation("update", UpdateClient)
        .mutation("delete", DeleteClient)
}
