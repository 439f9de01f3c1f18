pub mod mutation;
pub mod query;

pub use mutation::*;
pub use query::*;

use crate::server::graphql::ResolverRegistry;

/// Add every `users` field to the registry. New passwords are hashed at
/// `password_cost`.
pub fn register_user_resolvers(registry: ResolverRegistry, password_cost: u32) -> ResolverRegistry {
    registry
        .query("user", UserQuery)
        .query("users", UsersQuery)
        .query("userGrants", UserGrantsQuery)
        .mutation("createUser", CreateUser::new(password_cost))
        .mutation("updateUser", UpdateUser)
        .mutation("deleteUser", DeleteUser)
        .mutation("updateRoles", UpdateRoles)
}
