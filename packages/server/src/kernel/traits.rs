// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only. The guard, the selection filter and the
// resolvers depend on these seams, never on Redis or Postgres directly.
//
// Naming convention: Base* for trait names (e.g., BaseTokenStore, BaseGrantRepository)

use anyhow::Result;
use async_trait::async_trait;

use crate::common::{AuthError, ClientId, FieldPermissionMap, Operation, PrincipalId, RoleId};
use crate::domains::auth::models::UserCredentials;
use crate::domains::clients::models::Client;
use crate::domains::users::models::{NewUser, RoleAssignment, TableGrants, User};

// =============================================================================
// Token Store (Infrastructure - session records)
// =============================================================================

#[async_trait]
pub trait BaseTokenStore: Send + Sync {
    /// Resolve a token to the principal that owns it.
    ///
    /// Empty, unknown, expired or unparseable records are `Unauthenticated`.
    /// Connectivity failures are `StoreUnavailable`.
    async fn validate(&self, token: &str) -> Result<PrincipalId, AuthError>;

    /// Store `token -> principal` for the configured lifespan, replacing any
    /// previous record for the same token value.
    async fn issue(&self, principal: PrincipalId, token: &str) -> Result<(), AuthError>;

    /// Delete the record. `NotFound` if there was none.
    async fn revoke(&self, token: &str) -> Result<(), AuthError>;
}

// =============================================================================
// Grant Repository (Infrastructure - roles, table grants, field permissions)
// =============================================================================

#[async_trait]
pub trait BaseGrantRepository: Send + Sync {
    /// Whether any role held by `principal` allows `operation` on `table`.
    async fn has_grant(
        &self,
        principal: PrincipalId,
        table: &str,
        operation: Operation,
    ) -> Result<bool, AuthError>;

    /// Union of the field permissions of every role held by `principal` under
    /// the permission scope `scope`.
    async fn field_permissions(
        &self,
        principal: PrincipalId,
        scope: &str,
    ) -> Result<FieldPermissionMap, AuthError>;

    /// Grant check for a free-form verb. Verbs outside the four CRUD
    /// operations are never granted.
    async fn has_grant_for_verb(
        &self,
        principal: PrincipalId,
        table: &str,
        verb: &str,
    ) -> Result<bool, AuthError> {
        match Operation::parse(verb) {
            Some(operation) => self.has_grant(principal, table, operation).await,
            None => Ok(false),
        }
    }
}

// =============================================================================
// Client Store (Infrastructure - rows of `clients`)
// =============================================================================

#[async_trait]
pub trait BaseClientStore: Send + Sync {
    /// Clients ordered by id. `limit = None` returns every row after `offset`.
    async fn list(&self, offset: i64, limit: Option<i64>) -> Result<Vec<Client>>;

    async fn find_by_id(&self, id: ClientId) -> Result<Option<Client>>;

    async fn create(&self, name: &str) -> Result<Client>;

    /// Returns the number of rows updated.
    async fn update(&self, id: ClientId, name: &str) -> Result<u64>;

    /// Returns the number of rows deleted.
    async fn delete(&self, id: ClientId) -> Result<u64>;
}

// =============================================================================
// User Store (Infrastructure - rows of `users` and their roles)
// =============================================================================

#[async_trait]
pub trait BaseUserStore: Send + Sync {
    /// Credentials for login. Lookup failures are `Repository` errors.
    async fn find_credentials(&self, email: &str) -> Result<Option<UserCredentials>, AuthError>;

    /// Users ordered by id. `limit = None` returns every row after `offset`.
    async fn list(&self, offset: i64, limit: Option<i64>) -> Result<Vec<User>>;

    async fn find_by_id(&self, id: PrincipalId) -> Result<Option<User>>;

    /// `None` if the email is already registered.
    async fn create(&self, user: NewUser) -> Result<Option<User>>;

    /// `None` if there is no such user.
    async fn update(&self, id: PrincipalId, name: &str) -> Result<Option<User>>;

    /// Returns the deleted row, `None` if there was none.
    async fn delete(&self, id: PrincipalId) -> Result<Option<User>>;

    /// Replace the user's roles with exactly `roles`.
    async fn replace_roles(&self, id: PrincipalId, roles: &[RoleId]) -> Result<RoleAssignment>;

    /// Table grants the user holds through any role, ordered by table.
    async fn grants(&self, id: PrincipalId) -> Result<Vec<TableGrants>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::MockGrantRepository;

    #[tokio::test]
    async fn test_grant_for_verb_parses_crud_verbs_only() {
        let repo = MockGrantRepository::new().with_grant(5, "clients", Operation::Delete);
        let principal = PrincipalId::new(5);

        assert!(repo.has_grant_for_verb(principal, "clients", "delete").await.unwrap());
        assert!(!repo.has_grant_for_verb(principal, "clients", "read").await.unwrap());
        assert!(!repo.has_grant_for_verb(principal, "clients", "truncate").await.unwrap());
        assert!(!repo.has_grant_for_verb(principal, "clients", "DELETE").await.unwrap());

        // Unknown verbs never reach the repository.
        let checked: Vec<_> = repo.grant_calls().into_iter().map(|c| c.operation).collect();
        assert_eq!(checked, vec![Operation::Delete, Operation::Read]);
    }

    #[tokio::test]
    async fn test_grant_for_verb_propagates_repository_failures() {
        let repo = MockGrantRepository::new().failing();

        assert!(matches!(
            repo.has_grant_for_verb(PrincipalId::new(1), "clients", "read").await,
            Err(AuthError::Repository(_))
        ));
        assert!(!repo
            .has_grant_for_verb(PrincipalId::new(1), "clients", "drop")
            .await
            .unwrap());
    }
}
