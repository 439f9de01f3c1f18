//! Server dependencies (using traits for testability)
//!
//! This module provides the central dependency container handed to the guard,
//! the selection filter and every resolver. All external services sit behind
//! trait objects so tests can swap in the doubles from `test_dependencies`.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

use crate::common::{AuthError, ClientId, FieldPermissionMap, Operation, PrincipalId, RoleId};
use crate::domains::auth::models::{FieldPermission, Grant, UserCredentials};
use crate::domains::clients::models::Client;
use crate::domains::users::models::{NewUser, RoleAssignment, TableGrants, User};
use crate::kernel::{BaseClientStore, BaseGrantRepository, BaseTokenStore, BaseUserStore};

// =============================================================================
// Postgres adapters (implement the Base* traits over the SQL models)
// =============================================================================

/// Grant repository over the `userroles` / `grants` / `field_permissions` tables
#[derive(Clone)]
pub struct PostgresGrantRepository {
    pool: PgPool,
}

impl PostgresGrantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseGrantRepository for PostgresGrantRepository {
    async fn has_grant(
        &self,
        principal: PrincipalId,
        table: &str,
        operation: Operation,
    ) -> Result<bool, AuthError> {
        Ok(Grant::exists(principal, table, operation, &self.pool).await?)
    }

    async fn field_permissions(
        &self,
        principal: PrincipalId,
        scope: &str,
    ) -> Result<FieldPermissionMap, AuthError> {
        Ok(FieldPermission::for_scope(principal, scope, &self.pool).await?)
    }
}

/// Client store over the `clients` table
#[derive(Clone)]
pub struct PostgresClientStore {
    pool: PgPool,
}

impl PostgresClientStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseClientStore for PostgresClientStore {
    async fn list(&self, offset: i64, limit: Option<i64>) -> Result<Vec<Client>> {
        Client::find_page(offset, limit, &self.pool).await
    }

    async fn find_by_id(&self, id: ClientId) -> Result<Option<Client>> {
        Client::find_by_id(id, &self.pool).await
    }

    async fn create(&self, name: &str) -> Result<Client> {
        Client::insert(name, &self.pool).await
    }

    async fn update(&self, id: ClientId, name: &str) -> Result<u64> {
        Client::update_name(id, name, &self.pool).await
    }

    async fn delete(&self, id: ClientId) -> Result<u64> {
        Client::delete(id, &self.pool).await
    }
}

/// User store over the `users` and `userroles` tables
#[derive(Clone)]
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseUserStore for PostgresUserStore {
    async fn find_credentials(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, AuthError> {
        Ok(UserCredentials::find_by_email(email, &self.pool).await?)
    }

    async fn list(&self, offset: i64, limit: Option<i64>) -> Result<Vec<User>> {
        User::find_page(offset, limit, &self.pool).await
    }

    async fn find_by_id(&self, id: PrincipalId) -> Result<Option<User>> {
        User::find_by_id(id, &self.pool).await
    }

    async fn create(&self, user: NewUser) -> Result<Option<User>> {
        User::insert(&user, &self.pool).await
    }

    async fn update(&self, id: PrincipalId, name: &str) -> Result<Option<User>> {
        User::update_name(id, name, &self.pool).await
    }

    async fn delete(&self, id: PrincipalId) -> Result<Option<User>> {
        User::delete(id, &self.pool).await
    }

    async fn replace_roles(&self, id: PrincipalId, roles: &[RoleId]) -> Result<RoleAssignment> {
        User::replace_roles(id, roles, &self.pool).await
    }

    async fn grants(&self, id: PrincipalId) -> Result<Vec<TableGrants>> {
        User::grants(id, &self.pool).await
    }
}

// =============================================================================
// ServerDeps
// =============================================================================

/// Dependencies shared by every request (using traits for testability)
///
/// Built once at startup and passed explicitly; nothing here is global.
#[derive(Clone)]
pub struct ServerDeps {
    pub token_store: Arc<dyn BaseTokenStore>,
    pub grants: Arc<dyn BaseGrantRepository>,
    pub clients: Arc<dyn BaseClientStore>,
    pub users: Arc<dyn BaseUserStore>,
}

impl ServerDeps {
    pub fn new(
        token_store: Arc<dyn BaseTokenStore>,
        grants: Arc<dyn BaseGrantRepository>,
        clients: Arc<dyn BaseClientStore>,
        users: Arc<dyn BaseUserStore>,
    ) -> Self {
        Self {
            token_store,
            grants,
            clients,
            users,
        }
    }

    /// Production wiring: Redis sessions, Postgres for everything else.
    pub fn postgres(pool: PgPool, token_store: Arc<dyn BaseTokenStore>) -> Self {
        Self::new(
            token_store,
            Arc::new(PostgresGrantRepository::new(pool.clone())),
            Arc::new(PostgresClientStore::new(pool.clone())),
            Arc::new(PostgresUserStore::new(pool)),
        )
    }
}
