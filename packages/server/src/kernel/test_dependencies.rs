// TestDependencies - mock implementations for testing
//
// Provides in-memory doubles for every Base* trait, plus a spy resolver, so the
// guard, the selection filter and the executor can be tested without Redis or
// Postgres.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use redis::{ErrorKind, RedisError};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::{BaseClientStore, BaseGrantRepository, BaseTokenStore, BaseUserStore, ServerDeps};
use crate::common::{AuthError, ClientId, FieldPermissionMap, Operation, PrincipalId, RoleId};
use crate::domains::auth::models::UserCredentials;
use crate::domains::clients::models::Client;
use crate::domains::users::models::{NewUser, RoleAssignment, TableGrants, User};
use crate::server::auth::MemoryTokenStore;
use crate::server::graphql::{Arguments, ResolveError, Resolver, ResolverContext, SelectionNode};

// =============================================================================
// Mock Grant Repository
// =============================================================================

/// Arguments captured from a `has_grant` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantCall {
    pub principal: PrincipalId,
    pub table: String,
    pub operation: Operation,
}

#[derive(Default)]
struct GrantState {
    grants: HashSet<(PrincipalId, String, Operation)>,
    fields: HashMap<(PrincipalId, String), FieldPermissionMap>,
    failing: bool,
    failing_scopes: HashSet<String>,
    grant_calls: Vec<GrantCall>,
    field_calls: Vec<String>,
}

pub struct MockGrantRepository {
    state: Arc<Mutex<GrantState>>,
}

impl MockGrantRepository {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(GrantState::default())),
        }
    }

    /// Give `principal` a role allowing `operation` on `table`
    pub fn with_grant(self, principal: i32, table: &str, operation: Operation) -> Self {
        self.state.lock().unwrap().grants.insert((
            PrincipalId::new(principal),
            table.to_string(),
            operation,
        ));
        self
    }

    /// Allow every listed field under `scope`
    pub fn with_fields(mut self, principal: i32, scope: &str, fields: &[&str]) -> Self {
        for field in fields {
            self = self.with_field_rule(principal, scope, field, true);
        }
        self
    }

    /// Record an explicit allow/deny row for one field under `scope`
    pub fn with_field_rule(self, principal: i32, scope: &str, field: &str, allowed: bool) -> Self {
        self.state
            .lock()
            .unwrap()
            .fields
            .entry((PrincipalId::new(principal), scope.to_string()))
            .or_default()
            .merge(field, allowed);
        self
    }

    /// Make every lookup fail as if the database were unreachable
    pub fn failing(self) -> Self {
        self.state.lock().unwrap().failing = true;
        self
    }

    /// Make field lookups for one scope fail
    pub fn with_failing_scope(self, scope: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_scopes
            .insert(scope.to_string());
        self
    }

    /// Get all grant checks that were made
    pub fn grant_calls(&self) -> Vec<GrantCall> {
        self.state.lock().unwrap().grant_calls.clone()
    }

    /// Get the scopes of all field permission lookups, in call order
    pub fn field_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().field_calls.clone()
    }
}

impl Default for MockGrantRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn repository_down() -> AuthError {
    AuthError::Repository(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl BaseGrantRepository for MockGrantRepository {
    async fn has_grant(
        &self,
        principal: PrincipalId,
        table: &str,
        operation: Operation,
    ) -> Result<bool, AuthError> {
        let mut state = self.state.lock().unwrap();
        state.grant_calls.push(GrantCall {
            principal,
            table: table.to_string(),
            operation,
        });
        if state.failing {
            return Err(repository_down());
        }
        Ok(state
            .grants
            .contains(&(principal, table.to_string(), operation)))
    }

    async fn field_permissions(
        &self,
        principal: PrincipalId,
        scope: &str,
    ) -> Result<FieldPermissionMap, AuthError> {
        let mut state = self.state.lock().unwrap();
        state.field_calls.push(scope.to_string());
        if state.failing || state.failing_scopes.contains(scope) {
            return Err(repository_down());
        }
        Ok(state
            .fields
            .get(&(principal, scope.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

// =============================================================================
// Failing Token Store
// =============================================================================

/// Token store whose backend is unreachable
pub struct FailingTokenStore;

fn connection_refused() -> AuthError {
    AuthError::StoreUnavailable(RedisError::from((
        ErrorKind::IoError,
        "connection refused",
    )))
}

#[async_trait]
impl BaseTokenStore for FailingTokenStore {
    async fn validate(&self, _token: &str) -> Result<PrincipalId, AuthError> {
        Err(connection_refused())
    }

    async fn issue(&self, _principal: PrincipalId, _token: &str) -> Result<(), AuthError> {
        Err(connection_refused())
    }

    async fn revoke(&self, _token: &str) -> Result<(), AuthError> {
        Err(connection_refused())
    }
}

// =============================================================================
// Mock Client Store
// =============================================================================

pub struct MockClientStore {
    rows: Arc<Mutex<Vec<Client>>>,
    next_id: Arc<Mutex<i32>>,
    failing: bool,
}

impl MockClientStore {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(Mutex::new(1)),
            failing: false,
        }
    }

    /// Seed a row; ids are assigned in insertion order
    pub fn with_client(self, name: &str) -> Self {
        self.insert(name);
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Snapshot of all rows
    pub fn rows(&self) -> Vec<Client> {
        self.rows.lock().unwrap().clone()
    }

    fn insert(&self, name: &str) -> Client {
        let mut next_id = self.next_id.lock().unwrap();
        let client = Client {
            id: ClientId::new(*next_id),
            name: name.to_string(),
        };
        *next_id += 1;
        self.rows.lock().unwrap().push(client.clone());
        client
    }

    fn check(&self) -> Result<()> {
        if self.failing {
            return Err(anyhow!("clients table unavailable"));
        }
        Ok(())
    }
}

impl Default for MockClientStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseClientStore for MockClientStore {
    async fn list(&self, offset: i64, limit: Option<i64>) -> Result<Vec<Client>> {
        self.check()?;
        let rows = self.rows.lock().unwrap();
        let skip = offset.max(0) as usize;
        let take = limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(rows.iter().skip(skip).take(take).cloned().collect())
    }

    async fn find_by_id(&self, id: ClientId) -> Result<Option<Client>> {
        self.check()?;
        Ok(self.rows.lock().unwrap().iter().find(|c| c.id == id).cloned())
    }

    async fn create(&self, name: &str) -> Result<Client> {
        self.check()?;
        Ok(self.insert(name))
    }

    async fn update(&self, id: ClientId, name: &str) -> Result<u64> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|c| c.id == id) {
            Some(row) => {
                row.name = name.to_string();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete(&self, id: ClientId) -> Result<u64> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|c| c.id != id);
        Ok((before - rows.len()) as u64)
    }
}

// =============================================================================
// Mock User Store
// =============================================================================

struct MockUser {
    user: User,
    password_hash: String,
    roles: Vec<RoleId>,
}

#[derive(Default)]
struct UserState {
    rows: Vec<MockUser>,
    roles: HashMap<RoleId, Vec<(String, Operation)>>,
    failing: bool,
}

pub struct MockUserStore {
    state: Arc<Mutex<UserState>>,
}

impl MockUserStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(UserState::default())),
        }
    }

    /// Add a user with a bcrypt hash of `password` (minimum cost, tests only)
    pub fn with_user(self, id: i32, email: &str, password: &str) -> Self {
        let password_hash = bcrypt::hash(password, 4).expect("bcrypt hash");
        self.state.lock().unwrap().rows.push(MockUser {
            user: User {
                id: PrincipalId::new(id),
                name: String::new(),
                email: email.to_string(),
            },
            password_hash,
            roles: Vec::new(),
        });
        self
    }

    /// Define a role and the table grants it carries
    pub fn with_role(self, role: i32, grants: &[(&str, Operation)]) -> Self {
        self.state.lock().unwrap().roles.insert(
            RoleId::new(role),
            grants
                .iter()
                .map(|(table, op)| (table.to_string(), *op))
                .collect(),
        );
        self
    }

    pub fn failing(self) -> Self {
        self.state.lock().unwrap().failing = true;
        self
    }

    /// Snapshot of all rows
    pub fn rows(&self) -> Vec<User> {
        self.state
            .lock()
            .unwrap()
            .rows
            .iter()
            .map(|row| row.user.clone())
            .collect()
    }

    pub fn roles_of(&self, id: i32) -> Vec<RoleId> {
        self.state
            .lock()
            .unwrap()
            .rows
            .iter()
            .find(|row| row.user.id == PrincipalId::new(id))
            .map(|row| row.roles.clone())
            .unwrap_or_default()
    }

    /// Stored hash for `email`, if the user exists
    pub fn password_hash(&self, email: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .rows
            .iter()
            .find(|row| row.user.email == email)
            .map(|row| row.password_hash.clone())
    }

    fn available(&self) -> Result<std::sync::MutexGuard<'_, UserState>> {
        let state = self.state.lock().unwrap();
        if state.failing {
            return Err(anyhow!("users table unavailable"));
        }
        Ok(state)
    }
}

impl Default for MockUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseUserStore for MockUserStore {
    async fn find_credentials(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, AuthError> {
        let state = self.state.lock().unwrap();
        if state.failing {
            return Err(repository_down());
        }
        Ok(state
            .rows
            .iter()
            .find(|row| row.user.email == email)
            .map(|row| UserCredentials {
                id: row.user.id,
                email: row.user.email.clone(),
                password_hash: row.password_hash.clone(),
            }))
    }

    async fn list(&self, offset: i64, limit: Option<i64>) -> Result<Vec<User>> {
        let state = self.available()?;
        let skip = offset.max(0) as usize;
        let take = limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(state
            .rows
            .iter()
            .skip(skip)
            .take(take)
            .map(|row| row.user.clone())
            .collect())
    }

    async fn find_by_id(&self, id: PrincipalId) -> Result<Option<User>> {
        let state = self.available()?;
        Ok(state
            .rows
            .iter()
            .find(|row| row.user.id == id)
            .map(|row| row.user.clone()))
    }

    async fn create(&self, user: NewUser) -> Result<Option<User>> {
        let mut state = self.available()?;
        if state.rows.iter().any(|row| row.user.email == user.email) {
            return Ok(None);
        }
        let next_id = state.rows.iter().map(|row| row.user.id.get()).max().unwrap_or(0) + 1;
        let created = User {
            id: PrincipalId::new(next_id),
            name: user.name,
            email: user.email,
        };
        state.rows.push(MockUser {
            user: created.clone(),
            password_hash: user.password_hash,
            roles: Vec::new(),
        });
        Ok(Some(created))
    }

    async fn update(&self, id: PrincipalId, name: &str) -> Result<Option<User>> {
        let mut state = self.available()?;
        Ok(state
            .rows
            .iter_mut()
            .find(|row| row.user.id == id)
            .map(|row| {
                row.user.name = name.to_string();
                row.user.clone()
            }))
    }

    async fn delete(&self, id: PrincipalId) -> Result<Option<User>> {
        let mut state = self.available()?;
        let index = state.rows.iter().position(|row| row.user.id == id);
        Ok(index.map(|i| state.rows.remove(i).user))
    }

    async fn replace_roles(&self, id: PrincipalId, roles: &[RoleId]) -> Result<RoleAssignment> {
        let mut state = self.available()?;
        let known = roles.iter().all(|role| state.roles.contains_key(role));
        let Some(row) = state.rows.iter_mut().find(|row| row.user.id == id) else {
            return Ok(RoleAssignment::UnknownUser);
        };
        if !known {
            return Ok(RoleAssignment::UnknownRoles);
        }
        let mut roles = roles.to_vec();
        roles.sort();
        roles.dedup();
        row.roles = roles;
        Ok(RoleAssignment::Assigned(row.user.clone()))
    }

    async fn grants(&self, id: PrincipalId) -> Result<Vec<TableGrants>> {
        let state = self.available()?;
        let Some(row) = state.rows.iter().find(|row| row.user.id == id) else {
            return Ok(Vec::new());
        };
        let mut tables: BTreeMap<&str, [bool; 4]> = BTreeMap::new();
        for (table, operation) in row.roles.iter().filter_map(|r| state.roles.get(r)).flatten() {
            let flags = tables.entry(table.as_str()).or_default();
            if let Some(i) = Operation::ALL.iter().position(|op| op == operation) {
                flags[i] = true;
            }
        }
        Ok(tables
            .into_iter()
            .map(|(table, flags)| TableGrants::from_flags(table, flags))
            .collect())
    }
}

// =============================================================================
// Spy Resolver
// =============================================================================

/// Resolver that records every invocation and returns a canned value
pub struct SpyResolver {
    table: &'static str,
    operation: Operation,
    response: Value,
    returns_object: bool,
    calls: Arc<Mutex<Vec<SelectionNode>>>,
}

impl SpyResolver {
    pub fn new(table: &'static str, operation: Operation) -> Self {
        Self {
            table,
            operation,
            response: json!(null),
            returns_object: true,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_response(mut self, response: Value) -> Self {
        self.response = response;
        self
    }

    /// Declare the field scalar, so it is queried without a selection set
    pub fn returning_scalar(mut self) -> Self {
        self.returns_object = false;
        self
    }

    /// Shared handle on the recorded calls, usable after the spy is registered
    pub fn calls_handle(&self) -> Arc<Mutex<Vec<SelectionNode>>> {
        self.calls.clone()
    }

    /// Get the selections the resolver was invoked with
    pub fn calls(&self) -> Vec<SelectionNode> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Resolver for SpyResolver {
    type Args = Arguments;

    fn table(&self) -> &str {
        self.table
    }

    fn operation(&self) -> Operation {
        self.operation
    }

    fn returns_object(&self) -> bool {
        self.returns_object
    }

    async fn resolve(
        &self,
        _ctx: &ResolverContext,
        _args: Arguments,
        field: &SelectionNode,
    ) -> Result<Value, ResolveError> {
        self.calls.lock().unwrap().push(field.clone());
        Ok(self.response.clone())
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub token_store: Arc<MemoryTokenStore>,
    pub grants: Arc<MockGrantRepository>,
    pub clients: Arc<MockClientStore>,
    pub users: Arc<MockUserStore>,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            token_store: Arc::new(MemoryTokenStore::new()),
            grants: Arc::new(MockGrantRepository::new()),
            clients: Arc::new(MockClientStore::new()),
            users: Arc::new(MockUserStore::new()),
        }
    }

    /// Set a mock grant repository
    pub fn mock_grants(mut self, grants: MockGrantRepository) -> Self {
        self.grants = Arc::new(grants);
        self
    }

    /// Set a mock client store
    pub fn mock_clients(mut self, clients: MockClientStore) -> Self {
        self.clients = Arc::new(clients);
        self
    }

    /// Set a mock user store
    pub fn mock_users(mut self, users: MockUserStore) -> Self {
        self.users = Arc::new(users);
        self
    }

    /// Issue `token` for `principal` in the in-memory token store
    pub async fn with_session(self, principal: i32, token: &str) -> Self {
        self.token_store
            .issue(PrincipalId::new(principal), token)
            .await
            .expect("in-memory issue");
        self
    }

    /// Convert to ServerDeps for use with the guard, filter and resolvers
    pub fn into_server_deps(self) -> ServerDeps {
        ServerDeps::new(self.token_store, self.grants, self.clients, self.users)
    }

    /// Same, but with a token store that cannot be reached
    pub fn into_server_deps_with_store_down(self) -> ServerDeps {
        ServerDeps::new(
            Arc::new(FailingTokenStore),
            self.grants,
            self.clients,
            self.users,
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
