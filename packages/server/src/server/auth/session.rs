use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::common::{AuthError, PrincipalId};
use crate::kernel::token_store::{owner_key, parse_owner_key};
use crate::kernel::BaseTokenStore;

/// Opaque session token handed to the caller at login
pub type SessionToken = String;

/// Generate a new session token.
///
/// Two v4 UUIDs drawn from the OS generator (244 random bits), hex encoded.
/// Concurrent logins never need a lock: collisions are cryptographically
/// negligible.
pub fn generate_token() -> SessionToken {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

#[derive(Clone, Debug)]
struct SessionRecord {
    owner: String,
    expires_at: DateTime<Utc>,
}

/// In-memory token store
///
/// Same contract as the Redis store, for local development and tests. Expired
/// records are indistinguishable from missing ones.
pub struct MemoryTokenStore {
    sessions: Arc<RwLock<HashMap<SessionToken, SessionRecord>>>,
    lifespan: Duration,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::with_lifespan(Duration::hours(6))
    }

    pub fn with_lifespan(lifespan: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            lifespan,
        }
    }

    /// Store a raw owner value, bypassing the `user:<id>` encoding
    pub async fn insert_raw(&self, token: &str, owner: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            token.to_string(),
            SessionRecord {
                owner: owner.to_string(),
                expires_at: Utc::now() + self.lifespan,
            },
        );
    }

    /// Clean up expired sessions (run periodically)
    pub async fn cleanup_expired(&self) {
        let mut sessions = self.sessions.write().await;
        let now = Utc::now();
        sessions.retain(|_, record| record.expires_at > now);
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseTokenStore for MemoryTokenStore {
    async fn validate(&self, token: &str) -> Result<PrincipalId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Unauthenticated);
        }

        let sessions = self.sessions.read().await;
        let record = sessions.get(token).ok_or(AuthError::Unauthenticated)?;

        if Utc::now() >= record.expires_at {
            return Err(AuthError::Unauthenticated);
        }

        parse_owner_key(&record.owner).ok_or(AuthError::Unauthenticated)
    }

    async fn issue(&self, principal: PrincipalId, token: &str) -> Result<(), AuthError> {
        if token.is_empty() {
            return Err(AuthError::malformed("cannot issue an empty token"));
        }
        self.insert_raw(token, &owner_key(principal)).await;
        Ok(())
    }

    async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let mut sessions = self.sessions.write().await;
        match sessions.remove(token) {
            Some(record) if record.expires_at > Utc::now() => Ok(()),
            _ => Err(AuthError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_issue_validate_revoke_cycle() {
        let store = MemoryTokenStore::new();
        let principal = PrincipalId::new(42);
        let token = generate_token();

        assert!(matches!(
            store.validate(&token).await,
            Err(AuthError::Unauthenticated)
        ));

        store.issue(principal, &token).await.unwrap();
        assert_eq!(store.validate(&token).await.unwrap(), principal);

        store.revoke(&token).await.unwrap();
        assert!(matches!(
            store.validate(&token).await,
            Err(AuthError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_session_expiration() {
        let store = MemoryTokenStore::with_lifespan(Duration::zero());
        store.issue(PrincipalId::new(1), "short-lived").await.unwrap();

        let result = store.validate("short-lived").await;
        assert!(
            matches!(result, Err(AuthError::Unauthenticated)),
            "Expired session should be unauthenticated"
        );

        store.cleanup_expired().await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_revoke_missing_token() {
        let store = MemoryTokenStore::new();
        assert!(matches!(
            store.revoke("nope").await,
            Err(AuthError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_reissue_overwrites_mapping() {
        let store = MemoryTokenStore::new();
        store.issue(PrincipalId::new(1), "tok").await.unwrap();
        store.issue(PrincipalId::new(2), "tok").await.unwrap();
        assert_eq!(store.validate("tok").await.unwrap(), PrincipalId::new(2));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_and_garbled_records() {
        let store = MemoryTokenStore::new();
        assert!(matches!(
            store.validate("").await,
            Err(AuthError::Unauthenticated)
        ));

        store.insert_raw("garbled", "user:not-a-number").await;
        assert!(matches!(
            store.validate("garbled").await,
            Err(AuthError::Unauthenticated)
        ));

        assert!(matches!(
            store.issue(PrincipalId::new(1), "").await,
            Err(AuthError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_generated_tokens_are_unique_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
