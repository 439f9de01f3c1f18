//! Redis-backed session token store.
//!
//! Each session is one key: the opaque token maps to an owner key `user:<id>`
//! with a fixed TTL. Expiry is Redis eviction; an evicted token looks exactly
//! like one that never existed.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::debug;

use crate::common::{AuthError, PrincipalId};
use crate::kernel::BaseTokenStore;

/// Session lifespan when none is configured.
pub const DEFAULT_TOKEN_LIFESPAN: Duration = Duration::from_secs(6 * 60 * 60);

const OWNER_PREFIX: &str = "user:";

/// Value stored under a token for `principal`.
pub fn owner_key(principal: PrincipalId) -> String {
    format!("{}{}", OWNER_PREFIX, principal)
}

/// Principal id encoded in a stored owner key.
pub fn parse_owner_key(value: &str) -> Option<PrincipalId> {
    value.strip_prefix(OWNER_PREFIX)?.parse().ok()
}

/// Token store over a shared Redis connection manager.
///
/// `ConnectionManager` is cheap to clone and multiplexes all requests over one
/// reconnecting connection, so no lock is held around any call.
#[derive(Clone)]
pub struct RedisTokenStore {
    conn: ConnectionManager,
    lifespan: Duration,
}

impl RedisTokenStore {
    pub async fn connect(redis_url: &str, lifespan: Duration) -> Result<Self, AuthError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn, lifespan })
    }
}

#[async_trait]
impl BaseTokenStore for RedisTokenStore {
    async fn validate(&self, token: &str) -> Result<PrincipalId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Unauthenticated);
        }

        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(token).await?;

        let value = value.ok_or(AuthError::Unauthenticated)?;
        parse_owner_key(&value).ok_or_else(|| {
            debug!("Session record has an unparseable owner key");
            AuthError::Unauthenticated
        })
    }

    async fn issue(&self, principal: PrincipalId, token: &str) -> Result<(), AuthError> {
        if token.is_empty() {
            return Err(AuthError::malformed("cannot issue an empty token"));
        }

        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(token, owner_key(principal), self.lifespan.as_secs())
            .await?;
        Ok(())
    }

    async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(token).await?;
        if removed == 0 {
            return Err(AuthError::NotFound);
        }
        Ok(())
    }
}
