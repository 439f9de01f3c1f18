use anyhow::{anyhow, bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::kernel::DEFAULT_TOKEN_LIFESPAN;
use crate::server::graphql::FieldScope;

const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub token_ttl: Duration,
    pub request_timeout: Duration,
    pub db_max_connections: u32,
    pub field_scope: FieldScope,
    /// bcrypt cost for passwords set through user management.
    pub password_cost: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup (the process environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            database_url: lookup("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string()),
            port: parse_or(&lookup, "PORT", 8080).context("PORT must be a valid number")?,
            token_ttl: seconds_or(&lookup, "TOKEN_TTL_SECS", DEFAULT_TOKEN_LIFESPAN.as_secs())?,
            request_timeout: seconds_or(&lookup, "REQUEST_TIMEOUT_SECS", 30)?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)
                .context("DB_MAX_CONNECTIONS must be a valid number")?,
            field_scope: match lookup("FIELD_PERMISSION_SCOPE") {
                Some(value) => value
                    .parse()
                    .map_err(|e: String| anyhow!(e))
                    .context("FIELD_PERMISSION_SCOPE is invalid")?,
                None => FieldScope::default(),
            },
            password_cost: password_cost(&lookup)?,
        })
    }
}

/// A strictly positive number of seconds.
fn seconds_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration> {
    let secs: u64 =
        parse_or(lookup, key, default).with_context(|| format!("{} must be a number of seconds", key))?;
    if secs == 0 {
        bail!("{} must be greater than zero", key);
    }
    Ok(Duration::from_secs(secs))
}

fn password_cost(lookup: &impl Fn(&str) -> Option<String>) -> Result<u32> {
    let cost = parse_or(lookup, "BCRYPT_COST", bcrypt::DEFAULT_COST)
        .context("BCRYPT_COST must be a valid number")?;
    if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
        bail!(
            "BCRYPT_COST must be between {} and {}, got {}",
            MIN_BCRYPT_COST,
            MAX_BCRYPT_COST,
            cost
        );
    }
    Ok(cost)
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => Ok(raw.trim().parse()?),
        None => Ok(default),
    }
}
