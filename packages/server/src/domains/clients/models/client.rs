use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::ClientId;

/// Client model - SQL persistence layer
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl Client {
    /// Page through clients ordered by id. A `None` limit binds NULL, which
    /// Postgres treats as no limit.
    pub async fn find_page(offset: i64, limit: Option<i64>, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT id, name FROM clients ORDER BY id LIMIT $2 OFFSET $1")
            .bind(offset)
            .bind(limit)
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    /// Find client by ID
    pub async fn find_by_id(id: ClientId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT id, name FROM clients WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Insert new client
    pub async fn insert(name: &str, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>("INSERT INTO clients (name) VALUES ($1) RETURNING id, name")
            .bind(name)
            .fetch_one(pool)
            .await
            .map_err(Into::into)
    }

    /// Rename a client, returning the number of rows touched
    pub async fn update_name(id: ClientId, name: &str, pool: &PgPool) -> Result<u64> {
        let result = sqlx::query("UPDATE clients SET name = $1 WHERE id = $2")
            .bind(name)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete a client, returning the number of rows touched
    pub async fn delete(id: ClientId, pool: &PgPool) -> Result<u64> {
        let result = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
