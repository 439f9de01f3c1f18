use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::{Operation, PrincipalId, RoleId};

/// User model - the public columns of `users`
///
/// The password hash never leaves the database through this type; login reads
/// it via `UserCredentials`.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: PrincipalId,
    pub name: String,
    pub email: String,
}

/// Row to insert. `password_hash` is already a bcrypt hash.
#[derive(Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("name", &self.name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Operations a user may perform on one table, merged across all of their roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableGrants {
    pub table: String,
    pub operations: Vec<Operation>,
}

impl TableGrants {
    /// Build from the four grant flags, in `read, create, update, delete` order.
    pub fn from_flags(table: impl Into<String>, flags: [bool; 4]) -> Self {
        Self {
            table: table.into(),
            operations: Operation::ALL
                .into_iter()
                .zip(flags)
                .filter_map(|(op, allowed)| allowed.then_some(op))
                .collect(),
        }
    }
}

/// Outcome of replacing a user's roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleAssignment {
    Assigned(User),
    UnknownUser,
    /// At least one role id has no row; nothing was changed.
    UnknownRoles,
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl User {
    /// Page through users ordered by id. A `None` limit binds NULL (no limit).
    pub async fn find_page(offset: i64, limit: Option<i64>, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT id, name, email FROM users ORDER BY id LIMIT $2 OFFSET $1",
        )
        .bind(offset)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: PrincipalId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT id, name, email FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Insert a user. `None` when the email is already taken.
    pub async fn insert(user: &NewUser, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO users (name, email, password)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, name, email
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Rename a user, returning the updated row
    pub async fn update_name(id: PrincipalId, name: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "UPDATE users SET name = $1 WHERE id = $2 RETURNING id, name, email",
        )
        .bind(name)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Delete a user, returning the row as it was
    pub async fn delete(id: PrincipalId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("DELETE FROM users WHERE id = $1 RETURNING id, name, email")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Replace every role of a user in one transaction.
    pub async fn replace_roles(
        id: PrincipalId,
        roles: &[RoleId],
        pool: &PgPool,
    ) -> Result<RoleAssignment> {
        let mut roles = roles.to_vec();
        roles.sort();
        roles.dedup();

        let mut tx = pool.begin().await?;

        let Some(user) = sqlx::query_as::<_, Self>(
            "SELECT id, name, email FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(RoleAssignment::UnknownUser);
        };

        let known = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM roles WHERE id = ANY($1)")
            .bind(&roles)
            .fetch_one(&mut *tx)
            .await?;
        if known != roles.len() as i64 {
            return Ok(RoleAssignment::UnknownRoles);
        }

        sqlx::query("DELETE FROM userroles WHERE userid = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO userroles (userid, roleid) SELECT $1, UNNEST($2::int[])")
            .bind(id)
            .bind(&roles)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(RoleAssignment::Assigned(user))
    }

    /// Table grants of every role the user holds, one entry per table
    pub async fn grants(id: PrincipalId, pool: &PgPool) -> Result<Vec<TableGrants>> {
        let rows = sqlx::query_as::<_, (String, Option<bool>, Option<bool>, Option<bool>, Option<bool>)>(
            r#"
            SELECT g.ontable, bool_or(g.read), bool_or(g."create"), bool_or(g.update), bool_or(g.delete)
            FROM userroles ur
            JOIN grants g ON g.roleid = ur.roleid
            WHERE ur.userid = $1
            GROUP BY g.ontable
            ORDER BY g.ontable
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(table, read, create, update, delete)| {
                TableGrants::from_flags(
                    table,
                    [read, create, update, delete].map(|flag| flag.unwrap_or(false)),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_grants_list_allowed_operations_in_order() {
        let grants = TableGrants::from_flags("clients", [true, false, false, true]);
        assert_eq!(grants.operations, vec![Operation::Read, Operation::Delete]);
        assert_eq!(
            serde_json::to_value(&grants).unwrap(),
            json!({ "table": "clients", "operations": ["read", "delete"] })
        );
        assert!(TableGrants::from_flags("users", [false; 4]).operations.is_empty());
    }

    #[test]
    fn test_new_user_debug_hides_the_hash() {
        let user = NewUser {
            name: "Ada".to_string(),
            email: "ada@example.org".to_string(),
            password_hash: "$2b$04$secret".to_string(),
        };
        assert!(!format!("{:?}", user).contains("secret"));
    }
}
