use sqlx::PgPool;

use crate::common::PrincipalId;

/// Login credentials of a user.
///
/// `password_hash` is a bcrypt hash; plaintext passwords are never stored.
#[derive(Clone, sqlx::FromRow)]
pub struct UserCredentials {
    pub id: PrincipalId,
    pub email: String,
    pub password_hash: String,
}

impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("id", &self.id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl UserCredentials {
    /// Find credentials by email
    pub async fn find_by_email(email: &str, pool: &PgPool) -> sqlx::Result<Option<Self>> {
        sqlx::query_as::<_, UserCredentials>(
            "SELECT id, email, password AS password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(pool)
        .await
    }
}
