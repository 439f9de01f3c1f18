use sqlx::PgPool;

use crate::common::{FieldPermissionMap, Operation, PrincipalId};

/// Table-level grants of the roles held by a principal.
///
/// A grant row is `(roleid, ontable, read, create, update, delete)`.
pub struct Grant;

/// Field-level permissions of the roles held by a principal.
///
/// A row is `(roleid, parent, field, allowed)`.
pub struct FieldPermission;

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl Grant {
    /// Column of `grants` holding the flag for an operation.
    ///
    /// Only these four literals are ever spliced into SQL.
    fn column(operation: Operation) -> &'static str {
        match operation {
            Operation::Read => "g.read",
            Operation::Create => "g.\"create\"",
            Operation::Update => "g.update",
            Operation::Delete => "g.delete",
        }
    }

    /// Whether any role of `principal` allows `operation` on `table`
    pub async fn exists(
        principal: PrincipalId,
        table: &str,
        operation: Operation,
        pool: &PgPool,
    ) -> sqlx::Result<bool> {
        let sql = format!(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM userroles ur
                JOIN grants g ON g.roleid = ur.roleid
                WHERE ur.userid = $1 AND g.ontable = $2 AND {} = true
            )
            "#,
            Self::column(operation)
        );

        sqlx::query_scalar::<_, bool>(&sql)
            .bind(principal)
            .bind(table)
            .fetch_one(pool)
            .await
    }
}

impl FieldPermission {
    /// Permissions under `parent`, merged across every role of `principal`
    pub async fn for_scope(
        principal: PrincipalId,
        parent: &str,
        pool: &PgPool,
    ) -> sqlx::Result<FieldPermissionMap> {
        let rows = sqlx::query_as::<_, (String, Option<bool>)>(
            r#"
            SELECT fp.field, bool_or(fp.allowed)
            FROM userroles ur
            JOIN field_permissions fp ON fp.roleid = ur.roleid
            WHERE ur.userid = $1 AND fp.parent = $2
            GROUP BY fp.field
            "#,
        )
        .bind(principal)
        .bind(parent)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(field, allowed)| (field, allowed.unwrap_or(false)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_operation_has_a_quoted_column() {
        assert_eq!(Grant::column(Operation::Read), "g.read");
        assert_eq!(Grant::column(Operation::Create), "g.\"create\"");
        assert_eq!(Grant::column(Operation::Update), "g.update");
        assert_eq!(Grant::column(Operation::Delete), "g.delete");
    }
}
