//! Login action

use tracing::{error, info, warn};

use crate::common::{AuthError, PrincipalId};
use crate::kernel::ServerDeps;
use crate::server::auth::{generate_token, SessionToken};

/// Result of a login attempt
#[derive(Debug)]
pub enum LoginResult {
    Issued {
        principal: PrincipalId,
        token: SessionToken,
    },
    /// Unknown email or wrong password; the caller cannot tell which.
    Rejected,
}

/// Check a password against the stored bcrypt hash and open a session.
///
/// Hash verification runs on the blocking pool.
pub async fn login(email: &str, password: &str, deps: &ServerDeps) -> Result<LoginResult, AuthError> {
    if email.is_empty() || password.is_empty() {
        return Err(AuthError::malformed("email and password are required"));
    }

    let Some(user) = deps.users.find_credentials(email).await? else {
        info!("Login rejected: unknown email");
        return Ok(LoginResult::Rejected);
    };

    let password = password.to_string();
    let hash = user.password_hash.clone();
    let verified = match tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await
    {
        Ok(Ok(verified)) => verified,
        Ok(Err(e)) => {
            warn!(principal_id = %user.id, error = %e, "Stored password hash is unreadable");
            false
        }
        Err(e) => {
            error!(error = %e, "Password verification task failed");
            false
        }
    };

    if !verified {
        info!(principal_id = %user.id, "Login rejected: wrong password");
        return Ok(LoginResult::Rejected);
    }

    let token = generate_token();
    deps.token_store.issue(user.id, &token).await?;
    info!(principal_id = %user.id, "Session issued");

    Ok(LoginResult::Issued {
        principal: user.id,
        token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::{MockUserStore, TestDependencies};
    use crate::kernel::BaseTokenStore;

    fn deps() -> ServerDeps {
        TestDependencies::new()
            .mock_users(MockUserStore::new().with_user(7, "ada@example.org", "correct horse"))
            .into_server_deps()
    }

    #[tokio::test]
    async fn test_login_issues_a_valid_token() {
        let deps = deps();

        let result = login("ada@example.org", "correct horse", &deps).await.unwrap();

        let LoginResult::Issued { principal, token } = result else {
            panic!("expected a session");
        };
        assert_eq!(principal, PrincipalId::new(7));
        assert_eq!(deps.token_store.validate(&token).await.unwrap(), principal);
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email_are_rejected() {
        let deps = deps();

        assert!(matches!(
            login("ada@example.org", "wrong", &deps).await.unwrap(),
            LoginResult::Rejected
        ));
        assert!(matches!(
            login("bob@example.org", "correct horse", &deps).await.unwrap(),
            LoginResult::Rejected
        ));
    }

    #[tokio::test]
    async fn test_empty_credentials_are_malformed() {
        assert!(matches!(
            login("", "pw", &deps()).await,
            Err(AuthError::MalformedRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_token_store_outage_fails_login() {
        let deps = TestDependencies::new()
            .mock_users(MockUserStore::new().with_user(7, "ada@example.org", "pw"))
            .into_server_deps_with_store_down();

        assert!(matches!(
            login("ada@example.org", "pw", &deps).await,
            Err(AuthError::StoreUnavailable(_))
        ));
    }
}
