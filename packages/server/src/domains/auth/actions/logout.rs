//! Logout action

use tracing::info;

use crate::common::AuthError;
use crate::kernel::ServerDeps;
use crate::server::auth::extract_token;

/// Revoke the session named by the credential header.
///
/// A missing token or one with no session is the caller's mistake, so both
/// come back as `MalformedRequest`.
pub async fn logout(credential: Option<&str>, deps: &ServerDeps) -> Result<(), AuthError> {
    let token =
        extract_token(credential).map_err(|_| AuthError::malformed("missing session token"))?;

    match deps.token_store.revoke(token).await {
        Ok(()) => {
            info!("Session revoked");
            Ok(())
        }
        Err(AuthError::NotFound) => Err(AuthError::malformed("unknown session token")),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::TestDependencies;
    use crate::kernel::BaseTokenStore;

    #[tokio::test]
    async fn test_logout_revokes_once() {
        let deps = TestDependencies::new()
            .with_session(5, "tok")
            .await
            .into_server_deps();

        logout(Some("Bearer tok"), &deps).await.unwrap();
        assert!(deps.token_store.validate("tok").await.is_err());

        assert!(matches!(
            logout(Some("Bearer tok"), &deps).await,
            Err(AuthError::MalformedRequest(_))
        ));
        assert!(matches!(
            logout(None, &deps).await,
            Err(AuthError::MalformedRequest(_))
        ));
    }
}
