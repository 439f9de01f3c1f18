use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, error, info, Instrument};

use crate::common::{AuthError, Operation, Principal};
use crate::kernel::{BaseGrantRepository, BaseTokenStore, ServerDeps};
use crate::server::middleware::ClientIp;

/// Raw value of the credential header, if any.
pub fn credential_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

/// Pull the token out of the credential header.
///
/// Accepts `Bearer <token>` and, for older clients, a bare token with no
/// whitespace. Anything else is unparseable.
pub fn extract_token(credential: Option<&str>) -> Result<&str, AuthError> {
    let credential = credential.map(str::trim).unwrap_or_default();
    let token = match credential.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        Some(_) => return Err(AuthError::Unauthenticated),
        None => credential,
    };
    if token.is_empty()
        || token.eq_ignore_ascii_case("bearer")
        || token.contains(char::is_whitespace)
    {
        return Err(AuthError::Unauthenticated);
    }
    Ok(token)
}

/// Coarse table x operation gate.
///
/// Per request: `NoToken -> TokenPresent -> Authenticated -> Authorized |
/// Denied`. Every failure is terminal and nothing behind the guard runs.
#[derive(Clone)]
pub struct OperationGuard {
    token_store: Arc<dyn BaseTokenStore>,
    grants: Arc<dyn BaseGrantRepository>,
}

impl OperationGuard {
    pub fn new(token_store: Arc<dyn BaseTokenStore>, grants: Arc<dyn BaseGrantRepository>) -> Self {
        Self {
            token_store,
            grants,
        }
    }

    pub fn from_deps(deps: &ServerDeps) -> Self {
        Self::new(deps.token_store.clone(), deps.grants.clone())
    }

    /// Resolve the credential header to a principal.
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<Principal, AuthError> {
        let token = extract_token(credential).map_err(|e| {
            debug!("Rejected request without a usable token");
            e
        })?;

        match self.token_store.validate(token).await {
            Ok(id) => Ok(Principal::new(id)),
            Err(AuthError::Unauthenticated) => {
                info!("Rejected unknown or expired token");
                Err(AuthError::Unauthenticated)
            }
            Err(e) => {
                error!(error = %e, "Token validation failed");
                Err(e)
            }
        }
    }

    /// Check the `(table, operation)` grant for an authenticated principal.
    pub async fn authorize(
        &self,
        principal: &Principal,
        table: &str,
        operation: Operation,
    ) -> Result<(), AuthError> {
        match self.grants.has_grant(principal.id, table, operation).await {
            Ok(true) => {
                debug!(
                    principal_id = %principal.id,
                    table = table,
                    operation = %operation,
                    "Operation authorized"
                );
                Ok(())
            }
            Ok(false) => {
                info!(
                    principal_id = %principal.id,
                    table = table,
                    operation = %operation,
                    "Operation denied"
                );
                Err(AuthError::denied(table, operation))
            }
            Err(e) => {
                error!(
                    principal_id = %principal.id,
                    table = table,
                    operation = %operation,
                    error = %e,
                    "Grant lookup failed"
                );
                Err(e)
            }
        }
    }

    /// Authenticate then authorize.
    pub async fn check(
        &self,
        credential: Option<&str>,
        table: &str,
        operation: Operation,
    ) -> Result<Principal, AuthError> {
        let principal = self.authenticate(credential).await?;
        self.authorize(&principal, table, operation).await?;
        Ok(principal)
    }
}

/// Grant a route requires, set with `route_layer`.
#[derive(Clone)]
pub struct RequiredGrant {
    pub guard: OperationGuard,
    pub table: &'static str,
    pub operation: Operation,
}

/// Middleware running the Operation Guard in front of a route.
///
/// On success the [`Principal`] is stored in the request extensions.
pub async fn require_grant(
    State(required): State<RequiredGrant>,
    mut request: Request,
    next: Next,
) -> Response {
    let client_ip = request.extensions().get::<ClientIp>().map(|ip| ip.0);
    let span = tracing::info_span!(
        "operation_guard",
        client_ip = ?client_ip,
        table = required.table,
        operation = %required.operation,
    );
    let outcome = required
        .guard
        .check(
            credential_header(request.headers()),
            required.table,
            required.operation,
        )
        .instrument(span)
        .await;

    match outcome {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PrincipalId;
    use crate::kernel::test_dependencies::{MockGrantRepository, TestDependencies};

    #[test]
    fn test_extract_token_forms() {
        assert_eq!(extract_token(Some("Bearer abc")).unwrap(), "abc");
        assert_eq!(extract_token(Some("bearer   abc ")).unwrap(), "abc");
        assert_eq!(extract_token(Some("abc")).unwrap(), "abc");

        for bad in [None, Some(""), Some("Bearer "), Some("Basic abc"), Some("Bearer a b")] {
            assert!(
                matches!(extract_token(bad), Err(AuthError::Unauthenticated)),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_token_is_unauthenticated() {
        let deps = TestDependencies::new().into_server_deps();
        let guard = OperationGuard::from_deps(&deps);

        let err = guard
            .check(Some("Bearer abc"), "clients", Operation::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_grant_decides_per_operation() {
        let test_deps = TestDependencies::new()
            .mock_grants(MockGrantRepository::new().with_grant(3, "clients", Operation::Read))
            .with_session(3, "tok-3")
            .await;
        let grants = test_deps.grants.clone();
        let guard = OperationGuard::from_deps(&test_deps.into_server_deps());

        let principal = guard
            .check(Some("Bearer tok-3"), "clients", Operation::Read)
            .await
            .unwrap();
        assert_eq!(principal.id, PrincipalId::new(3));

        let err = guard
            .check(Some("Bearer tok-3"), "clients", Operation::Delete)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Denied {
                operation: Operation::Delete,
                ..
            }
        ));
        assert_eq!(grants.grant_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_no_grant_lookup_without_authentication() {
        let test_deps = TestDependencies::new();
        let grants = test_deps.grants.clone();
        let guard = OperationGuard::from_deps(&test_deps.into_server_deps());

        let _ = guard.check(None, "clients", Operation::Read).await;
        let _ = guard.check(Some("Bearer nope"), "clients", Operation::Read).await;

        assert!(grants.grant_calls().is_empty());
    }

    #[tokio::test]
    async fn test_store_failures_are_not_masked() {
        let guard =
            OperationGuard::from_deps(&TestDependencies::new().into_server_deps_with_store_down());
        let err = guard.authenticate(Some("Bearer abc")).await.unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable(_)));

        let test_deps = TestDependencies::new()
            .mock_grants(MockGrantRepository::new().failing())
            .with_session(1, "tok")
            .await;
        let guard = OperationGuard::from_deps(&test_deps.into_server_deps());
        let err = guard
            .check(Some("tok"), "clients", Operation::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Repository(_)));
    }
}
