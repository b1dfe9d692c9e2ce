//! Authenticated-caller extraction and access guards.

use axum::http::{HeaderMap, header::AUTHORIZATION};
use sqlx::PgPool;
use uuid::Uuid;

use super::{session_kind::SessionKind, storage, types::PrincipalInfo, utils::hash_token};
use crate::{api::error::ApiError, authz::Role};

/// The caller behind a validated session token.
pub(crate) struct Principal {
    pub(crate) id: Uuid,
    pub(crate) username: Option<String>,
    pub(crate) display_name: String,
    pub(crate) email: Option<String>,
    pub(crate) role: Role,
    pub(crate) mfa_enabled: bool,
    pub(crate) session_kind: SessionKind,
    pub(crate) token_hash: Vec<u8>,
}

impl Principal {
    pub(crate) fn info(&self) -> PrincipalInfo {
        PrincipalInfo {
            id: self.id.to_string(),
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            email: self.email.clone(),
            role: self.role,
            mfa_enabled: self.mfa_enabled,
        }
    }
}

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .ok_or(ApiError::TokenExpired)
}

/// Resolve the bearer token to a principal, whatever the session kind.
/// Expired sessions, unknown tokens, and inactive principals all map to the
/// same generic rejection.
pub(crate) async fn authenticate(pool: &PgPool, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let token = extract_bearer_token(headers)?;
    let token_hash = hash_token(token);
    let record = storage::lookup_session(pool, &token_hash)
        .await?
        .ok_or(ApiError::TokenExpired)?;

    Ok(Principal {
        id: record.principal_id,
        username: record.username,
        display_name: record.display_name,
        email: record.email,
        role: record.role,
        mfa_enabled: record.mfa_enabled,
        session_kind: SessionKind::from_token(token),
        token_hash,
    })
}

/// Guard for normal routes: full sessions only. Setup-scoped sessions are
/// rejected so a principal in forced setup cannot touch anything else.
pub(crate) async fn require_auth(pool: &PgPool, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let principal = authenticate(pool, headers).await?;
    if principal.session_kind != SessionKind::Full {
        return Err(ApiError::Forbidden);
    }
    Ok(principal)
}

/// Guard for routes reachable during setup as well: MFA enrollment and setup
/// completion accept either session kind.
pub(crate) async fn require_any_auth(
    pool: &PgPool,
    headers: &HeaderMap,
) -> Result<Principal, ApiError> {
    authenticate(pool, headers).await
}

pub(crate) async fn require_admin(
    pool: &PgPool,
    headers: &HeaderMap,
) -> Result<Principal, ApiError> {
    let principal = require_auth(pool, headers).await?;
    if principal.role != Role::Admin {
        return Err(ApiError::Forbidden);
    }
    Ok(principal)
}

#[cfg(test)]
mod tests {
    use super::extract_bearer_token;
    use axum::http::{HeaderMap, HeaderValue, header::AUTHORIZATION};

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers).ok(), Some("abc123"));
    }

    #[test]
    fn rejects_missing_or_malformed_header() {
        assert!(extract_bearer_token(&HeaderMap::new()).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert!(extract_bearer_token(&headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(extract_bearer_token(&headers).is_err());
    }
}
