//! Login orchestration: captcha gate, credential check, and the decision
//! between full access, MFA challenge, and forced setup.

pub mod captcha;
pub(crate) mod principal;
pub mod session;
pub(crate) mod session_kind;
pub mod state;
pub(crate) mod storage;
pub mod types;
pub(crate) mod utils;


use axum::{Json, extract::Extension, http::HeaderMap, http::StatusCode};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use self::{
    session_kind::SessionKind,
    state::AuthState,
    storage::{AuthRecord, SessionRecord},
    types::{
        FederatedLoginRequest, LoginRequest, LoginResponse, LoginStatus, MfaLoginRequest,
        PrincipalInfo, SetupCompleteRequest,
    },
    utils::{hash_password, password_meets_policy, verify_password},
};
use crate::{api::error::ApiError, authz::Role, captcha::answer_matches};

/// Next step after a successful credential check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoginNext {
    /// Credentials are provisional; the principal must finish setup first.
    SetupRequired,
    /// A TOTP code is still required.
    MfaPending,
    /// No further factor; issue a full session.
    Authenticated,
}

/// Forced setup always wins over the MFA challenge: a provisional account
/// completes enrollment inside the setup flow instead.
fn classify(force_setup: bool, mfa_bound: bool) -> LoginNext {
    if force_setup {
        LoginNext::SetupRequired
    } else if mfa_bound {
        LoginNext::MfaPending
    } else {
        LoginNext::Authenticated
    }
}

fn principal_info(record: &SessionRecord) -> PrincipalInfo {
    PrincipalInfo {
        id: record.principal_id.to_string(),
        username: record.username.clone(),
        display_name: record.display_name.clone(),
        email: record.email.clone(),
        role: record.role,
        mfa_enabled: record.mfa_enabled,
    }
}

async fn full_session_response(
    pool: &PgPool,
    auth_state: &AuthState,
    principal_id: uuid::Uuid,
) -> Result<LoginResponse, ApiError> {
    let record = storage::get_principal(pool, principal_id)
        .await?
        .ok_or(ApiError::AccountInactive)?;
    let token = storage::insert_session(
        pool,
        principal_id,
        auth_state.config().session_ttl_seconds(),
        SessionKind::Full,
    )
    .await?;
    Ok(LoginResponse {
        status: LoginStatus::Success,
        token: Some(token),
        pre_auth_token: None,
        principal: Some(principal_info(&record)),
    })
}

#[utoipa::path(
    post,
    path = "/v1/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credentials accepted; see status for the next step", body = LoginResponse),
        (status = 401, description = "Authentication failed")
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    // The captcha is consumed before credentials are looked at, so every
    // attempt costs a fresh challenge whether or not the password is right.
    // Rejections are recorded before the error leaves the handler.
    let consumed = storage::consume_captcha(&pool, &request.captcha_token).await?;
    let captcha_ok = consumed
        .as_ref()
        .is_some_and(|c| c.live && answer_matches(&c.answer, &request.captcha_code));
    if !captcha_ok {
        storage::log_event(&pool, None, "login.failed", &request.username).await?;
        return Err(ApiError::InvalidCaptcha);
    }

    let Some(record) = storage::lookup_auth_record(&pool, &request.username).await? else {
        storage::log_event(&pool, None, "login.failed", &request.username).await?;
        return Err(ApiError::InvalidCredentials);
    };
    let AuthRecord {
        id,
        is_active,
        password_hash,
        mfa_secret,
        force_setup,
    } = record;
    let password_ok = password_hash
        .as_deref()
        .is_some_and(|hash| verify_password(hash, &request.password));
    if !password_ok {
        storage::log_event(&pool, Some(id), "login.failed", &request.username).await?;
        return Err(ApiError::InvalidCredentials);
    }
    if !is_active {
        storage::log_event(&pool, Some(id), "login.failed", &request.username).await?;
        return Err(ApiError::AccountInactive);
    }

    match classify(force_setup, mfa_secret.is_some()) {
        LoginNext::SetupRequired => {
            let token = storage::insert_session(
                &pool,
                id,
                auth_state.config().setup_session_ttl_seconds(),
                SessionKind::Setup,
            )
            .await?;
            storage::log_event(&pool, Some(id), "login.setup_required", &request.username)
                .await?;
            Ok(Json(LoginResponse {
                status: LoginStatus::SetupRequired,
                token: Some(token),
                pre_auth_token: None,
                principal: None,
            }))
        }
        LoginNext::MfaPending => {
            let pre_auth_token =
                storage::insert_preauth(&pool, id, auth_state.config().preauth_ttl_seconds())
                    .await?;
            Ok(Json(LoginResponse {
                status: LoginStatus::MfaRequired,
                token: None,
                pre_auth_token: Some(pre_auth_token),
                principal: None,
            }))
        }
        LoginNext::Authenticated => {
            let response = full_session_response(&pool, &auth_state, id).await?;
            info!(principal = %id, "password login succeeded");
            storage::log_event(&pool, Some(id), "login.success", &request.username).await?;
            Ok(Json(response))
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/login/mfa",
    request_body = MfaLoginRequest,
    responses(
        (status = 200, description = "MFA accepted; session issued", body = LoginResponse),
        (status = 401, description = "Authentication failed")
    ),
    tag = "auth"
)]
pub async fn login_mfa(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<MfaLoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    // Peek first: an invalid code must leave the token alive (minus one
    // attempt) so the user can retry without logging in again.
    let principal_id = storage::peek_preauth(&pool, &request.pre_auth_token)
        .await?
        .ok_or(ApiError::TokenExpired)?;

    let (_, mfa_secret) = storage::get_credentials(&pool, principal_id)
        .await?
        .ok_or(ApiError::TokenExpired)?;
    let secret = mfa_secret.ok_or(ApiError::InvalidMfaCode)?;

    if !auth_state.totp().verify(&secret, &request.code) {
        storage::record_preauth_failure(
            &pool,
            &request.pre_auth_token,
            auth_state.config().max_mfa_attempts(),
        )
        .await?;
        storage::log_event(&pool, Some(principal_id), "login.mfa_failed", "").await?;
        return Err(ApiError::InvalidMfaCode);
    }

    // The delete is the serialization point; of two concurrent submissions
    // with a valid code, exactly one reaches the session insert.
    if !storage::consume_preauth(&pool, &request.pre_auth_token).await? {
        return Err(ApiError::TokenConsumed);
    }

    let response = full_session_response(&pool, &auth_state, principal_id).await?;
    info!(principal = %principal_id, "mfa login succeeded");
    storage::log_event(&pool, Some(principal_id), "login.success", "mfa").await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/v1/login/federated",
    request_body = FederatedLoginRequest,
    responses(
        (status = 200, description = "Federated identity accepted; session issued", body = LoginResponse),
        (status = 401, description = "Authentication failed")
    ),
    tag = "auth"
)]
pub async fn login_federated(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<FederatedLoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Some(client) = auth_state.federation() else {
        return Err(ApiError::Internal(anyhow::anyhow!(
            "federated login is not configured"
        )));
    };

    // Provider rejections (bad or replayed code) surface as the generic
    // authentication failure.
    let identity = client
        .exchange(&request.code)
        .await
        .map_err(|_| ApiError::InvalidCredentials)?;

    let (principal_id, role, is_active) = storage::upsert_federated_principal(
        &pool,
        &identity.subject,
        &identity.name,
        identity.email.as_deref(),
    )
    .await?;
    if !is_active {
        return Err(ApiError::AccountInactive);
    }
    if role != Role::Admin {
        storage::ensure_default_membership(&pool, principal_id).await?;
    }

    // Federated principals never pass through setup or local MFA; the
    // provider owns those factors.
    let response = full_session_response(&pool, &auth_state, principal_id).await?;
    info!(principal = %principal_id, "federated login succeeded");
    storage::log_event(&pool, Some(principal_id), "login.success", "federated").await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/v1/setup/complete",
    request_body = SetupCompleteRequest,
    responses(
        (status = 204, description = "Setup complete; log in again with the new credentials"),
        (status = 400, description = "Password or MFA enrollment rejected"),
        (status = 401, description = "Authentication failed")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn setup_complete(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<SetupCompleteRequest>,
) -> Result<StatusCode, ApiError> {
    let caller = principal::require_any_auth(&pool, &headers).await?;
    if caller.session_kind != SessionKind::Setup {
        return Err(ApiError::Forbidden);
    }

    if !password_meets_policy(&request.password) {
        return Err(ApiError::SetupValidationFailed(
            "password must be at least 8 characters and include lowercase, uppercase, digit, and special characters".to_string(),
        ));
    }

    let (current_hash, current_secret) = storage::get_credentials(&pool, caller.id)
        .await?
        .ok_or(ApiError::TokenExpired)?;
    if let Some(hash) = current_hash.as_deref() {
        if verify_password(hash, &request.password) {
            return Err(ApiError::SetupValidationFailed(
                "new password must differ from the current password".to_string(),
            ));
        }
    }

    // A principal without a bound secret must enroll here; a bound secret
    // stays untouched and any submitted one is ignored.
    let new_secret = if current_secret.is_some() {
        None
    } else {
        let secret = request.mfa_secret.as_deref().ok_or_else(|| {
            ApiError::SetupValidationFailed("MFA enrollment is required".to_string())
        })?;
        let code = request.mfa_code.as_deref().ok_or_else(|| {
            ApiError::SetupValidationFailed("MFA enrollment is required".to_string())
        })?;
        if !auth_state.totp().verify(secret, code) {
            return Err(ApiError::InvalidMfaCode);
        }
        Some(secret)
    };

    let password_hash = hash_password(&request.password)?;
    storage::complete_setup(&pool, caller.id, &password_hash, new_secret).await?;

    // All sessions go, the setup session included; the principal starts over
    // from an unauthenticated state with the new credentials.
    storage::delete_sessions_for(&pool, caller.id).await?;
    info!(principal = %caller.id, "setup completed");
    storage::log_event(&pool, Some(caller.id), "setup.completed", "").await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::{LoginNext, classify};

    #[test]
    fn setup_takes_precedence_over_mfa() {
        assert_eq!(classify(true, true), LoginNext::SetupRequired);
        assert_eq!(classify(true, false), LoginNext::SetupRequired);
    }

    #[test]
    fn bound_secret_requires_mfa() {
        assert_eq!(classify(false, true), LoginNext::MfaPending);
    }

    #[test]
    fn unbound_active_account_authenticates_directly() {
        assert_eq!(classify(false, false), LoginNext::Authenticated);
    }
}
