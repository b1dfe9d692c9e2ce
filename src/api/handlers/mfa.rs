//! TOTP enrollment endpoints.

use axum::{Json, extract::Extension, http::HeaderMap, http::StatusCode};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::{principal, state::AuthState, storage};
use crate::api::error::ApiError;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MfaGenerateResponse {
    /// Base32 secret to confirm via `bind`; nothing is persisted yet.
    pub secret: String,
    /// QR code of the provisioning URI as a PNG data URL.
    pub qr: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MfaBindRequest {
    pub secret: String,
    /// Current code from the authenticator, proving the secret was captured.
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MfaUnbindRequest {
    pub principal_id: Uuid,
}

#[utoipa::path(
    post,
    path = "/v1/mfa/generate",
    responses(
        (status = 200, description = "Fresh secret and provisioning QR code", body = MfaGenerateResponse),
        (status = 401, description = "Authentication failed")
    ),
    security(("bearer" = [])),
    tag = "mfa"
)]
pub async fn generate(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Json<MfaGenerateResponse>, ApiError> {
    // Reachable from a setup session too, since enrollment happens there.
    let caller = principal::require_any_auth(&pool, &headers).await?;
    let account = caller
        .username
        .as_deref()
        .unwrap_or(caller.display_name.as_str());
    let generated = auth_state.totp().generate_secret(account)?;
    Ok(Json(MfaGenerateResponse {
        secret: generated.secret,
        qr: generated.qr_data_url,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/mfa/bind",
    request_body = MfaBindRequest,
    responses(
        (status = 204, description = "Secret bound"),
        (status = 401, description = "Authentication failed"),
        (status = 409, description = "A secret is already bound")
    ),
    security(("bearer" = [])),
    tag = "mfa"
)]
pub async fn bind(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<MfaBindRequest>,
) -> Result<StatusCode, ApiError> {
    let caller = principal::require_any_auth(&pool, &headers).await?;

    let (_, current_secret) = storage::get_credentials(&pool, caller.id)
        .await?
        .ok_or(ApiError::TokenExpired)?;
    if current_secret.is_some() {
        return Err(ApiError::Conflict(
            "an authenticator is already bound".to_string(),
        ));
    }

    // Verify before persisting so a mistyped secret can never lock the
    // account out of its second factor.
    if !auth_state.totp().verify(&request.secret, &request.code) {
        return Err(ApiError::InvalidMfaCode);
    }

    storage::bind_mfa(&pool, caller.id, &request.secret).await?;
    info!(principal = %caller.id, "mfa secret bound");
    storage::log_event(&pool, Some(caller.id), "mfa.bound", "").await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/mfa/unbind",
    request_body = MfaUnbindRequest,
    responses(
        (status = 204, description = "Secret removed"),
        (status = 403, description = "Admin role required")
    ),
    security(("bearer" = [])),
    tag = "mfa"
)]
pub async fn unbind(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(request): Json<MfaUnbindRequest>,
) -> Result<StatusCode, ApiError> {
    // Reset path for lost authenticators; admin only.
    let caller = principal::require_admin(&pool, &headers).await?;
    storage::unbind_mfa(&pool, request.principal_id).await?;
    info!(admin = %caller.id, principal = %request.principal_id, "mfa secret unbound");
    storage::log_event(
        &pool,
        Some(caller.id),
        "mfa.unbound",
        &request.principal_id.to_string(),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
