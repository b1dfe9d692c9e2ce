//! Session introspection and logout endpoints.

use axum::{Json, extract::Extension, http::HeaderMap};
use sqlx::PgPool;

use super::{
    principal::{self, extract_bearer_token},
    storage,
    types::SessionResponse,
    utils::hash_token,
};
use crate::api::error::ApiError;

#[utoipa::path(
    get,
    path = "/v1/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 401, description = "No active session")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<SessionResponse>, ApiError> {
    let principal = principal::require_any_auth(&pool, &headers).await?;
    Ok(Json(SessionResponse {
        principal: principal.info(),
    }))
}

#[utoipa::path(
    post,
    path = "/v1/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<axum::http::StatusCode, ApiError> {
    // Logout never fails on a missing or already-revoked token.
    if let Ok(token) = extract_bearer_token(&headers) {
        storage::delete_session(&pool, &hash_token(token)).await?;
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}
