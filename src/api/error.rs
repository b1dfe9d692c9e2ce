//! API error taxonomy and HTTP mapping.
//!
//! Every authentication failure that happens before a session exists is
//! collapsed to the same generic 401 body at the transport boundary so the
//! response cannot be used for username enumeration or token-state probing.
//! The precise variant is still logged server-side.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid captcha")]
    InvalidCaptcha,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account inactive")]
    AccountInactive,
    #[error("invalid MFA code")]
    InvalidMfaCode,
    #[error("token expired")]
    TokenExpired,
    #[error("token consumed")]
    TokenConsumed,
    #[error("setup validation failed: {0}")]
    SetupValidationFailed(String),
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Pre-session failures are indistinguishable to the caller.
    fn is_generic_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidCaptcha
                | Self::InvalidCredentials
                | Self::AccountInactive
                | Self::InvalidMfaCode
                | Self::TokenExpired
                | Self::TokenConsumed
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.is_generic_rejection() {
            warn!("authentication rejected: {self}");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "authentication failed" })),
            )
                .into_response();
        }

        match self {
            Self::SetupValidationFailed(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "forbidden" })),
            )
                .into_response(),
            Self::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "not found" })),
            )
                .into_response(),
            Self::Conflict(message) => {
                (StatusCode::CONFLICT, Json(json!({ "error": message }))).into_response()
            }
            Self::Internal(err) => {
                error!("internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
            // is_generic_rejection covered these above.
            _ => StatusCode::UNAUTHORIZED.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ApiError;
    use axum::{http::StatusCode, response::IntoResponse};

    #[test]
    fn pre_session_failures_collapse_to_401() {
        for err in [
            ApiError::InvalidCaptcha,
            ApiError::InvalidCredentials,
            ApiError::AccountInactive,
            ApiError::InvalidMfaCode,
            ApiError::TokenExpired,
            ApiError::TokenConsumed,
        ] {
            let response = err.into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn setup_validation_is_a_400_with_detail() {
        let response = ApiError::SetupValidationFailed("password too short".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn authorization_failures_keep_their_status() {
        assert_eq!(
            ApiError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("duplicate group name".to_string())
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn internal_errors_hide_details() {
        let response = ApiError::Internal(anyhow::anyhow!("database down")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
