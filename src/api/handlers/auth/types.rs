//! Request/response types for the auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::authz::Role;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CaptchaResponse {
    pub token: String,
    /// Data URL of the rendered challenge image.
    pub image: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub captcha_token: String,
    pub captcha_code: String,
}

/// Outcome of a credential submission. `status` tells the client which step
/// comes next; only the matching token field is populated.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub status: LoginStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_auth_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<PrincipalInfo>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoginStatus {
    Success,
    MfaRequired,
    SetupRequired,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MfaLoginRequest {
    pub pre_auth_token: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FederatedLoginRequest {
    /// One-time authorization code from the identity provider.
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SetupCompleteRequest {
    pub password: String,
    /// Required together with `mfa_code` when no secret is bound yet.
    #[serde(default)]
    pub mfa_secret: Option<String>,
    #[serde(default)]
    pub mfa_code: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct PrincipalInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
    pub mfa_enabled: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub principal: PrincipalInfo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn login_response_omits_absent_tokens() -> Result<()> {
        let response = LoginResponse {
            status: LoginStatus::MfaRequired,
            token: None,
            pre_auth_token: Some("pre".to_string()),
            principal: None,
        };
        let value = serde_json::to_value(&response)?;
        assert_eq!(value["status"], "mfa_required");
        assert_eq!(value["pre_auth_token"], "pre");
        assert!(value.get("token").is_none());
        Ok(())
    }

    #[test]
    fn setup_request_tolerates_missing_mfa_fields() -> Result<()> {
        let request: SetupCompleteRequest =
            serde_json::from_value(serde_json::json!({ "password": "Aa1!aaaa" }))?;
        assert!(request.mfa_secret.is_none());
        assert!(request.mfa_code.is_none());
        Ok(())
    }

    #[test]
    fn principal_info_round_trips() -> Result<()> {
        let info = PrincipalInfo {
            id: "00000000-0000-0000-0000-000000000000".to_string(),
            username: Some("alice".to_string()),
            display_name: "Alice".to_string(),
            email: None,
            role: Role::Standard,
            mfa_enabled: false,
        };
        let value = serde_json::to_value(&info)?;
        assert_eq!(value["role"], "standard");
        let decoded: PrincipalInfo = serde_json::from_value(value)?;
        assert_eq!(decoded.username.as_deref(), Some("alice"));
        Ok(())
    }
}
