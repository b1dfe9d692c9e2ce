//! Identity federation exchange.
//!
//! The login path accepts a one-time authorization code minted by the
//! external identity provider and exchanges it server-side: first for an
//! app-level token, then for the user's access token, and finally for the
//! identity assertion itself. The assertion is treated as ground truth for
//! principal mapping; the caller never proves anything beyond possession of
//! the code.

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::APP_USER_AGENT;

/// Provider connection settings, loaded from CLI/env at startup.
#[derive(Clone, Debug)]
pub struct FederationConfig {
    base_url: String,
    app_id: String,
    app_secret: SecretString,
}

impl FederationConfig {
    #[must_use]
    pub fn new(base_url: String, app_id: String, app_secret: SecretString) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            app_id,
            app_secret,
        }
    }
}

/// Verified identity assertion returned by the provider.
#[derive(Clone, Debug, Deserialize)]
pub struct FederatedIdentity {
    /// Provider-scoped stable subject identifier.
    #[serde(rename = "open_id")]
    pub subject: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AppTokenResponse {
    tenant_access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    data: Option<ExchangeData>,
}

#[derive(Debug, Deserialize)]
struct ExchangeData {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    data: Option<FederatedIdentity>,
}

#[derive(Clone)]
pub struct FederationClient {
    http: Client,
    config: FederationConfig,
}

impl FederationClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: FederationConfig) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .user_agent(APP_USER_AGENT)
            .build()
            .context("failed to build federation HTTP client")?;
        Ok(Self { http, config })
    }

    /// Exchange a one-time authorization code for the provider's identity
    /// assertion.
    ///
    /// # Errors
    /// Returns an error on transport failure or when the provider rejects
    /// any step of the exchange.
    #[instrument(skip_all)]
    pub async fn exchange(&self, code: &str) -> Result<FederatedIdentity> {
        let app_token = self.app_token().await?;

        let response: ExchangeResponse = self
            .http
            .post(format!(
                "{}/open-apis/authen/v1/oidc/access_token",
                self.config.base_url
            ))
            .bearer_auth(&app_token)
            .json(&json!({ "grant_type": "authorization_code", "code": code }))
            .send()
            .await
            .context("authorization code exchange request failed")?
            .json()
            .await
            .context("authorization code exchange returned invalid JSON")?;

        let access_token = response
            .data
            .map(|data| data.access_token)
            .ok_or_else(|| anyhow!("provider rejected the authorization code"))?;

        let user_info: UserInfoResponse = self
            .http
            .get(format!(
                "{}/open-apis/authen/v1/user_info",
                self.config.base_url
            ))
            .bearer_auth(&access_token)
            .send()
            .await
            .context("user info request failed")?
            .json()
            .await
            .context("user info response was invalid JSON")?;

        user_info
            .data
            .ok_or_else(|| anyhow!("provider returned no identity assertion"))
    }

    async fn app_token(&self) -> Result<String> {
        let response: AppTokenResponse = self
            .http
            .post(format!(
                "{}/open-apis/auth/v3/tenant_access_token/internal",
                self.config.base_url
            ))
            .json(&json!({
                "app_id": self.config.app_id,
                "app_secret": self.config.app_secret.expose_secret(),
            }))
            .send()
            .await
            .context("app token request failed")?
            .json()
            .await
            .context("app token response was invalid JSON")?;

        response
            .tenant_access_token
            .ok_or_else(|| anyhow!("provider returned no app token"))
    }
}

#[cfg(test)]
mod tests {
    use super::{FederatedIdentity, FederationConfig};
    use anyhow::Result;
    use secrecy::SecretString;

    #[test]
    fn config_trims_trailing_slash() {
        let config = FederationConfig::new(
            "https://provider.example/".to_string(),
            "app".to_string(),
            SecretString::from("secret".to_string()),
        );
        assert_eq!(config.base_url, "https://provider.example");
    }

    #[test]
    fn identity_deserializes_provider_shape() -> Result<()> {
        let identity: FederatedIdentity = serde_json::from_value(serde_json::json!({
            "open_id": "ou_123",
            "name": "Alice",
            "email": "alice@example.com",
        }))?;
        assert_eq!(identity.subject, "ou_123");
        assert_eq!(identity.name, "Alice");
        assert_eq!(identity.email.as_deref(), Some("alice@example.com"));
        Ok(())
    }

    #[test]
    fn identity_tolerates_missing_optional_fields() -> Result<()> {
        let identity: FederatedIdentity =
            serde_json::from_value(serde_json::json!({ "open_id": "ou_456" }))?;
        assert_eq!(identity.subject, "ou_456");
        assert!(identity.name.is_empty());
        assert!(identity.email.is_none());
        Ok(())
    }
}
