//! Auth configuration and shared handler state.

use crate::{federation::FederationClient, totp::TotpEngine};

const DEFAULT_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_SETUP_SESSION_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_PREAUTH_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_MAX_MFA_ATTEMPTS: i32 = 5;
const DEFAULT_TOTP_ISSUER: &str = "docgate";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    session_ttl_seconds: i64,
    setup_session_ttl_seconds: i64,
    preauth_ttl_seconds: i64,
    max_mfa_attempts: i32,
    totp_issuer: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            setup_session_ttl_seconds: DEFAULT_SETUP_SESSION_TTL_SECONDS,
            preauth_ttl_seconds: DEFAULT_PREAUTH_TTL_SECONDS,
            max_mfa_attempts: DEFAULT_MAX_MFA_ATTEMPTS,
            totp_issuer: DEFAULT_TOTP_ISSUER.to_string(),
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_setup_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.setup_session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_preauth_ttl_seconds(mut self, seconds: i64) -> Self {
        self.preauth_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_mfa_attempts(mut self, attempts: i32) -> Self {
        self.max_mfa_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_totp_issuer(mut self, issuer: String) -> Self {
        self.totp_issuer = issuer;
        self
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn setup_session_ttl_seconds(&self) -> i64 {
        self.setup_session_ttl_seconds
    }

    #[must_use]
    pub fn preauth_ttl_seconds(&self) -> i64 {
        self.preauth_ttl_seconds
    }

    #[must_use]
    pub fn max_mfa_attempts(&self) -> i32 {
        self.max_mfa_attempts
    }

    #[must_use]
    pub fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AuthState {
    config: AuthConfig,
    totp: TotpEngine,
    federation: Option<FederationClient>,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, federation: Option<FederationClient>) -> Self {
        let totp = TotpEngine::new(config.totp_issuer().to_string());
        Self {
            config,
            totp,
            federation,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn totp(&self) -> &TotpEngine {
        &self.totp
    }

    pub(crate) fn federation(&self) -> Option<&FederationClient> {
        self.federation.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthConfig, AuthState};

    #[test]
    fn config_defaults_and_overrides() {
        let config = AuthConfig::new();
        assert_eq!(
            config.session_ttl_seconds(),
            super::DEFAULT_SESSION_TTL_SECONDS
        );
        assert_eq!(
            config.preauth_ttl_seconds(),
            super::DEFAULT_PREAUTH_TTL_SECONDS
        );
        assert_eq!(config.max_mfa_attempts(), super::DEFAULT_MAX_MFA_ATTEMPTS);
        assert_eq!(config.totp_issuer(), super::DEFAULT_TOTP_ISSUER);

        let config = config
            .with_session_ttl_seconds(60)
            .with_setup_session_ttl_seconds(30)
            .with_preauth_ttl_seconds(10)
            .with_max_mfa_attempts(3)
            .with_totp_issuer("docs.test".to_string());
        assert_eq!(config.session_ttl_seconds(), 60);
        assert_eq!(config.setup_session_ttl_seconds(), 30);
        assert_eq!(config.preauth_ttl_seconds(), 10);
        assert_eq!(config.max_mfa_attempts(), 3);
        assert_eq!(config.totp_issuer(), "docs.test");
    }

    #[test]
    fn state_constructs_without_federation() {
        let state = AuthState::new(AuthConfig::new(), None);
        assert!(state.federation().is_none());
        assert_eq!(state.config().totp_issuer(), "docgate");
    }
}
