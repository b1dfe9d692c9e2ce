//! Session kind markers for gating the forced-setup flow.
//!
//! Flow Overview:
//! - Tokens without a prefix are full sessions.
//! - `setup_` tokens are issued when a login hits the forced-setup state and
//!   only unlock the setup-completion and MFA enrollment routes.
//!
//! Security boundaries: the kind is derived from the token prefix; the token
//! is still validated against server-side storage before any access is
//! granted.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Prefix for setup-scoped session tokens.
pub(crate) const SETUP_PREFIX: &str = "setup_";

/// Session kinds used to gate the forced-setup flow.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Full session with normal access.
    Full,
    /// Session limited to setup completion and MFA enrollment.
    Setup,
}

impl SessionKind {
    /// Classify a session token by its prefix.
    pub(crate) fn from_token(token: &str) -> Self {
        if token.starts_with(SETUP_PREFIX) {
            Self::Setup
        } else {
            Self::Full
        }
    }

    /// Prefix applied when minting a token of this kind.
    pub(crate) fn prefix(self) -> &'static str {
        match self {
            Self::Full => "",
            Self::Setup => SETUP_PREFIX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SETUP_PREFIX, SessionKind};

    #[test]
    fn from_token_classifies_prefixes() {
        assert_eq!(
            SessionKind::from_token(&format!("{SETUP_PREFIX}token")),
            SessionKind::Setup
        );
        assert_eq!(SessionKind::from_token("plain"), SessionKind::Full);
    }

    #[test]
    fn prefix_round_trips() {
        for kind in [SessionKind::Full, SessionKind::Setup] {
            let token = format!("{}abc", kind.prefix());
            assert_eq!(SessionKind::from_token(&token), kind);
        }
    }
}
