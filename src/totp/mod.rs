//! Time-based one-time code engine.
//!
//! Secrets are generated here but never persisted by this module: binding a
//! secret to a principal requires the caller to first prove possession with
//! a valid code (see the MFA handlers). Verification accepts the current and
//! immediately adjacent 30-second steps to tolerate clock skew.

use anyhow::{Result, anyhow};
use std::time::{SystemTime, UNIX_EPOCH};
use totp_rs::{Algorithm, Secret, TOTP};

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECONDS: u64 = 30;

/// A freshly generated, not-yet-bound secret.
#[derive(Debug)]
pub struct GeneratedSecret {
    /// Base32 form for manual entry.
    pub secret: String,
    /// PNG data URL of the provisioning QR code.
    pub qr_data_url: String,
}

#[derive(Clone, Debug)]
pub struct TotpEngine {
    issuer: String,
}

impl TotpEngine {
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    /// Generate a fresh random secret and its provisioning QR code.
    ///
    /// # Errors
    /// Returns an error if secret generation or QR rendering fails.
    pub fn generate_secret(&self, account: &str) -> Result<GeneratedSecret> {
        let secret_bytes = Secret::generate_secret()
            .to_bytes()
            .map_err(|err| anyhow!("secret generation failed: {err:?}"))?;
        let totp = self.build(secret_bytes, account)?;
        let qr = totp
            .get_qr_base64()
            .map_err(|err| anyhow!("QR generation failed: {err}"))?;
        Ok(GeneratedSecret {
            secret: totp.get_secret_base32(),
            qr_data_url: format!("data:image/png;base64,{qr}"),
        })
    }

    /// Validate a 6-digit code against a base32 secret at the current time.
    ///
    /// Fails closed: malformed secrets or codes return `false`.
    #[must_use]
    pub fn verify(&self, secret_base32: &str, code: &str) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        self.verify_at(secret_base32, code, now)
    }

    /// Validation at an explicit timestamp; `verify` delegates here so the
    /// skew window is testable without touching the wall clock.
    pub(crate) fn verify_at(&self, secret_base32: &str, code: &str, time: u64) -> bool {
        let Ok(secret_bytes) = Secret::Encoded(secret_base32.to_string()).to_bytes() else {
            return false;
        };
        let Ok(totp) = self.build(secret_bytes, "account") else {
            return false;
        };
        totp.check(code.trim(), time)
    }

    fn build(&self, secret_bytes: Vec<u8>, account: &str) -> Result<TOTP> {
        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            SKEW,
            STEP_SECONDS,
            secret_bytes,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|err| anyhow!("TOTP init failed: {err}"))
    }
}
