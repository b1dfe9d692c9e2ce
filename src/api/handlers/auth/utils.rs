//! Token and password helpers shared by the auth handlers.

use anyhow::{Context, Result, anyhow};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng as SaltRng},
};
use base64::Engine;
use rand::{RngCore, rngs::OsRng};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Create a new opaque token (captcha, pre-auth, or session).
/// The raw value is only returned to the client; the database stores a hash.
pub(crate) fn generate_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a token so raw values never touch the database.
/// The hash is used for lookups when the token is presented.
pub(crate) fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Argon2-hash a password for storage.
pub(crate) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut SaltRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {err}"))
}

/// Constant-time password verification. Fails closed on malformed hashes.
pub(crate) fn verify_password(stored_hash: &str, password: &str) -> bool {
    PasswordHash::new(stored_hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Password policy for setup completion: at least 8 characters with a
/// lowercase letter, an uppercase letter, a digit, and a special character.
pub(crate) fn password_meets_policy(password: &str) -> bool {
    if password.len() < 8 {
        return false;
    }
    let checks = [
        r"[a-z]",
        r"[A-Z]",
        r"\d",
        r#"[!@#$%^&*(),.?":{}|<>\-_=+\[\];'`~/]"#,
    ];
    checks.iter().all(|pattern| {
        Regex::new(pattern).is_ok_and(|regex| regex.is_match(password))
    })
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    #[test]
    fn generate_token_has_full_entropy() -> Result<()> {
        let token = generate_token()?;
        let decoded = URL_SAFE_NO_PAD.decode(token.as_bytes())?;
        assert_eq!(decoded.len(), 32);
        Ok(())
    }

    #[test]
    fn hash_token_is_stable_and_distinct() {
        assert_eq!(hash_token("token"), hash_token("token"));
        assert_ne!(hash_token("token"), hash_token("other"));
    }

    #[test]
    fn password_round_trips_through_argon2() -> Result<()> {
        let hash = hash_password("S3cret!pw")?;
        assert!(verify_password(&hash, "S3cret!pw"));
        assert!(!verify_password(&hash, "S3cret!pw2"));
        Ok(())
    }

    #[test]
    fn verify_password_fails_closed_on_garbage_hash() {
        assert!(!verify_password("not-a-phc-string", "whatever"));
    }

    #[test]
    fn password_policy_requires_all_classes() {
        assert!(password_meets_policy("Aa1!aaaa"));
        assert!(!password_meets_policy("Aa1!a"));
        assert!(!password_meets_policy("aa1!aaaa"));
        assert!(!password_meets_policy("AA1!AAAA"));
        assert!(!password_meets_policy("Aaa!aaaa"));
        assert!(!password_meets_policy("Aa1aaaaa"));
    }
}
