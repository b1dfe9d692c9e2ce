//! Database helpers for principals, challenges, tokens, and sessions.
//!
//! Captcha and pre-auth tokens are consumed with single `DELETE .. RETURNING`
//! statements so check-and-invalidate is atomic: two concurrent submissions
//! of the same token can never both succeed.

use anyhow::{Context, Result, anyhow};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::utils::{generate_token, hash_token, is_unique_violation};
use crate::{api::handlers::auth::session_kind::SessionKind, authz::Role};

/// Credential-verification view of a principal, loaded by login handle.
pub(crate) struct AuthRecord {
    pub(crate) id: Uuid,
    pub(crate) is_active: bool,
    pub(crate) password_hash: Option<String>,
    pub(crate) mfa_secret: Option<String>,
    pub(crate) force_setup: bool,
}

/// Data returned for a valid session token.
pub(crate) struct SessionRecord {
    pub(crate) principal_id: Uuid,
    pub(crate) username: Option<String>,
    pub(crate) display_name: String,
    pub(crate) email: Option<String>,
    pub(crate) role: Role,
    pub(crate) mfa_enabled: bool,
}

/// Result of consuming a captcha challenge, whatever the outcome.
pub(crate) struct ConsumedCaptcha {
    pub(crate) answer: String,
    pub(crate) live: bool,
}

fn parse_role(value: &str) -> Result<Role> {
    Role::from_str(value).ok_or_else(|| anyhow!("unknown role in database: {value}"))
}

pub(crate) async fn lookup_auth_record(
    pool: &PgPool,
    username: &str,
) -> Result<Option<AuthRecord>> {
    let query = r"
        SELECT id, is_active, password_hash, mfa_secret, force_setup
        FROM principals
        WHERE username = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup auth record")?;

    Ok(row.map(|row| AuthRecord {
        id: row.get("id"),
        is_active: row.get("is_active"),
        password_hash: row.get("password_hash"),
        mfa_secret: row.get("mfa_secret"),
        force_setup: row.get("force_setup"),
    }))
}

pub(crate) async fn insert_captcha(
    pool: &PgPool,
    answer: &str,
    ttl_seconds: i64,
) -> Result<String> {
    let query = r"
        INSERT INTO captcha_challenges (token_hash, answer, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_token()?;
        let result = sqlx::query(query)
            .bind(hash_token(&token))
            .bind(answer)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert captcha challenge"),
        }
    }

    Err(anyhow!("failed to generate unique captcha token"))
}

/// Remove the challenge and return its stored answer plus liveness.
///
/// The row is gone after this call regardless of the comparison outcome, so
/// replay of a used token always fails at the lookup.
pub(crate) async fn consume_captcha(
    pool: &PgPool,
    token: &str,
) -> Result<Option<ConsumedCaptcha>> {
    let query = r"
        DELETE FROM captcha_challenges
        WHERE token_hash = $1
        RETURNING answer, (expires_at > NOW()) AS live
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(hash_token(token))
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume captcha challenge")?;

    Ok(row.map(|row| ConsumedCaptcha {
        answer: row.get("answer"),
        live: row.get("live"),
    }))
}

pub(crate) async fn insert_preauth(
    pool: &PgPool,
    principal_id: Uuid,
    ttl_seconds: i64,
) -> Result<String> {
    let query = r"
        INSERT INTO preauth_tokens (token_hash, principal_id, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_token()?;
        let result = sqlx::query(query)
            .bind(hash_token(&token))
            .bind(principal_id)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert pre-auth token"),
        }
    }

    Err(anyhow!("failed to generate unique pre-auth token"))
}

/// Look up the owner of a live pre-auth token without consuming it.
pub(crate) async fn peek_preauth(pool: &PgPool, token: &str) -> Result<Option<Uuid>> {
    let query = r"
        SELECT principal_id
        FROM preauth_tokens
        WHERE token_hash = $1
          AND expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(hash_token(token))
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup pre-auth token")?;
    Ok(row.map(|row| row.get("principal_id")))
}

/// Count a failed code submission; the token is deleted once the attempt
/// limit is reached so its own TTL is not the only bound on guessing.
pub(crate) async fn record_preauth_failure(
    pool: &PgPool,
    token: &str,
    max_attempts: i32,
) -> Result<()> {
    let query = r"
        UPDATE preauth_tokens
        SET attempts = attempts + 1
        WHERE token_hash = $1
        RETURNING attempts
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let token_hash = hash_token(token);
    let row = sqlx::query(query)
        .bind(&token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to record pre-auth failure")?;

    let Some(row) = row else {
        return Ok(());
    };
    let attempts: i32 = row.get("attempts");
    if attempts >= max_attempts {
        let query = "DELETE FROM preauth_tokens WHERE token_hash = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&token_hash)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to delete exhausted pre-auth token")?;
    }
    Ok(())
}

/// Consume a live pre-auth token. Returns false when another request won the
/// race or the token expired between peek and consume.
pub(crate) async fn consume_preauth(pool: &PgPool, token: &str) -> Result<bool> {
    let query = r"
        DELETE FROM preauth_tokens
        WHERE token_hash = $1
          AND expires_at > NOW()
        RETURNING principal_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(hash_token(token))
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume pre-auth token")?;
    Ok(row.is_some())
}

pub(crate) async fn insert_session(
    pool: &PgPool,
    principal_id: Uuid,
    ttl_seconds: i64,
    kind: SessionKind,
) -> Result<String> {
    let query = r"
        INSERT INTO sessions (token_hash, principal_id, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = format!("{}{}", kind.prefix(), generate_token()?);
        let result = sqlx::query(query)
            .bind(hash_token(&token))
            .bind(principal_id)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

pub(crate) async fn lookup_session(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    // Only accept active principals and unexpired sessions; live state is
    // always re-checked here rather than trusted from issuance time.
    let query = r"
        SELECT principals.id, principals.username, principals.display_name,
               principals.email, principals.role::text AS role,
               (principals.mfa_secret IS NOT NULL) AS mfa_enabled
        FROM sessions
        JOIN principals ON principals.id = sessions.principal_id
        WHERE sessions.token_hash = $1
          AND sessions.expires_at > NOW()
          AND principals.is_active
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    let Some(row) = row else {
        return Ok(None);
    };

    // Record activity for visibility without extending the session TTL.
    let query = r"
        UPDATE sessions
        SET last_seen_at = NOW()
        WHERE token_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update session last_seen_at")?;

    let role: String = row.get("role");
    Ok(Some(SessionRecord {
        principal_id: row.get("id"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        email: row.get("email"),
        role: parse_role(&role)?,
        mfa_enabled: row.get("mfa_enabled"),
    }))
}

/// Load an active principal for response bodies. Inactive principals are
/// filtered out so callers treat them like missing ones.
pub(crate) async fn get_principal(
    pool: &PgPool,
    principal_id: Uuid,
) -> Result<Option<SessionRecord>> {
    let query = r"
        SELECT id, username, display_name, email, role::text AS role,
               (mfa_secret IS NOT NULL) AS mfa_enabled
        FROM principals
        WHERE id = $1
          AND is_active
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(principal_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load principal")?;

    let Some(row) = row else {
        return Ok(None);
    };
    let role: String = row.get("role");
    Ok(Some(SessionRecord {
        principal_id: row.get("id"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        email: row.get("email"),
        role: parse_role(&role)?,
        mfa_enabled: row.get("mfa_enabled"),
    }))
}

pub(crate) async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    // Logout is idempotent; it's fine if no rows are deleted.
    let query = "DELETE FROM sessions WHERE token_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

pub(crate) async fn delete_sessions_for(pool: &PgPool, principal_id: Uuid) -> Result<()> {
    let query = "DELETE FROM sessions WHERE principal_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(principal_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete principal sessions")?;
    Ok(())
}

/// Current password hash and MFA secret, used by setup completion to reject
/// password reuse and decide whether binding is still required.
pub(crate) async fn get_credentials(
    pool: &PgPool,
    principal_id: Uuid,
) -> Result<Option<(Option<String>, Option<String>)>> {
    let query = r"
        SELECT password_hash, mfa_secret
        FROM principals
        WHERE id = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(principal_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load credentials")?;
    Ok(row.map(|row| (row.get("password_hash"), row.get("mfa_secret"))))
}

/// Persist the outcome of setup completion in one statement: new password
/// hash, the MFA secret when one was just bound, and the cleared flag. A
/// failure leaves no partial state behind.
pub(crate) async fn complete_setup(
    pool: &PgPool,
    principal_id: Uuid,
    password_hash: &str,
    new_mfa_secret: Option<&str>,
) -> Result<()> {
    let query = r"
        UPDATE principals
        SET password_hash = $2,
            mfa_secret = COALESCE($3, mfa_secret),
            force_setup = FALSE
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(principal_id)
        .bind(password_hash)
        .bind(new_mfa_secret)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to complete setup")?;
    Ok(())
}

pub(crate) async fn bind_mfa(pool: &PgPool, principal_id: Uuid, secret: &str) -> Result<()> {
    let query = "UPDATE principals SET mfa_secret = $2 WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(principal_id)
        .bind(secret)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to bind MFA secret")?;
    Ok(())
}

pub(crate) async fn unbind_mfa(pool: &PgPool, principal_id: Uuid) -> Result<()> {
    let query = "UPDATE principals SET mfa_secret = NULL WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(principal_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to unbind MFA secret")?;
    Ok(())
}

/// Map a federated identity to a principal, provisioning on first login.
/// Returns (id, role, `is_active`).
pub(crate) async fn upsert_federated_principal(
    pool: &PgPool,
    subject: &str,
    display_name: &str,
    email: Option<&str>,
) -> Result<(Uuid, Role, bool)> {
    let query = r"
        INSERT INTO principals (federated_id, display_name, email, role)
        VALUES ($1, $2, $3, 'standard')
        ON CONFLICT (federated_id) DO UPDATE
        SET display_name = EXCLUDED.display_name,
            email = COALESCE(EXCLUDED.email, principals.email)
        RETURNING id, role::text AS role, is_active
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(subject)
        .bind(display_name)
        .bind(email)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to upsert federated principal")?;

    let role: String = row.get("role");
    Ok((row.get("id"), parse_role(&role)?, row.get("is_active")))
}

/// Non-admin principals automatically belong to the reserved Default group.
pub(crate) async fn ensure_default_membership(pool: &PgPool, principal_id: Uuid) -> Result<()> {
    let query = r"
        INSERT INTO group_members (group_id, principal_id)
        SELECT id, $1 FROM principal_groups WHERE name = 'Default' AND is_system
        ON CONFLICT DO NOTHING
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(principal_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to ensure default group membership")?;
    Ok(())
}

/// Record an auth event for the external audit trail.
pub(crate) async fn log_event(
    pool: &PgPool,
    principal_id: Option<Uuid>,
    action: &str,
    detail: &str,
) -> Result<()> {
    let query = r"
        INSERT INTO audit_events (principal_id, action, detail)
        VALUES ($1, $2, $3)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(principal_id)
        .bind(action)
        .bind(detail)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to record audit event")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{AuthRecord, ConsumedCaptcha, parse_role};
    use crate::authz::Role;
    use uuid::Uuid;

    #[test]
    fn parse_role_accepts_known_values() {
        assert!(matches!(parse_role("admin"), Ok(Role::Admin)));
        assert!(matches!(parse_role("standard"), Ok(Role::Standard)));
        assert!(parse_role("superuser").is_err());
    }

    #[test]
    fn auth_record_holds_values() {
        let record = AuthRecord {
            id: Uuid::nil(),
            is_active: true,
            password_hash: Some("$argon2id$...".to_string()),
            mfa_secret: None,
            force_setup: true,
        };
        assert!(record.is_active);
        assert!(record.force_setup);
        assert!(record.mfa_secret.is_none());
    }

    #[test]
    fn consumed_captcha_carries_liveness() {
        let consumed = ConsumedCaptcha {
            answer: "1234".to_string(),
            live: false,
        };
        assert_eq!(consumed.answer, "1234");
        assert!(!consumed.live);
    }
}
