use crate::{
    api,
    api::handlers::auth::state::AuthConfig,
    federation::FederationConfig,
};
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub session_ttl_seconds: i64,
    pub setup_session_ttl_seconds: i64,
    pub preauth_ttl_seconds: i64,
    pub max_mfa_attempts: i32,
    pub totp_issuer: String,
    pub federation_base_url: Option<String>,
    pub federation_app_id: Option<String>,
    pub federation_app_secret: Option<SecretString>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new()
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_setup_session_ttl_seconds(args.setup_session_ttl_seconds)
        .with_preauth_ttl_seconds(args.preauth_ttl_seconds)
        .with_max_mfa_attempts(args.max_mfa_attempts)
        .with_totp_issuer(args.totp_issuer);

    // dispatch::handler already validated that these come as a full set.
    let federation = match (
        args.federation_base_url,
        args.federation_app_id,
        args.federation_app_secret,
    ) {
        (Some(base_url), Some(app_id), Some(app_secret)) => {
            Some(FederationConfig::new(base_url, app_id, app_secret))
        }
        _ => None,
    };

    api::new(args.port, args.dsn, auth_config, federation).await
}
