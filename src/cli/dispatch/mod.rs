//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{auth, federation};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    // Federation arguments must come as a complete set or not at all
    crate::cli::commands::validate(matches).map_err(|e| anyhow::anyhow!(e))?;

    let auth_opts = auth::Options::parse(matches)?;
    let federation_opts = federation::Options::parse(matches);

    Ok(Action::Server(Box::new(Args {
        port,
        dsn,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        setup_session_ttl_seconds: auth_opts.setup_session_ttl_seconds,
        preauth_ttl_seconds: auth_opts.preauth_ttl_seconds,
        max_mfa_attempts: auth_opts.max_mfa_attempts,
        totp_issuer: auth_opts.totp_issuer,
        federation_base_url: federation_opts.base_url,
        federation_app_id: federation_opts.app_id,
        federation_app_secret: federation_opts.app_secret,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::actions::Action;

    #[test]
    fn builds_server_action_from_args() {
        temp_env::with_vars_unset(
            [
                "DOCGATE_PORT",
                "DOCGATE_DSN",
                "DOCGATE_SESSION_TTL_SECONDS",
                "DOCGATE_FEDERATION_BASE_URL",
                "DOCGATE_FEDERATION_APP_ID",
                "DOCGATE_FEDERATION_APP_SECRET",
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec![
                    "docgate",
                    "--dsn",
                    "postgres://localhost/docgate",
                    "--session-ttl-seconds",
                    "3600",
                ]);
                let action = handler(&matches);
                assert!(action.is_ok());
                if let Ok(Action::Server(args)) = action {
                    assert_eq!(args.port, 8080);
                    assert_eq!(args.dsn, "postgres://localhost/docgate");
                    assert_eq!(args.session_ttl_seconds, 3600);
                    assert_eq!(args.max_mfa_attempts, 5);
                    assert!(args.federation_base_url.is_none());
                }
            },
        );
    }

    #[test]
    fn rejects_partial_federation_config() {
        temp_env::with_vars_unset(
            [
                "DOCGATE_FEDERATION_BASE_URL",
                "DOCGATE_FEDERATION_APP_ID",
                "DOCGATE_FEDERATION_APP_SECRET",
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec![
                    "docgate",
                    "--dsn",
                    "postgres://localhost/docgate",
                    "--federation-app-id",
                    "app",
                ]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(err.to_string().contains("--federation-base-url"));
                }
            },
        );
    }
}
