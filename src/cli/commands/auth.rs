use clap::{Arg, Command};

#[derive(Debug)]
pub struct Options {
    pub session_ttl_seconds: i64,
    pub setup_session_ttl_seconds: i64,
    pub preauth_ttl_seconds: i64,
    pub max_mfa_attempts: i32,
    pub totp_issuer: String,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing after parsing.
    pub fn parse(matches: &clap::ArgMatches) -> anyhow::Result<Self> {
        Ok(Self {
            session_ttl_seconds: matches
                .get_one::<i64>("session-ttl-seconds")
                .copied()
                .unwrap_or(86_400),
            setup_session_ttl_seconds: matches
                .get_one::<i64>("setup-session-ttl-seconds")
                .copied()
                .unwrap_or(900),
            preauth_ttl_seconds: matches
                .get_one::<i64>("preauth-ttl-seconds")
                .copied()
                .unwrap_or(300),
            max_mfa_attempts: matches
                .get_one::<i32>("max-mfa-attempts")
                .copied()
                .unwrap_or(5),
            totp_issuer: matches
                .get_one::<String>("totp-issuer")
                .cloned()
                .unwrap_or_else(|| "docgate".to_string()),
        })
    }
}

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Full session TTL in seconds")
                .env("DOCGATE_SESSION_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("setup-session-ttl-seconds")
                .long("setup-session-ttl-seconds")
                .help("Setup-scoped session TTL in seconds")
                .env("DOCGATE_SETUP_SESSION_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("preauth-ttl-seconds")
                .long("preauth-ttl-seconds")
                .help("Pre-auth (MFA pending) token TTL in seconds")
                .env("DOCGATE_PREAUTH_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("max-mfa-attempts")
                .long("max-mfa-attempts")
                .help("Failed MFA code submissions allowed per pre-auth token")
                .env("DOCGATE_MAX_MFA_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(i32)),
        )
        .arg(
            Arg::new("totp-issuer")
                .long("totp-issuer")
                .help("Issuer shown in authenticator apps")
                .env("DOCGATE_TOTP_ISSUER")
                .default_value("docgate"),
        )
}
