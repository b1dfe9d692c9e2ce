use clap::{Arg, Command};
use secrecy::SecretString;

pub const ARG_FEDERATION_BASE_URL: &str = "federation-base-url";
pub const ARG_FEDERATION_APP_ID: &str = "federation-app-id";
pub const ARG_FEDERATION_APP_SECRET: &str = "federation-app-secret";

#[derive(Debug)]
pub struct Options {
    pub base_url: Option<String>,
    pub app_id: Option<String>,
    pub app_secret: Option<SecretString>,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &clap::ArgMatches) -> Self {
        Self {
            base_url: matches.get_one::<String>(ARG_FEDERATION_BASE_URL).cloned(),
            app_id: matches.get_one::<String>(ARG_FEDERATION_APP_ID).cloned(),
            app_secret: matches
                .get_one::<String>(ARG_FEDERATION_APP_SECRET)
                .cloned()
                .map(SecretString::from),
        }
    }
}

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FEDERATION_BASE_URL)
                .long(ARG_FEDERATION_BASE_URL)
                .help("Identity provider base URL; federated login is disabled when unset")
                .env("DOCGATE_FEDERATION_BASE_URL"),
        )
        .arg(
            Arg::new(ARG_FEDERATION_APP_ID)
                .long(ARG_FEDERATION_APP_ID)
                .help("Application id registered with the identity provider")
                .env("DOCGATE_FEDERATION_APP_ID"),
        )
        .arg(
            Arg::new(ARG_FEDERATION_APP_SECRET)
                .long(ARG_FEDERATION_APP_SECRET)
                .help("Application secret registered with the identity provider")
                .env("DOCGATE_FEDERATION_APP_SECRET"),
        )
}
