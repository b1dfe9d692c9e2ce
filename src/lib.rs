//! # Docgate (Document Access Control Core)
//!
//! `docgate` is the access-control authority for a document store. It owns
//! the step-up login flow (captcha, password, TOTP, forced first-time setup),
//! opaque bearer sessions, and the hierarchical permission model that decides
//! whether a principal may view or download a resource.
//!
//! ## Login state machine
//!
//! A login attempt moves through captcha verification, credential check, and
//! then one of three outcomes: a full session, an MFA challenge backed by a
//! single-use pre-auth token, or a setup-scoped session for principals that
//! have never completed first-time configuration.
//!
//! ## Permission model
//!
//! Grants attach view/download flags to a (subject, resource) pair, where a
//! subject is a user or a group. Effective rights are the permissive union of
//! every grant on the resource and its ancestor folders; there is no deny
//! grant, and admins bypass grants entirely. `can_download` always implies
//! `can_view`.
//!
//! All pre-session failures collapse to a generic `401` at the HTTP boundary
//! so responses cannot be used for username enumeration.

pub mod api;
pub mod authz;
pub mod captcha;
pub mod cli;
pub mod federation;
pub mod totp;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_user_agent_shape() {
        assert!(APP_USER_AGENT.starts_with("docgate/"));
    }
}
