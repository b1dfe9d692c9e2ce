//! API handlers for docgate.
//!
//! Auth, MFA, and permissions each keep their storage helpers next to the
//! handlers that use them.

pub mod auth;
pub mod health;
pub mod mfa;
pub mod permissions;
