//! # Sentinela (User Authentication & Account Management)
//!
//! `sentinela` is a credential-based authentication service: registration
//! with email verification, login issuing signed access/refresh token pairs,
//! brute-force account lockout, per-client rate limiting, structured
//! security-event logging, and role-gated account administration.
//!
//! ## Abuse resistance
//!
//! Two independent controls protect the login surface:
//!
//! - **Account lockout** guards a single account against any client: repeated
//!   failed attempts set a `locked_until` timestamp on the account, evaluated
//!   lazily on the next attempt. No timers or background jobs.
//! - **Rate limiting** guards the service against a single client: per
//!   (client, action) fixed windows, checked before any credential or
//!   database work.
//!
//! ## Enumeration resistance
//!
//! Unknown accounts and wrong passwords produce the same response
//! (`401 Incorrect credentials`), so the login endpoint does not reveal
//! which emails are registered.

pub mod api;
pub mod cli;

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
        // Should be a hex string (full SHA-1 is 40 chars, but could be short)
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
