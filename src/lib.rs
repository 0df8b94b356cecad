//! # pulse-portal
//!
//! A client for a security provider's server-rendered web portal. There is
//! no official API: the client signs in like a browser, keeps the cookie
//! session alive and recovers every token and state it needs from the HTML
//! the portal renders.
//!
//! ## Session
//!
//! A session is created by [`portal::Portal::login`] and lives in memory
//! only. Successful exchanges refresh it; a redirect back to the sign-in page
//! ends it. After that every read answers `Unauthenticated` until the next
//! login.
//!
//! ## Multi-factor sign-in
//!
//! When the portal asks for verification, `login` stops at `MfaRequired`.
//! The caller fetches the offered methods, requests and validates a six digit
//! code, optionally registers the device as trusted, and finishes with
//! `complete_sign_in`.
//!
//! ## Commands
//!
//! Arm and disarm buttons carry anti-forgery tokens that are only valid
//! until the next exchange. `set_panel_status` reads the orb and uses its
//! buttons straight away. A refusal caused by open sensors is escalated to a
//! force-arm with the tokens from that same refusal.

pub mod cli;
pub mod config;
pub mod portal;

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
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with("pulse-portal/"));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
