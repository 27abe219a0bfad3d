//! Z.AI upstream authentication library
//!
//! Everything that talks to the upstream service on behalf of the token pool:
//! the sign-in exchange that turns an email/password pair into a session
//! token, the synthetic chat request used as a health probe, and the entries
//! file that persists the raw pool list between restarts. This crate keeps no
//! pool state of its own.
//!
//! Credential flow:
//! 1. Operator supplies raw entries (config, env, or `EntryFile`)
//! 2. Pool hands out bearer tokens for outbound chat requests
//! 3. `Upstream::probe()` re-checks tokens the pool has marked failed
//! 4. `Upstream::sign_in()` exchanges stored credentials for a fresh token
//! 5. Refreshed raw entries are written back via `EntryFile::save()`

pub mod constants;
pub mod entries;
pub mod error;
pub mod probe;
pub mod signin;
pub mod upstream;

pub use constants::*;
pub use entries::{EntryFile, parse_entry_list};
pub use error::{Error, Result};
pub use signin::SignInResponse;
pub use upstream::{Upstream, UpstreamConfig};

/// Short, log-safe rendering of a token or raw entry.
///
/// Keeps the first 8 characters and elides the rest so log lines and admin
/// listings can identify an entry without leaking it.
pub fn token_preview(token: &str) -> String {
    match token.char_indices().nth(8) {
        Some((idx, _)) => format!("{}...", &token[..idx]),
        None => token.to_string(),
    }
}
