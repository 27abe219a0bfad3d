//! Upstream outcome classification
//!
//! Maps the HTTP status of a request made with a pool token onto the action
//! the failure tracker takes for that token.

/// What an upstream response says about the token that made it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Accepted; clears a previous failure mark.
    Success,
    /// Refused (invalid, revoked or throttled); the entry is marked failed.
    Rejected,
    /// Upstream or network trouble unrelated to the token; no pool action.
    Transient,
}

impl Outcome {
    /// Metric/log label.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Rejected => "rejected",
            Outcome::Transient => "transient",
        }
    }
}

/// Classify an upstream HTTP status.
///
/// 2xx is Success. 401/403 mean the token is no longer accepted and 429 means
/// it is throttled; both are Rejected so rotation moves on. Everything else
/// (408, 5xx, other 4xx) is Transient.
pub fn classify_status(status: u16) -> Outcome {
    match status {
        200..=299 => Outcome::Success,
        401 | 403 | 429 => Outcome::Rejected,
        _ => Outcome::Transient,
    }
}
