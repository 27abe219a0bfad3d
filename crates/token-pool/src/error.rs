//! Error types for pool operations

/// Errors from pool operations.
///
/// Selection, failure tracking and refresh never fail; the fallible steps are
/// handing refreshed entries to the persistence collaborator and background
/// cycles that die before finishing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("persisting entries failed: {0}")]
    Persist(String),

    #[error("background cycle aborted: {0}")]
    Cycle(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
