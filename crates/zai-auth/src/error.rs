//! Error types for upstream authentication operations

/// Errors from upstream authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("sign-in failed: {0}")]
    SignIn(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("sign-in response carried no token")]
    MissingToken,

    #[error("HTTP client construction failed: {0}")]
    Client(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
