//! Raw pool entry forms
//!
//! A raw entry is one of:
//! - `token`: opaque bearer token
//! - `email----password`: credentials known, no token yet
//! - `email----password----token`: composite, fully usable
//!
//! Any other separator count is treated as an opaque bearer token rather than
//! rejected.

use std::fmt;

/// Separator between the segments of a raw entry.
pub const SEPARATOR: &str = "----";

/// Identity written into a refreshed composite entry whose email could not be
/// recovered, so the new token stays usable as a bearer credential.
pub const PLACEHOLDER_IDENTITY: &str = "unknown";

/// Bearer token carried by a raw entry.
///
/// Exactly three segments yield the last one; everything else, including the
/// two-segment credentials form, is returned unchanged. Never fails.
pub fn extract_token(raw: &str) -> &str {
    let mut segments = raw.split(SEPARATOR);
    match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(_), Some(_), Some(token), None) => token,
        _ => raw,
    }
}

/// A parsed raw entry.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialEntry {
    Bearer {
        token: String,
    },
    Credentials {
        email: String,
        password: String,
    },
    Composite {
        email: String,
        password: String,
        token: String,
    },
}

impl CredentialEntry {
    /// Classify a raw string by separator count.
    pub fn parse(raw: &str) -> Self {
        let segments: Vec<&str> = raw.split(SEPARATOR).collect();
        match segments.as_slice() {
            [email, password] => Self::Credentials {
                email: email.to_string(),
                password: password.to_string(),
            },
            [email, password, token] => Self::Composite {
                email: email.to_string(),
                password: password.to_string(),
                token: token.to_string(),
            },
            _ => Self::Bearer {
                token: raw.to_string(),
            },
        }
    }

    pub fn composite(email: &str, password: &str, token: &str) -> Self {
        Self::Composite {
            email: email.to_string(),
            password: password.to_string(),
            token: token.to_string(),
        }
    }

    /// Raw string form, the inverse of `parse`.
    pub fn raw(&self) -> String {
        match self {
            Self::Bearer { token } => token.clone(),
            Self::Credentials { email, password } => {
                format!("{email}{SEPARATOR}{password}")
            }
            Self::Composite {
                email,
                password,
                token,
            } => format!("{email}{SEPARATOR}{password}{SEPARATOR}{token}"),
        }
    }

    pub fn email(&self) -> &str {
        match self {
            Self::Bearer { .. } => "",
            Self::Credentials { email, .. } | Self::Composite { email, .. } => email,
        }
    }

    pub fn password(&self) -> &str {
        match self {
            Self::Bearer { .. } => "",
            Self::Credentials { password, .. } | Self::Composite { password, .. } => password,
        }
    }

    /// Token segment, if the entry carries one separate from its credentials.
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Bearer { token } | Self::Composite { token, .. } => Some(token),
            Self::Credentials { .. } => None,
        }
    }

    pub fn has_credentials(&self) -> bool {
        !matches!(self, Self::Bearer { .. })
    }

    pub fn needs_token(&self) -> bool {
        matches!(self, Self::Credentials { .. })
    }
}

impl fmt::Debug for CredentialEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer { token } => f
                .debug_struct("Bearer")
                .field("token", &zai_auth::token_preview(token))
                .finish(),
            Self::Credentials { email, .. } => f
                .debug_struct("Credentials")
                .field("email", email)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::Composite { email, token, .. } => f
                .debug_struct("Composite")
                .field("email", email)
                .field("password", &"[REDACTED]")
                .field("token", &zai_auth::token_preview(token))
                .finish(),
        }
    }
}
