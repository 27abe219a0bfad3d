//! Secret wrapper for passwords and other sensitive values

use std::fmt;
use zeroize::Zeroize;

/// Sensitive value - redacted in Debug/Display/logs, zeroed on drop
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    /// Create a new secret value
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Whether the wrapped string is empty. Lets callers test for a missing
    /// password without exposing it.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Secret<String> {
    fn default() -> Self {
        Self(String::new())
    }
}

impl From<&str> for Secret<String> {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_redacted_in_debug_and_display() {
        let password = Secret::from("hunter2");
        assert_eq!(format!("{password:?}"), "[REDACTED]");
        assert_eq!(format!("{password}"), "[REDACTED]");
    }

    #[test]
    fn expose_returns_inner_value() {
        let password = Secret::new(String::from("hunter2"));
        assert_eq!(password.expose(), "hunter2");
    }

    #[test]
    fn default_is_empty() {
        let password = Secret::<String>::default();
        assert!(password.is_empty());
        assert!(!Secret::from("x").is_empty());
    }

    #[test]
    fn clone_keeps_value() {
        let password = Secret::from("hunter2");
        let copy = password.clone();
        assert_eq!(copy.expose(), password.expose());
    }
}
