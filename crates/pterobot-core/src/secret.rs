//! Redacting wrapper for credentials.

use std::sync::Arc;

use crate::config::ConfigError;

/// A credential that never appears in `Debug` or `Display` output.
///
/// Cloning is cheap; the value is shared, not copied.
#[derive(Clone)]
pub struct Secret(Arc<str>);

impl Secret {
    /// Wrap a credential.
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    /// Read a required credential from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnv`] when the variable is unset or blank.
    pub fn from_env(name: &str) -> Result<Self, ConfigError> {
        match std::env::var(name) {
            Ok(value) if !value.trim().is_empty() => Ok(Self::new(value.trim())),
            _ => Err(ConfigError::MissingEnv {
                name: name.to_owned(),
            }),
        }
    }

    /// The raw credential. Only call this when building an auth header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for Secret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

impl core::fmt::Display for Secret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_is_redacted() {
        let secret = Secret::new("ptla_abcdef");
        assert_eq!(format!("{secret:?}"), "Secret([REDACTED])");
        assert_eq!(secret.to_string(), "[REDACTED]");
        assert_eq!(secret.expose(), "ptla_abcdef");
    }
}
