//! Configuration for the secrets service.

use crate::error::Error;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::env;

/// Environment variable holding the static secret.
pub const SECRET_KEY_ENV: &str = "DEKVAULT_SECRET_KEY";

/// Environment variable naming the data key used for new encryptions.
pub const ENCRYPTION_KEY_ENV: &str = "DEKVAULT_ENCRYPTION_KEY";

/// Settings consumed by [`SecretsService`](crate::service::SecretsService).
///
/// Deserializable so it can be embedded in a host application's config:
///
/// ```
/// # use dekvault::config::SecretsConfig;
/// let config: SecretsConfig = serde_json::from_str(r#"{ "secret_key": "s3cr3t" }"#).unwrap();
/// assert_eq!(config.default_encryption_key, "");
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SecretsConfig {
    /// Process-wide static secret. Encrypts data keys and legacy payloads.
    pub secret_key: SecretString,

    /// Name of the data key used by `encrypt`. Empty means the static secret.
    #[serde(default)]
    pub default_encryption_key: String,
}

impl SecretsConfig {
    /// Creates a configuration that encrypts directly under the static secret.
    #[must_use]
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: SecretString::new(secret_key.into()),
            default_encryption_key: String::new(),
        }
    }

    /// Sets the data key used for new encryptions.
    #[must_use]
    pub fn with_default_encryption_key(mut self, name: impl Into<String>) -> Self {
        self.default_encryption_key = name.into();
        self
    }

    /// Reads `DEKVAULT_SECRET_KEY` and `DEKVAULT_ENCRYPTION_KEY`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the secret is unset or empty.
    pub fn from_env() -> Result<Self, Error> {
        let secret_key = env::var(SECRET_KEY_ENV)
            .map_err(|_| Error::Config(format!("{SECRET_KEY_ENV} is not set")))?;
        let default_encryption_key = env::var(ENCRYPTION_KEY_ENV).unwrap_or_default();

        let config = Self::new(secret_key).with_default_encryption_key(default_encryption_key);
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the service cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the secret is empty.
    pub fn validate(&self) -> Result<(), Error> {
        if self.secret_key.expose_secret().is_empty() {
            return Err(Error::Config("secret key must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults_to_static_secret() {
        let config = SecretsConfig::new("s3cr3t");
        assert_eq!(config.secret_key.expose_secret(), "s3cr3t");
        assert_eq!(config.default_encryption_key, "");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_secret_is_invalid() {
        let result = SecretsConfig::new("").validate();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = SecretsConfig::new("s3cr3t").with_default_encryption_key("root");
        let debug = format!("{config:?}");
        assert!(!debug.contains("s3cr3t"));
        assert!(debug.contains("root"));
    }
}
