//! Error types for `dekvault` operations.

use std::fmt;
use std::time::Duration;

/// Main error type for `dekvault` operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The blob starts with `#` but carries no readable key name
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The store has no record for the requested data key
    #[error("data key not found: {0}")]
    DataKeyNotFound(String),

    /// A data key with this name already exists in the store
    #[error("data key already exists: {0}")]
    DataKeyExists(String),

    /// A record references a provider id that was never registered
    #[error("could not find encryption provider '{0}'")]
    ProviderNotFound(String),

    /// A provider id was registered twice
    #[error("encryption provider '{0}' is already registered")]
    DuplicateProvider(String),

    /// A pluggable provider failed to encrypt or decrypt a data key
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// AEAD encryption or decryption failed.
    ///
    /// Carries no detail: a truncated ciphertext, a wrong key and a forged
    /// tag all surface identically.
    #[error("cipher failure: ciphertext may be corrupted or tampered")]
    CipherFailure,

    /// The store did not answer before the deadline
    #[error("store {operation} timed out after {deadline:?}")]
    StoreTimeout {
        /// Store operation that timed out
        operation: &'static str,
        /// Deadline that was exceeded
        deadline: Duration,
    },

    /// The store returned an error other than "not found"
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The operating system random source failed
    #[error("random source failure: {0}")]
    RandomSource(String),

    /// `encrypt`/`decrypt` was called before `initialize` completed
    #[error("secrets service is not initialized")]
    NotInitialized,

    /// Configuration is missing or invalid
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(name) => Self::DataKeyNotFound(name),
            StoreError::AlreadyExists(name) => Self::DataKeyExists(name),
            StoreError::Unavailable(msg) => Self::StoreUnavailable(msg),
            StoreError::Io(err) => Self::StoreUnavailable(err.to_string()),
        }
    }
}

/// Errors reported by a [`Provider`](crate::provider::Provider) implementation.
#[derive(Debug)]
pub enum ProviderError {
    /// Wrapping a data key failed
    EncryptFailed(String),

    /// Unwrapping a data key failed
    DecryptFailed(String),

    /// The provider's backing service could not be reached
    Unavailable(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncryptFailed(msg) => write!(f, "data key encryption failed: {msg}"),
            Self::DecryptFailed(msg) => write!(f, "data key decryption failed: {msg}"),
            Self::Unavailable(msg) => write!(f, "provider unavailable: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Errors reported by a [`DataKeyStore`](crate::store::DataKeyStore) implementation.
#[derive(Debug)]
pub enum StoreError {
    /// No record exists under this name
    NotFound(String),

    /// A record already exists under this name
    AlreadyExists(String),

    /// The store failed for another reason
    Unavailable(String),

    /// I/O operation failed
    Io(std::io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(name) => write!(f, "data key not found: {name}"),
            Self::AlreadyExists(name) => write!(f, "data key already exists: {name}"),
            Self::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_data_key_not_found() {
        let err = Error::from(StoreError::NotFound("root".to_string()));
        assert!(matches!(err, Error::DataKeyNotFound(name) if name == "root"));
    }

    #[test]
    fn test_store_io_maps_to_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::from(StoreError::from(io));
        assert!(matches!(err, Error::StoreUnavailable(msg) if msg.contains("denied")));
    }

    #[test]
    fn test_provider_not_found_message() {
        let err = Error::ProviderNotFound("kms".to_string());
        assert_eq!(err.to_string(), "could not find encryption provider 'kms'");
    }
}
