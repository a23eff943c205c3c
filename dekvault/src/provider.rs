//! Provider abstraction for data key encryption.
//!
//! Providers never see user payloads: they encrypt and decrypt data keys,
//! which in turn encrypt payloads. Each persisted data key records the id of
//! the provider that encrypted it.

use crate::cipher;
use crate::error::{Error, ProviderError};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretVec};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Id of the built-in static-secret provider.
pub const STATIC_SECRET_PROVIDER: &str = "";

/// Encrypts and decrypts data keys.
///
/// Implementations must be thread-safe (`Send + Sync`) to support
/// concurrent resolution of data keys.
///
/// # Example
///
/// ```rust,ignore
/// use dekvault::provider::Provider;
///
/// struct KmsProvider { /* client */ }
///
/// #[async_trait::async_trait]
/// impl Provider for KmsProvider {
///     async fn encrypt(&self, data_key: &[u8]) -> Result<Vec<u8>, ProviderError> {
///         // Implementation
///     }
///     // ... decrypt
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Encrypts a plaintext data key.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::EncryptFailed` if encryption fails.
    async fn encrypt(&self, data_key: &[u8]) -> Result<Vec<u8>, ProviderError>;

    /// Decrypts an encrypted data key.
    ///
    /// # Returns
    ///
    /// Returns the plaintext data key in a `SecretVec` for memory safety.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::DecryptFailed` if decryption fails.
    async fn decrypt(&self, encrypted: &[u8]) -> Result<SecretVec<u8>, ProviderError>;
}

#[async_trait]
impl<T> Provider for Arc<T>
where
    T: Provider + ?Sized,
{
    async fn encrypt(&self, data_key: &[u8]) -> Result<Vec<u8>, ProviderError> {
        (**self).encrypt(data_key).await
    }

    async fn decrypt(&self, encrypted: &[u8]) -> Result<SecretVec<u8>, ProviderError> {
        (**self).decrypt(encrypted).await
    }
}

#[async_trait]
impl<T> Provider for Box<T>
where
    T: Provider + ?Sized,
{
    async fn encrypt(&self, data_key: &[u8]) -> Result<Vec<u8>, ProviderError> {
        (**self).encrypt(data_key).await
    }

    async fn decrypt(&self, encrypted: &[u8]) -> Result<SecretVec<u8>, ProviderError> {
        (**self).decrypt(encrypted).await
    }
}

/// Built-in provider that encrypts data keys under the configured static secret.
pub struct StaticSecretProvider {
    secret: Arc<SecretVec<u8>>,
}

impl StaticSecretProvider {
    /// Creates a provider over the shared static secret.
    #[must_use]
    pub const fn new(secret: Arc<SecretVec<u8>>) -> Self {
        Self { secret }
    }
}

#[async_trait]
impl Provider for StaticSecretProvider {
    async fn encrypt(&self, data_key: &[u8]) -> Result<Vec<u8>, ProviderError> {
        cipher::seal(data_key, self.secret.expose_secret())
            .map_err(|e| ProviderError::EncryptFailed(e.to_string()))
    }

    async fn decrypt(&self, encrypted: &[u8]) -> Result<SecretVec<u8>, ProviderError> {
        cipher::open(encrypted, self.secret.expose_secret())
            .map(SecretVec::new)
            .map_err(|e| ProviderError::DecryptFailed(e.to_string()))
    }
}

/// Closed set of providers, keyed by the id persisted on each data key.
///
/// Populated once at startup; resolution never loads anything dynamically.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Creates a registry holding only the static-secret provider.
    #[must_use]
    pub fn new(static_secret: Arc<SecretVec<u8>>) -> Self {
        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        providers.insert(
            STATIC_SECRET_PROVIDER.to_string(),
            Arc::new(StaticSecretProvider::new(static_secret)),
        );
        Self { providers }
    }

    /// Registers a provider under `id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateProvider` if `id` is taken, including the
    /// empty id of the static-secret provider.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        provider: Arc<dyn Provider>,
    ) -> Result<(), Error> {
        let id = id.into();
        if self.providers.contains_key(&id) {
            return Err(Error::DuplicateProvider(id));
        }
        self.providers.insert(id, provider);
        Ok(())
    }

    /// Looks up the provider registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ProviderNotFound` if nothing is registered under `id`.
    pub fn resolve(&self, id: &str) -> Result<Arc<dyn Provider>, Error> {
        self.providers.get(id).cloned().ok_or_else(|| Error::ProviderNotFound(id.to_string()))
    }

    /// Returns `true` if a provider is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// Returns the registered ids in sorted order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry").field("ids", &self.ids()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_secret() -> Arc<SecretVec<u8>> {
        Arc::new(SecretVec::new(b"SW2YcwTIb9zpOOhoPsMm".to_vec()))
    }

    // Reverses the key bytes; enough to tell providers apart in tests.
    struct ReversingProvider;

    #[async_trait]
    impl Provider for ReversingProvider {
        async fn encrypt(&self, data_key: &[u8]) -> Result<Vec<u8>, ProviderError> {
            Ok(data_key.iter().rev().copied().collect())
        }

        async fn decrypt(&self, encrypted: &[u8]) -> Result<SecretVec<u8>, ProviderError> {
            Ok(SecretVec::new(encrypted.iter().rev().copied().collect()))
        }
    }

    #[tokio::test]
    async fn test_static_provider_round_trip() {
        let provider = StaticSecretProvider::new(static_secret());

        let encrypted = provider.encrypt(&[7u8; 16]).await.unwrap();
        assert_ne!(encrypted, vec![7u8; 16]);

        let decrypted = provider.decrypt(&encrypted).await.unwrap();
        assert_eq!(decrypted.expose_secret(), &vec![7u8; 16]);
    }

    #[tokio::test]
    async fn test_static_provider_wrong_secret_fails() {
        let provider = StaticSecretProvider::new(static_secret());
        let other = StaticSecretProvider::new(Arc::new(SecretVec::new(b"another".to_vec())));

        let encrypted = provider.encrypt(&[1u8; 16]).await.unwrap();
        let result = other.decrypt(&encrypted).await;
        assert!(matches!(result, Err(ProviderError::DecryptFailed(_))));
    }

    #[tokio::test]
    async fn test_registry_resolves_static_provider() {
        let registry = ProviderRegistry::new(static_secret());
        assert!(registry.contains(STATIC_SECRET_PROVIDER));

        let provider = registry.resolve(STATIC_SECRET_PROVIDER).unwrap();
        let encrypted = provider.encrypt(b"data-key").await.unwrap();
        assert_eq!(provider.decrypt(&encrypted).await.unwrap().expose_secret(), b"data-key");
    }

    #[tokio::test]
    async fn test_registry_register_and_resolve() {
        let mut registry = ProviderRegistry::new(static_secret());
        registry.register("reverse", Arc::new(ReversingProvider)).unwrap();

        assert_eq!(registry.ids(), vec!["", "reverse"]);
        let provider = registry.resolve("reverse").unwrap();
        assert_eq!(provider.encrypt(&[1, 2, 3]).await.unwrap(), vec![3, 2, 1]);
    }

    #[test]
    fn test_registry_unknown_provider() {
        let registry = ProviderRegistry::new(static_secret());
        let result = registry.resolve("kms");
        assert!(matches!(result, Err(Error::ProviderNotFound(id)) if id == "kms"));
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = ProviderRegistry::new(static_secret());
        registry.register("reverse", Arc::new(ReversingProvider)).unwrap();

        let again = registry.register("reverse", Arc::new(ReversingProvider));
        assert!(matches!(again, Err(Error::DuplicateProvider(id)) if id == "reverse"));

        let shadow = registry.register(STATIC_SECRET_PROVIDER, Arc::new(ReversingProvider));
        assert!(matches!(shadow, Err(Error::DuplicateProvider(_))));
    }
}
