//! Secrets service for encryption and decryption operations.
//!
//! The service implements envelope encryption over a persistent store of
//! data keys:
//! 1. Resolve the data key named by the configuration (cache, then store)
//! 2. Decrypt the stored data key with the provider that encrypted it
//! 3. Encrypt the payload under the data key
//! 4. Prefix the ciphertext with the data key's name
//!
//! The empty key name is the static secret itself and never touches the
//! store, the providers or the cache.

use crate::cache::{DataKey, DataKeyCache, DATA_KEY_CACHE_TTL};
use crate::cipher;
use crate::config::SecretsConfig;
use crate::envelope;
use crate::error::Error;
use crate::kdf::generate_data_key;
use crate::provider::{Provider, ProviderRegistry, STATIC_SECRET_PROVIDER};
use crate::store::{DataKeyRecord, DataKeyStore};
use secrecy::{ExposeSecret, SecretVec};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Name of the data key created by [`SecretsService::initialize`].
pub const ROOT_DATA_KEY: &str = "root";

/// Provider id recorded on generated data keys.
pub const DEFAULT_PROVIDER: &str = STATIC_SECRET_PROVIDER;

/// Deadline for the whole bootstrap of the root data key.
pub const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for resolving one data key on a cache miss.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(1);

/// Encrypts and decrypts payloads under cached, provider-wrapped data keys.
///
/// A service starts uninitialized; [`initialize`](Self::initialize) makes it
/// ready. Clones share the store, the providers and the cache, so a single
/// initialized service can be handed to every collaborator that needs it.
///
/// # Example
///
/// ```
/// use dekvault::prelude::*;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Error> {
/// let config = SecretsConfig::new("s3cr3t").with_default_encryption_key("root");
/// let secrets = SecretsService::new(MemoryDataKeyStore::new(), config)?;
/// secrets.initialize().await?;
///
/// let blob = secrets.encrypt(b"db-password").await?;
/// assert!(blob.starts_with(b"#cm9vdA#"));
/// assert_eq!(secrets.decrypt(&blob).await?, b"db-password");
/// # Ok(())
/// # }
/// ```
pub struct SecretsService<S: DataKeyStore> {
    store: Arc<S>,
    providers: Arc<ProviderRegistry>,
    cache: Arc<DataKeyCache>,
    static_secret: DataKey,
    default_encryption_key: String,
    ready: Arc<AtomicBool>,
}

impl<S: DataKeyStore> SecretsService<S> {
    /// Creates an uninitialized service with only the static-secret provider.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is invalid.
    pub fn new(store: S, config: SecretsConfig) -> Result<Self, Error> {
        Self::builder(store, config).build()
    }

    /// Starts a builder, used to register additional providers.
    #[must_use]
    pub fn builder(store: S, config: SecretsConfig) -> SecretsServiceBuilder<S> {
        SecretsServiceBuilder { store, config, providers: Vec::new() }
    }

    /// Ensures the root data key exists, then marks the service ready.
    ///
    /// Safe to call on every start: an existing root key is left untouched.
    /// The lookup and the creation share a single deadline.
    ///
    /// # Errors
    ///
    /// Returns error if the store lookup fails for any reason other than the
    /// key being absent, or if generating or persisting the key fails.
    pub async fn initialize(&self) -> Result<(), Error> {
        with_deadline("bootstrap", BOOTSTRAP_TIMEOUT, async {
            match self.store.get_data_key(ROOT_DATA_KEY).await {
                Ok(_) => {
                    debug!(key = ROOT_DATA_KEY, "root data key present");
                    Ok(())
                }
                Err(err) => match Error::from(err) {
                    Error::DataKeyNotFound(_) => self.create_data_key(ROOT_DATA_KEY).await,
                    other => Err(other),
                },
            }
        })
        .await
        .or_else(|err| match err {
            // Another process bootstrapped between our lookup and our write.
            Error::DataKeyExists(_) => {
                debug!(key = ROOT_DATA_KEY, "root data key created concurrently");
                Ok(())
            }
            other => Err(other),
        })?;

        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Returns `true` once [`initialize`](Self::initialize) has completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Creates and persists a new random data key named `name`.
    ///
    /// The key is always encrypted under the static secret, never under
    /// another data key.
    ///
    /// # Errors
    ///
    /// Returns `Error::DataKeyExists` if `name` is empty or already stored,
    /// `Error::RandomSource` if key generation fails, and store or provider
    /// errors if persisting fails.
    pub async fn generate_data_key(&self, name: &str) -> Result<(), Error> {
        with_deadline("create_data_key", BOOTSTRAP_TIMEOUT, self.create_data_key(name)).await
    }

    async fn create_data_key(&self, name: &str) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::DataKeyExists(String::new()));
        }

        let data_key = generate_data_key()?;
        let provider = self.providers.resolve(DEFAULT_PROVIDER)?;
        let encrypted_bytes = provider.encrypt(data_key.expose_secret()).await?;

        self.store
            .create_data_key(DataKeyRecord::new(name, DEFAULT_PROVIDER, encrypted_bytes))
            .await?;

        info!(key = name, provider = DEFAULT_PROVIDER, "created data key");
        Ok(())
    }

    /// Returns the plaintext of the data key named `name`.
    ///
    /// The empty name resolves to the static secret. Other names are served
    /// from the cache, or fetched from the store and decrypted by the
    /// record's provider, then cached for [`DATA_KEY_CACHE_TTL`].
    ///
    /// # Errors
    ///
    /// Returns `Error::DataKeyNotFound` if the store has no such key,
    /// `Error::ProviderNotFound` if its provider is not registered,
    /// `Error::StoreTimeout` if the lookup exceeds [`LOOKUP_TIMEOUT`], and
    /// store or provider errors otherwise. The cache is left unchanged on
    /// failure.
    pub async fn resolve_data_key(&self, name: &str) -> Result<DataKey, Error> {
        if name.is_empty() {
            return Ok(Arc::clone(&self.static_secret));
        }

        if let Some(data_key) = self.cache.get(name) {
            debug!(key = name, "data key cache hit");
            return Ok(data_key);
        }

        debug!(key = name, "data key cache miss");
        let data_key = with_deadline("resolve_data_key", LOOKUP_TIMEOUT, async {
            let record = self.store.get_data_key(name).await?;
            let provider = self.providers.resolve(&record.provider_id)?;

            provider.decrypt(&record.encrypted_bytes).await.map_err(|err| {
                warn!(
                    key = name,
                    provider = %record.provider_id,
                    error = %err,
                    "could not decrypt data key"
                );
                Error::from(err)
            })
        })
        .await?;

        let data_key = Arc::new(data_key);
        self.cache.put(name, Arc::clone(&data_key), DATA_KEY_CACHE_TTL);
        Ok(data_key)
    }

    /// Encrypts `payload` under the default encryption key.
    ///
    /// # Returns
    ///
    /// `'#' base64(key_name) '#' ciphertext`
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized` before [`initialize`](Self::initialize),
    /// key resolution errors, or `Error::CipherFailure`.
    pub async fn encrypt(&self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        self.ensure_ready()?;

        let data_key = self.resolve_data_key(&self.default_encryption_key).await?;
        let ciphertext = cipher::seal(payload, data_key.expose_secret())?;

        Ok(envelope::encode(&self.default_encryption_key, &ciphertext))
    }

    /// Decrypts a blob produced by [`encrypt`](Self::encrypt) or a legacy
    /// blob encrypted directly under the static secret.
    ///
    /// An empty blob decrypts to an empty payload without touching the store.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized` before [`initialize`](Self::initialize),
    /// `Error::MalformedEnvelope`, key resolution errors, or
    /// `Error::CipherFailure` if the ciphertext was tampered with.
    pub async fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, Error> {
        self.ensure_ready()?;

        if blob.is_empty() {
            return Ok(Vec::new());
        }

        let (key_name, ciphertext) = envelope::decode(blob)?.into_parts();
        let data_key = match key_name {
            Some(name) => self.resolve_data_key(&name).await?,
            None => Arc::clone(&self.static_secret),
        };

        cipher::open(&ciphertext, data_key.expose_secret())
    }

    /// Name of the data key used by [`encrypt`](Self::encrypt).
    #[must_use]
    pub fn default_encryption_key(&self) -> &str {
        &self.default_encryption_key
    }

    /// The registered providers.
    #[must_use]
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// The data key cache.
    #[must_use]
    pub fn cache(&self) -> &DataKeyCache {
        &self.cache
    }

    fn ensure_ready(&self) -> Result<(), Error> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }
}

impl<S: DataKeyStore> Clone for SecretsService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            providers: Arc::clone(&self.providers),
            cache: Arc::clone(&self.cache),
            static_secret: Arc::clone(&self.static_secret),
            default_encryption_key: self.default_encryption_key.clone(),
            ready: Arc::clone(&self.ready),
        }
    }
}

/// Builder for [`SecretsService`].
pub struct SecretsServiceBuilder<S> {
    store: S,
    config: SecretsConfig,
    providers: Vec<(String, Arc<dyn Provider>)>,
}

impl<S: DataKeyStore> SecretsServiceBuilder<S> {
    /// Registers a provider under `id`.
    #[must_use]
    pub fn provider(mut self, id: impl Into<String>, provider: impl Provider + 'static) -> Self {
        let provider: Arc<dyn Provider> = Arc::new(provider);
        self.providers.push((id.into(), provider));
        self
    }

    /// Builds the uninitialized service.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is invalid and
    /// `Error::DuplicateProvider` if two providers share an id.
    pub fn build(self) -> Result<SecretsService<S>, Error> {
        self.config.validate()?;

        let static_secret: DataKey = Arc::new(SecretVec::new(
            self.config.secret_key.expose_secret().as_bytes().to_vec(),
        ));

        let mut registry = ProviderRegistry::new(Arc::clone(&static_secret));
        for (id, provider) in self.providers {
            registry.register(id, provider)?;
        }

        Ok(SecretsService {
            store: Arc::new(self.store),
            providers: Arc::new(registry),
            cache: Arc::new(DataKeyCache::new()),
            static_secret,
            default_encryption_key: self.config.default_encryption_key,
            ready: Arc::new(AtomicBool::new(false)),
        })
    }
}

async fn with_deadline<T, F>(operation: &'static str, deadline: Duration, fut: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| Error::StoreTimeout { operation, deadline })?
}
