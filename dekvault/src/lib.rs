//! # `dekvault`
//!
//! Envelope encryption for stored secrets: payloads are encrypted under
//! data keys, and data keys are stored encrypted by pluggable providers.
//!
//! ## Features
//!
//! - AEAD encryption (ChaCha20-Poly1305 with HKDF-SHA256 derived keys)
//! - Self-describing ciphertexts naming the data key they were sealed under
//! - Idempotent bootstrap of a root data key
//! - Time-bounded cache of decrypted data keys
//! - Reads legacy blobs encrypted directly under the static secret
//!
//! ## Example
//!
//! ```rust,ignore
//! use dekvault::prelude::*;
//!
//! let config = SecretsConfig::from_env()?;
//! let secrets = SecretsService::new(FileDataKeyStore::open("./data-keys.json")?, config)?;
//! secrets.initialize().await?;
//!
//! let blob = secrets.encrypt(b"db-password").await?;
//! let plaintext = secrets.decrypt(&blob).await?;
//! ```

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod cipher;
pub mod config;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod provider;
pub mod service;
pub mod store;

pub mod prelude {
    //! Convenience re-exports for common use.
    pub use crate::config::SecretsConfig;
    pub use crate::envelope::Envelope;
    pub use crate::error::{Error, ProviderError, StoreError};
    pub use crate::provider::Provider;
    pub use crate::service::SecretsService;
    pub use crate::store::{DataKeyRecord, DataKeyStore, MemoryDataKeyStore};
}
