//! File-based data key store for `dekvault`.
//!
//! This store keeps every data key record in a single JSON file and is
//! suitable for development, testing and single-node deployments.

#![warn(clippy::pedantic, clippy::nursery)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use dekvault::error::StoreError;
use dekvault::store::{DataKeyRecord, DataKeyStore};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

const FORMAT_VERSION: u32 = 1;

/// File-based data key store.
///
/// Records are stored as:
/// ```text
/// {
///   "version": 1,
///   "data_keys": [
///     { "name": "root", "provider": "", "encrypted_data": "<base64>", "active": true }
///   ]
/// }
/// ```
///
/// Writes replace the file atomically through a temporary sibling file and
/// are serialized by a lock held in this process only. The file must have a
/// single writing process: two processes creating keys at the same time can
/// each rewrite the file from a stale copy, and one of the new keys is lost.
/// Concurrent tasks sharing one `FileDataKeyStore` are safe.
pub struct FileDataKeyStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DataKeyFile {
    version: u32,
    data_keys: Vec<StoredDataKey>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredDataKey {
    name: String,
    provider: String,
    encrypted_data: String,
    active: bool,
}

impl StoredDataKey {
    fn from_record(record: &DataKeyRecord) -> Self {
        Self {
            name: record.name.clone(),
            provider: record.provider_id.clone(),
            encrypted_data: STANDARD.encode(&record.encrypted_bytes),
            active: record.active,
        }
    }

    fn to_record(&self) -> Result<DataKeyRecord, StoreError> {
        let encrypted_bytes = STANDARD.decode(&self.encrypted_data).map_err(|e| {
            StoreError::Unavailable(format!("corrupt data key '{}': {e}", self.name))
        })?;
        Ok(DataKeyRecord {
            name: self.name.clone(),
            provider_id: self.provider.clone(),
            encrypted_bytes,
            active: self.active,
        })
    }
}

impl FileDataKeyStore {
    /// Opens the store at `path`.
    ///
    /// The file itself is created by the first write.
    ///
    /// # Errors
    ///
    /// Returns error if the parent directory doesn't exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        if !parent.is_dir() {
            return Err(StoreError::Unavailable(format!(
                "data key directory does not exist: {}",
                parent.display()
            )));
        }
        Ok(Self { path, write_lock: Mutex::new(()) })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lists every stored record, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub async fn list(&self) -> Result<Vec<DataKeyRecord>, StoreError> {
        self.load().await?.data_keys.iter().map(StoredDataKey::to_record).collect()
    }

    async fn load(&self) -> Result<DataKeyFile, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(DataKeyFile { version: FORMAT_VERSION, data_keys: Vec::new() })
            }
            Err(err) => return Err(err.into()),
        };

        let file: DataKeyFile = serde_json::from_slice(&bytes).map_err(|e| {
            StoreError::Unavailable(format!("corrupt data key file {}: {e}", self.path.display()))
        })?;

        if file.version != FORMAT_VERSION {
            return Err(StoreError::Unavailable(format!(
                "unsupported data key file version: {} (supported: {FORMAT_VERSION})",
                file.version
            )));
        }
        Ok(file)
    }

    async fn save(&self, file: &DataKeyFile) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(file)
            .map_err(|e| StoreError::Unavailable(format!("could not encode data keys: {e}")))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(format!(".{}.tmp", std::process::id()));
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DataKeyStore for FileDataKeyStore {
    async fn get_data_key(&self, name: &str) -> Result<DataKeyRecord, StoreError> {
        let file = self.load().await?;
        file.data_keys
            .iter()
            .find(|stored| stored.name == name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?
            .to_record()
    }

    async fn create_data_key(&self, record: DataKeyRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut file = self.load().await?;
        if file.data_keys.iter().any(|stored| stored.name == record.name) {
            return Err(StoreError::AlreadyExists(record.name));
        }

        file.data_keys.push(StoredDataKey::from_record(&record));
        self.save(&file).await?;

        debug!(key = %record.name, path = %self.path.display(), "stored data key");
        Ok(())
    }
}
