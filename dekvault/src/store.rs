//! Persistent storage contract for encrypted data keys.

use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// An encrypted data key as persisted by a [`DataKeyStore`].
///
/// Records are immutable once created, except for `active`. No record is
/// ever stored under the empty name, which stands for the static secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataKeyRecord {
    /// Unique name of the data key
    pub name: String,
    /// Id of the provider that encrypted `encrypted_bytes`
    pub provider_id: String,
    /// The data key, encrypted by the provider.
    ///
    /// Holds the provider's output as is, with no envelope header. For the
    /// static-secret provider this is a bare [`cipher::seal`](crate::cipher::seal)
    /// message under the static secret.
    pub encrypted_bytes: Vec<u8>,
    /// Whether the key may be used for new encryptions
    pub active: bool,
}

impl DataKeyRecord {
    /// Creates an active record.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        provider_id: impl Into<String>,
        encrypted_bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            provider_id: provider_id.into(),
            encrypted_bytes,
            active: true,
        }
    }
}

/// Durable store of encrypted data keys, shared across the process.
///
/// Calls may block on I/O. Callers bound every call with a deadline and drop
/// the future when it expires, so implementations must tolerate being
/// cancelled at any await point.
#[async_trait]
pub trait DataKeyStore: Send + Sync {
    /// Fetches the record named `name`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no such record exists.
    async fn get_data_key(&self, name: &str) -> Result<DataKeyRecord, StoreError>;

    /// Persists a new record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if a record with the same name
    /// exists.
    async fn create_data_key(&self, record: DataKeyRecord) -> Result<(), StoreError>;
}

#[async_trait]
impl<T> DataKeyStore for Arc<T>
where
    T: DataKeyStore + ?Sized,
{
    async fn get_data_key(&self, name: &str) -> Result<DataKeyRecord, StoreError> {
        (**self).get_data_key(name).await
    }

    async fn create_data_key(&self, record: DataKeyRecord) -> Result<(), StoreError> {
        (**self).create_data_key(record).await
    }
}

/// Process-local [`DataKeyStore`], for tests and single-process embedding.
#[derive(Debug, Default)]
pub struct MemoryDataKeyStore {
    records: Mutex<HashMap<String, DataKeyRecord>>,
}

impl MemoryDataKeyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no record is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DataKeyRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DataKeyStore for MemoryDataKeyStore {
    async fn get_data_key(&self, name: &str) -> Result<DataKeyRecord, StoreError> {
        self.lock().get(name).cloned().ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn create_data_key(&self, record: DataKeyRecord) -> Result<(), StoreError> {
        let mut records = self.lock();
        if records.contains_key(&record.name) {
            return Err(StoreError::AlreadyExists(record.name));
        }
        records.insert(record.name.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_create_and_get() {
        let store = MemoryDataKeyStore::new();
        store.create_data_key(DataKeyRecord::new("root", "", vec![1, 2, 3])).await.unwrap();

        let record = store.get_data_key("root").await.unwrap();
        assert_eq!(record.name, "root");
        assert_eq!(record.provider_id, "");
        assert_eq!(record.encrypted_bytes, vec![1, 2, 3]);
        assert!(record.active);
    }

    #[tokio::test]
    async fn test_memory_store_not_found() {
        let store = MemoryDataKeyStore::new();
        let result = store.get_data_key("missing").await;
        assert!(matches!(result, Err(StoreError::NotFound(name)) if name == "missing"));
    }

    #[tokio::test]
    async fn test_memory_store_rejects_duplicate_names() {
        let store = MemoryDataKeyStore::new();
        store.create_data_key(DataKeyRecord::new("root", "", vec![1])).await.unwrap();

        let result = store.create_data_key(DataKeyRecord::new("root", "", vec![2])).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
        assert_eq!(store.get_data_key("root").await.unwrap().encrypted_bytes, vec![1]);
        assert_eq!(store.len(), 1);
    }
}
