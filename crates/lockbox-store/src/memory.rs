//! In-memory implementation of both storage traits.
//!
//! This is primarily for testing. It has the same semantics as the on-disk
//! stores but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use lockbox_core::{Filename, RegistrySnapshot};

use crate::error::{Result, StoreError};
use crate::traits::{BlobStore, RegistryStore};

/// In-memory store.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    /// File contents by name.
    blobs: HashMap<Filename, Bytes>,

    /// Last saved registry.
    registry: Option<RegistrySnapshot>,

    /// How many times the registry was saved.
    saves: usize,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose registry starts out as `snapshot`.
    pub fn with_registry(snapshot: RegistrySnapshot) -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner {
                registry: Some(snapshot),
                ..Default::default()
            }),
        }
    }

    /// Number of `save_registry` calls so far.
    pub fn save_count(&self) -> usize {
        self.inner.read().map(|inner| inner.saves).unwrap_or(0)
    }

    /// The last saved registry, if any.
    pub fn saved_registry(&self) -> Option<RegistrySnapshot> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.registry.clone())
    }

    /// Number of stored files.
    pub fn file_count(&self) -> usize {
        self.inner.read().map(|inner| inner.blobs.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::InvalidData("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::InvalidData("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn read_file(&self, name: &Filename) -> Result<Bytes> {
        self.read()?
            .blobs
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn write_file(&self, name: &Filename, data: Bytes) -> Result<()> {
        self.write()?.blobs.insert(name.clone(), data);
        Ok(())
    }

    async fn delete_file(&self, name: &Filename) -> Result<()> {
        self.write()?
            .blobs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn has_file(&self, name: &Filename) -> Result<bool> {
        Ok(self.read()?.blobs.contains_key(name))
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn load_registry(&self) -> Result<RegistrySnapshot> {
        Ok(self.read()?.registry.clone().unwrap_or_default())
    }

    async fn save_registry(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        let mut inner = self.write()?;
        inner.registry = Some(snapshot.clone());
        inner.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockbox_core::{FileRecord, Identity};

    #[tokio::test]
    async fn test_blob_lifecycle() {
        let store = MemoryStore::new();
        let name = Filename::new("notes.txt");

        assert!(!store.has_file(&name).await.unwrap());
        assert!(matches!(
            store.read_file(&name).await,
            Err(StoreError::NotFound(_))
        ));

        store.write_file(&name, Bytes::from_static(b"hi")).await.unwrap();
        assert!(store.has_file(&name).await.unwrap());
        assert_eq!(store.read_file(&name).await.unwrap(), Bytes::from_static(b"hi"));

        store.write_file(&name, Bytes::from_static(b"bye")).await.unwrap();
        assert_eq!(store.read_file(&name).await.unwrap(), Bytes::from_static(b"bye"));

        store.delete_file(&name).await.unwrap();
        assert!(!store.has_file(&name).await.unwrap());
        assert!(matches!(
            store.delete_file(&name).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_registry_save_and_load() {
        let store = MemoryStore::new();
        assert!(store.load_registry().await.unwrap().is_empty());
        assert_eq!(store.save_count(), 0);

        let alice = Identity::new("alice").unwrap();
        let snapshot = RegistrySnapshot {
            users: vec![alice.clone()],
            files: vec![FileRecord::new(Filename::new("a"), alice)],
        };

        store.save_registry(&snapshot).await.unwrap();
        assert_eq!(store.load_registry().await.unwrap(), snapshot);
        assert_eq!(store.save_count(), 1);
    }
}
