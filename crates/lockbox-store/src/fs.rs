//! File contents stored as plain files in one directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use lockbox_core::Filename;

use crate::error::{Result, StoreError};
use crate::traits::BlobStore;

/// Blob store backed by a directory on disk.
///
/// Each file is stored under its own name directly inside `root`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Use `root` as the file directory, creating it if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// The directory holding the files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &Filename) -> Result<PathBuf> {
        if !name.is_plain() {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name.as_str()))
    }
}

fn not_found(name: &Filename) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |e| match e.kind() {
        ErrorKind::NotFound => StoreError::NotFound(name.to_string()),
        _ => StoreError::Io(e),
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn read_file(&self, name: &Filename) -> Result<Bytes> {
        let data = tokio::fs::read(self.path(name)?)
            .await
            .map_err(not_found(name))?;
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, name: &Filename, data: Bytes) -> Result<()> {
        tokio::fs::write(self.path(name)?, &data).await?;
        tracing::debug!(file = %name, bytes = data.len(), "wrote file");
        Ok(())
    }

    async fn delete_file(&self, name: &Filename) -> Result<()> {
        tokio::fs::remove_file(self.path(name)?)
            .await
            .map_err(not_found(name))
    }

    async fn has_file(&self, name: &Filename) -> Result<bool> {
        match tokio::fs::metadata(self.path(name)?).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fs_blob_lifecycle() {
        let tmp = TempDir::new().unwrap();
        let store = FsBlobStore::open(tmp.path().join("files")).await.unwrap();
        let name = Filename::new("notes.txt");

        assert!(!store.has_file(&name).await.unwrap());
        store.write_file(&name, Bytes::from_static(b"hi")).await.unwrap();

        assert!(tmp.path().join("files/notes.txt").exists());
        assert!(store.has_file(&name).await.unwrap());
        assert_eq!(store.read_file(&name).await.unwrap(), Bytes::from_static(b"hi"));

        store.delete_file(&name).await.unwrap();
        assert!(!store.has_file(&name).await.unwrap());
        assert!(matches!(
            store.read_file(&name).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_file(&name).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fs_rejects_path_names() {
        let tmp = TempDir::new().unwrap();
        let store = FsBlobStore::open(tmp.path()).await.unwrap();

        for bad in ["../escape", "a/b", "..", ""] {
            let result = store
                .write_file(&Filename::new(bad), Bytes::from_static(b"x"))
                .await;
            assert!(matches!(result, Err(StoreError::InvalidName(_))), "{bad}");
        }
        assert!(!tmp.path().parent().unwrap().join("escape").exists());
    }
}
