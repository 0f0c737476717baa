//! Storage traits: raw file contents and registry persistence.
//!
//! The server is storage-agnostic. File bytes go through a [`BlobStore`];
//! the access registry is loaded once at startup and saved once at shutdown
//! through a [`RegistryStore`].

use async_trait::async_trait;
use bytes::Bytes;

use lockbox_core::{Filename, RegistrySnapshot};

use crate::error::Result;

/// Storage for the contents of uploaded files.
///
/// Names reaching a store have already been validated as plain file names,
/// but implementations that map names to paths must still refuse anything
/// else.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read a file's contents. Fails with `NotFound` if absent.
    async fn read_file(&self, name: &Filename) -> Result<Bytes>;

    /// Write a file's contents, replacing any previous contents.
    async fn write_file(&self, name: &Filename, data: Bytes) -> Result<()>;

    /// Remove a file. Fails with `NotFound` if absent.
    async fn delete_file(&self, name: &Filename) -> Result<()>;

    /// Check whether a file exists.
    async fn has_file(&self, name: &Filename) -> Result<bool>;
}

/// Load-at-startup, save-at-shutdown persistence for the access registry.
///
/// There is no incremental durability: a crash between the two loses every
/// change made since startup.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Load the saved registry, or an empty one if nothing was saved yet.
    async fn load_registry(&self) -> Result<RegistrySnapshot>;

    /// Replace the saved registry with `snapshot`.
    async fn save_registry(&self, snapshot: &RegistrySnapshot) -> Result<()>;
}
