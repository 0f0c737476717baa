//! # Lockbox Store
//!
//! Storage collaborators for the Lockbox server.
//!
//! ## Overview
//!
//! File contents live behind [`BlobStore`]; the access registry is
//! persisted through [`RegistryStore`]. Both are async traits so the server
//! never blocks its runtime on disk I/O.
//!
//! ## Key Types
//!
//! - [`FsBlobStore`] - One plain file per uploaded file, in a single directory
//! - [`SqliteRegistryStore`] - Registry snapshot in SQLite, replaced whole on save
//! - [`MemoryStore`] - Both traits in memory, for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lockbox_store::{FsBlobStore, RegistryStore, SqliteRegistryStore};
//!
//! async fn example() {
//!     let files = FsBlobStore::open("lockbox-files").await.unwrap();
//!     let registry = SqliteRegistryStore::open("lockbox.db").unwrap();
//!
//!     let snapshot = registry.load_registry().await.unwrap();
//!     // ... serve ...
//!     registry.save_registry(&snapshot).await.unwrap();
//! }
//! ```

pub mod error;
pub mod fs;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use fs::FsBlobStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteRegistryStore;
pub use traits::{BlobStore, RegistryStore};
