//! # Lockbox
//!
//! A small multi-user file-sharing server. Clients upload, download, delete
//! and share files; the server enforces per-file ownership and read access.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                    Server                     │
//! │   listener ──► ConnectionHandler (per conn)   │
//! ├───────────────────────────────────────────────┤
//! │  ServerState: Mutex<AccessRegistry>, stores   │
//! ├──────────────┬───────────────┬────────────────┤
//! │ lockbox-wire │ lockbox-perms │ lockbox-store  │
//! │  (framing)   │ (envelopes,   │ (files, sqlite)│
//! │              │  validation)  │                │
//! ├──────────────┴───────────────┴────────────────┤
//! │                 lockbox-core                  │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lockbox::{Server, ServerConfig, ServerState, ShutdownHandle};
//! use lockbox_perms::{IdentityKeys, MemoryKeyDirectory};
//! use lockbox_store::MemoryStore;
//!
//! async fn example() -> lockbox::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     let state = ServerState::load(
//!         ServerConfig::default(),
//!         IdentityKeys::generate(),
//!         Arc::new(MemoryKeyDirectory::new()),
//!         store.clone(),
//!         store,
//!     )
//!     .await?;
//!
//!     let server = Server::bind(Arc::new(state))?;
//!     let (handle, shutdown) = ShutdownHandle::channel();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         handle.shutdown();
//!     });
//!
//!     let report = server.serve(shutdown).await?;
//!     println!("served {} connections", report.connections);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod server;

pub use client::{Client, ClientConfig};
pub use dispatcher::{ConnectionHandler, Phase};
pub use error::{LockboxError, Result};
pub use server::{ServeReport, Server, ServerConfig, ServerState, ShutdownHandle};

// Re-export commonly used types from sub-crates
pub use lockbox_core::{Filename, Identity, Request, Response, ResponsePayload};
pub use lockbox_perms::{IdentityKeys, PublicKeys, SignaturePolicy};
pub use lockbox_wire::FrameConfig;
