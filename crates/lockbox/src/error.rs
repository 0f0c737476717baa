//! Error types for the server and client.

use lockbox_core::CoreError;
use lockbox_perms::PermsError;
use lockbox_store::StoreError;
use lockbox_wire::{FramingError, WireError};
use thiserror::Error;

/// Errors that can occur while serving or sending requests.
#[derive(Debug, Error)]
pub enum LockboxError {
    /// Framing or message encoding error.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Envelope or key directory error.
    #[error("permission error: {0}")]
    Perms(#[from] PermsError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Core type error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The peer broke the request/response protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Socket error outside of framing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FramingError> for LockboxError {
    fn from(e: FramingError) -> Self {
        LockboxError::Wire(WireError::Framing(e))
    }
}

/// Result type for server and client operations.
pub type Result<T> = std::result::Result<T, LockboxError>;
