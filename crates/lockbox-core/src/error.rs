//! Error types for Lockbox Core.

use thiserror::Error;

/// Core errors that can occur while building or decoding primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid identity {0:?}: {1}")]
    InvalidIdentity(String, &'static str),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("unknown request kind: {0}")]
    UnknownKind(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
