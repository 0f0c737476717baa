//! Error types for the permissions module.

use lockbox_core::{Filename, Identity};
use thiserror::Error;

/// Errors from sealing, opening and key handling.
///
/// Any of these on the request path is fatal to the request: no response
/// can be sealed for a message that could not be authenticated.
#[derive(Debug, Error)]
pub enum PermsError {
    /// Encryption error.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Decryption error.
    #[error("decryption error: {0}")]
    Decryption(String),

    /// The signature did not verify against the recovered plaintext.
    #[error("signature verification failed for {0}")]
    SignatureInvalid(Identity),

    /// No public keys are on file for this identity.
    #[error("no public key on file for {0}")]
    UnknownKey(Identity),

    /// Malformed key material.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error while reading or writing key files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] lockbox_core::CoreError),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;

/// Why a request was rejected before execution.
///
/// These are expected, user-facing outcomes. The `Display` text is sent back
/// to the client verbatim as the failure reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("user {0} doesn't exist")]
    UnknownUser(Identity),

    #[error("user {0} already exists")]
    UserExists(Identity),

    #[error("target user {0} doesn't exist")]
    UnknownTarget(Identity),

    #[error("filename is empty")]
    EmptyFilename,

    #[error("filename {0} is not a plain file name")]
    InvalidFilename(Filename),

    #[error("file {0} already exists")]
    FileExists(Filename),

    #[error("file {0} does not exist")]
    FileNotFound(Filename),

    #[error("data is empty")]
    EmptyData,

    #[error("user {user} is unauthorized to {action} file {filename}")]
    Unauthorized {
        user: Identity,
        action: &'static str,
        filename: Filename,
    },

    #[error("user {user} already has read access to file {filename}")]
    AlreadyShared { user: Identity, filename: Filename },

    #[error("unrecognized operation: {0}")]
    UnrecognizedOperation(String),
}
