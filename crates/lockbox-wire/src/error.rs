//! Error types for the wire module.

use std::time::Duration;

use thiserror::Error;

/// Faults in the length-prefixed framing.
///
/// Every one of these ends the connection; no response is sent.
#[derive(Debug, Error)]
pub enum FramingError {
    /// The length header is not a decimal number.
    #[error("malformed length header: {0:?}")]
    MalformedHeader(String),

    /// Declared or outgoing length exceeds the configured maximum.
    #[error("message of {size} bytes exceeds maximum of {max} bytes")]
    TooLarge { size: usize, max: usize },

    /// Peer closed before the declared number of bytes arrived.
    #[error("short read: expected {expected} bytes, received {received}")]
    ShortRead { expected: usize, received: usize },

    /// Peer closed before a complete length header arrived.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// No complete frame within the read deadline.
    #[error("timed out after {0:?} waiting for a frame")]
    Timeout(Duration),

    /// Underlying socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors building or decoding wire messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// Framing fault.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// The bytes are not a wire message.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// The message could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A sealed payload was required but the message is in the clear, or it
    /// has no signature.
    #[error("message is not sealed")]
    NotSealed,

    /// A clear payload was required but the message is sealed.
    #[error("message is sealed")]
    NotClear,

    /// Envelope fault.
    #[error("envelope error: {0}")]
    Perms(#[from] lockbox_perms::PermsError),
}

/// Result type for wire operations.
pub type Result<T> = std::result::Result<T, WireError>;
