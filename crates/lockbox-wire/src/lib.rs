//! # Lockbox Wire
//!
//! Transport-level encoding for Lockbox: length-prefixed frames over any
//! `AsyncRead`/`AsyncWrite`, and the [`WireMessage`] each frame carries.
//!
//! ## Frame Format
//!
//! ```text
//! [32-byte ASCII decimal length][payload]
//! ```
//!
//! The payload is a CBOR-encoded [`WireMessage`].

pub mod error;
pub mod framing;
pub mod messages;

pub use error::{FramingError, Result, WireError};
pub use framing::{
    encode_header, parse_header, recv_frame, send_frame, FrameConfig, HEADER_WIDTH,
};
pub use messages::{WireData, WireMessage};

use tokio::io::{AsyncRead, AsyncWrite};

/// Encode and send one message as a frame.
pub async fn send_message<W>(writer: &mut W, message: &WireMessage, config: &FrameConfig) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = message.to_bytes()?;
    send_frame(writer, &bytes, config).await?;
    Ok(())
}

/// Receive one frame and decode it as a message.
pub async fn recv_message<R>(reader: &mut R, config: &FrameConfig) -> Result<WireMessage>
where
    R: AsyncRead + Unpin,
{
    let bytes = recv_frame(reader, config).await?;
    WireMessage::from_bytes(&bytes)
}
