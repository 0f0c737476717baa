//! Length-prefixed framing.
//!
//! A frame is a fixed-width ASCII decimal length followed by exactly that
//! many payload bytes:
//!
//! ```text
//! 00000000000000000000000000000005hello
//! |<-------- HEADER_WIDTH -------->|
//! ```
//!
//! The header is always [`HEADER_WIDTH`] bytes, so the receiver never has to
//! guess where it ends. Peers that pad with spaces instead of zeros are
//! accepted.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FramingError;

/// Width of the length header in bytes.
pub const HEADER_WIDTH: usize = 32;

/// Default maximum payload size (64 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Default read deadline for one frame.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default size of a single socket read.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

type Result<T> = std::result::Result<T, FramingError>;

/// Framing limits.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest payload accepted or sent.
    pub max_message_size: usize,

    /// Deadline for receiving one complete frame. `None` waits forever.
    pub read_timeout: Option<Duration>,

    /// Upper bound on a single read from the socket.
    pub chunk_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Encode a payload length as a zero-padded header.
pub fn encode_header(len: usize) -> [u8; HEADER_WIDTH] {
    let mut header = [0u8; HEADER_WIDTH];
    header.copy_from_slice(format!("{len:0>width$}", width = HEADER_WIDTH).as_bytes());
    header
}

/// Parse a length header.
///
/// Surrounding ASCII whitespace and leading zeros are accepted; anything
/// else that is not a decimal digit is malformed.
pub fn parse_header(header: &[u8]) -> Result<usize> {
    let malformed = || FramingError::MalformedHeader(String::from_utf8_lossy(header).into_owned());

    let digits = std::str::from_utf8(header)
        .map_err(|_| malformed())?
        .trim_matches(|c: char| c.is_ascii_whitespace());
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    // At most 32 digits, which always fits in a u128.
    let value: u128 = digits.parse().map_err(|_| malformed())?;

    Ok(usize::try_from(value).unwrap_or(usize::MAX))
}

/// Write one frame.
pub async fn send_frame<W>(writer: &mut W, payload: &[u8], config: &FrameConfig) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > config.max_message_size {
        return Err(FramingError::TooLarge {
            size: payload.len(),
            max: config.max_message_size,
        });
    }

    writer.write_all(&encode_header(payload.len())).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;

    tracing::debug!(bytes = payload.len(), "sent frame");
    Ok(())
}

/// Read one frame, honoring the configured read deadline.
pub async fn recv_frame<R>(reader: &mut R, config: &FrameConfig) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    match config.read_timeout {
        Some(deadline) => tokio::time::timeout(deadline, read_frame(reader, config))
            .await
            .map_err(|_| FramingError::Timeout(deadline))?,
        None => read_frame(reader, config).await,
    }
}

async fn read_frame<R>(reader: &mut R, config: &FrameConfig) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_WIDTH];
    let mut filled = 0;
    while filled < HEADER_WIDTH {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            return Err(FramingError::ConnectionClosed);
        }
        filled += n;
    }

    let expected = parse_header(&header)?;
    if expected > config.max_message_size {
        return Err(FramingError::TooLarge {
            size: expected,
            max: config.max_message_size,
        });
    }

    let mut payload = Vec::with_capacity(expected);
    let mut chunk = vec![0u8; config.chunk_size.max(1)];
    while payload.len() < expected {
        let want = chunk.len().min(expected - payload.len());
        let n = reader.read(&mut chunk[..want]).await?;
        if n == 0 {
            return Err(FramingError::ShortRead {
                expected,
                received: payload.len(),
            });
        }
        payload.extend_from_slice(&chunk[..n]);
    }

    tracing::debug!(bytes = expected, "received frame");
    Ok(payload)
}
