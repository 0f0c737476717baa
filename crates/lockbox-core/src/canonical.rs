//! Deterministic CBOR encoding.
//!
//! Requests, responses and envelopes are encoded with ciborium. Structs are
//! encoded field by field in declaration order and no hash maps cross the
//! wire, so the same value always produces the same bytes. Signatures are
//! computed over these bytes, which makes that property load-bearing.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CoreError, Result};

/// Encode a value to CBOR bytes.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(buf)
}

/// Decode a value from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use crate::types::Filename;
    use bytes::Bytes;

    #[test]
    fn test_encoding_is_deterministic() {
        let request = Request::UploadFile {
            filename: Filename::new("notes.txt"),
            data: Bytes::from_static(b"hi"),
        };

        assert_eq!(to_cbor(&request).unwrap(), to_cbor(&request).unwrap());
    }

    #[test]
    fn test_raw_bytes_survive() {
        let data = Bytes::from((0u8..=255).collect::<Vec<_>>());
        let request = Request::UploadFile {
            filename: Filename::new("all-bytes.bin"),
            data: data.clone(),
        };

        let decoded: Request = from_cbor(&to_cbor(&request).unwrap()).unwrap();
        match decoded {
            Request::UploadFile { data: decoded, .. } => assert_eq!(decoded, data),
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        let result: Result<Request> = from_cbor(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(CoreError::DecodingError(_))));
    }
}
