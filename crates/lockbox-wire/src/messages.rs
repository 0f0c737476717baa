//! Wire message types.
//!
//! Every frame carries exactly one [`WireMessage`], in both directions.
//! `add_user` and its response travel in the clear; everything else is an
//! [`Envelope`] split into its sealed box (`data`) and signature (`mac`).

use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use lockbox_core::{from_cbor, to_cbor, Ed25519Signature, Identity, Request, Response};
use lockbox_perms::{Envelope, IdentityKeys, PublicKeys, SealedBox};

use crate::error::{Result, WireError};

/// The body of a wire message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireData {
    /// CBOR-encoded request or response, unencrypted.
    Clear(Bytes),

    /// Sealed box holding the CBOR-encoded request or response.
    Sealed(SealedBox),
}

/// One framed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Operation name for requests; `success` or `failure` for responses.
    pub header: String,

    /// Who sent the message. Responses come from the server identity.
    pub sender: Identity,

    /// Signature over the plaintext, present on sealed messages.
    pub mac: Option<Ed25519Signature>,

    /// The payload.
    pub data: WireData,
}

impl WireMessage {
    /// An unsealed request. Only meaningful for `add_user`.
    pub fn clear_request(sender: Identity, request: &Request) -> Result<Self> {
        Ok(Self {
            header: request.header().to_string(),
            sender,
            mac: None,
            data: WireData::Clear(encode(request)?),
        })
    }

    /// A request sealed for the server and signed by `sender`.
    pub fn sealed_request(
        sender: Identity,
        request: &Request,
        server: &PublicKeys,
        sender_keys: &IdentityKeys,
    ) -> Result<Self> {
        let envelope = Envelope::seal(request, server, sender_keys)?;
        Ok(Self::from_envelope(request.header().to_string(), sender, envelope))
    }

    /// An unsealed response from the server.
    pub fn clear_response(response: &Response) -> Result<Self> {
        Ok(Self {
            header: response.header().to_string(),
            sender: Identity::server(),
            mac: None,
            data: WireData::Clear(encode(response)?),
        })
    }

    /// A response sealed for `recipient` and signed by the server.
    pub fn sealed_response(
        response: &Response,
        recipient: &PublicKeys,
        server_keys: &IdentityKeys,
    ) -> Result<Self> {
        let envelope = Envelope::seal(response, recipient, server_keys)?;
        Ok(Self::from_envelope(
            response.header().to_string(),
            Identity::server(),
            envelope,
        ))
    }

    fn from_envelope(header: String, sender: Identity, envelope: Envelope) -> Self {
        Self {
            header,
            sender,
            mac: Some(envelope.signature),
            data: WireData::Sealed(envelope.sealed),
        }
    }

    /// Whether the payload is sealed.
    pub fn is_sealed(&self) -> bool {
        matches!(self.data, WireData::Sealed(_))
    }

    /// Reassemble the envelope of a sealed, signed message.
    pub fn envelope(&self) -> Result<Envelope> {
        match (&self.data, &self.mac) {
            (WireData::Sealed(sealed), Some(signature)) => Ok(Envelope {
                sealed: sealed.clone(),
                signature: *signature,
            }),
            _ => Err(WireError::NotSealed),
        }
    }

    /// Decode a clear payload.
    pub fn decode_clear<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.data {
            WireData::Clear(bytes) => {
                from_cbor(bytes).map_err(|e| WireError::Decoding(e.to_string()))
            }
            WireData::Sealed(_) => Err(WireError::NotClear),
        }
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        to_cbor(self).map_err(|e| WireError::Encoding(e.to_string()))
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        from_cbor(bytes).map_err(|e| WireError::Decoding(e.to_string()))
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Bytes> {
    to_cbor(value)
        .map(Bytes::from)
        .map_err(|e| WireError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockbox_core::Filename;
    use lockbox_perms::SignaturePolicy;

    fn alice() -> Identity {
        Identity::new("alice").unwrap()
    }

    #[test]
    fn test_clear_add_user() {
        let message = WireMessage::clear_request(alice(), &Request::AddUser).unwrap();
        assert_eq!(message.header, "add_user");
        assert!(!message.is_sealed());
        assert!(matches!(message.envelope(), Err(WireError::NotSealed)));

        let decoded = WireMessage::from_bytes(&message.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.decode_clear::<Request>().unwrap(), Request::AddUser);
    }

    #[test]
    fn test_sealed_request_opens_for_server() {
        let alice_keys = IdentityKeys::generate();
        let server_keys = IdentityKeys::generate();
        let request = Request::DownloadFile {
            filename: Filename::new("notes.txt"),
        };

        let message =
            WireMessage::sealed_request(alice(), &request, &server_keys.public_keys(), &alice_keys)
                .unwrap();
        assert_eq!(message.header, "download_file");
        assert!(message.mac.is_some());
        assert!(matches!(
            message.decode_clear::<Request>(),
            Err(WireError::NotClear)
        ));

        let decoded = WireMessage::from_bytes(&message.to_bytes().unwrap()).unwrap();
        let opened: Request = decoded
            .envelope()
            .unwrap()
            .open(&server_keys, &alice(), &alice_keys.public_keys(), SignaturePolicy::Enforce)
            .unwrap();
        assert_eq!(opened, request);
    }

    #[test]
    fn test_sealed_without_mac_is_not_an_envelope() {
        let alice_keys = IdentityKeys::generate();
        let server = IdentityKeys::generate().public_keys();

        let mut message =
            WireMessage::sealed_request(alice(), &Request::AddUser, &server, &alice_keys).unwrap();
        message.mac = None;
        assert!(matches!(message.envelope(), Err(WireError::NotSealed)));
    }

    #[test]
    fn test_responses_come_from_server() {
        let response = Response::failure("file x does not exist");
        let message = WireMessage::clear_response(&response).unwrap();

        assert_eq!(message.header, "failure");
        assert_eq!(message.sender, Identity::server());
        assert_eq!(message.decode_clear::<Response>().unwrap(), response);
    }

    #[test]
    fn test_garbage_is_a_decoding_error() {
        assert!(matches!(
            WireMessage::from_bytes(b"\xff\x00garbage"),
            Err(WireError::Decoding(_))
        ));
    }
}
