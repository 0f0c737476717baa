//! Sealed, signed envelopes.
//!
//! An [`Envelope`] protects exactly one request or response. The payload is
//! encoded to CBOR, encrypted for the recipient with an ephemeral X25519 key
//! agreement and ChaCha20-Poly1305 (a sealed box), and the *plaintext* bytes
//! are signed with the sender's Ed25519 key.
//!
//! Opening reverses the steps: decrypt with the recipient's agreement key,
//! verify the signature over the recovered plaintext with the sender's
//! public key, then decode.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use lockbox_core::{from_cbor, to_cbor, Ed25519Signature, Identity};

use crate::crypto::{
    ephemeral_exchange, AgreementSecret, IdentityKeys, PublicKeys, X25519PublicKey, NONCE_SIZE,
};
use crate::error::{PermsError, Result};

/// What to do when an envelope decrypts but its signature does not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignaturePolicy {
    /// Reject the message.
    #[default]
    Enforce,

    /// Log a warning and accept the message anyway.
    ///
    /// Only for talking to legacy peers that sign incorrectly; never use in
    /// production.
    WarnOnly,
}

/// Ciphertext that only the holder of one X25519 secret can open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBox {
    /// The sender's one-time public key.
    pub ephemeral_public: X25519PublicKey,

    pub nonce: [u8; NONCE_SIZE],

    /// Ciphertext followed by the Poly1305 tag.
    pub ciphertext: Bytes,
}

impl SealedBox {
    /// Encrypt `plaintext` so only `recipient`'s secret can open it.
    pub fn seal(plaintext: &[u8], recipient: &X25519PublicKey) -> Result<Self> {
        let (ephemeral_public, key) = ephemeral_exchange(recipient);
        let (nonce, ciphertext) = key.encrypt(plaintext)?;

        Ok(Self {
            ephemeral_public,
            nonce,
            ciphertext: Bytes::from(ciphertext),
        })
    }

    pub fn open(&self, recipient: &AgreementSecret) -> Result<Vec<u8>> {
        recipient
            .envelope_key(&self.ephemeral_public)
            .decrypt(&self.nonce, &self.ciphertext)
    }

    pub fn ciphertext_len(&self) -> usize {
        self.ciphertext.len()
    }

    /// Hex form of the ciphertext, for logs and diagnostics.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.ciphertext)
    }
}

/// A sealed box plus a detached signature over its plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// The encrypted payload.
    pub sealed: SealedBox,

    /// Sender's signature over the plaintext payload bytes.
    pub signature: Ed25519Signature,
}

impl Envelope {
    /// Seal a payload for `recipient`, signed by `sender`.
    pub fn seal<T: Serialize>(payload: &T, recipient: &PublicKeys, sender: &IdentityKeys) -> Result<Self> {
        let plaintext = to_cbor(payload)?;
        let signature = sender.sign(&plaintext);
        let sealed = SealedBox::seal(&plaintext, &recipient.encryption)?;

        Ok(Self { sealed, signature })
    }

    /// Open an envelope addressed to `recipient` and claimed to be from `sender`.
    pub fn open<T: DeserializeOwned>(
        &self,
        recipient: &IdentityKeys,
        sender: &Identity,
        sender_keys: &PublicKeys,
        policy: SignaturePolicy,
    ) -> Result<T> {
        let plaintext = self.open_bytes(recipient, sender, sender_keys, policy)?;
        Ok(from_cbor(&plaintext)?)
    }

    /// Decrypt and verify, returning the raw plaintext bytes.
    pub fn open_bytes(
        &self,
        recipient: &IdentityKeys,
        sender: &Identity,
        sender_keys: &PublicKeys,
        policy: SignaturePolicy,
    ) -> Result<Vec<u8>> {
        let plaintext = self.sealed.open(&recipient.agreement_secret())?;

        if sender_keys.signing.verify(&plaintext, &self.signature).is_err() {
            match policy {
                SignaturePolicy::Enforce => {
                    return Err(PermsError::SignatureInvalid(sender.clone()));
                }
                SignaturePolicy::WarnOnly => {
                    tracing::warn!(%sender, "accepting envelope with invalid signature");
                }
            }
        }

        Ok(plaintext)
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(to_cbor(self)?)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        from_cbor(bytes).map_err(|e| PermsError::Serialization(e.to_string()))
    }
}
