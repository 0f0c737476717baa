//! Key material behind envelopes.
//!
//! One 32-byte seed per identity yields both keys:
//!
//! ```text
//! seed ──────────────────────────────► Ed25519 signing key
//! seed ─ blake3::derive_key(agreement) ► X25519 agreement secret
//! ```
//!
//! Sealing runs a one-shot X25519 exchange between a fresh ephemeral key and
//! the recipient's agreement key. The shared secret goes through BLAKE3 in
//! key-derivation mode, bound to both public keys, and the result keys
//! ChaCha20-Poly1305.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use lockbox_core::{Ed25519PublicKey, Ed25519Signature, SigningKey, SEED_SIZE};

use crate::error::{PermsError, Result};

const AGREEMENT_KEY_CONTEXT: &str = "lockbox-v0 x25519 agreement key";
const ENVELOPE_KEY_CONTEXT: &str = "lockbox-v0 envelope encryption key";

/// ChaCha20-Poly1305 nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// The public half of an X25519 key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct X25519PublicKey(pub [u8; 32]);

impl X25519PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let mut key = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut key)
            .map_err(|e| PermsError::InvalidKey(format!("x25519 public key: {e}")))?;
        Ok(Self(key))
    }

    fn to_dalek(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl fmt::Debug for X25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X25519PublicKey({}..)", &self.to_hex()[..12])
    }
}

/// The long-term X25519 secret that opens envelopes addressed to an identity.
pub struct AgreementSecret(StaticSecret);

impl AgreementSecret {
    fn from_seed(seed: &[u8; SEED_SIZE]) -> Self {
        Self(StaticSecret::from(blake3::derive_key(AGREEMENT_KEY_CONTEXT, seed)))
    }

    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey(PublicKey::from(&self.0).to_bytes())
    }

    /// Recompute the key a sender derived when sealing with `ephemeral`.
    pub fn envelope_key(&self, ephemeral: &X25519PublicKey) -> EnvelopeKey {
        let shared = self.0.diffie_hellman(&ephemeral.to_dalek());
        EnvelopeKey::derive(shared.as_bytes(), ephemeral, &self.public_key())
    }
}

/// Start a one-shot exchange with `recipient`.
///
/// Returns the ephemeral public key to ship with the ciphertext and the key
/// to encrypt under. The ephemeral secret is consumed here.
pub fn ephemeral_exchange(recipient: &X25519PublicKey) -> (X25519PublicKey, EnvelopeKey) {
    let secret = EphemeralSecret::random_from_rng(rand::thread_rng());
    let ephemeral = X25519PublicKey(PublicKey::from(&secret).to_bytes());
    let shared = secret.diffie_hellman(&recipient.to_dalek());
    let key = EnvelopeKey::derive(shared.as_bytes(), &ephemeral, recipient);
    (ephemeral, key)
}

/// Symmetric key for one envelope.
pub struct EnvelopeKey([u8; 32]);

impl EnvelopeKey {
    fn derive(shared: &[u8; 32], ephemeral: &X25519PublicKey, recipient: &X25519PublicKey) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(ENVELOPE_KEY_CONTEXT);
        hasher.update(shared);
        hasher.update(&ephemeral.0);
        hasher.update(&recipient.0);
        Self(*hasher.finalize().as_bytes())
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }

    /// Encrypt under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<([u8; NONCE_SIZE], Vec<u8>)> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| PermsError::Encryption("aead seal failed".into()))?;
        Ok((nonce, ciphertext))
    }

    pub fn decrypt(&self, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| PermsError::Decryption("authentication tag mismatch".into()))
    }
}

/// The public half of an identity: what the key directory hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeys {
    /// Verifies signatures made by the identity.
    pub signing: Ed25519PublicKey,

    /// Seals envelopes addressed to the identity.
    pub encryption: X25519PublicKey,
}

/// All key material of one identity.
#[derive(Clone)]
pub struct IdentityKeys {
    seed: [u8; SEED_SIZE],
    signing: SigningKey,
}

impl IdentityKeys {
    /// Keys from a fresh random seed.
    pub fn generate() -> Self {
        let mut seed = [0u8; SEED_SIZE];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    pub fn from_seed(seed: &[u8; SEED_SIZE]) -> Self {
        Self {
            seed: *seed,
            signing: SigningKey::from_seed(seed),
        }
    }

    /// The secret seed. Whoever holds it is this identity.
    pub fn seed(&self) -> [u8; SEED_SIZE] {
        self.seed
    }

    pub fn public_keys(&self) -> PublicKeys {
        PublicKeys {
            signing: self.signing.public_key(),
            encryption: self.agreement_secret().public_key(),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        self.signing.sign(message)
    }

    /// The secret that opens envelopes addressed to this identity.
    pub fn agreement_secret(&self) -> AgreementSecret {
        AgreementSecret::from_seed(&self.seed)
    }
}

impl fmt::Debug for IdentityKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeys")
            .field("public", &self.public_keys())
            .finish_non_exhaustive()
    }
}
