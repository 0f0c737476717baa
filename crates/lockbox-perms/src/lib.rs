//! # Lockbox Permissions
//!
//! Everything that decides whether a message is authentic and whether the
//! request inside it is allowed.
//!
//! ## Overview
//!
//! - **Envelopes**: every request except `add_user`, and every response to
//!   one, travels sealed for its recipient and signed by its sender.
//! - **Key directory**: maps identities to their public keys.
//! - **Access registry**: users, file owners and read-access lists.
//! - **Validation**: ordered, first-failure-wins checks per request kind.
//!
//! ## Key Model
//!
//! Each identity holds one 32-byte seed. The Ed25519 signing key is the seed
//! itself; the X25519 agreement key is derived from it with BLAKE3. Sealing
//! uses a fresh ephemeral X25519 key per message, so two seals of the same
//! payload never produce the same ciphertext.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lockbox_core::{Identity, Request};
//! use lockbox_perms::{AccessRegistry, Envelope, IdentityKeys, SignaturePolicy, validate};
//!
//! let alice = Identity::new("alice").unwrap();
//! let alice_keys = IdentityKeys::generate();
//! let server_keys = IdentityKeys::generate();
//!
//! let envelope = Envelope::seal(&Request::AddUser, &server_keys.public_keys(), &alice_keys).unwrap();
//! let request: Request = envelope
//!     .open(&server_keys, &alice, &alice_keys.public_keys(), SignaturePolicy::Enforce)
//!     .unwrap();
//!
//! assert!(validate(&alice, &request, &AccessRegistry::new()).is_ok());
//! ```

pub mod crypto;
pub mod envelope;
pub mod error;
pub mod pki;
pub mod registry;
pub mod validation;

pub use crypto::{
    ephemeral_exchange, AgreementSecret, EnvelopeKey, IdentityKeys, PublicKeys, X25519PublicKey,
    NONCE_SIZE,
};
pub use envelope::{Envelope, SealedBox, SignaturePolicy};
pub use error::{PermsError, Result, ValidationError};
pub use pki::{load_or_generate_keypair, FsKeyDirectory, KeyDirectory, MemoryKeyDirectory};
pub use registry::AccessRegistry;
pub use validation::validate;
