//! # Lockbox Core
//!
//! Pure primitives for Lockbox: identities, file records, the typed request
//! and response model, and Ed25519 signing keys.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Identity`] - A validated user name, also used to name key files
//! - [`Filename`] - The name a file is stored under on the server
//! - [`FileRecord`] - Owner and read-access list of one stored file
//! - [`Request`] / [`Response`] - One operation and its outcome
//! - [`SigningKey`] - Ed25519 signing key taken from a 32-byte seed
//!
//! ## Encoding
//!
//! Everything that crosses the wire is encoded as CBOR. See [`canonical`].

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod request;
pub mod types;

pub use canonical::{from_cbor, to_cbor};
pub use crypto::{Ed25519PublicKey, Ed25519Signature, SigningKey, SEED_SIZE, SIGNATURE_SIZE};
pub use error::{CoreError, Result};
pub use request::{
    Request, RequestKind, Response, ResponsePayload, FAILURE_HEADER, SUCCESS_HEADER,
};
pub use types::{FileRecord, Filename, Identity, RegistrySnapshot, SERVER_IDENTITY};
