//! Shared cryptography utilities
//!
//! Signing identities used to attach an optional ECDSA P-256 signature to a
//! sealed evidence manifest, and standalone verification against a published
//! public key.

pub mod keys;

pub use keys::{verify_hex_signature, EphemeralIdentity, KeyError, SigningIdentity};
