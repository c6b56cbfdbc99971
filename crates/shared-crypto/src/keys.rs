//! ECDSA P-256 signing identities

use p256::{
    ecdsa::{signature::Signer, signature::Verifier, Signature, SigningKey, VerifyingKey},
    SecretKey,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum KeyError {
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),
}

/// Anything that can sign a sealed manifest
pub trait SigningIdentity: Send + Sync {
    /// SEC1 uncompressed public key bytes
    fn public_key_sec1(&self) -> Vec<u8>;

    fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_sec1())
    }

    /// Sign raw data and return the DER-encoded signature
    fn sign(&self, data: &[u8]) -> Vec<u8>;

    fn sign_hex(&self, data: &[u8]) -> String {
        hex::encode(self.sign(data))
    }
}

/// A P-256 key pair held in memory
pub struct EphemeralIdentity {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl EphemeralIdentity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        let secret_key = SecretKey::random(&mut rand_core::OsRng);
        Self::from_secret(&secret_key)
    }

    /// Restore an identity from raw private key bytes
    pub fn from_private_key(bytes: &[u8]) -> Result<Self, KeyError> {
        let secret_key =
            SecretKey::from_slice(bytes).map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self::from_secret(&secret_key))
    }

    /// Restore an identity from a hex-encoded private key (as kept in config)
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes =
            hex::decode(hex_key.trim()).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
        Self::from_private_key(&bytes)
    }

    /// Export the private key
    /// WARNING: exposes the secret; only for writing to a protected key file
    pub fn export_private_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Verify a DER signature made by this identity
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        match Signature::from_der(signature) {
            Ok(sig) => self.verifying_key.verify(data, &sig).is_ok(),
            Err(_) => false,
        }
    }

    fn from_secret(secret_key: &SecretKey) -> Self {
        let signing_key = SigningKey::from(secret_key);
        let verifying_key = VerifyingKey::from(&signing_key);
        Self {
            signing_key,
            verifying_key,
        }
    }
}

impl SigningIdentity for EphemeralIdentity {
    fn public_key_sec1(&self) -> Vec<u8> {
        self.verifying_key
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let signature: Signature = self.signing_key.sign(data);
        signature.to_der().as_bytes().to_vec()
    }
}

/// Verify a hex DER signature against a hex SEC1 public key
///
/// Returns `Ok(false)` for a well-formed key whose signature does not match,
/// and an error only when the key or encodings themselves are malformed.
pub fn verify_hex_signature(
    public_key_hex: &str,
    data: &[u8],
    signature_hex: &str,
) -> Result<bool, KeyError> {
    let key_bytes =
        hex::decode(public_key_hex.trim()).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
    let verifying_key = VerifyingKey::from_sec1_bytes(&key_bytes)
        .map_err(|e| KeyError::InvalidPublicKey(e.to_string()))?;
    let sig_bytes =
        hex::decode(signature_hex.trim()).map_err(|e| KeyError::InvalidHex(e.to_string()))?;

    Ok(match Signature::from_der(&sig_bytes) {
        Ok(sig) => verifying_key.verify(data, &sig).is_ok(),
        Err(_) => false,
    })
}
