//! Node identity keys.
//!
//! Every node owns an Ed25519 key pair. The public key is advertised inside
//! every envelope's sender field; the secret key signs outbound payloads.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;

use crate::{PUBLIC_KEY_SIZE, SIGNATURE_SIZE};

/// Signature errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Public key bytes are not a valid Ed25519 key
    #[error("Invalid public key")]
    InvalidKey,

    /// Signature bytes have the wrong length
    #[error("Invalid signature length: {0}")]
    InvalidLength(usize),

    /// Signature does not verify against the message
    #[error("Signature verification failed")]
    Rejected,
}

/// Ed25519 key pair identifying a node.
///
/// The secret key is zeroized on drop (via `ed25519-dalek`'s `zeroize`
/// integration) and never appears in `Debug` output.
#[derive(Clone)]
pub struct KeyPair {
    secret: SigningKey,
}

impl KeyPair {
    /// Generates a fresh random key pair.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self {
            secret: SigningKey::generate(&mut rng),
        }
    }

    /// Creates a key pair from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            secret: SigningKey::from_bytes(&seed),
        }
    }

    /// Returns the public key bytes.
    pub fn public_key(&self) -> Vec<u8> {
        self.secret.verifying_key().as_bytes().to_vec()
    }

    /// Signs a message, returning the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.secret.sign(message).to_bytes().to_vec()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair([REDACTED])")
    }
}

/// Verifies an Ed25519 signature over a message.
pub fn verify_signature(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    let key_bytes: &[u8; PUBLIC_KEY_SIZE] = public_key
        .try_into()
        .map_err(|_| SignatureError::InvalidKey)?;
    let key = VerifyingKey::from_bytes(key_bytes).map_err(|_| SignatureError::InvalidKey)?;

    let sig_bytes: &[u8; SIGNATURE_SIZE] = signature
        .try_into()
        .map_err(|_| SignatureError::InvalidLength(signature.len()))?;
    let sig = Signature::from_bytes(sig_bytes);

    key.verify(message, &sig)
        .map_err(|_| SignatureError::Rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        let keys = KeyPair::generate();
        let message = b"hello weft";

        let signature = keys.sign(message);
        assert_eq!(signature.len(), SIGNATURE_SIZE);
        verify_signature(&keys.public_key(), message, &signature).unwrap();
    }

    #[test]
    fn test_tampered_message_rejected() {
        let keys = KeyPair::generate();
        let signature = keys.sign(b"original");

        let err = verify_signature(&keys.public_key(), b"tampered", &signature).unwrap_err();
        assert_eq!(err, SignatureError::Rejected);
    }

    #[test]
    fn test_wrong_key_rejected() {
        let keys = KeyPair::generate();
        let other = KeyPair::generate();
        let signature = keys.sign(b"message");

        let err = verify_signature(&other.public_key(), b"message", &signature).unwrap_err();
        assert_eq!(err, SignatureError::Rejected);
    }

    #[test]
    fn test_invalid_key_length() {
        let keys = KeyPair::generate();
        let signature = keys.sign(b"message");

        let err = verify_signature(&[1, 2, 3], b"message", &signature).unwrap_err();
        assert_eq!(err, SignatureError::InvalidKey);
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = KeyPair::from_seed([7u8; 32]);
        let b = KeyPair::from_seed([7u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_debug_redacted() {
        let keys = KeyPair::generate();
        assert_eq!(format!("{:?}", keys), "KeyPair([REDACTED])");
    }
}
