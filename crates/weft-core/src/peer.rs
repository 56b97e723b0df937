//! Peer identifiers.

use std::fmt;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::encoding::{CanonicalDecode, CanonicalEncode, DecodeError};

/// Identity of a remote peer: its advertised canonical address and its
/// Ed25519 public key.
///
/// Created once per remote peer and never mutated. Equality is field-wise;
/// two ids naming the same address with different keys are different peers.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId {
    /// Canonical address the peer can be reached at.
    pub address: String,
    /// The peer's public key bytes.
    pub public_key: Vec<u8>,
}

impl PeerId {
    /// Creates a peer id.
    pub fn new(address: impl Into<String>, public_key: Vec<u8>) -> Self {
        Self {
            address: address.into(),
            public_key,
        }
    }

    /// Short hex form of the public key for display.
    pub fn short_key(&self) -> String {
        let hex = hex::encode(&self.public_key);
        hex.chars().take(16).collect()
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({} {})", self.address, self.short_key())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

impl CanonicalEncode for PeerId {
    fn encode(&self, buf: &mut BytesMut) {
        self.address.encode(buf);
        self.public_key.encode(buf);
    }
}

impl CanonicalDecode for PeerId {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            address: String::decode(buf)?,
            public_key: Vec::<u8>::decode(buf)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_roundtrip() {
        let id = PeerId::new("quic://127.0.0.1:4242", vec![0xAB; 32]);
        let decoded = PeerId::from_bytes(&id.to_vec()).unwrap();
        assert_eq!(id, decoded);
    }

    #[test]
    fn test_equality_is_field_wise() {
        let a = PeerId::new("quic://127.0.0.1:4242", vec![1; 32]);
        let b = PeerId::new("quic://127.0.0.1:4242", vec![2; 32]);
        let c = PeerId::new("quic://127.0.0.1:4243", vec![1; 32]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, a.clone());
    }
}
