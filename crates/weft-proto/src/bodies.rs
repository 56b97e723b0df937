//! Message bodies.
//!
//! A body is any type carried inside an envelope. Each body type declares a
//! stable type url; the handler registry is keyed by the full url string,
//! assigned here at definition time rather than derived from any runtime
//! reflection facility.

use bytes::{Bytes, BytesMut};

use weft_core::encoding::{CanonicalDecode, CanonicalEncode, DecodeError};

/// A message body that can travel inside an envelope.
pub trait Body: CanonicalEncode + CanonicalDecode + Send + Sync + 'static {
    /// Stable schema-assigned identifier for this body type.
    const TYPE_URL: &'static str;
}

/// Opens the peer-exchange conversation.
///
/// Sent to every peer successfully dialed during bootstrap. The payload is
/// empty; the reciprocal exchange lives in the discovery collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandshakeRequest;

impl Body for HandshakeRequest {
    const TYPE_URL: &'static str = "weft.v1.HandshakeRequest";
}

impl CanonicalEncode for HandshakeRequest {
    fn encode(&self, _buf: &mut BytesMut) {}
}

impl CanonicalDecode for HandshakeRequest {
    fn decode(_buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_request_is_empty_on_the_wire() {
        assert!(HandshakeRequest.to_vec().is_empty());
        HandshakeRequest::from_bytes(&[]).unwrap();
    }
}
