//! Message bodies used by the integration suites.

use bytes::{Bytes, BytesMut};

use weft_core::encoding::{CanonicalDecode, CanonicalEncode, DecodeError};
use weft_proto::Body;

/// Request half of the echo exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    /// Round-trip correlation value.
    pub nonce: u64,
}

impl Body for Ping {
    const TYPE_URL: &'static str = "weft.test.Ping";
}

impl CanonicalEncode for Ping {
    fn encode(&self, buf: &mut BytesMut) {
        self.nonce.encode(buf);
    }
}

impl CanonicalDecode for Ping {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            nonce: u64::decode(buf)?,
        })
    }
}

/// Reply half of the echo exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pong {
    /// Nonce copied from the ping.
    pub nonce: u64,
}

impl Body for Pong {
    const TYPE_URL: &'static str = "weft.test.Pong";
}

impl CanonicalEncode for Pong {
    fn encode(&self, buf: &mut BytesMut) {
        self.nonce.encode(buf);
    }
}

impl CanonicalDecode for Pong {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            nonce: u64::decode(buf)?,
        })
    }
}
