//! The authenticated message envelope.
//!
//! Every stream carries exactly one length-delimited frame holding an
//! [`Envelope`]: a tagged body, the sender's [`PeerId`], and an Ed25519
//! signature. The signature covers the raw body value only (not the type
//! tag), and is always checked against the public key carried in the
//! sender field - identity derives from the envelope, not the connection.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use weft_core::encoding::{CanonicalDecode, CanonicalEncode, DecodeError};
use weft_core::{verify_signature, KeyPair, PeerId};

use crate::bodies::Body;

/// Maximum size of a single envelope frame on the wire.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Envelope errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// Envelope or body bytes are malformed
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Signature does not verify against the sender's public key
    #[error("Envelope signature is invalid")]
    SignatureInvalid,

    /// Body carries a different type than requested
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The type url asked for
        expected: String,
        /// The type url on the wire
        actual: String,
    },
}

/// A self-describing payload: the body's type url plus its encoded bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedPayload {
    /// Schema-assigned identifier of the body type.
    pub type_url: String,
    /// Canonical encoding of the body.
    pub value: Vec<u8>,
}

impl TaggedPayload {
    /// Wraps a body into its tagged form.
    pub fn wrap<B: Body>(body: &B) -> Self {
        Self {
            type_url: B::TYPE_URL.to_string(),
            value: body.to_vec(),
        }
    }

    /// Decodes the payload as a concrete body type.
    ///
    /// Fails with [`ProtoError::TypeMismatch`] if the tag names a different
    /// type than `B`.
    pub fn decode_as<B: Body>(&self) -> Result<B, ProtoError> {
        if self.type_url != B::TYPE_URL {
            return Err(ProtoError::TypeMismatch {
                expected: B::TYPE_URL.to_string(),
                actual: self.type_url.clone(),
            });
        }
        Ok(B::from_bytes(&self.value)?)
    }
}

impl CanonicalEncode for TaggedPayload {
    fn encode(&self, buf: &mut BytesMut) {
        self.type_url.encode(buf);
        self.value.encode(buf);
    }
}

impl CanonicalDecode for TaggedPayload {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        let type_url = String::decode(buf)?;
        if type_url.is_empty() {
            return Err(DecodeError::Custom("empty type url".to_string()));
        }
        Ok(Self {
            type_url,
            value: Vec::<u8>::decode(buf)?,
        })
    }
}

/// Authenticated container for one message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// The tagged payload.
    pub body: TaggedPayload,
    /// Identity of the signing node.
    pub sender: PeerId,
    /// Ed25519 signature over `body.value`.
    pub signature: Vec<u8>,
}

impl Envelope {
    /// Encodes and signs a body on behalf of `sender`.
    pub fn seal<B: Body>(body: &B, sender: PeerId, keys: &KeyPair) -> Self {
        let body = TaggedPayload::wrap(body);
        let signature = keys.sign(&body.value);
        Self {
            body,
            sender,
            signature,
        }
    }

    /// Verifies the signature against the sender's public key.
    pub fn verify(&self) -> Result<(), ProtoError> {
        verify_signature(&self.sender.public_key, &self.body.value, &self.signature)
            .map_err(|_| ProtoError::SignatureInvalid)
    }
}

impl CanonicalEncode for Envelope {
    fn encode(&self, buf: &mut BytesMut) {
        self.body.encode(buf);
        self.sender.encode(buf);
        self.signature.encode(buf);
    }
}

impl CanonicalDecode for Envelope {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(Self {
            body: TaggedPayload::decode(buf)?,
            sender: PeerId::decode(buf)?,
            signature: Vec::<u8>::decode(buf)?,
        })
    }
}
