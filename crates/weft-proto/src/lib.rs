//! Weft Proto - Wire types for the weft overlay network.
//!
//! Defines the authenticated envelope exchanged on every stream, the `Body`
//! trait implemented by message payloads, and the built-in bodies.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod bodies;
pub mod envelope;

pub use bodies::{Body, HandshakeRequest};
pub use envelope::{Envelope, ProtoError, TaggedPayload, MAX_FRAME_SIZE};
