//! Weft Core - Core types and primitives for the weft overlay network.
//!
//! This crate provides:
//! - Canonical encoding for deterministic serialization
//! - Ed25519 node identity keys
//! - Peer identifiers (advertised address + public key)

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod encoding;
pub mod keys;
pub mod peer;

pub use encoding::{CanonicalDecode, CanonicalEncode, DecodeError};
pub use keys::{verify_signature, KeyPair, SignatureError};
pub use peer::PeerId;

/// Ed25519 public key length in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_SIZE: usize = 64;
