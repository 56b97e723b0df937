//! Weft Net - Connection and session fabric for the weft overlay network.
//!
//! A node advertises an Ed25519 identity, listens for peers over QUIC,
//! dials peers on demand, and exchanges signed envelopes - one envelope per
//! multiplexed stream. Inbound envelopes are verified before dispatch to
//! user-registered handlers.
//!
//! The pieces:
//! - [`address`] / [`resolve`] - address parsing and DNS-backed
//!   canonicalization; the peer cache is keyed by canonical addresses
//! - [`pool`] - keyed TTL store with renewal and eviction-time close
//! - [`client`] - per-peer session owner with reconnect and backoff
//! - [`node`] - listener, peer index, bootstrap and broadcast
//! - [`handlers`] - body-type registry invoked after verification

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod address;
pub mod backoff;
pub mod client;
mod endpoint;
pub mod error;
mod frame;
pub mod handlers;
pub mod node;
pub mod pool;
pub mod resolve;
pub mod routes;

pub use address::{format_address, parse_address, AddressInfo};
pub use backoff::{Backoff, BackoffConfig};
pub use client::PeerClient;
pub use error::NetError;
pub use handlers::{Handler, HandlerRegistry, MessageContext};
pub use node::{MuxConfig, Network, NetworkConfig};
pub use pool::{EntryConfig, Pool, Poolable};
pub use resolve::Resolver;
pub use routes::{MemoryRoutes, RoutingTable};
