//! Weft Tests - Multi-node integration harness.
//!
//! Spins up real nodes on loopback ephemeral ports with recording handlers,
//! so integration tests can assert on delivery, identity binding, and the
//! peer index without mocking the transport.

pub mod bodies;
pub mod harness;
pub mod node;

pub use bodies::{Ping, Pong};
pub use harness::TestNetwork;
pub use node::{Inbox, TestNode};

/// Initializes tracing for a test run; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weft_net=debug,weft_tests=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
