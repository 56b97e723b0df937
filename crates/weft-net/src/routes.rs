//! Routing table interface.
//!
//! The fabric informs the routing collaborator about peers it has
//! authenticated and peers it has lost; everything else about routing lives
//! outside this crate.

use std::collections::HashMap;

use parking_lot::RwLock;

use weft_core::PeerId;

/// The operations the fabric needs from a routing table.
///
/// Implementations are internally synchronized.
pub trait RoutingTable: Send + Sync {
    /// Records that `id` was seen alive.
    fn update(&self, id: PeerId);

    /// Removes a peer.
    fn remove_peer(&self, id: &PeerId);

    /// Returns true if the peer is known.
    fn peer_exists(&self, id: &PeerId) -> bool;
}

/// Flat in-memory routing table, keyed by peer address.
///
/// Suitable for tests and single-process wiring; real deployments plug in
/// their own implementation.
#[derive(Default)]
pub struct MemoryRoutes {
    peers: RwLock<HashMap<String, PeerId>>,
}

impl MemoryRoutes {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// Returns true if no peers are known.
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// All known peer ids.
    pub fn peers(&self) -> Vec<PeerId> {
        self.peers.read().values().cloned().collect()
    }
}

impl RoutingTable for MemoryRoutes {
    fn update(&self, id: PeerId) {
        self.peers.write().insert(id.address.clone(), id);
    }

    fn remove_peer(&self, id: &PeerId) {
        self.peers.write().remove(&id.address);
    }

    fn peer_exists(&self, id: &PeerId) -> bool {
        self.peers
            .read()
            .get(&id.address)
            .is_some_and(|known| known == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(address: &str) -> PeerId {
        PeerId::new(address, vec![7; 32])
    }

    #[test]
    fn test_update_remove_exists() {
        let routes = MemoryRoutes::new();
        let id = peer("quic://10.0.0.1:1000");

        assert!(!routes.peer_exists(&id));
        routes.update(id.clone());
        assert!(routes.peer_exists(&id));
        assert_eq!(routes.len(), 1);

        routes.remove_peer(&id);
        assert!(!routes.peer_exists(&id));
        assert!(routes.is_empty());
    }

    #[test]
    fn test_same_address_different_key_is_a_different_peer() {
        let routes = MemoryRoutes::new();
        routes.update(peer("quic://10.0.0.1:1000"));

        let impostor = PeerId::new("quic://10.0.0.1:1000", vec![9; 32]);
        assert!(!routes.peer_exists(&impostor));
    }
}
