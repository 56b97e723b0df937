//! The network node.
//!
//! Owns the QUIC listener, the peer index keyed by canonical address, the
//! handler registry, and the broadcast primitives. Peer clients hold a
//! [`NodeHandle`] capability - keys, routing table, registry, resolver and
//! a weak peer-index reference - rather than the node itself.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use quinn::ConnectionError;
use rand::seq::SliceRandom;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use weft_core::{KeyPair, PeerId};
use weft_proto::{Body, HandshakeRequest};

use crate::address::format_address;
use crate::backoff::BackoffConfig;
use crate::client::PeerClient;
use crate::endpoint::{server_endpoint, EndpointHolder};
use crate::error::NetError;
use crate::handlers::HandlerRegistry;
use crate::resolve::{Resolver, DEFAULT_DNS_CACHE_CAPACITY};
use crate::routes::RoutingTable;

/// Multiplexer parameters applied to every session.
#[derive(Debug, Clone, Copy)]
pub struct MuxConfig {
    /// Keep-alive ping interval.
    pub keep_alive: Duration,
    /// Idle time after which a session is torn down.
    pub idle_timeout: Duration,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Node configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Advertised scheme.
    pub scheme: String,
    /// Bind and advertised host; an IP literal.
    pub host: String,
    /// Bind port; 0 picks an ephemeral port at listen time.
    pub port: u16,
    /// Reconnection backoff policy.
    pub backoff: BackoffConfig,
    /// Multiplexer parameters.
    pub mux: MuxConfig,
    /// Capacity of the hostname lookup cache.
    pub dns_cache_capacity: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            scheme: "quic".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            backoff: BackoffConfig::default(),
            mux: MuxConfig::default(),
            dns_cache_capacity: DEFAULT_DNS_CACHE_CAPACITY,
        }
    }
}

/// Peer index: canonical address -> client. At most one client per address.
pub(crate) struct PeerTable {
    inner: RwLock<HashMap<String, Arc<PeerClient>>>,
}

impl PeerTable {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(HashMap::new()),
        })
    }

    pub(crate) fn get(&self, address: &str) -> Option<Arc<PeerClient>> {
        self.inner.read().get(address).cloned()
    }

    /// Inserts `client` unless the address is taken; returns the winner.
    pub(crate) fn insert_if_absent(
        &self,
        address: &str,
        client: Arc<PeerClient>,
    ) -> Result<Arc<PeerClient>, Arc<PeerClient>> {
        let mut inner = self.inner.write();
        match inner.get(address) {
            Some(existing) => Err(existing.clone()),
            None => {
                inner.insert(address.to_string(), client.clone());
                Ok(client)
            }
        }
    }

    /// Removes the entry for `address` if it still points at `client`.
    pub(crate) fn remove_if_same(&self, address: &str, client: *const PeerClient) {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.get(address) {
            if std::ptr::eq(Arc::as_ptr(existing), client) {
                inner.remove(address);
            }
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<(String, Arc<PeerClient>)> {
        self.inner
            .read()
            .iter()
            .map(|(address, client)| (address.clone(), client.clone()))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().len()
    }
}

/// Capability handed to peer clients: exactly the node operations a client
/// needs, never the node itself.
#[derive(Clone)]
pub(crate) struct NodeHandle {
    pub(crate) keys: Arc<KeyPair>,
    pub(crate) id: PeerId,
    pub(crate) routes: Arc<dyn RoutingTable>,
    pub(crate) processors: Arc<HandlerRegistry>,
    pub(crate) resolver: Arc<Resolver>,
    pub(crate) endpoint: Arc<EndpointHolder>,
    pub(crate) backoff: BackoffConfig,
    peers: Weak<PeerTable>,
}

impl NodeHandle {
    /// Registers `client` under `address` in the peer index; returns false
    /// if another client already owns the address.
    pub(crate) fn adopt_peer(&self, address: &str, client: &Arc<PeerClient>) -> bool {
        match self.peers.upgrade() {
            Some(peers) => peers.insert_if_absent(address, client.clone()).is_ok(),
            None => false,
        }
    }

    /// Drops `client`'s entry from the peer index.
    pub(crate) fn drop_peer(&self, address: &str, client: &PeerClient) {
        if let Some(peers) = self.peers.upgrade() {
            peers.remove_if_same(address, client);
        }
    }
}

/// A node in the overlay network.
pub struct Network {
    config: NetworkConfig,
    keys: Arc<KeyPair>,
    id: RwLock<PeerId>,
    routes: Arc<dyn RoutingTable>,
    processors: Arc<HandlerRegistry>,
    peers: Arc<PeerTable>,
    resolver: Arc<Resolver>,
    endpoint: Arc<EndpointHolder>,
    listening_tx: watch::Sender<bool>,
    listening_rx: watch::Receiver<bool>,
}

impl Network {
    /// Creates a node from its configuration, identity keys, and routing
    /// table. Handlers are registered through [`Network::handlers`].
    pub fn new(config: NetworkConfig, keys: KeyPair, routes: Arc<dyn RoutingTable>) -> Arc<Self> {
        let keys = Arc::new(keys);
        let address = format_address(&config.scheme, &config.host, config.port);
        let id = PeerId::new(address, keys.public_key());
        let (listening_tx, listening_rx) = watch::channel(false);
        let endpoint = Arc::new(EndpointHolder::new(config.mux));
        let resolver = Arc::new(Resolver::new(config.dns_cache_capacity));

        Arc::new(Self {
            config,
            keys,
            id: RwLock::new(id),
            routes,
            processors: Arc::new(HandlerRegistry::new()),
            peers: PeerTable::new(),
            resolver,
            endpoint,
            listening_tx,
            listening_rx,
        })
    }

    /// The node's identity.
    pub fn id(&self) -> PeerId {
        self.id.read().clone()
    }

    /// The node's canonical address.
    pub fn address(&self) -> String {
        self.id.read().address.clone()
    }

    /// The handler registry.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.processors
    }

    /// The routing table this node reports to.
    pub fn routes(&self) -> &Arc<dyn RoutingTable> {
        &self.routes
    }

    /// The address resolver and its DNS cache.
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Number of cached peer clients.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Canonical addresses of all cached peers.
    pub fn peer_addresses(&self) -> Vec<String> {
        self.peers
            .snapshot()
            .into_iter()
            .map(|(address, _)| address)
            .collect()
    }

    /// The cached client for a canonical address.
    pub fn peer(&self, address: &str) -> Option<Arc<PeerClient>> {
        self.peers.get(address)
    }

    /// A receiver that flips to true once the node is listening.
    pub fn listening(&self) -> watch::Receiver<bool> {
        self.listening_rx.clone()
    }

    fn handle(&self) -> NodeHandle {
        NodeHandle {
            keys: self.keys.clone(),
            id: self.id.read().clone(),
            routes: self.routes.clone(),
            processors: self.processors.clone(),
            resolver: self.resolver.clone(),
            endpoint: self.endpoint.clone(),
            backoff: self.config.backoff,
            peers: Arc::downgrade(&self.peers),
        }
    }

    /// Binds the listener and serves inbound sessions until shutdown.
    ///
    /// Signals [`Network::listening`] once the socket is ready; run this in
    /// its own task and use the signal (or [`Network::bootstrap`]) to
    /// sequence against it.
    pub async fn listen(self: &Arc<Self>) -> Result<(), NetError> {
        let host: IpAddr = self.config.host.parse().map_err(|_| {
            NetError::InvalidAddress(format!("bind host {} is not an IP", self.config.host))
        })?;
        let endpoint = server_endpoint(SocketAddr::new(host, self.config.port), &self.config.mux)?;
        let local = endpoint.local_addr()?;

        if self.config.port == 0 {
            // Ephemeral bind: advertise the actual port.
            let address = format_address(&self.config.scheme, &self.config.host, local.port());
            *self.id.write() = PeerId::new(address, self.keys.public_key());
        }
        self.endpoint.install(endpoint.clone());
        let _ = self.listening_tx.send(true);
        info!(port = local.port(), "listening for peers");

        while let Some(incoming) = endpoint.accept().await {
            let node = self.clone();
            tokio::spawn(async move {
                match incoming.await {
                    Ok(conn) => node.serve_session(conn).await,
                    Err(err) => warn!(error = %err, "failed to accept connection"),
                }
            });
        }
        Ok(())
    }

    /// Serves one accepted session: a nascent client plus a stream-accept
    /// loop, one task per inbound stream.
    async fn serve_session(self: Arc<Self>, conn: quinn::Connection) {
        let remote = conn.remote_address();
        debug!(remote = %remote, "accepted session");
        let client = PeerClient::new(self.handle());

        loop {
            match conn.accept_bi().await {
                Ok((send, recv)) => {
                    let client = client.clone();
                    tokio::spawn(async move { client.ingest(send, recv).await });
                }
                // Connection lost mid-session: try to re-reach the peer.
                Err(ConnectionError::Reset) | Err(ConnectionError::TimedOut) => {
                    debug!(remote = %remote, "session lost; reestablishing");
                    let client = client.clone();
                    tokio::spawn(async move {
                        if let Err(err) = client.reestablish_connection().await {
                            debug!(error = %err, "reestablish failed");
                        }
                    });
                    break;
                }
                Err(ConnectionError::ApplicationClosed(_))
                | Err(ConnectionError::LocallyClosed) => {
                    debug!(remote = %remote, "session closed");
                    break;
                }
                Err(err) => {
                    warn!(remote = %remote, error = %err, "failed to accept stream");
                    break;
                }
            }
        }
    }

    /// Dials a peer, reusing the cached client for its canonical address.
    ///
    /// Two simultaneous dials to addresses that resolve the same collapse
    /// to one client; the loser's session is discarded.
    pub async fn dial(self: &Arc<Self>, address: &str) -> Result<Arc<PeerClient>, NetError> {
        let canonical = self.resolver.unify_address(address).await?;
        if canonical == self.address() {
            return Err(NetError::SelfDial);
        }

        if let Some(existing) = self.peers.get(&canonical) {
            if existing.is_active() {
                return Ok(existing);
            }
            // Cached but stale: revive the entry rather than duplicate it.
            match existing.establish_connection(&canonical).await {
                Ok(()) | Err(NetError::AlreadyConnected) => return Ok(existing),
                Err(err) => return Err(err),
            }
        }

        let client = PeerClient::new(self.handle());
        client.establish_connection(&canonical).await?;

        match self.peers.insert_if_absent(&canonical, client.clone()) {
            Ok(client) => Ok(client),
            Err(winner) => {
                client.discard_session();
                Ok(winner)
            }
        }
    }

    /// Waits for the listener, then dials each bootstrap peer and opens the
    /// handshake. Per-address failures are logged and skipped.
    pub async fn bootstrap(self: &Arc<Self>, addresses: &[String]) {
        let mut listening = self.listening_rx.clone();
        let _ = listening.wait_for(|ready| *ready).await;

        let own = self.address();
        let filtered = self.resolver.filter_peers(&own, addresses).await;
        for address in filtered {
            match self.dial(&address).await {
                Ok(client) => {
                    if let Err(err) = client.tell(&HandshakeRequest).await {
                        error!(peer = %address, error = %err, "failed to send handshake");
                    }
                }
                Err(err) => {
                    warn!(peer = %address, error = %err, "failed to dial bootstrap peer");
                }
            }
        }
    }

    /// Sends `body` to every cached peer; delivery failures are logged and
    /// do not abort the iteration.
    pub async fn broadcast<B: Body>(&self, body: &B) {
        for (address, client) in self.peers.snapshot() {
            if let Err(err) = client.tell(body).await {
                warn!(peer = %address, error = %err, "failed to send broadcast");
            }
        }
    }

    /// Sends `body` to the cached peers at the given canonical addresses.
    ///
    /// A failed send triggers a background reconnect attempt for that peer.
    pub async fn broadcast_by_addresses<B: Body>(&self, body: &B, addresses: &[String]) {
        for address in addresses {
            let Some(client) = self.peers.get(address) else {
                warn!(peer = %address, "cannot broadcast; peer does not exist");
                continue;
            };
            if let Err(err) = client.tell(body).await {
                warn!(peer = %address, error = %err, "failed to send broadcast");
                let client = client.clone();
                tokio::spawn(async move {
                    if let Err(err) = client.reestablish_connection().await {
                        debug!(error = %err, "reconnect after failed broadcast failed");
                    }
                });
            }
        }
    }

    /// Sends `body` to the cached peers with the given identities.
    pub async fn broadcast_by_ids<B: Body>(&self, body: &B, ids: &[PeerId]) {
        let addresses: Vec<String> = ids.iter().map(|id| id.address.clone()).collect();
        self.broadcast_by_addresses(body, &addresses).await;
    }

    /// Sends `body` to up to `k` peers sampled without replacement.
    ///
    /// Scans the peer index for at most `3k` addresses, shuffles, and sends
    /// to the first `min(k, len)`. Does not guarantee exactly `k`.
    pub async fn broadcast_randomly<B: Body>(&self, body: &B, k: usize) {
        let mut addresses = Vec::new();
        for (address, _) in self.peers.snapshot() {
            addresses.push(address);
            if addresses.len() >= k.saturating_mul(3) {
                break;
            }
        }

        addresses.shuffle(&mut rand::thread_rng());
        addresses.truncate(k);
        self.broadcast_by_addresses(body, &addresses).await;
    }

    /// Closes every peer client and the listener.
    pub fn shutdown(&self) {
        for (_, client) in self.peers.snapshot() {
            client.close();
        }
        self.endpoint.close();
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::MemoryRoutes;

    fn test_network() -> Arc<Network> {
        Network::new(
            NetworkConfig {
                port: 4242,
                ..Default::default()
            },
            KeyPair::generate(),
            Arc::new(MemoryRoutes::new()),
        )
    }

    #[test]
    fn test_identity_from_config() {
        let network = test_network();
        assert_eq!(network.address(), "quic://127.0.0.1:4242");
        assert_eq!(network.id().public_key.len(), 32);
        assert_eq!(network.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_dial_self_is_rejected() {
        let network = test_network();
        let err = network.dial("quic://127.0.0.1:4242").await.unwrap_err();
        assert!(matches!(err, NetError::SelfDial));
        assert_eq!(network.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_dial_rejects_malformed_address() {
        let network = test_network();
        assert!(matches!(
            network.dial("").await.unwrap_err(),
            NetError::InvalidAddress(_)
        ));
        assert!(matches!(
            network.dial("quic://127.0.0.1:0").await.unwrap_err(),
            NetError::InvalidAddress(_)
        ));
    }

    #[test]
    fn test_peer_table_insert_if_absent_collapses() {
        let table = PeerTable::new();
        let a = PeerClient::new(test_support::standalone_handle());
        let b = PeerClient::new(test_support::standalone_handle());

        assert!(table
            .insert_if_absent("quic://10.0.0.1:1000", a.clone())
            .is_ok());
        let winner = table
            .insert_if_absent("quic://10.0.0.1:1000", b.clone())
            .unwrap_err();
        assert!(Arc::ptr_eq(&winner, &a));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_peer_table_remove_if_same() {
        let table = PeerTable::new();
        let a = PeerClient::new(test_support::standalone_handle());
        let b = PeerClient::new(test_support::standalone_handle());
        let _ = table.insert_if_absent("quic://10.0.0.1:1000", a.clone());

        // A stale pointer does not evict the current owner.
        table.remove_if_same("quic://10.0.0.1:1000", Arc::as_ptr(&b));
        assert_eq!(table.len(), 1);

        table.remove_if_same("quic://10.0.0.1:1000", Arc::as_ptr(&a));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_listening_signal_starts_low() {
        let network = test_network();
        assert!(!*network.listening().borrow());
    }
}
