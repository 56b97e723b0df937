//! Per-peer client.
//!
//! A `PeerClient` owns the node's session to one remote peer. Outbound
//! messages open a fresh stream per envelope; inbound streams are fed to
//! [`PeerClient::ingest`] by the accept loop. The first verified envelope
//! binds the peer's identity; a session lost mid-flight is reestablished
//! with exponential backoff, and a peer that stays unreachable is closed
//! and dropped from the routing table.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use weft_core::PeerId;
use weft_proto::{Body, Envelope, TaggedPayload};

use crate::address::parse_address;
use crate::backoff::Backoff;
use crate::error::NetError;
use crate::frame::{read_frame, write_frame};
use crate::handlers::MessageContext;
use crate::node::NodeHandle;

/// Reconnection attempts before a peer is declared unreachable.
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

enum BindOutcome {
    First,
    Known,
    Mismatch(PeerId),
}

/// The node's handle to one remote peer.
pub struct PeerClient {
    node: NodeHandle,
    /// Canonical address this client connects to. Set on dial, or when the
    /// peer's first envelope advertises one.
    remote_addr: RwLock<Option<String>>,
    /// Authenticated identity; bound by the first verified inbound envelope.
    id: RwLock<Option<PeerId>>,
    /// Session to the peer. Written by the (re)connect path, read by
    /// `tell`/`request`; readers treat a missing or closed session as
    /// `NotConnected`.
    session: RwLock<Option<quinn::Connection>>,
    backoff: Mutex<Backoff>,
    closed: AtomicBool,
}

impl std::fmt::Debug for PeerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerClient")
            .field("remote_addr", &self.remote_addr.read())
            .field("id", &self.id.read().as_ref().map(|id| &id.address))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl PeerClient {
    pub(crate) fn new(node: NodeHandle) -> Arc<Self> {
        let backoff = Backoff::new(node.backoff);
        Arc::new(Self {
            node,
            remote_addr: RwLock::new(None),
            id: RwLock::new(None),
            session: RwLock::new(None),
            backoff: Mutex::new(backoff),
            closed: AtomicBool::new(false),
        })
    }

    /// The peer's authenticated identity, if bound yet.
    pub fn peer_id(&self) -> Option<PeerId> {
        self.id.read().clone()
    }

    /// The canonical address this client dials.
    pub fn remote_address(&self) -> Option<String> {
        self.remote_addr.read().clone()
    }

    /// Returns true once the client has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn active_session(&self) -> Option<quinn::Connection> {
        self.session
            .read()
            .as_ref()
            .filter(|conn| conn.close_reason().is_none())
            .cloned()
    }

    /// Returns true if the session is open.
    pub fn is_active(&self) -> bool {
        self.active_session().is_some()
    }

    /// Signs `body` into an envelope on behalf of this node.
    pub(crate) fn seal<B: Body>(&self, body: &B) -> Envelope {
        Envelope::seal(body, self.node.id.clone(), &self.node.keys)
    }

    fn socket_addr(address: &str) -> Result<SocketAddr, NetError> {
        let info = parse_address(address)?;
        let ip: IpAddr = info
            .host
            .parse()
            .map_err(|_| NetError::InvalidAddress(format!("host not resolved in {address}")))?;
        Ok(SocketAddr::new(ip, info.port))
    }

    /// Dials the transport and stores the session.
    ///
    /// `address` must be canonical (numeric host). Fails with
    /// `AlreadyConnected` when a live session exists.
    pub(crate) async fn establish_connection(&self, address: &str) -> Result<(), NetError> {
        if self.active_session().is_some() {
            return Err(NetError::AlreadyConnected);
        }

        let sock = Self::socket_addr(address)?;
        let conn = self.node.endpoint.connect(sock).await?;

        *self.remote_addr.write() = Some(address.to_string());
        *self.session.write() = Some(conn);
        debug!(peer = %address, "connection established");
        Ok(())
    }

    /// Tears down the session and retries the connection with backoff.
    ///
    /// After [`MAX_RECONNECT_ATTEMPTS`] failures the client closes itself
    /// and reports the peer unreachable.
    pub async fn reestablish_connection(self: &Arc<Self>) -> Result<(), NetError> {
        if let Some(conn) = self.session.write().take() {
            conn.close(0u32.into(), b"redial");
        }
        self.backoff.lock().reset();

        let address = self
            .remote_addr
            .read()
            .clone()
            .or_else(|| self.id.read().as_ref().map(|id| id.address.clone()))
            .ok_or(NetError::NotConnected)?;

        for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
            match self.establish_connection(&address).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let delay = self.backoff.lock().next();
                    debug!(
                        peer = %address,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "reconnect attempt failed"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        self.close();
        Err(NetError::Unreachable)
    }

    /// Sends one envelope to the peer on a fresh stream.
    pub async fn tell<B: Body>(&self, body: &B) -> Result<(), NetError> {
        let conn = self.active_session().ok_or(NetError::NotConnected)?;
        let (mut send, _recv) = conn
            .open_bi()
            .await
            .map_err(|e| NetError::StreamOpenFailed(e.to_string()))?;

        let envelope = self.seal(body);
        let result = write_frame(&mut send, &envelope).await;
        let _ = send.finish();
        result
    }

    /// Sends one envelope and awaits one verified envelope in reply.
    ///
    /// The whole exchange runs under an absolute deadline of now + `timeout`.
    pub async fn request<B: Body>(
        &self,
        body: &B,
        timeout: Duration,
    ) -> Result<TaggedPayload, NetError> {
        let conn = self.active_session().ok_or(NetError::NotConnected)?;
        let (mut send, mut recv) = conn
            .open_bi()
            .await
            .map_err(|e| NetError::StreamOpenFailed(e.to_string()))?;

        let envelope = self.seal(body);
        let exchange = async {
            write_frame(&mut send, &envelope).await?;
            let _ = send.finish();

            let reply = read_frame(&mut recv).await?;
            reply.verify()?;
            Ok::<_, NetError>(reply.body)
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(NetError::Timeout),
        }
    }

    fn bind_identity(&self, sender: &PeerId) -> BindOutcome {
        let mut id = self.id.write();
        match &*id {
            None => {
                *id = Some(sender.clone());
                BindOutcome::First
            }
            Some(bound) if bound == sender => BindOutcome::Known,
            Some(bound) => BindOutcome::Mismatch(bound.clone()),
        }
    }

    /// Connects back to the address the peer's first envelope advertised,
    /// and registers this client in the peer index. If another client
    /// already owns that address the dial is skipped.
    async fn connect_back(self: &Arc<Self>, advertised: &str) -> Result<(), NetError> {
        let canonical = self.node.resolver.unify_address(advertised).await?;
        if canonical == self.node.id.address {
            return Ok(());
        }
        if !self.node.adopt_peer(&canonical, self) {
            return Ok(());
        }
        *self.remote_addr.write() = Some(canonical.clone());
        match self.establish_connection(&canonical).await {
            Ok(()) | Err(NetError::AlreadyConnected) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Consumes one inbound stream: read, verify, bind identity, dispatch.
    ///
    /// Failures here are stream-local; the peer is never evicted over one
    /// bad frame.
    pub(crate) async fn ingest(
        self: Arc<Self>,
        send: quinn::SendStream,
        mut recv: quinn::RecvStream,
    ) {
        let envelope = match read_frame(&mut recv).await {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(error = %err, "failed to read inbound envelope");
                return;
            }
        };

        if let Err(err) = envelope.verify() {
            warn!(claimed = %envelope.sender, error = %err, "dropping unauthenticated envelope");
            return;
        }
        let sender = envelope.sender.clone();

        match self.bind_identity(&sender) {
            BindOutcome::First => {
                if let Err(err) = self.connect_back(&sender.address).await {
                    warn!(peer = %sender.address, error = %err, "failed to connect back to peer");
                    return;
                }
            }
            BindOutcome::Known => {}
            BindOutcome::Mismatch(bound) => {
                warn!(
                    claimed = %sender,
                    bound = %bound,
                    "envelope sender does not match bound identity"
                );
                return;
            }
        }

        self.node.routes.update(sender.clone());
        debug!(peer = %sender.address, type_url = %envelope.body.type_url, "message received");

        let mut ctx = MessageContext::new(self.clone(), sender, envelope.body, send);
        if let Err(err) = self.node.processors.dispatch(&mut ctx).await {
            warn!(error = %err, "message handler failed");
        }
    }

    /// Discards the session without the close bookkeeping; used when a
    /// concurrent dial to the same address lost the insertion race.
    pub(crate) fn discard_session(&self) {
        if let Some(conn) = self.session.write().take() {
            conn.close(0u32.into(), b"duplicate");
        }
    }

    /// Closes the client: the peer leaves the routing table, the session is
    /// torn down, and the entry is removed from the peer index.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(id) = self.id.read().clone() {
            if self.node.routes.peer_exists(&id) {
                self.node.routes.remove_peer(&id);
                info!(peer = %id.address, "peer disconnected");
            }
        }

        if let Some(conn) = self.session.write().take() {
            conn.close(0u32.into(), b"closed");
        }

        if let Some(address) = self.remote_addr.read().clone() {
            self.node.drop_peer(&address, self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::test_support::standalone_handle;

    fn peer(address: &str, key: u8) -> PeerId {
        PeerId::new(address, vec![key; 32])
    }

    #[test]
    fn test_identity_binds_once_and_rejects_mismatch() {
        let client = PeerClient::new(standalone_handle());
        let alice = peer("quic://10.0.0.1:1000", 1);
        let mallory = peer("quic://10.0.0.9:1000", 9);

        assert!(matches!(
            client.bind_identity(&alice),
            BindOutcome::First
        ));
        assert_eq!(client.peer_id(), Some(alice.clone()));

        assert!(matches!(client.bind_identity(&alice), BindOutcome::Known));
        assert!(matches!(
            client.bind_identity(&mallory),
            BindOutcome::Mismatch(_)
        ));
        // The bound identity is unchanged by the rejected envelope.
        assert_eq!(client.peer_id(), Some(alice));
    }

    #[test]
    fn test_same_address_different_key_is_a_mismatch() {
        let client = PeerClient::new(standalone_handle());
        let alice = peer("quic://10.0.0.1:1000", 1);
        let impostor = peer("quic://10.0.0.1:1000", 2);

        client.bind_identity(&alice);
        assert!(matches!(
            client.bind_identity(&impostor),
            BindOutcome::Mismatch(_)
        ));
    }

    #[test]
    fn test_operations_without_session_fail_not_connected() {
        let client = PeerClient::new(standalone_handle());
        assert!(!client.is_active());

        let err = futures_block_on(client.tell(&weft_proto::HandshakeRequest)).unwrap_err();
        assert!(matches!(err, NetError::NotConnected));
    }

    #[test]
    fn test_close_removes_bound_peer_from_routes() {
        let handle = standalone_handle();
        let routes = handle.routes.clone();
        let client = PeerClient::new(handle);

        let alice = peer("quic://10.0.0.1:1000", 1);
        client.bind_identity(&alice);
        routes.update(alice.clone());
        assert!(routes.peer_exists(&alice));

        client.close();
        assert!(client.is_closed());
        assert!(!routes.peer_exists(&alice));

        // Closing twice is a no-op.
        client.close();
    }

    /// Minimal executor for exercising async paths that never suspend.
    fn futures_block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }
}
