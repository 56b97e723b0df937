//! Test node: a real network on an ephemeral loopback port.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use weft_core::{KeyPair, PeerId};
use weft_net::{
    Handler, MemoryRoutes, MessageContext, NetError, Network, NetworkConfig,
};
use weft_proto::{Body, HandshakeRequest};

use crate::bodies::{Ping, Pong};

/// Records every message a test node's handlers saw.
#[derive(Default)]
pub struct Inbox {
    entries: Mutex<Vec<(PeerId, String)>>,
}

impl Inbox {
    /// Messages of the given type received so far.
    pub fn count_of(&self, type_url: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|(_, url)| url == type_url)
            .count()
    }

    /// Senders of every recorded message.
    pub fn senders(&self) -> Vec<PeerId> {
        self.entries
            .lock()
            .iter()
            .map(|(sender, _)| sender.clone())
            .collect()
    }

    fn record(&self, sender: PeerId, type_url: &str) {
        self.entries.lock().push((sender, type_url.to_string()));
    }

    /// Polls until `n` messages of `type_url` arrived or the timeout hits.
    pub async fn wait_for(&self, type_url: &str, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.count_of(type_url) >= n {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

struct RecordHandshake {
    inbox: Arc<Inbox>,
}

#[async_trait]
impl Handler<HandshakeRequest> for RecordHandshake {
    async fn handle(
        &self,
        ctx: &mut MessageContext,
        _body: HandshakeRequest,
    ) -> Result<(), NetError> {
        self.inbox
            .record(ctx.sender.clone(), HandshakeRequest::TYPE_URL);
        Ok(())
    }
}

struct EchoPing {
    inbox: Arc<Inbox>,
}

#[async_trait]
impl Handler<Ping> for EchoPing {
    async fn handle(&self, ctx: &mut MessageContext, body: Ping) -> Result<(), NetError> {
        self.inbox.record(ctx.sender.clone(), Ping::TYPE_URL);
        ctx.reply(&Pong { nonce: body.nonce }).await
    }
}

/// A running node with recording handlers and an in-memory routing table.
pub struct TestNode {
    /// The node under test.
    pub network: Arc<Network>,
    /// Its routing table.
    pub routes: Arc<MemoryRoutes>,
    /// Everything its handlers received.
    pub inbox: Arc<Inbox>,
    listen_task: JoinHandle<()>,
}

impl TestNode {
    /// Starts a node on an ephemeral loopback port and waits until it
    /// listens. Handlers: handshake recording plus ping echo.
    pub async fn start() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let routes = Arc::new(MemoryRoutes::new());
        let network = Network::new(NetworkConfig::default(), KeyPair::generate(), routes.clone());

        let inbox = Arc::new(Inbox::default());
        network.handlers().register::<HandshakeRequest, _>(RecordHandshake {
            inbox: inbox.clone(),
        });
        network.handlers().register::<Ping, _>(EchoPing {
            inbox: inbox.clone(),
        });

        let listen_task = {
            let network = network.clone();
            tokio::spawn(async move {
                let _ = network.listen().await;
            })
        };
        network.listening().wait_for(|ready| *ready).await?;

        info!(address = %network.address(), "test node listening");
        Ok(Self {
            network,
            routes,
            inbox,
            listen_task,
        })
    }

    /// The node's canonical address.
    pub fn address(&self) -> String {
        self.network.address()
    }

    /// The node's identity.
    pub fn id(&self) -> PeerId {
        self.network.id()
    }

    /// Shuts the node down.
    pub fn stop(&self) {
        self.network.shutdown();
        self.listen_task.abort();
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.stop();
    }
}
