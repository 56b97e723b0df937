//! Handler registry and message dispatch.
//!
//! Handlers are registered per body type and looked up by the full type url
//! carried in the envelope's tag. Registration normally happens once at
//! node construction, but the table tolerates runtime additions; lookups
//! never block registration for long (clone-out under a read lock).

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;

use weft_core::PeerId;
use weft_proto::{Body, TaggedPayload};

use crate::client::PeerClient;
use crate::error::NetError;
use crate::frame::write_frame;

/// Execution context handed to a handler for one inbound message.
pub struct MessageContext {
    /// The peer client the message arrived through.
    pub client: Arc<PeerClient>,
    /// Authenticated identity of the sender.
    pub sender: PeerId,
    /// The tagged payload as it appeared on the wire.
    pub body: TaggedPayload,
    reply_stream: Option<quinn::SendStream>,
}

impl MessageContext {
    pub(crate) fn new(
        client: Arc<PeerClient>,
        sender: PeerId,
        body: TaggedPayload,
        reply_stream: quinn::SendStream,
    ) -> Self {
        Self {
            client,
            sender,
            body,
            reply_stream: Some(reply_stream),
        }
    }

    /// Writes one signed envelope back on the inbound stream.
    ///
    /// A stream carries at most one reply; a second call fails.
    pub async fn reply<B: Body>(&mut self, body: &B) -> Result<(), NetError> {
        let mut stream = self
            .reply_stream
            .take()
            .ok_or_else(|| NetError::SendFailed("reply stream already used".to_string()))?;

        let envelope = self.client.seal(body);
        let result = write_frame(&mut stream, &envelope).await;
        let _ = stream.finish();
        result
    }
}

/// A typed handler for one body type.
#[async_trait]
pub trait Handler<B: Body>: Send + Sync + 'static {
    /// Processes one verified inbound message.
    async fn handle(&self, ctx: &mut MessageContext, body: B) -> Result<(), NetError>;
}

#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn call(&self, ctx: &mut MessageContext) -> Result<(), NetError>;
}

struct TypedHandler<B, H> {
    inner: H,
    _body: PhantomData<fn() -> B>,
}

#[async_trait]
impl<B: Body, H: Handler<B>> ErasedHandler for TypedHandler<B, H> {
    async fn call(&self, ctx: &mut MessageContext) -> Result<(), NetError> {
        let body = ctx.body.decode_as::<B>()?;
        self.inner.handle(ctx, body).await
    }
}

/// Maps body type urls to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ErasedHandler>>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for body type `B`, replacing any previous one.
    pub fn register<B: Body, H: Handler<B>>(&self, handler: H) {
        let erased = Arc::new(TypedHandler {
            inner: handler,
            _body: PhantomData,
        });
        self.handlers
            .write()
            .insert(B::TYPE_URL.to_string(), erased);
    }

    /// Returns true if a handler is registered for `type_url`.
    pub fn contains(&self, type_url: &str) -> bool {
        self.handlers.read().contains_key(type_url)
    }

    /// Invokes the handler for the context's body type.
    ///
    /// An unregistered type is not an error: it is logged at warning level
    /// and the message is discarded.
    pub(crate) async fn dispatch(&self, ctx: &mut MessageContext) -> Result<(), NetError> {
        let handler = self.handlers.read().get(&ctx.body.type_url).cloned();
        match handler {
            Some(handler) => handler.call(ctx).await,
            None => {
                warn!(type_url = %ctx.body.type_url, "unknown message type received");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_proto::HandshakeRequest;

    struct Nop;

    #[async_trait]
    impl Handler<HandshakeRequest> for Nop {
        async fn handle(
            &self,
            _ctx: &mut MessageContext,
            _body: HandshakeRequest,
        ) -> Result<(), NetError> {
            Ok(())
        }
    }

    #[test]
    fn test_register_keys_by_full_type_url() {
        let registry = HandlerRegistry::new();
        assert!(!registry.contains(HandshakeRequest::TYPE_URL));

        registry.register::<HandshakeRequest, _>(Nop);
        assert!(registry.contains("weft.v1.HandshakeRequest"));
        // The final segment alone is not a key.
        assert!(!registry.contains("HandshakeRequest"));
    }

    #[test]
    fn test_reregistration_replaces() {
        let registry = HandlerRegistry::new();
        registry.register::<HandshakeRequest, _>(Nop);
        registry.register::<HandshakeRequest, _>(Nop);
        assert!(registry.contains(HandshakeRequest::TYPE_URL));
    }
}
