//! In-process transports.
//!
//! [`LocalTransport`] connects a client straight to a [`Handler`] in the same
//! process, running each request on a tokio worker. [`GenericHost`] runs
//! requests inline and is the bridge for embedding the runtime into a foreign
//! server loop: hand it bytes, get bytes back.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::context::CallContext;
use crate::context::Peer;
use crate::transport::ClientTransport;
use crate::transport::Error;
use crate::transport::Handler;
use crate::transport::Request;
use crate::transport::Responder;
use crate::transport::Result;

/// Responds by completing a oneshot channel.
pub(crate) struct OneshotResponder(oneshot::Sender<Vec<u8>>);

impl OneshotResponder {
    pub(crate) fn new(tx: oneshot::Sender<Vec<u8>>) -> Self {
        Self(tx)
    }
}

#[async_trait::async_trait]
impl Responder for OneshotResponder {
    async fn respond(self: Box<Self>, payload: Vec<u8>) -> Result<()> {
        self.0
            .send(payload)
            .map_err(|_| Error::ConnectionLost("requester stopped waiting".into()))
    }
}

/// Runs handlers inline for requests that arrive through some other server.
pub struct GenericHost {
    handler: Arc<dyn Handler>,
}

impl GenericHost {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self { handler }
    }

    /// Handles one request and returns the response payload.
    pub async fn handle(&self, payload: Vec<u8>, context: Arc<CallContext>) -> Result<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        self.handler.handle(Request::new(payload, context, OneshotResponder(tx))).await;
        rx.await
            .map_err(|_| Error::ConnectionLost("handler finished without responding".into()))
    }
}

/// Client transport that dispatches each send onto a tokio worker.
pub struct LocalTransport {
    handler: Arc<dyn Handler>,
}

impl LocalTransport {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self { handler }
    }
}

#[async_trait::async_trait]
impl ClientTransport for LocalTransport {
    async fn send(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        let request = Request::new(
            payload.to_vec(),
            Arc::new(CallContext::for_peer(Peer::Local)),
            OneshotResponder(tx),
        );

        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move { handler.handle(request).await });

        rx.await
            .map_err(|_| Error::ConnectionLost("handler dropped the request".into()))
    }
}
