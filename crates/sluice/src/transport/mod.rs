//! # Transport Abstraction
//!
//! A minimal, async interface for moving bytes between peers.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: transports know nothing about calls, signatures or
//!   encodings. They move opaque buffers.
//! - **Request-Response**: the client contract is "send bytes, await bytes".
//!   The server contract is "here is a request, respond to it once".
//! - **Hosts report, never crash**: a failing connection is logged and
//!   broadcast as a [`HostError`], then only that connection goes away.

use std::fmt;
use std::io;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::watch;
use tracing::warn;

use crate::context::CallContext;
use crate::context::Peer;

pub mod frame;
pub mod http;
pub mod local;
pub mod pipe;
pub mod tcp;

pub use tcp::HostConfig;

/// Errors that occur at the network/transport layer.
#[derive(Debug, Clone)]
pub enum Error {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// The operation timed out before a response was received.
    Timeout,
    /// A frame exceeded the configured maximum length.
    PayloadTooLarge { len: usize, max: usize },
    /// Framing violation: bad length prefix, truncated header.
    Protocol(String),
    /// Generic I/O error or internal transport failure.
    Io(String),
    /// Every candidate remote endpoint refused the connection.
    Connect(Vec<String>),
    /// The HTTP peer answered with a non-success status.
    Status(u16),
    /// The host is already listening.
    AlreadyListening,
    /// The transport was shut down while the operation was in flight.
    Closed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Timeout => write!(f, "Request timed out"),
            Self::PayloadTooLarge { len, max } => {
                write!(f, "Payload too large for transport: {} bytes (max {})", len, max)
            }
            Self::Protocol(msg) => write!(f, "Protocol violation: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
            Self::Connect(failures) if failures.is_empty() => {
                write!(f, "Unable to connect: no remote endpoints configured")
            }
            Self::Connect(failures) => {
                write!(f, "Unable to connect to any of the specified hosts: {}", failures.join("; "))
            }
            Self::Status(code) => write!(f, "Unexpected HTTP status {}", code),
            Self::AlreadyListening => write!(f, "Host is already listening"),
            Self::Closed => write!(f, "Transport closed"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Self::ConnectionLost(e.to_string()),
            io::ErrorKind::TimedOut => Self::Timeout,
            _ => Self::Io(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client side: send a payload, wait for the matching response.
///
/// This trait is designed to be object-safe (`Arc<dyn ClientTransport>`).
#[async_trait::async_trait]
pub trait ClientTransport: Send + Sync + 'static {
    /// # invariants
    /// - Returns the raw reply bytes on success.
    /// - Does not interpret the payload content.
    async fn send(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

/// Delivers the one response for a request back to its peer.
#[async_trait::async_trait]
pub trait Responder: Send + 'static {
    async fn respond(self: Box<Self>, payload: Vec<u8>) -> Result<()>;
}

/// One inbound request as seen by a server-side [`Handler`].
pub struct Request {
    payload: Vec<u8>,
    context: Arc<CallContext>,
    responder: Box<dyn Responder>,
}

impl Request {
    pub fn new(payload: Vec<u8>, context: Arc<CallContext>, responder: impl Responder) -> Self {
        Self {
            payload,
            context,
            responder: Box::new(responder),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }

    pub fn into_parts(self) -> (Vec<u8>, Arc<CallContext>, Box<dyn Responder>) {
        (self.payload, self.context, self.responder)
    }

    pub async fn respond(self, payload: Vec<u8>) -> Result<()> {
        self.responder.respond(payload).await
    }
}

/// Server side entry point. Implementations must respond to every request.
#[async_trait::async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, request: Request);
}

/// Where in a host a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStage {
    Accept,
    Receive,
    Respond,
}

/// Structured host failure, broadcast to anyone subscribed via `errors()`.
#[derive(Debug, Clone)]
pub struct HostError {
    pub stage: HostStage,
    pub peer: Option<Peer>,
    pub error: Error,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.peer {
            Some(peer) => write!(f, "{:?} failed for {}: {}", self.stage, peer, self.error),
            None => write!(f, "{:?} failed: {}", self.stage, self.error),
        }
    }
}

#[derive(Clone)]
pub(crate) struct HostEvents(broadcast::Sender<HostError>);

impl HostEvents {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self(tx)
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<HostError> {
        self.0.subscribe()
    }

    pub(crate) fn emit(&self, stage: HostStage, peer: Option<Peer>, error: Error) {
        let event = HostError { stage, peer, error };
        warn!(%event, "host error");
        // nobody listening is fine
        let _ = self.0.send(event);
    }
}

/// Cancellation signal observed by host accept and read loops.
#[derive(Clone)]
pub(crate) struct Shutdown(watch::Receiver<bool>);

impl Shutdown {
    pub(crate) fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self(rx))
    }

    /// Resolves once shutdown is requested or the signal's owner is gone.
    pub(crate) async fn wait(&mut self) {
        let _ = self.0.wait_for(|stop| *stop).await;
    }
}
