//! Per-request context handed to target selectors, interceptors and
//! context-aware targets.

use std::fmt;
use std::net::SocketAddr;

/// Who sent a request. Hosts insert one into every [`CallContext`] they build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    Tcp(SocketAddr),
    Pipe(String),
    Local,
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{}", addr),
            Self::Pipe(name) => write!(f, "pipe://{}", name),
            Self::Local => f.write_str("local"),
        }
    }
}

/// Typed bag of request-scoped values. This does NOT travel across the network.
pub struct CallContext {
    data: anymap::Map<dyn anymap::any::Any + Send + Sync>,
}

impl CallContext {
    pub fn new() -> Self {
        Self { data: anymap::Map::new() }
    }

    pub fn for_peer(peer: Peer) -> Self {
        Self::new().with(peer)
    }

    pub fn with<T: Send + Sync + 'static>(mut self, val: T) -> Self {
        self.data.insert(val);
        self
    }

    pub fn insert<T: Send + Sync + 'static>(&mut self, val: T) -> Option<T> {
        self.data.insert(val)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.data.get::<T>()
    }

    pub fn peer(&self) -> Option<&Peer> {
        self.get::<Peer>()
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("peer", &self.peer())
            .field("entries", &self.data.len())
            .finish()
    }
}
