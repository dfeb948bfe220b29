//! Connection pool over a flat list of candidate endpoints.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tracing::debug;

use super::config::TcpClientConfig;
use super::connection::Connection;
use crate::transport::Error;
use crate::transport::Result;

pub(crate) struct ConnectionPool {
    config: Arc<TcpClientConfig>,
    idle: Mutex<VecDeque<Arc<Connection>>>,
}

impl ConnectionPool {
    pub(crate) fn new(config: Arc<TcpClientConfig>) -> Self {
        Self {
            config,
            idle: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<Connection>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live pooled connections. Dead ones are pruned on the way.
    pub(crate) fn len(&self) -> usize {
        let mut idle = self.lock();
        idle.retain(|c| !c.is_closed());
        idle.len()
    }

    /// Takes the oldest live connection.
    ///
    /// A shared (multiplexed) checkout leaves the connection in the pool, moved
    /// to the back. An exclusive checkout removes it until [`Self::put`].
    pub(crate) fn checkout(&self, exclusive: bool) -> Option<Arc<Connection>> {
        let mut idle = self.lock();
        while let Some(conn) = idle.pop_front() {
            if conn.is_closed() {
                debug!(remote = conn.remote(), "pruning closed connection");
                continue;
            }
            if !exclusive {
                idle.push_back(Arc::clone(&conn));
            }
            return Some(conn);
        }
        None
    }

    /// Returns a connection to the pool. A closed connection, or one past
    /// [`TcpClientConfig::pool_capacity`], is handed back instead.
    pub(crate) fn put(&self, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        if conn.is_closed() {
            return Some(conn);
        }
        let mut idle = self.lock();
        idle.retain(|c| !c.is_closed());
        if idle.len() >= self.config.pool_capacity() {
            return Some(conn);
        }
        idle.push_back(conn);
        None
    }

    /// Opens a fresh connection, racing every remote. The first success wins;
    /// failures are only reported if every remote fails.
    pub(crate) async fn connect(&self) -> Result<Arc<Connection>> {
        let mut attempts: FuturesUnordered<_> = self
            .config
            .remotes
            .iter()
            .map(|remote| Connection::connect(remote, Arc::clone(&self.config)))
            .collect();

        let mut failures = Vec::new();
        while let Some(attempt) = attempts.next().await {
            match attempt {
                Ok(conn) => return Ok(Arc::new(conn)),
                Err(e) => failures.push(e.to_string()),
            }
        }
        Err(Error::Connect(failures))
    }
}
