use std::sync::Arc;

use tracing::debug;

use super::config::TcpClientConfig;
use super::connection::Connection;
use super::pool::ConnectionPool;
use crate::transport::ClientTransport;
use crate::transport::Result;

/// Pooled TCP client transport.
///
/// Policy per call:
/// - while the pool holds fewer than `min_pool_size` live connections, open a
///   fresh one (warm-up);
/// - otherwise try a pooled connection, and on any failure fall back to a
///   fresh connection without surfacing the pooled error.
///
/// With multiplexing, a fresh connection joins the pool as soon as it is open.
/// Without it, a connection only returns to the pool after a successful call.
/// Either way the pool never holds more than
/// [`TcpClientConfig::pool_capacity`] connections; surplus ones are closed
/// once their call completes.
pub struct TcpClientTransport {
    config: Arc<TcpClientConfig>,
    pool: ConnectionPool,
}

impl TcpClientTransport {
    pub fn new(config: TcpClientConfig) -> Self {
        let config = Arc::new(config);
        Self {
            pool: ConnectionPool::new(Arc::clone(&config)),
            config,
        }
    }

    /// Shorthand for a single remote with default settings.
    pub fn connect_to(remote: impl Into<String>) -> Self {
        Self::new(TcpClientConfig::new([remote.into()]))
    }

    pub fn config(&self) -> &TcpClientConfig {
        &self.config
    }

    /// Live connections currently held by the pool.
    pub fn pooled(&self) -> usize {
        self.pool.len()
    }

    async fn send_fresh(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let conn = self.pool.connect().await?;
        if self.config.multiplexing {
            if self.pool.put(Arc::clone(&conn)).is_some() {
                debug!(remote = conn.remote(), "pool full, connection closes after this call");
            }
            return conn.call(payload).await;
        }

        let response = conn.call(payload).await?;
        self.release(conn);
        Ok(response)
    }

    fn release(&self, conn: Arc<Connection>) {
        if let Some(surplus) = self.pool.put(conn) {
            debug!(remote = surplus.remote(), "pool full, closing connection");
        }
    }
}

#[async_trait::async_trait]
impl ClientTransport for TcpClientTransport {
    async fn send(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if self.pool.len() < self.config.min_pool_size {
            return self.send_fresh(payload).await;
        }

        let exclusive = !self.config.multiplexing;
        if let Some(conn) = self.pool.checkout(exclusive) {
            match conn.call(payload).await {
                Ok(response) => {
                    if exclusive {
                        self.release(conn);
                    }
                    return Ok(response);
                }
                Err(error) => {
                    debug!(
                        remote = conn.remote(),
                        in_flight = conn.in_flight(),
                        %error,
                        "pooled connection failed, retrying on a fresh one"
                    );
                }
            }
        }

        self.send_fresh(payload).await
    }
}
