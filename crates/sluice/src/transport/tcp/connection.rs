//! # Client Connection with Read Pump
//!
//! One physical socket. A background task continuously reads response frames
//! and routes each one to the pending request with the same id; writes go
//! through the connection's [`SendQueue`].
//!
//! ## Invariants
//!
//! - Ids are assigned per connection from a monotonically increasing counter.
//! - A response whose id has no pending entry is dropped.
//! - Once a fault is recorded, no new request is registered and every pending
//!   request has already been failed with that fault.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use super::config::TcpClientConfig;
use super::send_queue::SendQueue;
use crate::transport::Error;
use crate::transport::Result;
use crate::transport::frame;

type Waiter = oneshot::Sender<Result<Vec<u8>>>;

#[derive(Default)]
struct Pending {
    fault: Option<Error>,
    requests: HashMap<u64, Waiter>,
}

#[derive(Default)]
struct Shared {
    pending: Mutex<Pending>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the first fault and fails everything still waiting.
    fn fail_all(&self, error: Error) {
        let waiters: Vec<Waiter> = {
            let mut pending = self.lock();
            if pending.fault.is_none() {
                pending.fault = Some(error.clone());
            }
            pending.requests.drain().map(|(_, tx)| tx).collect()
        };
        for tx in waiters {
            let _ = tx.send(Err(error.clone()));
        }
    }
}

pub(crate) struct Connection {
    remote: String,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    queue: SendQueue,
    reader: JoinHandle<()>,
    config: Arc<TcpClientConfig>,
}

impl Connection {
    pub(crate) async fn connect(remote: &str, config: Arc<TcpClientConfig>) -> Result<Self> {
        let connecting = TcpStream::connect(remote);
        let stream = match config.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connecting).await.map_err(|_| Error::Timeout)??,
            None => connecting.await?,
        };
        stream.set_nodelay(true)?;
        debug!(remote, "tcp connection established");
        Ok(Self::from_stream(stream, remote.to_string(), config))
    }

    fn from_stream(stream: TcpStream, remote: String, config: Arc<TcpClientConfig>) -> Self {
        let (reader, writer) = stream.into_split();
        let shared = Arc::new(Shared::default());
        let reader = tokio::spawn(pump(reader, Arc::clone(&shared), config.max_frame_len, remote.clone()));

        Self {
            remote,
            shared,
            next_id: AtomicU64::new(1),
            queue: SendQueue::spawn(writer),
            reader,
            config,
        }
    }

    pub(crate) fn remote(&self) -> &str {
        &self.remote
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.shared.lock().fault.is_some()
    }

    /// Number of requests awaiting a response on this connection.
    pub(crate) fn in_flight(&self) -> usize {
        self.shared.lock().requests.len()
    }

    pub(crate) async fn call(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = frame::encode_tcp(id, payload)?;

        let rx = {
            let mut pending = self.shared.lock();
            if let Some(fault) = &pending.fault {
                return Err(fault.clone());
            }
            let (tx, rx) = oneshot::channel();
            pending.requests.insert(id, tx);
            rx
        };

        if let Err(e) = self.queue.send(frame).await {
            // a half-written frame leaves the stream unusable
            self.shared.fail_all(e.clone());
            return Err(e);
        }

        let response = match self.config.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(response) => response,
                Err(_) => {
                    self.shared.lock().requests.remove(&id);
                    debug!(remote = %self.remote, id, "request timed out");
                    return Err(Error::Timeout);
                }
            },
            None => rx.await,
        };

        response.map_err(|_| Error::ConnectionLost("connection dropped while awaiting a response".into()))?
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
        self.shared.fail_all(Error::Closed);
    }
}

async fn pump(mut reader: OwnedReadHalf, shared: Arc<Shared>, max_frame_len: usize, remote: String) {
    let error = loop {
        match frame::read_tcp(&mut reader, max_frame_len).await {
            Ok(Some((id, payload))) => {
                let waiter = shared.lock().requests.remove(&id);
                match waiter {
                    Some(tx) => {
                        // receiver may have timed out, that's fine
                        let _ = tx.send(Ok(payload));
                    }
                    None => debug!(%remote, id, "dropping response with no pending request"),
                }
            }
            Ok(None) => break Error::ConnectionLost("remote closed the connection".into()),
            Err(e) => break e,
        }
    };

    debug!(%remote, %error, "tcp connection pump stopped");
    shared.fail_all(error);
}
