use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::net::ToSocketAddrs;
use tokio::sync::broadcast;
use tokio::sync::watch;
use tracing::debug;

use super::config::HostConfig;
use super::send_queue::SendQueue;
use crate::context::CallContext;
use crate::context::Peer;
use crate::transport::Error;
use crate::transport::Handler;
use crate::transport::HostError;
use crate::transport::HostEvents;
use crate::transport::HostStage;
use crate::transport::Request;
use crate::transport::Responder;
use crate::transport::Result;
use crate::transport::Shutdown;
use crate::transport::frame;

struct Listening {
    local_addr: SocketAddr,
    stop: watch::Sender<bool>,
}

/// Accepts TCP connections and feeds every framed request to a [`Handler`].
///
/// Each connection gets its own read loop. Requests are handled on spawned
/// tasks so the next frame is read while earlier ones are still running;
/// responses are written back through the connection's send queue in
/// completion order.
pub struct TcpHost {
    handler: Arc<dyn Handler>,
    config: HostConfig,
    events: HostEvents,
    state: Mutex<Option<Listening>>,
}

impl TcpHost {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self::with_config(handler, HostConfig::default())
    }

    pub fn with_config(handler: Arc<dyn Handler>, config: HostConfig) -> Self {
        Self {
            handler,
            config,
            events: HostEvents::new(),
            state: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Listening>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes to host-level faults.
    pub fn errors(&self) -> broadcast::Receiver<HostError> {
        self.events.subscribe()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock().as_ref().map(|l| l.local_addr)
    }

    pub fn is_listening(&self) -> bool {
        self.lock().is_some()
    }

    /// Binds `addr` and starts accepting. Returns the bound address.
    pub async fn start_listening(&self, addr: impl ToSocketAddrs) -> Result<SocketAddr> {
        if self.is_listening() {
            return Err(Error::AlreadyListening);
        }

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let mut state = self.lock();
        if state.is_some() {
            return Err(Error::AlreadyListening);
        }

        let (stop, shutdown) = Shutdown::new();
        tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.handler),
            self.events.clone(),
            shutdown,
            self.config.max_frame_len,
        ));
        *state = Some(Listening { local_addr, stop });

        debug!(%local_addr, "tcp host listening");
        Ok(local_addr)
    }

    /// Stops accepting and ends every connection's read loop. Requests already
    /// dispatched run to completion.
    pub fn stop_listening(&self) {
        if let Some(listening) = self.lock().take() {
            debug!(local_addr = %listening.local_addr, "tcp host stopping");
            let _ = listening.stop.send(true);
        }
    }
}

impl Drop for TcpHost {
    fn drop(&mut self) {
        self.stop_listening();
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: Arc<dyn Handler>,
    events: HostEvents,
    mut shutdown: Shutdown,
    max_frame_len: usize,
) {
    let signal = shutdown.clone();
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(serve_connection(
                        stream,
                        peer,
                        Arc::clone(&handler),
                        events.clone(),
                        signal.clone(),
                        max_frame_len,
                    ));
                }
                Err(e) => {
                    events.emit(HostStage::Accept, None, e.into());
                    // accept errors are usually fd exhaustion; don't spin on them
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            },
        }
    }
    debug!("tcp host accept loop stopped");
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<dyn Handler>,
    events: HostEvents,
    mut shutdown: Shutdown,
    max_frame_len: usize,
) {
    debug!(%peer, "accepted tcp connection");
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%peer, error = %e, "could not disable nagle");
    }

    let (mut reader, writer) = stream.into_split();
    let queue = Arc::new(SendQueue::spawn(writer));
    let context = Arc::new(CallContext::for_peer(Peer::Tcp(peer)));

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            frame = frame::read_tcp(&mut reader, max_frame_len) => match frame {
                Ok(Some((id, payload))) => {
                    let responder = TcpResponder { id, queue: Arc::clone(&queue) };
                    let request = Request::new(payload, Arc::clone(&context), responder);
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move { handler.handle(request).await });
                }
                Ok(None) => {
                    debug!(%peer, "peer closed tcp connection");
                    break;
                }
                Err(e) => {
                    events.emit(HostStage::Receive, Some(Peer::Tcp(peer)), e);
                    break;
                }
            },
        }
    }
}

struct TcpResponder {
    id: u64,
    queue: Arc<SendQueue>,
}

#[async_trait::async_trait]
impl Responder for TcpResponder {
    async fn respond(self: Box<Self>, payload: Vec<u8>) -> Result<()> {
        let frame = frame::encode_tcp(self.id, &payload)?;
        self.queue.send(frame).await
    }
}
