//! # Named-Pipe Transport
//!
//! Local IPC with one request per pipe connection: the client connects, writes
//! one `[len][payload]` frame, reads one back and disconnects. No ids, no
//! reuse, no correlation state.
//!
//! On Windows this is a real named pipe (`\\.\pipe\<name>`). Elsewhere it is a
//! Unix domain socket in the temp dir, or at `<name>` if that is an absolute path.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tracing::debug;

use crate::context::CallContext;
use crate::context::Peer;
use crate::transport::ClientTransport;
use crate::transport::Error;
use crate::transport::Handler;
use crate::transport::HostConfig;
use crate::transport::HostError;
use crate::transport::HostEvents;
use crate::transport::HostStage;
use crate::transport::Request;
use crate::transport::Result;
use crate::transport::Shutdown;
use crate::transport::frame;
use crate::transport::frame::DEFAULT_MAX_FRAME_LEN;
use crate::transport::local::OneshotResponder;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as platform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as platform;

/// Client side: one pipe connection per [`ClientTransport::send`].
pub struct PipeClientTransport {
    name: String,
    max_frame_len: usize,
}

impl PipeClientTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait::async_trait]
impl ClientTransport for PipeClientTransport {
    async fn send(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let request = frame::encode_pipe(payload)?;
        let mut stream = platform::connect(&self.name).await?;

        stream.write_all(&request).await?;
        stream.flush().await?;

        let response = frame::read_pipe(&mut stream, self.max_frame_len).await?;
        response.ok_or_else(|| Error::ConnectionLost("pipe closed before a response arrived".into()))
    }
}

struct Listening {
    name: String,
    stop: watch::Sender<bool>,
}

/// Accepts pipe clients and serves one request per connection.
pub struct PipeHost {
    handler: Arc<dyn Handler>,
    config: HostConfig,
    events: HostEvents,
    state: Mutex<Option<Listening>>,
}

impl PipeHost {
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

    pub fn errors(&self) -> broadcast::Receiver<HostError> {
        self.events.subscribe()
    }

    pub fn is_listening(&self) -> bool {
        self.lock().is_some()
    }

    pub async fn start_listening(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        if state.is_some() {
            return Err(Error::AlreadyListening);
        }

        let listener = platform::PipeListener::bind(name)?;
        let (stop, shutdown) = Shutdown::new();
        tokio::spawn(accept_loop(
            listener,
            name.to_string(),
            Arc::clone(&self.handler),
            self.events.clone(),
            shutdown,
            self.config.max_frame_len,
        ));
        *state = Some(Listening {
            name: name.to_string(),
            stop,
        });

        debug!(pipe = name, "pipe host listening");
        Ok(())
    }

    pub fn stop_listening(&self) {
        if let Some(listening) = self.lock().take() {
            debug!(pipe = %listening.name, "pipe host stopping");
            let _ = listening.stop.send(true);
        }
    }
}

impl Drop for PipeHost {
    fn drop(&mut self) {
        self.stop_listening();
    }
}

async fn accept_loop(
    mut listener: platform::PipeListener,
    name: String,
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
                Ok(stream) => {
                    tokio::spawn(serve_client(
                        stream,
                        name.clone(),
                        Arc::clone(&handler),
                        events.clone(),
                        signal.clone(),
                        max_frame_len,
                    ));
                }
                Err(e) => {
                    events.emit(HostStage::Accept, Some(Peer::Pipe(name.clone())), e.into());
                    break;
                }
            },
        }
    }
    debug!(pipe = %name, "pipe host accept loop stopped");
}

async fn serve_client(
    mut stream: platform::ServerStream,
    name: String,
    handler: Arc<dyn Handler>,
    events: HostEvents,
    mut shutdown: Shutdown,
    max_frame_len: usize,
) {
    let peer = Peer::Pipe(name);
    let received = tokio::select! {
        _ = shutdown.wait() => return,
        received = frame::read_pipe(&mut stream, max_frame_len) => received,
    };

    let payload = match received {
        Ok(Some(payload)) => payload,
        Ok(None) => {
            debug!(%peer, "pipe client left without a request");
            return;
        }
        Err(e) => {
            events.emit(HostStage::Receive, Some(peer), e);
            return;
        }
    };

    let (tx, rx) = oneshot::channel();
    let context = Arc::new(CallContext::for_peer(peer.clone()));
    handler.handle(Request::new(payload, context, OneshotResponder::new(tx))).await;

    let Ok(response) = rx.await else {
        debug!(%peer, "handler finished without responding");
        return;
    };

    let written = match frame::encode_pipe(&response) {
        Ok(bytes) => match stream.write_all(&bytes).await {
            Ok(()) => stream.flush().await.map_err(Error::from),
            Err(e) => Err(e.into()),
        },
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        events.emit(HostStage::Respond, Some(peer), e);
    }
    let _ = stream.shutdown().await;
}
