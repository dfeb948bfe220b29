//! Single-writer outbound queue.
//!
//! Callers enqueue whole frames and await their completion; one background task
//! drains the queue strictly FIFO, one physical write at a time. After the first
//! write failure every queued and future frame fails with that error.

use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::debug;

use crate::transport::Error;
use crate::transport::Result;

struct Outbound {
    frame: Vec<u8>,
    done: oneshot::Sender<Result<()>>,
}

pub(crate) struct SendQueue {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl SendQueue {
    /// Spawns the drain task. It exits once every handle to the queue is gone
    /// and the backlog is written.
    pub(crate) fn spawn<W>(writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain(writer, rx));
        Self { tx }
    }

    pub(crate) async fn send(&self, frame: Vec<u8>) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.tx.send(Outbound { frame, done }).map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)?
    }
}

async fn drain<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Outbound>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(item) = rx.recv().await {
        let written = match writer.write_all(&item.frame).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        match written {
            Ok(()) => {
                let _ = item.done.send(Ok(()));
            }
            Err(e) => {
                let error = Error::from(e);
                debug!(%error, "send queue write failed");
                let _ = item.done.send(Err(error.clone()));
                rx.close();
                while let Ok(rest) = rx.try_recv() {
                    let _ = rest.done.send(Err(error.clone()));
                }
                return;
            }
        }
    }
    let _ = writer.shutdown().await;
}
