//! Named-pipe transport against raw handlers.

mod common;

use std::sync::Arc;
use std::time::Duration;

use sluice::Peer;
use sluice::transport::ClientTransport;
use sluice::transport::Error;
use sluice::transport::Handler;
use sluice::transport::HostConfig;
use sluice::transport::HostStage;
use sluice::transport::Request;
use sluice::transport::pipe::PipeClientTransport;
use sluice::transport::pipe::PipeHost;

use common::init_tracing;
use common::unique_pipe;

struct Echo;

#[async_trait::async_trait]
impl Handler for Echo {
    async fn handle(&self, request: Request) {
        let payload = request.payload().to_vec();
        let _ = request.respond(payload).await;
    }
}

/// Answers with the peer it saw, as text.
struct WhoAmI;

#[async_trait::async_trait]
impl Handler for WhoAmI {
    async fn handle(&self, request: Request) {
        let peer = request.context().peer().map(|p| p.to_string()).unwrap_or_default();
        let _ = request.respond(peer.into_bytes()).await;
    }
}

// --- Test 1: Echo ---

#[tokio::test]
async fn test_pipe_echo() {
    init_tracing();
    let name = unique_pipe("echo");
    let host = PipeHost::new(Arc::new(Echo));
    host.start_listening(&name).await.unwrap();

    let client = PipeClientTransport::new(&name);
    assert_eq!(client.send(&[1, 2, 3, 4, 5]).await.unwrap(), vec![1, 2, 3, 4, 5]);
    assert_eq!(client.send(&[]).await.unwrap(), Vec::<u8>::new());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pipe_concurrent_clients() {
    let name = unique_pipe("fanout");
    let host = PipeHost::new(Arc::new(Echo));
    host.start_listening(&name).await.unwrap();

    let client = Arc::new(PipeClientTransport::new(&name));
    let calls = (0..32u8).map(|i| {
        let client = Arc::clone(&client);
        async move { (i, client.send(&[i; 8]).await) }
    });
    for (i, response) in futures::future::join_all(calls).await {
        assert_eq!(response.unwrap(), vec![i; 8]);
    }
}

// --- Test 2: Context ---

#[tokio::test]
async fn test_pipe_peer_in_context() {
    let name = unique_pipe("whoami");
    let host = PipeHost::new(Arc::new(WhoAmI));
    host.start_listening(&name).await.unwrap();

    let response = PipeClientTransport::new(&name).send(b"?").await.unwrap();
    assert_eq!(String::from_utf8(response).unwrap(), Peer::Pipe(name.clone()).to_string());
}

// --- Test 3: Lifecycle ---

#[tokio::test]
async fn test_pipe_host_lifecycle() {
    let name = unique_pipe("lifecycle");
    let host = PipeHost::new(Arc::new(Echo));

    host.start_listening(&name).await.unwrap();
    assert!(host.is_listening());
    assert!(matches!(host.start_listening(&name).await, Err(Error::AlreadyListening)));

    host.stop_listening();
    assert!(!host.is_listening());

    host.start_listening(&name).await.unwrap();
    assert_eq!(PipeClientTransport::new(&name).send(b"hi").await.unwrap(), b"hi");
}

#[tokio::test]
async fn test_pipe_without_host_fails() {
    let client = PipeClientTransport::new(unique_pipe("nobody"));
    assert!(client.send(b"anyone?").await.is_err());
}

// --- Test 4: Oversized frames ---

#[tokio::test]
async fn test_pipe_host_rejects_oversized_requests() {
    let name = unique_pipe("small");
    let host = PipeHost::with_config(Arc::new(Echo), HostConfig::default().with_max_frame_len(8));
    let mut errors = host.errors();
    host.start_listening(&name).await.unwrap();

    let client = PipeClientTransport::new(&name);
    assert!(client.send(&[0; 64]).await.is_err());

    let event = tokio::time::timeout(Duration::from_secs(5), errors.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.stage, HostStage::Receive);
    assert!(matches!(event.error, Error::PayloadTooLarge { len: 64, max: 8 }));

    assert_eq!(client.send(&[7; 8]).await.unwrap(), vec![7; 8]);
}
