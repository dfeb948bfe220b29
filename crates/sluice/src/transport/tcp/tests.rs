use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::HostConfig;
use super::TcpClientConfig;
use super::TcpClientTransport;
use super::TcpHost;
use super::connection::Connection;
use crate::transport::ClientTransport;
use crate::transport::Error;
use crate::transport::Handler;
use crate::transport::HostStage;
use crate::transport::Request;
use crate::transport::frame;

const MAX: usize = 1 << 20;

/// Accepts forever, serving each connection with `serve`. Returns the bound
/// address and a count of accepted connections.
async fn spawn_server<F, Fut>(serve: F) -> (SocketAddr, Arc<AtomicUsize>)
where
    F: Fn(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            count.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(serve(stream));
        }
    });
    (addr, accepted)
}

/// Raw framed server that reacts to the payload:
/// `hang` never answers, `slow` answers after 100ms, `die` drops the
/// connection (only while `armed`), anything else is echoed.
async fn scripted(stream: TcpStream, armed: Arc<AtomicBool>) {
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(Mutex::new(writer));
    while let Ok(Some((id, payload))) = frame::read_tcp(&mut reader, MAX).await {
        match payload.as_slice() {
            b"hang" => continue,
            b"die" if armed.swap(false, Ordering::SeqCst) => return,
            b"slow" => {
                let writer = Arc::clone(&writer);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    let reply = frame::encode_tcp(id, &payload).unwrap();
                    let _ = writer.lock().await.write_all(&reply).await;
                });
            }
            _ => {
                let reply = frame::encode_tcp(id, &payload).unwrap();
                if writer.lock().await.write_all(&reply).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn scripted_server() -> (SocketAddr, Arc<AtomicUsize>, Arc<AtomicBool>) {
    let armed = Arc::new(AtomicBool::new(true));
    let arm = Arc::clone(&armed);
    let (addr, accepted) = spawn_server(move |stream| scripted(stream, Arc::clone(&arm))).await;
    (addr, accepted, armed)
}

fn config(addr: SocketAddr) -> TcpClientConfig {
    TcpClientConfig::new([addr.to_string()])
}

// --- connection ---

#[tokio::test]
async fn responses_are_routed_by_id_in_any_order() {
    let (addr, _) = spawn_server(|stream: TcpStream| async move {
        let (mut reader, mut writer) = stream.into_split();
        let mut frames = Vec::new();
        for _ in 0..3 {
            frames.push(frame::read_tcp(&mut reader, MAX).await.unwrap().unwrap());
        }
        for (id, payload) in frames.into_iter().rev() {
            let mut reply = b"re:".to_vec();
            reply.extend_from_slice(&payload);
            writer.write_all(&frame::encode_tcp(id, &reply).unwrap()).await.unwrap();
        }
        // keep the socket open until the client is done
        let _ = frame::read_tcp(&mut reader, MAX).await;
    })
    .await;

    let conn = Connection::connect(&addr.to_string(), Arc::new(config(addr))).await.unwrap();
    let (one, two, three) = tokio::join!(conn.call(b"one"), conn.call(b"two"), conn.call(b"three"));

    assert_eq!(one.unwrap(), b"re:one");
    assert_eq!(two.unwrap(), b"re:two");
    assert_eq!(three.unwrap(), b"re:three");
    assert_eq!(conn.in_flight(), 0);
}

#[tokio::test]
async fn a_connection_fault_only_fails_that_connections_requests() {
    let (addr, _, _) = scripted_server().await;
    let config = Arc::new(config(addr));
    let doomed = Connection::connect(&addr.to_string(), Arc::clone(&config)).await.unwrap();
    let healthy = Connection::connect(&addr.to_string(), config).await.unwrap();

    let (waiting, dying, fine) = tokio::join!(doomed.call(b"hang"), doomed.call(b"die"), healthy.call(b"fine"));

    assert!(waiting.is_err());
    assert!(dying.is_err());
    assert_eq!(fine.unwrap(), b"fine");

    assert!(doomed.is_closed());
    assert_eq!(doomed.in_flight(), 0);
    // the recorded fault is returned without touching the socket
    assert!(doomed.call(b"again").await.is_err());

    assert!(!healthy.is_closed());
    assert_eq!(healthy.call(b"still fine").await.unwrap(), b"still fine");
}

#[tokio::test]
async fn timed_out_requests_leave_the_connection_usable() {
    let (addr, _, _) = scripted_server().await;
    let config = Arc::new(config(addr).with_request_timeout(Duration::from_millis(30)));
    let conn = Connection::connect(&addr.to_string(), config).await.unwrap();

    assert!(matches!(conn.call(b"slow").await, Err(Error::Timeout)));
    assert_eq!(conn.in_flight(), 0);

    // let the late response arrive and be dropped
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(conn.call(b"ok").await.unwrap(), b"ok");
    assert!(!conn.is_closed());
}

// --- pool policy ---

#[tokio::test]
async fn warm_up_opens_min_pool_size_connections_then_reuses_them() {
    let (addr, accepted, _) = scripted_server().await;
    let transport = TcpClientTransport::new(config(addr).with_min_pool_size(3));

    let warm = (0..3u8).map(|i| {
        let transport = &transport;
        async move { transport.send(&[i]).await }
    });
    for (i, response) in futures::future::join_all(warm).await.into_iter().enumerate() {
        assert_eq!(response.unwrap(), vec![i as u8]);
    }
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
    assert_eq!(transport.pooled(), 3);

    assert_eq!(transport.send(b"next").await.unwrap(), b"next");
    assert_eq!(accepted.load(Ordering::SeqCst), 3);

    for i in 0..12u8 {
        assert_eq!(transport.send(&[i]).await.unwrap(), vec![i]);
    }
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
    assert_eq!(transport.pooled(), 3);
}

#[tokio::test]
async fn multiplexed_calls_share_a_connection() {
    let (addr, accepted, _) = scripted_server().await;
    let transport = TcpClientTransport::new(config(addr).with_min_pool_size(1));

    transport.send(b"warm").await.unwrap();
    let (a, b) = tokio::join!(transport.send(b"slow"), transport.send(b"slow"));
    assert_eq!(a.unwrap(), b"slow");
    assert_eq!(b.unwrap(), b"slow");
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_multiplexed_calls_get_a_connection_each() {
    let (addr, accepted, _) = scripted_server().await;
    let transport = TcpClientTransport::new(config(addr).with_min_pool_size(1).with_multiplexing(false));

    transport.send(b"warm").await.unwrap();
    assert_eq!(transport.pooled(), 1);

    let (a, b) = tokio::join!(transport.send(b"slow"), transport.send(b"slow"));
    assert_eq!(a.unwrap(), b"slow");
    assert_eq!(b.unwrap(), b"slow");
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    // the second connection is over capacity and is not kept
    assert_eq!(transport.pooled(), 1);
}

async fn burst(transport: &TcpClientTransport, calls: usize) {
    let sends = (0..calls).map(|_| transport.send(b"slow"));
    for response in futures::future::join_all(sends).await {
        assert_eq!(response.unwrap(), b"slow");
    }
}

#[tokio::test]
async fn a_burst_does_not_grow_the_pool_past_its_capacity() {
    for multiplexing in [false, true] {
        let (addr, accepted, _) = scripted_server().await;
        let transport = TcpClientTransport::new(config(addr).with_min_pool_size(2).with_multiplexing(multiplexing));

        burst(&transport, 50).await;
        assert!(accepted.load(Ordering::SeqCst) > 2);
        assert_eq!(transport.pooled(), 2, "multiplexing = {}", multiplexing);

        // the kept connections serve what follows
        let before = accepted.load(Ordering::SeqCst);
        for _ in 0..5 {
            assert_eq!(transport.send(b"again").await.unwrap(), b"again");
        }
        assert_eq!(accepted.load(Ordering::SeqCst), before);
        assert_eq!(transport.pooled(), 2);
    }
}

#[tokio::test]
async fn max_pool_size_raises_the_capacity() {
    let (addr, _, _) = scripted_server().await;
    let transport = TcpClientTransport::new(
        config(addr)
            .with_min_pool_size(1)
            .with_max_pool_size(4)
            .with_multiplexing(false),
    );
    assert_eq!(transport.config().pool_capacity(), 4);

    burst(&transport, 10).await;
    assert_eq!(transport.pooled(), 4);
}

#[test]
fn pool_capacity_never_drops_below_the_warm_up_size() {
    let config = TcpClientConfig::default();
    assert_eq!(config.pool_capacity(), 5);
    assert_eq!(config.clone().with_max_pool_size(2).pool_capacity(), 5);
    assert_eq!(config.with_min_pool_size(0).pool_capacity(), 1);
}

#[tokio::test]
async fn a_failed_pooled_call_falls_back_to_a_fresh_connection() {
    let (addr, accepted, armed) = scripted_server().await;
    let transport = TcpClientTransport::new(config(addr).with_min_pool_size(1));

    transport.send(b"warm").await.unwrap();
    assert_eq!(accepted.load(Ordering::SeqCst), 1);

    // the pooled connection drops this call; the retry is echoed
    assert_eq!(transport.send(b"die").await.unwrap(), b"die");
    assert!(!armed.load(Ordering::SeqCst));
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    assert_eq!(transport.pooled(), 1);
}

#[tokio::test]
async fn connecting_races_every_remote() {
    let dead = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let transport = TcpClientTransport::connect_to(dead.to_string());
    match transport.send(b"hello").await {
        Err(Error::Connect(failures)) => assert_eq!(failures.len(), 1),
        other => panic!("expected a connect error, got {:?}", other),
    }

    let (live, _, _) = scripted_server().await;
    let transport = TcpClientTransport::new(TcpClientConfig::new([dead.to_string(), live.to_string()]));
    assert_eq!(transport.send(b"hello").await.unwrap(), b"hello");
}

// --- host ---

struct Echo;

#[async_trait::async_trait]
impl Handler for Echo {
    async fn handle(&self, request: Request) {
        let payload = request.payload().to_vec();
        let _ = request.respond(payload).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn host_serves_concurrent_pooled_clients() {
    let host = TcpHost::new(Arc::new(Echo));
    let addr = host.start_listening("127.0.0.1:0").await.unwrap();
    let transport = Arc::new(TcpClientTransport::new(config(addr).with_min_pool_size(2)));

    let payloads: Vec<Vec<u8>> = {
        let mut rng = rand::thread_rng();
        (0..64)
            .map(|_| {
                let len = rng.gen_range(0..4096);
                (0..len).map(|_| rng.r#gen::<u8>()).collect()
            })
            .collect()
    };

    let calls = payloads.iter().map(|p| {
        let transport = Arc::clone(&transport);
        async move { transport.send(p).await }
    });
    let responses = futures::future::join_all(calls).await;

    for (sent, received) in payloads.iter().zip(responses) {
        assert_eq!(&received.unwrap(), sent);
    }
}

/// Answers `slow` after 200ms and everything else at once.
struct Lagging;

#[async_trait::async_trait]
impl Handler for Lagging {
    async fn handle(&self, request: Request) {
        if request.payload() == b"slow" {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        let mut reply = b"re:".to_vec();
        reply.extend_from_slice(request.payload());
        let _ = request.respond(reply).await;
    }
}

#[tokio::test]
async fn host_keeps_reading_while_a_request_is_handled() {
    let host = TcpHost::new(Arc::new(Lagging));
    let addr = host.start_listening("127.0.0.1:0").await.unwrap();
    let transport = TcpClientTransport::new(config(addr).with_min_pool_size(1));
    transport.send(b"warm").await.unwrap();

    let finished = std::sync::Mutex::new(Vec::new());
    let send = |payload: &'static [u8]| {
        let (transport, finished) = (&transport, &finished);
        async move {
            let response = transport.send(payload).await;
            finished.lock().unwrap().push(payload);
            response
        }
    };
    let (slow, fast) = tokio::join!(send(b"slow"), send(b"fast"));

    assert_eq!(slow.unwrap(), b"re:slow");
    assert_eq!(fast.unwrap(), b"re:fast");
    assert_eq!(*finished.lock().unwrap(), vec![&b"fast"[..], &b"slow"[..]]);
    // both went over the one warmed connection
    assert_eq!(transport.pooled(), 1);
}

#[tokio::test]
async fn host_start_stop_lifecycle() {
    let host = TcpHost::new(Arc::new(Echo));
    assert!(!host.is_listening());

    let addr = host.start_listening("127.0.0.1:0").await.unwrap();
    assert_eq!(host.local_addr(), Some(addr));
    assert!(matches!(host.start_listening("127.0.0.1:0").await, Err(Error::AlreadyListening)));

    host.stop_listening();
    assert!(!host.is_listening());
    assert_eq!(host.local_addr(), None);

    let again = host.start_listening("127.0.0.1:0").await.unwrap();
    let transport = TcpClientTransport::connect_to(again.to_string());
    assert_eq!(transport.send(b"back").await.unwrap(), b"back");
}

#[tokio::test]
async fn host_reports_oversized_frames() {
    let host = TcpHost::with_config(Arc::new(Echo), HostConfig::default().with_max_frame_len(16));
    let mut errors = host.errors();
    let addr = host.start_listening("127.0.0.1:0").await.unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&frame::encode_tcp(1, &[0u8; 64]).unwrap()).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), errors.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.stage, HostStage::Receive);
    assert!(matches!(event.peer, Some(crate::Peer::Tcp(_))));
    assert!(matches!(event.error, Error::PayloadTooLarge { len: 64, max: 16 }));

    // other clients are unaffected
    let transport = TcpClientTransport::connect_to(addr.to_string());
    assert_eq!(transport.send(b"small").await.unwrap(), b"small");
}
