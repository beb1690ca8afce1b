// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Transport-level liveness: heartbeat emission, the watchdog force-close on
//! a silent server, and the bounded offline send buffer.
//!
//! The peer here is a raw accept-only WebSocket server that records every
//! frame and never answers, so the client's own timers are the only thing
//! driving the session.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;

use murmur::token::StaticToken;
use murmur::transport::socket::SocketClient;
use murmur::transport::{ConnectionStatus, RealtimeLink, SocketConfig};
use murmur_proto::codec;
use murmur_proto::frame::ClientFrame;

/// Frames recorded by the server, in arrival order.
type Recorded = Arc<Mutex<Vec<ClientFrame>>>;

struct SilentServer {
    addr: SocketAddr,
    frames: Recorded,
    accepts: Arc<AtomicUsize>,
}

/// Accepts WebSocket connections on `addr`, decodes every text frame into
/// `frames`, and never sends anything back.
async fn silent_server(addr: &str) -> SilentServer {
    let listener = TcpListener::bind(addr).await.unwrap();
    let server = SilentServer {
        addr: listener.local_addr().unwrap(),
        frames: Arc::new(Mutex::new(Vec::new())),
        accepts: Arc::new(AtomicUsize::new(0)),
    };
    serve_silently(listener, Arc::clone(&server.frames), Arc::clone(&server.accepts));
    server
}

fn serve_silently(listener: TcpListener, frames: Recorded, accepts: Arc<AtomicUsize>) {
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            accepts.fetch_add(1, Ordering::SeqCst);
            let frames = Arc::clone(&frames);
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    if let Message::Text(text) = message {
                        if let Ok(frame) = codec::decode_client(text.as_str()) {
                            frames.lock().push(frame);
                        }
                    }
                }
            });
        }
    });
}

/// A config with timers shrunk to test scale; individual tests override the
/// knobs they exercise.
fn fast_config(addr: SocketAddr) -> SocketConfig {
    let mut config = SocketConfig::new(format!("ws://{addr}"));
    config.heartbeat_interval = Duration::from_millis(100);
    config.watchdog_interval = Duration::from_millis(50);
    config.liveness_timeout = Duration::from_secs(10);
    config.backoff_base = Duration::from_millis(100);
    config.backoff_cap = Duration::from_millis(400);
    config.jitter_max = Duration::ZERO;
    config
}

fn spawn_client(config: SocketConfig) -> SocketClient {
    SocketClient::spawn(config, Arc::new(StaticToken::new("alice")))
}

/// Receives statuses until `target` shows up or the deadline passes.
async fn wait_for_status(
    rx: &mut broadcast::Receiver<ConnectionStatus>,
    target: ConnectionStatus,
    deadline: Duration,
) -> bool {
    let until = tokio::time::Instant::now() + deadline;
    loop {
        match tokio::time::timeout_at(until, rx.recv()).await {
            Ok(Ok(status)) if status == target => return true,
            Ok(Ok(_)) => {}
            Ok(Err(_)) | Err(_) => return false,
        }
    }
}

#[tokio::test]
async fn idle_connection_emits_heartbeat_pings() {
    let server = silent_server("127.0.0.1:0").await;
    let link = spawn_client(fast_config(server.addr));
    let mut status_rx = link.subscribe_status();
    link.connect();
    assert!(wait_for_status(&mut status_rx, ConnectionStatus::Connected, Duration::from_secs(5)).await);

    // Nothing else is sent, so everything the server sees is heartbeat.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let pings = server
            .frames
            .lock()
            .iter()
            .filter(|f| matches!(f, ClientFrame::Ping))
            .count();
        if pings >= 3 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected repeated pings, saw {pings}"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    link.disconnect();
}

#[tokio::test]
async fn silent_server_is_force_closed_and_redialed() {
    let server = silent_server("127.0.0.1:0").await;
    let mut config = fast_config(server.addr);
    // Shorter than one heartbeat round trip could ever take here, so only
    // the watchdog can end the session.
    config.liveness_timeout = Duration::from_millis(250);
    let link = spawn_client(config);
    let mut status_rx = link.subscribe_status();
    link.connect();

    assert!(wait_for_status(&mut status_rx, ConnectionStatus::Connected, Duration::from_secs(5)).await);
    // The server answers nothing, so the watchdog must tear the session
    // down and schedule a redial.
    assert!(
        wait_for_status(&mut status_rx, ConnectionStatus::Reconnecting, Duration::from_secs(5)).await,
        "watchdog never force-closed the silent session"
    );
    assert!(
        wait_for_status(&mut status_rx, ConnectionStatus::Connected, Duration::from_secs(5)).await,
        "client never recovered after the force-close"
    );
    assert!(server.accepts.load(Ordering::SeqCst) >= 2);

    link.disconnect();
}

#[tokio::test]
async fn offline_buffer_keeps_only_the_newest_frames() {
    // Reserve an address with no listener behind it yet.
    let probe_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe_listener.local_addr().unwrap();
    drop(probe_listener);

    let mut config = fast_config(addr);
    config.outbound_buffer_cap = 3;
    let link = spawn_client(config);
    let mut status_rx = link.subscribe_status();
    link.connect();

    // Let the first dial fail so the driver is parked in backoff, then pile
    // on more frames than the buffer holds.
    tokio::time::sleep(Duration::from_millis(150)).await;
    for n in 1..=5 {
        link.send(ClientFrame::Typing {
            receiver_id: format!("t{n}"),
            is_typing: true,
        });
    }

    let listener = TcpListener::bind(addr).await.unwrap();
    let frames: Recorded = Arc::new(Mutex::new(Vec::new()));
    serve_silently(listener, Arc::clone(&frames), Arc::new(AtomicUsize::new(0)));

    assert!(wait_for_status(&mut status_rx, ConnectionStatus::Connected, Duration::from_secs(5)).await);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let receivers: Vec<String> = frames
            .lock()
            .iter()
            .filter_map(|f| match f {
                ClientFrame::Typing { receiver_id, .. } => Some(receiver_id.clone()),
                _ => None,
            })
            .collect();
        if receivers.len() >= 3 {
            // Oldest-first flush of a full buffer: the first two frames were
            // dropped, the surviving three arrive in send order.
            assert_eq!(receivers, ["t3", "t4", "t5"]);
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "buffered frames never flushed, saw {receivers:?}"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    link.disconnect();
}
