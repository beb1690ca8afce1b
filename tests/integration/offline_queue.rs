// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Offline send behavior: with no backend reachable, sends land in the
//! durable queue instead of erroring, survive a client restart via the
//! store, and drain once the backend appears.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use murmur::cipher::aes::AesGcmCipher;
use murmur::coordinator::{ChatClient, ChatConfig, ChatEvent, SendOptions};
use murmur::rest::HttpBackend;
use murmur::store::memory::MemoryStore;
use murmur::token::StaticToken;
use murmur::transport::socket::SocketClient;
use murmur::transport::SocketConfig;
use murmur_proto::message::MessageStatus;
use tokio::sync::mpsc;

type Client = ChatClient<AesGcmCipher, HttpBackend<StaticToken>, Arc<MemoryStore>, SocketClient>;

const TEST_KEY: [u8; 32] = [7u8; 32];

async fn connect_user_with_store(
    addr: SocketAddr,
    user: &str,
    store: Arc<MemoryStore>,
) -> (Arc<Client>, mpsc::Receiver<ChatEvent>) {
    let tokens = Arc::new(StaticToken::new(user));
    let backend = HttpBackend::new(
        format!("http://{addr}/").parse().unwrap(),
        Arc::clone(&tokens),
    )
    .unwrap();
    let link = SocketClient::spawn(SocketConfig::new(format!("ws://{addr}")), tokens);
    let (client, events) = ChatClient::new(
        AesGcmCipher::new(&TEST_KEY),
        backend,
        store,
        link,
        ChatConfig::new(user),
    );
    client.initialize().await;
    (client, events)
}

/// Reserves an OS-assigned port and releases it so a later server can bind
/// it. Slightly racy in principle, fine for a test.
async fn reserved_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn wait_for(deadline: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    predicate()
}

#[tokio::test]
async fn unreachable_backend_queues_instead_of_failing() {
    let addr = reserved_addr().await;
    let store = Arc::new(MemoryStore::new());
    let (alice, _events) = connect_user_with_store(addr, "alice", store).await;

    let record = alice
        .send_message("bob", "written while offline", SendOptions::default())
        .await
        .unwrap();

    // No error, but no confirmation either: the record stays provisional
    // and queued.
    assert!(record.id.is_provisional());
    assert_eq!(record.status, MessageStatus::Queued);
    assert_eq!(alice.queue_len(), 1);

    // Still visible in the active list for the UI.
    assert_eq!(alice.messages().len(), 1);

    alice.shutdown();
}

#[tokio::test]
async fn queue_survives_restart_through_the_store() {
    let addr = reserved_addr().await;
    let store = Arc::new(MemoryStore::new());

    let (alice, _events) = connect_user_with_store(addr, "alice", Arc::clone(&store)).await;
    alice
        .send_message("bob", "first", SendOptions::default())
        .await
        .unwrap();
    alice
        .send_message("bob", "second", SendOptions::default())
        .await
        .unwrap();
    assert_eq!(alice.queue_len(), 2);
    alice.shutdown();

    // A fresh client over the same store picks up the cached list and the
    // pending queue.
    let (revived, _events) = connect_user_with_store(addr, "alice", store).await;
    assert_eq!(revived.queue_len(), 2);
    assert_eq!(revived.messages().len(), 2);

    revived.shutdown();
}

#[tokio::test]
async fn queue_drains_when_the_backend_comes_up() {
    let addr = reserved_addr().await;
    let store = Arc::new(MemoryStore::new());
    let (alice, _events) = connect_user_with_store(addr, "alice", store).await;

    alice
        .send_message("bob", "first", SendOptions::default())
        .await
        .unwrap();
    alice
        .send_message("bob", "second", SendOptions::default())
        .await
        .unwrap();
    assert_eq!(alice.queue_len(), 2);

    // Bring the hub up on the address the client is already pointed at.
    // The socket client's retry loop finds it and the `connected`
    // transition flushes the queue.
    let (_bound, server) = murmur_hub::start_server(&addr.to_string()).await.unwrap();

    assert!(
        wait_for(Duration::from_secs(10), || alice.queue_len() == 0).await,
        "queue never drained"
    );
    let messages = alice.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.status.is_confirmed()));
    assert!(messages.iter().all(|m| !m.id.is_provisional()));

    alice.shutdown();
    server.abort();
}
