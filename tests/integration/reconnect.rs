// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Reconnect behavior of the socket client: a dropped connection moves the
//! client through `reconnecting` back to `connected` without any caller
//! involvement, and the session keeps working afterwards.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use murmur::cipher::aes::AesGcmCipher;
use murmur::coordinator::{ChatClient, ChatConfig, ChatEvent, SendOptions};
use murmur::rest::HttpBackend;
use murmur::store::memory::MemoryStore;
use murmur::token::StaticToken;
use murmur::transport::socket::SocketClient;
use murmur::transport::{ConnectionStatus, SocketConfig};
use murmur_hub::state::HubState;
use tokio::sync::mpsc;

type Client = ChatClient<AesGcmCipher, HttpBackend<StaticToken>, MemoryStore, SocketClient>;

const TEST_KEY: [u8; 32] = [7u8; 32];

async fn connect_user(addr: SocketAddr, user: &str) -> (Arc<Client>, mpsc::Receiver<ChatEvent>) {
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
        MemoryStore::new(),
        link,
        ChatConfig::new(user),
    );
    client.initialize().await;
    (client, events)
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
async fn dropped_connection_recovers_on_its_own() {
    let state = Arc::new(HubState::new());
    let (addr, server) = murmur_hub::http::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();

    let (alice, mut events) = connect_user(addr, "alice").await;
    assert!(
        wait_for(Duration::from_secs(5), || {
            alice.connection_status() == ConnectionStatus::Connected
        })
        .await
    );

    // Sever the socket from the server side.
    state.close_all_connections();

    // The client notices the drop...
    assert!(
        wait_for(Duration::from_secs(5), || {
            alice.connection_status() != ConnectionStatus::Connected
        })
        .await,
        "client never noticed the drop"
    );

    // ...and recovers without caller involvement.
    assert!(
        wait_for(Duration::from_secs(10), || {
            alice.connection_status() == ConnectionStatus::Connected
        })
        .await,
        "client never reconnected"
    );

    // The status stream saw a non-connected intermediate state.
    let mut saw_drop = false;
    while let Ok(event) = events.try_recv() {
        if let ChatEvent::ConnectionChanged(status) = event {
            if status != ConnectionStatus::Connected {
                saw_drop = true;
            }
        }
    }
    assert!(saw_drop, "no disconnect was surfaced to the event stream");

    alice.shutdown();
    server.abort();
}

#[tokio::test]
async fn session_works_after_reconnect() {
    let state = Arc::new(HubState::new());
    let (addr, server) = murmur_hub::http::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();

    let (alice, _events) = connect_user(addr, "alice").await;
    assert!(
        wait_for(Duration::from_secs(5), || {
            alice.connection_status() == ConnectionStatus::Connected
        })
        .await
    );

    state.close_all_connections();
    assert!(
        wait_for(Duration::from_secs(5), || {
            alice.connection_status() != ConnectionStatus::Connected
        })
        .await
    );
    assert!(
        wait_for(Duration::from_secs(10), || {
            alice.connection_status() == ConnectionStatus::Connected
        })
        .await
    );

    // Sends still confirm on the recovered session.
    let record = alice
        .send_message("bob", "after the blip", SendOptions::default())
        .await
        .unwrap();
    assert!(record.status.is_confirmed());

    alice.shutdown();
    server.abort();
}
