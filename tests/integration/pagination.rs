// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! History pagination against a pre-seeded hub: the initial sync pulls the
//! newest page, `fetch_more_messages` walks backwards, and a short page
//! latches the end of history.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use murmur::cipher::aes::AesGcmCipher;
use murmur::coordinator::{ChatClient, ChatConfig, ChatEvent};
use murmur::rest::HttpBackend;
use murmur::store::memory::MemoryStore;
use murmur::token::StaticToken;
use murmur::transport::socket::SocketClient;
use murmur::transport::SocketConfig;
use murmur_hub::state::HubState;
use murmur_proto::message::{Message, MessageStatus, MessageType};
use tokio::sync::mpsc;

type Client = ChatClient<AesGcmCipher, HttpBackend<StaticToken>, MemoryStore, SocketClient>;

const TEST_KEY: [u8; 32] = [7u8; 32];

async fn connect_user_with_page_size(
    addr: SocketAddr,
    user: &str,
    page_size: usize,
) -> (Arc<Client>, mpsc::Receiver<ChatEvent>) {
    let tokens = Arc::new(StaticToken::new(user));
    let backend = HttpBackend::new(
        format!("http://{addr}/").parse().unwrap(),
        Arc::clone(&tokens),
    )
    .unwrap();
    let link = SocketClient::spawn(SocketConfig::new(format!("ws://{addr}")), tokens);
    let mut config = ChatConfig::new(user);
    config.page_size = page_size;
    let (client, events) = ChatClient::new(
        AesGcmCipher::new(&TEST_KEY),
        backend,
        MemoryStore::new(),
        link,
        config,
    );
    client.initialize().await;
    (client, events)
}

/// Polls `predicate` until it holds or the deadline passes.
async fn wait_for(
    deadline: std::time::Duration,
    mut predicate: impl FnMut() -> bool,
) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    predicate()
}

/// Seeds `count` alice<->bob messages with strictly increasing timestamps.
fn seed_history(state: &HubState, count: i64) {
    let base = Utc::now() - ChronoDuration::hours(1);
    for n in 0..count {
        let mut message = Message::outgoing(
            "bob",
            "alice",
            MessageType::Text,
            format!("Y3Qte30={n}"),
            "aXY=".into(),
            MessageStatus::Sending,
        );
        message.created_at = base + ChronoDuration::seconds(n);
        state.insert_message(message);
    }
}

#[tokio::test]
async fn initial_sync_pulls_one_page_newest_first() {
    let state = Arc::new(HubState::new());
    seed_history(&state, 12);
    let (addr, server) = murmur_hub::http::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();

    let (alice, _events) = connect_user_with_page_size(addr, "alice", 5).await;

    // The initial sync fires once the socket reports connected.
    assert!(
        wait_for(std::time::Duration::from_secs(5), || {
            alice.messages().len() == 5
        })
        .await,
        "initial page never arrived"
    );

    let messages = alice.messages();
    assert!(messages.windows(2).all(|w| w[0].created_at > w[1].created_at));
    assert!(alice.has_more_messages());

    alice.shutdown();
    server.abort();
}

#[tokio::test]
async fn fetch_more_walks_back_and_latches_the_end() {
    let state = Arc::new(HubState::new());
    seed_history(&state, 12);
    let (addr, server) = murmur_hub::http::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();

    let (alice, _events) = connect_user_with_page_size(addr, "alice", 5).await;
    assert!(
        wait_for(std::time::Duration::from_secs(5), || {
            alice.messages().len() == 5
        })
        .await
    );

    alice.fetch_more_messages().await;
    assert_eq!(alice.messages().len(), 10);
    assert!(alice.has_more_messages());

    // The last page is short: 2 entries, end of history.
    alice.fetch_more_messages().await;
    let messages = alice.messages();
    assert_eq!(messages.len(), 12);
    assert!(!alice.has_more_messages());

    // Still newest first across page boundaries, no duplicates.
    assert!(messages.windows(2).all(|w| w[0].created_at > w[1].created_at));

    // Further calls are no-ops.
    alice.fetch_more_messages().await;
    assert_eq!(alice.messages().len(), 12);

    alice.shutdown();
    server.abort();
}
