//! Shared fixtures for coordinator unit tests: a scriptable backend, an
//! in-process link, and a fully wired client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use murmur_proto::message::{Message, MessageId, MessageStatus, MessageType, Reactions};

use crate::cipher::ContentCipher;
use crate::cipher::aes::AesGcmCipher;
use crate::rest::{BackendApi, RestError};
use crate::store::memory::MemoryStore;
use crate::transport::loopback::LoopbackLink;
use crate::transport::ConnectionStatus;

use super::{ChatClient, ChatConfig, ChatEvent};

pub(crate) const TEST_KEY: [u8; 32] = [7u8; 32];

/// Scriptable [`BackendApi`]: records every call, fails on demand, and
/// serves `fetch_messages` from a newest-first history vector.
#[derive(Default)]
pub(crate) struct MockBackend {
    fail: AtomicBool,
    next_id: AtomicUsize,
    pub sent: Mutex<Vec<Message>>,
    pub deleted: Mutex<Vec<(String, bool)>>,
    pub marked_read: Mutex<Vec<String>>,
    pub history: Mutex<Vec<Message>>,
    pub fetch_calls: AtomicUsize,
}

impl MockBackend {
    pub fn fetch_call_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

impl MockBackend {
    pub fn fail_requests(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RestError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(RestError::Status(503))
        } else {
            Ok(())
        }
    }
}

impl BackendApi for MockBackend {
    async fn send_message(&self, draft: &Message) -> Result<Message, RestError> {
        self.check()?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut confirmed = draft.clone();
        confirmed.id = MessageId::new(format!("srv-{n}"));
        confirmed.status = MessageStatus::Sent;
        self.sent.lock().push(confirmed.clone());
        Ok(confirmed)
    }

    async fn fetch_messages(
        &self,
        limit: usize,
        offset: usize,
        last_sync: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, RestError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let history = self.history.lock().clone();
        Ok(history
            .into_iter()
            .filter(|m| last_sync.is_none_or(|watermark| m.created_at > watermark))
            .skip(offset)
            .take(limit)
            .collect())
    }

    async fn delete_message(&self, id: &str, for_everyone: bool) -> Result<(), RestError> {
        self.check()?;
        self.deleted.lock().push((id.to_owned(), for_everyone));
        Ok(())
    }

    async fn react(&self, id: &str, emoji: &str) -> Result<Reactions, RestError> {
        self.check()?;
        let _ = id;
        let mut reactions = Reactions::new();
        reactions.entry(emoji.to_owned()).or_default().insert("bob".into());
        Ok(reactions)
    }

    async fn mark_read(&self, id: &str) -> Result<(), RestError> {
        self.check()?;
        self.marked_read.lock().push(id.to_owned());
        Ok(())
    }
}

pub(crate) struct Harness {
    pub client: Arc<ChatClient<AesGcmCipher, Arc<MockBackend>, Arc<MemoryStore>, Arc<LoopbackLink>>>,
    pub events: mpsc::Receiver<ChatEvent>,
    pub backend: Arc<MockBackend>,
    pub store: Arc<MemoryStore>,
    pub link: Arc<LoopbackLink>,
}

impl Harness {
    /// Places a confirmed incoming message (from `sender` to the current
    /// user) directly into the active list, bypassing the wire.
    pub fn push_incoming(&self, id: &str, sender: &str) {
        let message = incoming_message(id, sender, "hi");
        self.client.state.lock().list.insert_head(message);
    }
}

/// A fully wired client over mock collaborators. `online` controls whether
/// the link starts in `Connected` or stays scriptable via `link.set_status`.
pub(crate) fn harness(online: bool) -> Harness {
    harness_with(online, crate::rest::PAGE_SIZE)
}

/// Like [`harness`] with a custom page size for pagination tests.
pub(crate) fn harness_with(online: bool, page_size: usize) -> Harness {
    let backend = Arc::new(MockBackend::default());
    let store = Arc::new(MemoryStore::new());
    let link = Arc::new(LoopbackLink::offline());
    if online {
        link.set_status(ConnectionStatus::Connected);
    }
    let mut config = ChatConfig::new("alice");
    config.page_size = page_size;
    let (client, events) = ChatClient::new(
        AesGcmCipher::new(&TEST_KEY),
        Arc::clone(&backend),
        Arc::clone(&store),
        Arc::clone(&link),
        config,
    );
    Harness {
        client,
        events,
        backend,
        store,
        link,
    }
}

/// A server-confirmed message addressed to the current test user, content
/// encrypted with [`TEST_KEY`].
pub(crate) fn incoming_message(id: &str, sender: &str, text: &str) -> Message {
    let cipher = AesGcmCipher::new(&TEST_KEY);
    let encrypted = cipher.encrypt(text).unwrap();
    let mut message = Message::outgoing(
        sender,
        "alice",
        MessageType::Text,
        encrypted.ciphertext,
        encrypted.iv,
        MessageStatus::Sent,
    );
    message.id = MessageId::new(id);
    message
}

/// Decrypts the whole active list in display order.
pub(crate) fn decrypt_all(h: &Harness) -> Vec<String> {
    h.client
        .messages()
        .iter()
        .map(|m| h.client.decrypt_message(m))
        .collect()
}
