//! The delivery coordinator.
//!
//! [`ChatClient`] is the single source of truth for the visible message
//! list, the outbound queue, and typing/read-receipt signaling. It owns the
//! reconciliation of optimistic local records with server-confirmed ones
//! (matched by `client_id`) and guarantees exactly-once visual effect on
//! top of at-least-once delivery attempts.
//!
//! One instance per session, explicitly constructed and explicitly owned --
//! collaborators are injected through the type parameters, and UI layers
//! observe the client through its accessors and the [`ChatEvent`] channel.

pub mod list;
mod receive;
mod send;

pub use send::SendOptions;

#[cfg(test)]
pub(crate) mod testutil;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use murmur_proto::message::{ClientId, Message, MessageStatus, ValidationError};

use crate::cipher::{CipherError, ContentCipher};
use crate::rest::{self, BackendApi};
use crate::store::{PROFILE_KEY, StateStore, collections};
use crate::transport::{ConnectionStatus, RealtimeLink};

use list::MessageList;

/// Fixed placeholder shown when content cannot be decrypted. Decryption
/// failure must never break message rendering.
pub const DECRYPT_PLACEHOLDER: &str = "[Unable to decrypt message]";

/// Placeholder shown for messages deleted for everyone.
pub const DELETED_PLACEHOLDER: &str = "[Message deleted]";

/// Errors returned by [`ChatClient::send_message`].
///
/// Only local pipeline failures surface here; network failure is not an
/// error -- the message stays visible as `queued` and retries on the next
/// flush.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Content validation failed (empty, too large).
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Content could not be encrypted.
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),
}

/// Events emitted for UI consumption.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// The active list changed shape (insert, remove, reload, clear).
    MessageListChanged,
    /// An inbound message was accepted into the list.
    MessageReceived {
        /// The received message (content still encrypted).
        message: Message,
    },
    /// A message's delivery status changed.
    StatusChanged {
        /// Idempotency key of the affected message.
        client_id: ClientId,
        /// The new status.
        status: MessageStatus,
    },
    /// The peer started or stopped typing.
    TypingChanged {
        /// Who is typing.
        sender_id: String,
        /// Whether they are typing now.
        is_typing: bool,
    },
    /// The realtime connection changed status.
    ConnectionChanged(ConnectionStatus),
    /// A background failure was recorded into the observable error field.
    ErrorRecorded(String),
}

/// Construction parameters for [`ChatClient`].
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// The signed-in user id; becomes `sender_id` on outgoing messages.
    pub user_id: String,
    /// Page size for pagination and sync fetches.
    pub page_size: usize,
    /// Capacity of the [`ChatEvent`] channel.
    pub event_buffer: usize,
}

impl ChatConfig {
    /// Defaults for the given user.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            page_size: rest::PAGE_SIZE,
            event_buffer: 256,
        }
    }
}

/// Mutable coordinator state.
///
/// Guarded by a sync mutex that is never held across an await point;
/// operations snapshot what they need, release the lock, then perform I/O.
pub(crate) struct ClientState {
    pub(crate) list: MessageList,
    /// Outbound queue in insertion order, deduplicated by `client_id`.
    pub(crate) outbox: Vec<Message>,
    /// False once a page came back short.
    pub(crate) has_more: bool,
    /// Pagination in-flight guard.
    pub(crate) fetching: bool,
    /// Queue-flush in-flight guard.
    pub(crate) flushing: bool,
    /// Peer typing flags keyed by sender id.
    pub(crate) typing: HashMap<String, bool>,
    /// Last background failure, observable by the UI.
    pub(crate) last_error: Option<String>,
}

impl ClientState {
    fn new() -> Self {
        Self {
            list: MessageList::new(),
            outbox: Vec::new(),
            has_more: true,
            fetching: false,
            flushing: false,
            typing: HashMap::new(),
            last_error: None,
        }
    }
}

/// The delivery coordinator. See the module docs.
pub struct ChatClient<C, R, S, L> {
    pub(crate) cipher: C,
    pub(crate) backend: R,
    pub(crate) store: S,
    pub(crate) link: L,
    pub(crate) config: ChatConfig,
    pub(crate) state: Mutex<ClientState>,
    event_tx: mpsc::Sender<ChatEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<C, R, S, L> ChatClient<C, R, S, L>
where
    C: ContentCipher + 'static,
    R: BackendApi + 'static,
    S: StateStore + 'static,
    L: RealtimeLink,
{
    /// Creates the client and the event receiver the UI should consume.
    ///
    /// The client is inert until [`initialize`](Self::initialize).
    pub fn new(
        cipher: C,
        backend: R,
        store: S,
        link: L,
        config: ChatConfig,
    ) -> (Arc<Self>, mpsc::Receiver<ChatEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        let client = Arc::new(Self {
            cipher,
            backend,
            store,
            link,
            config,
            state: Mutex::new(ClientState::new()),
            event_tx,
            tasks: Mutex::new(Vec::new()),
        });
        (client, event_rx)
    }

    /// Loads cached state, wires the realtime link, and performs the
    /// initial sync.
    ///
    /// Storage failures are recorded, not propagated: the client starts
    /// with whatever could be loaded.
    pub async fn initialize(self: &Arc<Self>) {
        self.load_cached().await;

        // Subscribe before connecting so the first `connected` transition
        // (which triggers sync and queue flush) cannot be missed.
        let status_task = {
            let client = Arc::clone(self);
            let mut status_rx = self.link.subscribe_status();
            tokio::spawn(async move {
                loop {
                    match status_rx.recv().await {
                        Ok(status) => {
                            client.emit(ChatEvent::ConnectionChanged(status));
                            if status == ConnectionStatus::Connected {
                                client.sync_messages().await;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "status subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        };
        let frame_task = {
            let client = Arc::clone(self);
            let mut frame_rx = self.link.subscribe_frames();
            tokio::spawn(async move {
                loop {
                    match frame_rx.recv().await {
                        Ok(frame) => client.handle_frame(frame).await,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "frame subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        };
        self.tasks.lock().extend([status_task, frame_task]);

        self.link.connect();
        self.sync_messages().await;
    }

    /// Stops background tasks and closes the realtime connection.
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.link.disconnect();
    }

    /// The signed-in user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.config.user_id
    }

    /// Snapshot of the active list, newest first.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().list.snapshot()
    }

    /// Number of messages waiting in the outbound queue.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.state.lock().outbox.len()
    }

    /// Whether older pages may still exist on the server.
    #[must_use]
    pub fn has_more_messages(&self) -> bool {
        self.state.lock().has_more
    }

    /// Whether the given peer is currently typing.
    #[must_use]
    pub fn is_peer_typing(&self, sender_id: &str) -> bool {
        self.state
            .lock()
            .typing
            .get(sender_id)
            .copied()
            .unwrap_or(false)
    }

    /// Last recorded background failure, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    /// Current realtime connection status.
    #[must_use]
    pub fn connection_status(&self) -> ConnectionStatus {
        self.link.status()
    }

    /// Decrypts a message body for rendering.
    ///
    /// Tombstoned messages render as [`DELETED_PLACEHOLDER`]; any
    /// decryption failure renders as [`DECRYPT_PLACEHOLDER`]. Never fails.
    #[must_use]
    pub fn decrypt_message(&self, message: &Message) -> String {
        if message.is_tombstoned() {
            return DELETED_PLACEHOLDER.to_owned();
        }
        match self
            .cipher
            .decrypt(&message.encrypted_content, &message.encryption_iv)
        {
            Ok(plaintext) => plaintext,
            Err(err) => {
                debug!(client_id = %message.client_id, %err, "decrypt failed");
                DECRYPT_PLACEHOLDER.to_owned()
            }
        }
    }

    /// Purges all persisted collections and resets in-memory state.
    pub async fn clear_all_messages(&self) {
        if let Err(err) = self.store.clear(collections::MESSAGES).await {
            self.record_error("clear messages", &err);
        }
        if let Err(err) = self.store.clear(collections::OUTBOX).await {
            self.record_error("clear outbox", &err);
        }
        {
            let mut state = self.state.lock();
            state.list.clear();
            state.outbox.clear();
            state.has_more = true;
        }
        self.emit(ChatEvent::MessageListChanged);
    }

    async fn load_cached(self: &Arc<Self>) {
        let cached = match self.store.values(collections::MESSAGES).await {
            Ok(values) => values,
            Err(err) => {
                self.record_error("load cached messages", &err);
                Vec::new()
            }
        };
        let queued = match self.store.values(collections::OUTBOX).await {
            Ok(values) => values,
            Err(err) => {
                self.record_error("load outbox", &err);
                Vec::new()
            }
        };

        let mut messages: Vec<Message> = cached
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(message) => Some(message),
                Err(err) => {
                    warn!(%err, "skipping malformed cached message");
                    None
                }
            })
            .collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let outbox: Vec<Message> = queued
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(message) => Some(message),
                Err(err) => {
                    warn!(%err, "skipping malformed outbox entry");
                    None
                }
            })
            .collect();

        {
            let mut state = self.state.lock();
            for message in messages {
                state.list.append_tail(message);
            }
            state.outbox = outbox;
        }

        let profile = serde_json::json!({ "user_id": self.config.user_id });
        if let Err(err) = self
            .store
            .put(collections::PROFILE, PROFILE_KEY, profile)
            .await
        {
            self.record_error("persist profile", &err);
        }

        self.emit(ChatEvent::MessageListChanged);
    }

    /// Cache key for a message: server id once assigned, `client_id` while
    /// provisional.
    pub(crate) fn cache_key(message: &Message) -> &str {
        if message.id.is_provisional() {
            message.client_id.as_str()
        } else {
            message.id.as_str()
        }
    }

    /// Best-effort cache write; failures are recorded, never propagated.
    pub(crate) async fn persist_message(&self, message: &Message) {
        match serde_json::to_value(message) {
            Ok(value) => {
                if let Err(err) = self
                    .store
                    .put(collections::MESSAGES, Self::cache_key(message), value)
                    .await
                {
                    self.record_error("persist message", &err);
                }
            }
            Err(err) => self.record_error("encode message", &err),
        }
    }

    pub(crate) async fn drop_cached(&self, key: &str) {
        if let Err(err) = self.store.delete(collections::MESSAGES, key).await {
            self.record_error("drop cached message", &err);
        }
    }

    /// Emits a UI event; drops it if the receiver is full or gone. Events
    /// are notifications, not state -- state is always re-readable from the
    /// accessors.
    pub(crate) fn emit(&self, event: ChatEvent) {
        if self.event_tx.try_send(event).is_err() {
            debug!("event channel full or closed, dropping event");
        }
    }

    /// Records a background failure into the observable error field.
    pub(crate) fn record_error(&self, context: &str, err: &dyn fmt::Display) {
        let text = format!("{context}: {err}");
        warn!("{text}");
        self.state.lock().last_error = Some(text.clone());
        self.emit(ChatEvent::ErrorRecorded(text));
    }
}
